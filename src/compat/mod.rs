//! Platform compatibility shims

pub mod winpty;

pub use winpty::{HostPlatform, WinptyCompat};
