//! EventHub: listener registry for terminal and channel events
//!
//! Both sides of an attachment (terminal surface and transport channel) expose
//! their notifications through an `EventHub`. Strategies register closures and
//! keep the returned `ListenerId` so that detaching removes exactly what they
//! added.
//!
//! The hub never deduplicates listeners: registering the same logic twice
//! yields two deliveries. Callers that must not double-register (re-attach)
//! have to remove their previous listener first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::AttachError;

/// Process-wide id source, so an id removed from the wrong hub is a no-op.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`EventHub::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) -> Result<(), AttachError> + Send + Sync>;

/// Ordered list of listeners for one event type.
pub struct EventHub<E> {
    listeners: Mutex<Vec<(ListenerId, Listener<E>)>>,
}

impl<E> EventHub<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener. Listeners run in registration order.
    pub fn listen<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&E) -> Result<(), AttachError> + Send + Sync + 'static,
    {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(handler)));
        id
    }

    /// Remove a listener. Returns false if it was not registered here.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Deliver an event to every listener.
    ///
    /// The list is snapshotted first: a handler may detach itself (or others)
    /// while the event is being delivered. Every handler runs; the first
    /// error is returned.
    pub fn emit(&self, event: &E) -> Result<(), AttachError> {
        let snapshot: Vec<Listener<E>> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        let mut first_err = None;
        for listener in snapshot {
            if let Err(e) = listener(event) {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_listen_and_emit() {
        let hub: EventHub<u32> = EventHub::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        hub.listen(move |v| {
            seen_clone.fetch_add(*v as usize, Ordering::SeqCst);
            Ok(())
        });

        hub.emit(&3).unwrap();
        hub.emit(&4).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_no_dedup_by_identity() {
        let hub: EventHub<()> = EventHub::new();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let c = count.clone();
            hub.listen(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        hub.emit(&()).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unlisten_foreign_id_is_noop() {
        let a: EventHub<()> = EventHub::new();
        let b: EventHub<()> = EventHub::new();
        let id = a.listen(|_| Ok(()));

        assert!(!b.unlisten(id));
        assert_eq!(a.listener_count(), 1);
        assert!(a.unlisten(id));
        assert!(!a.unlisten(id));
        assert_eq!(a.listener_count(), 0);
    }

    #[test]
    fn test_all_listeners_run_and_first_error_returned() {
        let hub: EventHub<()> = EventHub::new();
        let ran = Arc::new(AtomicUsize::new(0));

        hub.listen(|_| Err(AttachError::Parser("first".into())));
        let ran_clone = ran.clone();
        hub.listen(move |_| {
            ran_clone.fetch_add(1, Ordering::SeqCst);
            Err(AttachError::Parser("second".into()))
        });

        let err = hub.emit(&()).unwrap_err();
        assert!(err.to_string().contains("first"));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_unlisten_during_emit() {
        let hub: Arc<EventHub<()>> = Arc::new(EventHub::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let hub_weak = Arc::downgrade(&hub);
        let slot_clone = slot.clone();
        let id = hub.listen(move |_| {
            if let (Some(hub), Some(id)) = (hub_weak.upgrade(), *slot_clone.lock()) {
                hub.unlisten(id);
            }
            Ok(())
        });
        *slot.lock() = Some(id);

        hub.emit(&()).unwrap();
        assert_eq!(hub.listener_count(), 0);
    }
}
