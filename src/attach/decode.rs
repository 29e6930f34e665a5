//! Streaming UTF-8 decoding for binary channel payloads

/// Per-binding decoder that carries an incomplete trailing character over to
/// the next chunk instead of rendering U+FFFD for each half.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk. Invalid sequences are replaced, incomplete trailing
    /// sequences are held back until the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(chunk);

        let boundary = find_utf8_safe_boundary(&buf);
        self.carry = buf.split_off(boundary);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Bytes held back waiting for the rest of a character.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }
}

/// Find a safe UTF-8 boundary in a byte slice.
/// Returns the index up to which the bytes form complete UTF-8 characters.
/// Any trailing incomplete multi-byte sequence is excluded.
fn find_utf8_safe_boundary(buf: &[u8]) -> usize {
    if buf.is_empty() {
        return 0;
    }

    let mut i = buf.len();

    // Max UTF-8 char is 4 bytes
    while i > 0 && i > buf.len().saturating_sub(4) {
        let byte = buf[i - 1];

        // ASCII (stray continuation bytes after it can never complete)
        if byte & 0x80 == 0 {
            return buf.len();
        }

        // Continuation byte, keep going back
        if byte & 0xC0 == 0x80 {
            i -= 1;
            continue;
        }

        let char_len = if byte & 0xF8 == 0xF0 {
            4
        } else if byte & 0xF0 == 0xE0 {
            3
        } else if byte & 0xE0 == 0xC0 {
            2
        } else {
            // Invalid start byte, let the lossy decode handle it
            return buf.len();
        };

        let start_pos = i - 1;
        let available = buf.len() - start_pos;

        return if available >= char_len {
            buf.len()
        } else {
            start_pos
        };
    }

    // Only continuation bytes in the tail window: not a char we can complete
    buf.len()
}
