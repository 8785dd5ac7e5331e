//! Bounded capture of combined process output

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Default capacity of an [`OutputBuffer`] (1 MiB)
pub const DEFAULT_OUTPUT_LIMIT: usize = 1024 * 1024;

/// Shared ring buffer holding the most recent output of one process
///
/// Standard output and standard error are appended to the same buffer in the
/// order the pumps observe them. Once `limit` bytes are held, the oldest bytes
/// are discarded. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    inner: Arc<Mutex<Ring>>,
}

#[derive(Debug)]
struct Ring {
    bytes: VecDeque<u8>,
    limit: usize,
    dropped: u64,
}

impl OutputBuffer {
    /// Create an empty buffer holding at most `limit` bytes
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Ring {
                bytes: VecDeque::new(),
                limit: limit.max(1),
                dropped: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        // A panicking pump cannot leave the ring in a torn state
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a chunk, evicting the oldest bytes past the limit
    pub fn push(&self, chunk: &[u8]) {
        let mut ring = self.lock();
        let limit = ring.limit;

        if chunk.len() >= limit {
            let skipped = chunk.len() - limit;
            ring.dropped += (ring.bytes.len() + skipped) as u64;
            ring.bytes.clear();
            ring.bytes.extend(&chunk[skipped..]);
            return;
        }

        let overflow = (ring.bytes.len() + chunk.len()).saturating_sub(limit);
        if overflow > 0 {
            ring.bytes.drain(..overflow);
            ring.dropped += overflow as u64;
        }
        ring.bytes.extend(chunk);
    }

    /// Contents as text, invalid UTF-8 replaced
    pub fn contents(&self) -> String {
        let ring = self.lock();
        let (front, back) = ring.bytes.as_slices();
        let mut bytes = Vec::with_capacity(front.len() + back.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Number of bytes currently held
    pub fn len(&self) -> usize {
        self.lock().bytes.len()
    }

    /// Whether nothing has been captured (or everything was cleared)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes discarded so far because the limit was reached
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Maximum number of bytes held
    pub fn limit(&self) -> usize {
        self.lock().limit
    }

    /// Forget everything captured so far
    pub fn clear(&self) {
        let mut ring = self.lock();
        ring.bytes.clear();
        ring.dropped = 0;
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_everything_under_limit() {
        let buf = OutputBuffer::new(16);
        buf.push(b"hello ");
        buf.push(b"world");
        assert_eq!(buf.contents(), "hello world");
        assert_eq!(buf.dropped(), 0);
    }

    #[test]
    fn evicts_oldest_bytes() {
        let buf = OutputBuffer::new(8);
        buf.push(b"abcdef");
        buf.push(b"ghij");
        assert_eq!(buf.contents(), "cdefghij");
        assert_eq!(buf.len(), 8);
        assert_eq!(buf.dropped(), 2);
    }

    #[test]
    fn oversized_chunk_keeps_its_tail() {
        let buf = OutputBuffer::new(4);
        buf.push(b"xy");
        buf.push(b"0123456789");
        assert_eq!(buf.contents(), "6789");
        assert_eq!(buf.dropped(), 8);
    }

    #[test]
    fn clones_share_storage() {
        let buf = OutputBuffer::new(32);
        let pump_side = buf.clone();
        pump_side.push(b"line\n");
        assert_eq!(buf.contents(), "line\n");

        buf.clear();
        assert!(pump_side.is_empty());
    }
}
