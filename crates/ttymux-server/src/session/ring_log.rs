//! Circular buffer for session output replay.
//!
//! Stores the last N bytes a supervised command produced so that a
//! late-joining or reconnecting client can receive a scrollback snapshot
//! without the server keeping unbounded history. Once full, the oldest
//! bytes are silently overwritten — replay is best-effort, not durable.

use ttymux_core::{TtyError, TtyResult};

/// Default per-session log capacity (64 KiB).
pub const DEFAULT_LOG_CAPACITY: usize = 64 * 1024;

/// An owned copy of buffered output, detached from the log it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl std::ops::Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

/// A fixed-capacity circular byte log with overwrite-oldest semantics.
///
/// The backing store is exactly `capacity` bytes; `write` and `read` are
/// offsets in `[0, capacity)`. `wrapped` records whether the write cursor
/// has ever passed the end of the store, which is what decides how many
/// bytes a snapshot returns. Invariant: the oldest retained byte sits at
/// `read`, which equals `write` once wrapped and 0 before.
#[derive(Debug)]
pub struct RingLog {
    buf: Vec<u8>,
    capacity: usize,
    write: usize,
    read: usize,
    wrapped: bool,
}

impl RingLog {
    /// Create a log with the given capacity in bytes.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring log capacity must be non-zero");
        Self {
            buf: vec![0u8; capacity],
            capacity,
            write: 0,
            read: 0,
            wrapped: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bytes currently available for replay.
    pub fn len(&self) -> usize {
        if self.wrapped {
            self.capacity
        } else {
            self.write
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append output bytes, overwriting the oldest data if needed.
    ///
    /// Always retains input and returns `data.len()`; an input at least as
    /// large as the capacity discards everything previously logged and
    /// keeps only its last `capacity` bytes.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let len = data.len();
        if len == 0 {
            return 0;
        }

        if len >= self.capacity {
            self.buf.copy_from_slice(&data[len - self.capacity..]);
            self.write = 0;
            self.read = 0;
            self.wrapped = true;
            return len;
        }

        let tail = self.capacity - self.write;
        if len < tail {
            self.buf[self.write..self.write + len].copy_from_slice(data);
            self.write += len;
        } else {
            // Fill the remaining tail, then continue from the start.
            self.buf[self.write..].copy_from_slice(&data[..tail]);
            self.buf[..len - tail].copy_from_slice(&data[tail..]);
            self.write = len - tail;
            self.wrapped = true;
        }

        if self.wrapped {
            self.read = self.write;
        }

        len
    }

    /// Copy out buffered bytes in logical order, oldest first.
    ///
    /// `requested == 0` means "everything retained": the full capacity once
    /// the log has wrapped, otherwise exactly the bytes written so far. A
    /// positive `requested` returns the oldest `requested` bytes; asking
    /// for more than the capacity is rejected.
    pub fn snapshot(&self, requested: usize) -> TtyResult<ByteBuffer> {
        if requested > self.capacity {
            return Err(TtyError::SnapshotTooLarge {
                requested,
                capacity: self.capacity,
            });
        }

        let available = self.len();
        let wanted = if requested == 0 { available } else { requested };
        let wanted = wanted.min(available);

        let mut out = Vec::with_capacity(wanted);
        if self.wrapped {
            let tail = &self.buf[self.read..];
            if wanted <= tail.len() {
                out.extend_from_slice(&tail[..wanted]);
            } else {
                out.extend_from_slice(tail);
                out.extend_from_slice(&self.buf[..wanted - tail.len()]);
            }
        } else {
            out.extend_from_slice(&self.buf[..wanted]);
        }

        Ok(ByteBuffer::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retains_in_order_under_capacity() {
        let mut log = RingLog::new(16);
        assert_eq!(log.append(b"hello "), 6);
        assert_eq!(log.append(b"world"), 5);
        assert_eq!(&*log.snapshot(0).unwrap(), b"hello world");
        assert_eq!(log.len(), 11);
    }

    #[test]
    fn keeps_last_capacity_bytes_after_wrap() {
        // Capacity 8: "abcdefgh" then "ij" drops the oldest two.
        let mut log = RingLog::new(8);
        log.append(b"abcdefgh");
        log.append(b"ij");
        assert_eq!(&*log.snapshot(0).unwrap(), b"cdefghij");
        assert_eq!(log.len(), 8);
    }

    #[test]
    fn oversized_append_keeps_trailing_window() {
        let mut log = RingLog::new(4);
        log.append(b"xy");
        assert_eq!(log.append(b"abcdefgh"), 8);
        assert_eq!(&*log.snapshot(0).unwrap(), b"efgh");
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn exact_fill_reports_full() {
        let mut log = RingLog::new(4);
        log.append(b"abcd");
        assert_eq!(&*log.snapshot(0).unwrap(), b"abcd");
        log.append(b"e");
        assert_eq!(&*log.snapshot(0).unwrap(), b"bcde");
    }

    #[test]
    fn split_write_preserves_order() {
        let mut log = RingLog::new(8);
        log.append(b"abcdef");
        // Two bytes fit the tail, three wrap to the head.
        log.append(b"ghijk");
        assert_eq!(&*log.snapshot(0).unwrap(), b"defghijk");
    }

    #[test]
    fn partial_snapshot_returns_oldest() {
        let mut log = RingLog::new(8);
        log.append(b"abcdef");
        assert_eq!(&*log.snapshot(3).unwrap(), b"abc");

        log.append(b"ghij");
        // Wrapped; oldest retained is 'c'.
        assert_eq!(&*log.snapshot(4).unwrap(), b"cdef");
    }

    #[test]
    fn snapshot_over_capacity_rejected() {
        let log = RingLog::new(8);
        assert!(matches!(
            log.snapshot(9),
            Err(TtyError::SnapshotTooLarge {
                requested: 9,
                capacity: 8
            })
        ));
    }

    #[test]
    fn empty_log_snapshots_empty() {
        let log = RingLog::new(8);
        assert!(log.snapshot(0).unwrap().is_empty());
        assert!(log.is_empty());
    }
}
