//! Generic fixed-capacity ring buffer for single-writer, multi-reader use.
//!
//! This is the bounded store at the heart of the pipeline: the acquisition
//! producer pushes into it at frame rate and must never block on slow
//! consumers, so the buffer overwrites its oldest element once full. Consumers
//! that cannot keep up silently lose the oldest unconsumed entries — a
//! deliberate backpressure policy trading completeness for bounded memory and
//! bounded acquisition latency.
//!
//! Indexing is relative to the most recent push: `get(0)` is the latest
//! element, `get(1)` the one before it, and so on up to `size() - 1`.
//!
//! Reads clone the element under a short read lock, so a reader can never
//! observe a torn element; anything retained beyond the call is an owned copy
//! by construction. Pushes take a brief write lock. With one writer and short
//! critical sections the producer's push latency stays bounded.

use crate::error::{AppResult, CytoError};
use std::sync::RwLock;

struct RingInner<T> {
    slots: Vec<T>,
    /// Index of the next slot to write.
    head: usize,
    /// Elements held; grows to capacity and stays there.
    len: usize,
}

/// Fixed-capacity circular store of elements, overwrite-oldest-on-full.
pub struct RingBuffer<T> {
    inner: RwLock<RingInner<T>>,
    capacity: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a buffer holding at most `capacity` elements.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be >= 1");
        Self {
            inner: RwLock::new(RingInner {
                slots: Vec::with_capacity(capacity),
                head: 0,
                len: 0,
            }),
            capacity,
        }
    }

    /// Append an element, overwriting the oldest once full. Never fails.
    pub fn push(&self, item: T) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let head = inner.head;
        if inner.slots.len() < self.capacity {
            inner.slots.push(item);
        } else {
            inner.slots[head] = item;
        }
        inner.head = (head + 1) % self.capacity;
        inner.len = (inner.len + 1).min(self.capacity);
    }

    /// Copy of the element `k` pushes behind the latest (`k = 0` is latest).
    pub fn get(&self, k: usize) -> AppResult<T> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if k >= inner.len {
            return Err(CytoError::OutOfRange {
                index: k,
                size: inner.len,
            });
        }
        // head points one past the most recent element.
        let idx = (inner.head + self.capacity - 1 - k) % self.capacity;
        Ok(inner.slots[idx].clone())
    }

    /// Copy of the most recent element, if any.
    pub fn latest(&self) -> Option<T> {
        self.get(0).ok()
    }

    /// Number of elements currently held: min(total pushes, capacity).
    pub fn size(&self) -> usize {
        match self.inner.read() {
            Ok(guard) => guard.len,
            Err(poisoned) => poisoned.into_inner().len,
        }
    }

    /// Maximum element count, fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Copies of all held elements, oldest first. Used by the frame-export
    /// trigger, which dumps the whole buffer in acquisition order.
    pub fn snapshot_oldest_first(&self) -> Vec<T> {
        let inner = match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out = Vec::with_capacity(inner.len);
        for k in (0..inner.len).rev() {
            let idx = (inner.head + self.capacity - 1 - k) % self.capacity;
            out.push(inner.slots[idx].clone());
        }
        out
    }

    /// Discard all elements, keeping the capacity.
    pub fn clear(&self) {
        let mut inner = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.slots.clear();
        inner.head = 0;
        inner.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn evicts_oldest_once_full() {
        let rb = RingBuffer::new(2);
        rb.push('A');
        rb.push('B');
        rb.push('C');

        assert_eq!(rb.size(), 2);
        assert_eq!(rb.get(0).unwrap(), 'C');
        assert_eq!(rb.get(1).unwrap(), 'B');
    }

    #[test]
    fn out_of_range_read_fails() {
        let rb = RingBuffer::new(2);
        rb.push('A');
        rb.push('B');
        rb.push('C');

        match rb.get(2) {
            Err(CytoError::OutOfRange { index, size }) => {
                assert_eq!(index, 2);
                assert_eq!(size, 2);
            }
            other => panic!("expected OutOfRange, got {:?}", other.map(|_| ())),
        }
        assert!(rb.get(0).is_ok());
    }

    #[test]
    fn empty_buffer_has_no_latest() {
        let rb: RingBuffer<u32> = RingBuffer::new(4);
        assert!(rb.is_empty());
        assert!(rb.latest().is_none());
        assert!(matches!(
            rb.get(0),
            Err(CytoError::OutOfRange { index: 0, size: 0 })
        ));
    }

    #[test]
    fn snapshot_is_oldest_first() {
        let rb = RingBuffer::new(3);
        for i in 0..5 {
            rb.push(i);
        }
        assert_eq!(rb.snapshot_oldest_first(), vec![2, 3, 4]);
    }

    #[test]
    fn clear_resets_but_keeps_capacity() {
        let rb = RingBuffer::new(3);
        rb.push(1);
        rb.push(2);
        rb.clear();
        assert_eq!(rb.size(), 0);
        assert_eq!(rb.capacity(), 3);
        rb.push(7);
        assert_eq!(rb.latest(), Some(7));
    }

    #[test]
    fn concurrent_writer_and_readers() {
        let rb = Arc::new(RingBuffer::new(64));
        let writer_rb = Arc::clone(&rb);
        let writer = thread::spawn(move || {
            for i in 0u64..10_000 {
                writer_rb.push(i);
            }
        });

        let mut readers = Vec::new();
        for _ in 0..3 {
            let reader_rb = Arc::clone(&rb);
            readers.push(thread::spawn(move || {
                let mut last_seen = 0u64;
                for _ in 0..1_000 {
                    if let Some(v) = reader_rb.latest() {
                        // The latest value never moves backwards.
                        assert!(v >= last_seen);
                        last_seen = v;
                    }
                }
            }));
        }

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(rb.size(), 64);
        assert_eq!(rb.latest(), Some(9_999));
    }
}
