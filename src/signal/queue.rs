//! Bounded FIFO queue holding the occurrences of a single signal number.
//!
//! One queue per signal per process. Ordering across signals is the delivery
//! sweep's job; within one queue arrival order is preserved, except that a
//! failed delivery goes back to the front so it retries before anything that
//! arrived after it.

use alloc::collections::VecDeque;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use super::types::SigOccurrence;
use super::SignalError;

/// Real-time signals queue every send up to this depth.
pub const RT_QUEUE_CAPACITY: usize = 32;
/// Standard signals coalesce, so a short queue suffices.
pub const STD_QUEUE_CAPACITY: usize = 8;

/// Counters for one queue, snapshot under the queue lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub enqueued: u64,
    pub dequeued: u64,
    /// Sends rejected at capacity.
    pub dropped: u64,
    pub high_water: usize,
}

pub struct SignalQueue {
    entries: Mutex<QueueInner>,
    /// Sequence source for FIFO tie-breaks; monotonic per queue.
    next_seq: AtomicU64,
    capacity: usize,
}

struct QueueInner {
    deque: VecDeque<SigOccurrence>,
    stats: QueueStats,
}

impl SignalQueue {
    pub fn new(capacity: usize) -> Self {
        SignalQueue {
            entries: Mutex::new(QueueInner {
                deque: VecDeque::new(),
                stats: QueueStats::default(),
            }),
            next_seq: AtomicU64::new(0),
            capacity,
        }
    }

    /// Stamp and append an occurrence. `Err(QueueFull)` at capacity; the
    /// occurrence is dropped and counted, never silently lost from the stats.
    pub fn enqueue(&self, mut occ: SigOccurrence) -> Result<(), SignalError> {
        let mut inner = self.entries.lock();
        if inner.deque.len() >= self.capacity {
            inner.stats.dropped += 1;
            return Err(SignalError::QueueFull);
        }
        occ.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        inner.deque.push_back(occ);
        inner.stats.enqueued += 1;
        let len = inner.deque.len();
        if len > inner.stats.high_water {
            inner.stats.high_water = len;
        }
        Ok(())
    }

    /// Put a dequeued occurrence back at the front, keeping its original
    /// sequence stamp. Used when delivery fails mid-sweep. Ignores capacity:
    /// the slot was freed by the dequeue that produced `occ`.
    pub fn requeue(&self, occ: SigOccurrence) {
        let mut inner = self.entries.lock();
        inner.deque.push_front(occ);
        let len = inner.deque.len();
        if len > inner.stats.high_water {
            inner.stats.high_water = len;
        }
    }

    pub fn dequeue(&self) -> Option<SigOccurrence> {
        let mut inner = self.entries.lock();
        let occ = inner.deque.pop_front()?;
        inner.stats.dequeued += 1;
        Some(occ)
    }

    pub fn peek(&self) -> Option<SigOccurrence> {
        self.entries.lock().deque.front().copied()
    }

    /// Drop everything queued, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut inner = self.entries.lock();
        let n = inner.deque.len();
        inner.deque.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.lock().deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().deque.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        self.entries.lock().stats
    }
}
