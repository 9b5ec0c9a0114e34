//! Per-process pending-signal state: one queue per signal number plus the
//! pending bitmask and delivery bookkeeping.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use super::constants::*;
use super::queue::{SignalQueue, RT_QUEUE_CAPACITY, STD_QUEUE_CAPACITY};
use super::sigset::SignalSet;
use super::types::SigOccurrence;
use super::SignalError;

/// Snapshot of a process's delivery counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSignalStats {
    pub total_pending: usize,
    pub delivered: u64,
    pub last_delivery_time: u64,
}

struct StateInner {
    /// Bit per signal with at least one undelivered occurrence (or a
    /// deferred standard signal recorded without a queue entry).
    pending: SignalSet,
    /// Mirror of the mask-table blocked set; kept in sync by every mask
    /// mutation so the sweep reads it under this lock alone.
    blocked: SignalSet,
    /// Signal currently being delivered, while a delivery is in flight.
    current_signal: Option<u32>,
    total_pending: usize,
    delivered: u64,
    last_delivery_time: u64,
}

/// Pending signals and queues for one process.
///
/// Created fresh at process creation; fork does not copy it (the child
/// starts with nothing pending).
pub struct ProcessSignalState {
    /// Indexed by signal number; entry 0 unused.
    queues: Box<[SignalQueue; 64]>,
    inner: Mutex<StateInner>,
    /// Single-flight latch: at most one delivery sweep per process.
    delivery_active: AtomicBool,
}

impl ProcessSignalState {
    pub fn new() -> Self {
        ProcessSignalState {
            queues: Box::new(core::array::from_fn(|i| {
                let cap = if is_realtime(i as u32) {
                    RT_QUEUE_CAPACITY
                } else {
                    STD_QUEUE_CAPACITY
                };
                SignalQueue::new(cap)
            })),
            inner: Mutex::new(StateInner {
                pending: SignalSet::empty(),
                blocked: SignalSet::empty(),
                current_signal: None,
                total_pending: 0,
                delivered: 0,
                last_delivery_time: 0,
            }),
            delivery_active: AtomicBool::new(false),
        }
    }

    pub fn queue(&self, sig: u32) -> &SignalQueue {
        &self.queues[sig as usize]
    }

    /// Enqueue an occurrence and set its pending bit.
    pub fn push(&self, occ: SigOccurrence) -> Result<(), SignalError> {
        let sig = occ.signo;
        self.queues[sig as usize].enqueue(occ)?;
        let mut inner = self.inner.lock();
        let _ = inner.pending.add(sig);
        inner.total_pending += 1;
        Ok(())
    }

    /// Record a deferred standard signal as pending without a queue entry.
    /// Returns false if the bit was already set (the occurrence coalesces
    /// away entirely).
    pub fn mark_pending(&self, sig: u32) -> bool {
        let mut inner = self.inner.lock();
        if inner.pending.contains(sig) {
            return false;
        }
        let _ = inner.pending.add(sig);
        inner.total_pending += 1;
        true
    }

    /// Take the front occurrence of `sig`, clearing the pending bit when the
    /// queue drains. Returns None (and clears the bit) if only a deferred
    /// marker was pending.
    pub fn pop(&self, sig: u32) -> Option<SigOccurrence> {
        let occ = self.queues[sig as usize].dequeue();
        let mut inner = self.inner.lock();
        if inner.total_pending > 0 {
            inner.total_pending -= 1;
        }
        if self.queues[sig as usize].is_empty() {
            let _ = inner.pending.remove(sig);
        }
        occ
    }

    /// Put a failed delivery back and restore its pending bit.
    pub fn unpop(&self, occ: SigOccurrence) {
        let sig = occ.signo;
        self.queues[sig as usize].requeue(occ);
        let mut inner = self.inner.lock();
        let _ = inner.pending.add(sig);
        inner.total_pending += 1;
    }

    pub fn pending(&self) -> SignalSet {
        self.inner.lock().pending
    }

    pub fn blocked(&self) -> SignalSet {
        self.inner.lock().blocked
    }

    /// Update the blocked-set mirror.
    pub fn sync_blocked(&self, blocked: SignalSet) {
        self.inner.lock().blocked = blocked;
    }

    /// Pending and not blocked. KILL/STOP can never be blocked so they are
    /// always deliverable while pending.
    pub fn deliverable(&self) -> SignalSet {
        let inner = self.inner.lock();
        inner.pending.intersect(inner.blocked.complement())
    }

    pub fn has_deliverable(&self) -> bool {
        !self.deliverable().is_empty()
    }

    /// Claim the delivery latch. False means a sweep is already in flight
    /// and the caller must not start another.
    pub fn begin_delivery(&self) -> bool {
        self.delivery_active
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    pub fn end_delivery(&self) {
        self.delivery_active.store(false, Ordering::Release);
    }

    pub fn set_current_signal(&self, sig: Option<u32>) {
        self.inner.lock().current_signal = sig;
    }

    pub fn current_signal(&self) -> Option<u32> {
        self.inner.lock().current_signal
    }

    /// Count a completed delivery.
    pub fn record_delivery(&self, now: u64) {
        let mut inner = self.inner.lock();
        inner.delivered += 1;
        inner.last_delivery_time = now;
    }

    /// Discard everything pending for one signal: queued occurrences plus a
    /// bare deferred marker. Returns how many were dropped.
    pub fn discard(&self, sig: u32) -> usize {
        // queue lock released before taking the state lock; push takes them
        // in the same order
        let queued = self.queues[sig as usize].clear();
        let mut inner = self.inner.lock();
        let marker = queued == 0 && inner.pending.contains(sig);
        let dropped = queued + marker as usize;
        let _ = inner.pending.remove(sig);
        inner.total_pending = inner.total_pending.saturating_sub(dropped);
        dropped
    }

    /// Discard all pending state (exec and teardown). Returns how many
    /// occurrences were dropped.
    pub fn clear_all(&self) -> usize {
        let mut dropped = 0;
        for q in self.queues.iter() {
            dropped += q.clear();
        }
        let mut inner = self.inner.lock();
        inner.pending = SignalSet::empty();
        inner.total_pending = 0;
        inner.current_signal = None;
        dropped
    }

    pub fn stats(&self) -> ProcessSignalStats {
        let inner = self.inner.lock();
        ProcessSignalStats {
            total_pending: inner.total_pending,
            delivered: inner.delivered,
            last_delivery_time: inner.last_delivery_time,
        }
    }
}

impl Default for ProcessSignalState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::types::SigInfo;

    fn occ(signo: u32) -> SigOccurrence {
        SigOccurrence {
            signo,
            info: SigInfo::kernel(signo),
            priority: signal_priority(signo),
            seq: 0,
            enqueued_at: 0,
            flags: 0,
        }
    }

    #[test]
    fn push_pop_tracks_pending_bit() {
        let state = ProcessSignalState::new();
        state.push(occ(SIGTERM)).unwrap();
        state.push(occ(SIGTERM)).unwrap();
        assert!(state.pending().contains(SIGTERM));
        assert_eq!(state.stats().total_pending, 2);

        assert!(state.pop(SIGTERM).is_some());
        // one occurrence still queued, bit stays set
        assert!(state.pending().contains(SIGTERM));
        assert!(state.pop(SIGTERM).is_some());
        assert!(!state.pending().contains(SIGTERM));
        assert_eq!(state.stats().total_pending, 0);
    }

    #[test]
    fn mark_pending_coalesces() {
        let state = ProcessSignalState::new();
        assert!(state.mark_pending(SIGINT));
        assert!(!state.mark_pending(SIGINT));
        assert_eq!(state.stats().total_pending, 1);
        // deferred marker: pending bit set, queue empty
        assert!(state.pending().contains(SIGINT));
        assert!(state.queue(SIGINT).is_empty());
        assert!(state.pop(SIGINT).is_none());
        assert!(!state.pending().contains(SIGINT));
    }

    #[test]
    fn deliverable_excludes_blocked() {
        let state = ProcessSignalState::new();
        state.push(occ(SIGTERM)).unwrap();
        state.push(occ(SIGUSR1)).unwrap();

        let mut blocked = SignalSet::empty();
        blocked.add(SIGTERM).unwrap();
        state.sync_blocked(blocked);

        let deliverable = state.deliverable();
        assert!(!deliverable.contains(SIGTERM));
        assert!(deliverable.contains(SIGUSR1));
    }

    #[test]
    fn delivery_latch_is_single_flight() {
        let state = ProcessSignalState::new();
        assert!(state.begin_delivery());
        assert!(!state.begin_delivery());
        state.end_delivery();
        assert!(state.begin_delivery());
        state.end_delivery();
    }

    #[test]
    fn discard_only_touches_one_signal() {
        let state = ProcessSignalState::new();
        state.push(occ(SIGTERM)).unwrap();
        state.mark_pending(SIGINT);
        assert_eq!(state.discard(SIGINT), 1);
        assert!(!state.pending().contains(SIGINT));
        // the other signal's accounting is untouched
        assert!(state.pending().contains(SIGTERM));
        assert_eq!(state.stats().total_pending, 1);
        // nothing pending: no-op
        assert_eq!(state.discard(SIGINT), 0);
    }

    #[test]
    fn clear_all_drops_everything() {
        let state = ProcessSignalState::new();
        state.push(occ(SIGTERM)).unwrap();
        state.push(occ(SIGRTMIN)).unwrap();
        state.push(occ(SIGRTMIN)).unwrap();
        assert_eq!(state.clear_all(), 3);
        assert!(state.pending().is_empty());
        assert_eq!(state.stats().total_pending, 0);
    }
}
