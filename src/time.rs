//! Monotonic tick clock.
//!
//! The platform timer interrupt advances a global tick counter; everything in
//! the engine that needs a timestamp (enqueue times, delivery latency, alarm
//! deadlines) reads milliseconds derived from it. Hosted tests drive the
//! clock by calling `timer_interrupt()` directly.

use core::sync::atomic::{AtomicU64, Ordering};

/// Milliseconds per tick (100 Hz).
pub const TICK_PERIOD_MS: u64 = 10;

/// Global monotonic tick counter.
static TICKS: AtomicU64 = AtomicU64::new(0);

/// Invoked from the platform timer interrupt once per tick.
#[inline]
pub fn timer_interrupt() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

/// Raw tick counter.
#[inline]
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Milliseconds since the clock started.
///
/// Monotonic; wraps no earlier than ~5.8 billion years at 100 Hz.
#[inline]
pub fn get_monotonic_time() -> u64 {
    get_ticks() * TICK_PERIOD_MS
}

/// Advance the clock by whole seconds. Convenience for timer callers that
/// think in seconds (the alarm syscall).
pub fn advance_seconds(seconds: u64) {
    TICKS.fetch_add(seconds * 1000 / TICK_PERIOD_MS, Ordering::Relaxed);
}
