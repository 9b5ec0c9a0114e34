//! POSIX-style signal delivery engine.
//!
//! This crate implements the signal subsystem of a kernel as a standalone
//! library: signal generation, priority-ordered queuing, mask-based blocking
//! and deferral, coalescing, per-signal dispositions, and the syscall facade
//! that translates POSIX-shaped calls into engine operations.
//!
//! Layering (leaf-first):
//! - `signal::SignalSet` - bitset over signal numbers 1..=63
//! - `signal::queue::SignalQueue` - bounded priority queue per signal number
//! - `signal::state::ProcessSignalState` - per-process pending/blocked state
//! - `signal::delivery::DeliveryEngine` - generate -> enqueue -> sweep -> dispatch
//! - `syscall::SyscallFacade` - kill/sigaction/sigprocmask/... entry points
//!
//! Architecture-specific context switching (the handler trampoline), the
//! scheduler, and timers are consumed as injected trait objects; see
//! `signal::delivery::{Trampoline, Scheduler, Timer}`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod process;
pub mod signal;
pub mod syscall;
pub mod time;

use conquer_once::spin::OnceCell;

use process::ProcessManager;
use signal::delivery::DeliveryEngine;
use syscall::alarm::AlarmClock;
use syscall::signal::SyscallFacade;

static ENGINE: OnceCell<DeliveryEngine> = OnceCell::uninit();
static PROCESS_MANAGER: OnceCell<ProcessManager> = OnceCell::uninit();
static ALARMS: OnceCell<AlarmClock> = OnceCell::uninit();

/// Initialize the global engine, process table, and alarm clock.
///
/// Idempotent; subsystems are created lazily on first access anyway, so this
/// exists mainly to front-load initialization at a well-defined point in boot.
pub fn init() {
    engine();
    manager();
    alarms();
    log::info!("signal delivery engine initialized ({} signals)", signal::constants::NSIG);
}

/// The global delivery engine.
pub fn engine() -> &'static DeliveryEngine {
    ENGINE.get_or_init(DeliveryEngine::new)
}

/// The global process table.
pub fn manager() -> &'static ProcessManager {
    PROCESS_MANAGER.get_or_init(ProcessManager::new)
}

/// The global alarm clock.
pub fn alarms() -> &'static AlarmClock {
    ALARMS.get_or_init(AlarmClock::new)
}

/// Syscall facade over the global singletons.
pub fn facade() -> SyscallFacade<'static> {
    SyscallFacade::new(engine(), manager(), alarms())
}
