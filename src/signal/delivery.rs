//! The delivery engine: generation, deferral, coalescing, and the
//! priority-ordered delivery sweep.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::{Mutex, RwLock};

use super::constants::*;
use super::sigset::SignalSet;
use super::types::{
    default_action, DefaultAction, Disposition, SigInfo, SigOccurrence, SigSource,
};
use super::SignalError;
use crate::process::{Process, ProcessId, ProcessState};

/// Everything a context-switch layer needs to run one user handler.
///
/// The engine treats `Trampoline::invoke` as running the handler to
/// completion: the handler-duration mask is installed before the call and
/// restored after it returns, so an architecture backend that instead
/// defers to a real sigreturn must manage the restore itself.
#[derive(Debug, Clone, Copy)]
pub struct HandlerInvocation {
    pub signo: u32,
    pub handler_addr: u64,
    pub info: SigInfo,
    /// Mask in effect before the handler mask was installed.
    pub old_mask: SignalSet,
    pub flags: u64,
    /// Run on the alternate stack (SA_ONSTACK and a stack is installed).
    pub use_alt_stack: bool,
    pub alt_stack_base: u64,
    pub alt_stack_size: usize,
}

/// Architecture backend that transfers control to a user handler.
pub trait Trampoline: Send + Sync {
    fn invoke(&self, process: &Process, invocation: &HandlerInvocation) -> Result<(), SignalError>;
}

/// Scheduler hooks the engine calls on state transitions.
pub trait Scheduler: Send + Sync {
    /// A blocked/stopped process became runnable.
    fn wake(&self, pid: ProcessId);
    /// Give up the CPU inside a blocking-wait loop.
    fn yield_now(&self);
}

/// Monotonic time source; overrides the built-in tick clock when installed.
pub trait Timer: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Engine-wide counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    /// Accepted generations (occurrence queued or deferred marker set).
    pub generated: u64,
    pub delivered: u64,
    /// Generations absorbed into an already-pending standard signal.
    pub coalesced: u64,
    /// Generations recorded pending-only because the signal was blocked.
    pub deferred: u64,
    /// Occurrences dropped (ignored disposition, dead target, queue full).
    pub discarded: u64,
    /// Dispatch failures (trampoline refused).
    pub failed: u64,
    /// Occurrences put back at the queue front after a failed dispatch.
    pub requeued: u64,
    /// Default-action terminations performed.
    pub terminated: u64,
    latency_total_ms: u64,
    pub latency_max_ms: u64,
    latency_samples: u64,
}

impl EngineStats {
    pub fn avg_latency_ms(&self) -> u64 {
        if self.latency_samples == 0 {
            0
        } else {
            self.latency_total_ms / self.latency_samples
        }
    }

    fn record_latency(&mut self, ms: u64) {
        self.latency_total_ms += ms;
        self.latency_samples += 1;
        if ms > self.latency_max_ms {
            self.latency_max_ms = ms;
        }
    }
}

/// Generation-to-dispatch pipeline. Holds no per-process state; everything
/// per-process lives in `ProcessSignalState`/`SignalMaskState` and the engine
/// operates on whatever `Process` it is handed.
pub struct DeliveryEngine {
    stats: Mutex<EngineStats>,
    /// Master switch; generation still records, delivery sweeps no-op.
    enabled: AtomicBool,
    /// Cap on simultaneous sweeps across all processes.
    max_concurrent: AtomicUsize,
    active_sweeps: AtomicUsize,
    trampoline: RwLock<Option<Box<dyn Trampoline>>>,
    scheduler: RwLock<Option<Box<dyn Scheduler>>>,
    timer: RwLock<Option<Box<dyn Timer>>>,
}

impl DeliveryEngine {
    pub fn new() -> Self {
        DeliveryEngine {
            stats: Mutex::new(EngineStats::default()),
            enabled: AtomicBool::new(true),
            max_concurrent: AtomicUsize::new(usize::MAX),
            active_sweeps: AtomicUsize::new(0),
            trampoline: RwLock::new(None),
            scheduler: RwLock::new(None),
            timer: RwLock::new(None),
        }
    }

    pub fn set_trampoline(&self, trampoline: Box<dyn Trampoline>) {
        *self.trampoline.write() = Some(trampoline);
    }

    pub fn set_scheduler(&self, scheduler: Box<dyn Scheduler>) {
        *self.scheduler.write() = Some(scheduler);
    }

    pub fn set_timer(&self, timer: Box<dyn Timer>) {
        *self.timer.write() = Some(timer);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_max_concurrent(&self, max: usize) {
        self.max_concurrent.store(max.max(1), Ordering::Relaxed);
    }

    pub fn stats(&self) -> EngineStats {
        *self.stats.lock()
    }

    pub fn now(&self) -> u64 {
        match self.timer.read().as_ref() {
            Some(t) => t.now_ms(),
            None => crate::time::get_monotonic_time(),
        }
    }

    fn wake(&self, pid: ProcessId) {
        if let Some(s) = self.scheduler.read().as_ref() {
            s.wake(pid);
        }
    }

    fn yield_now(&self) {
        match self.scheduler.read().as_ref() {
            Some(s) => s.yield_now(),
            None => core::hint::spin_loop(),
        }
    }

    /// Generate `sig` for `process`.
    ///
    /// The full pipeline: validate, drop for dead targets, discard on
    /// ignored dispositions (unless forced), defer blocked standard signals
    /// as a pending bit, coalesce standard signals already pending, queue
    /// everything else, then attempt inline delivery unless `GEN_DEFER`.
    pub fn generate(
        &self,
        process: &Process,
        sig: u32,
        source: SigSource,
        flags: u32,
    ) -> Result<(), SignalError> {
        if !is_valid_signal(sig) {
            return Err(SignalError::InvalidSignal);
        }
        if process.is_terminated() {
            self.stats.lock().discarded += 1;
            return Ok(());
        }

        // SIGCONT's continue side effect happens at generation, even if the
        // signal itself ends up ignored
        if sig == SIGCONT && process.state() == ProcessState::Stopped {
            process.set_state(ProcessState::Ready);
            self.wake(process.id);
        }

        let forced = flags & GEN_FORCE != 0 || sig == SIGKILL || sig == SIGSTOP;

        // Ignored signals are discarded at generation time, not delivery time
        if !forced && self.effectively_ignored(process, sig) {
            self.stats.lock().discarded += 1;
            log::trace!("signal {} to {} discarded (ignored)", signal_name(sig), process.id);
            return Ok(());
        }

        let blocked = process.signals.blocked().contains(sig) && !forced;

        if !is_realtime(sig) {
            if blocked {
                // Deferred: pending bit only, no queue entry. A repeat while
                // already pending coalesces away entirely.
                let mut stats = self.stats.lock();
                if process.signals.mark_pending(sig) {
                    stats.generated += 1;
                    stats.deferred += 1;
                } else {
                    stats.coalesced += 1;
                }
                return Ok(());
            }
            // coalescing outside the blocked path is opt-in
            if flags & GEN_COALESCE != 0
                && is_coalescible(sig)
                && process.signals.pending().contains(sig)
            {
                self.stats.lock().coalesced += 1;
                return Ok(());
            }
        }

        let occ = SigOccurrence {
            signo: sig,
            info: SigInfo::from_source(sig, source),
            priority: signal_priority(sig),
            seq: 0,
            enqueued_at: self.now(),
            flags,
        };
        if let Err(e) = process.signals.push(occ) {
            self.stats.lock().discarded += 1;
            return Err(e);
        }
        self.stats.lock().generated += 1;
        log::trace!("signal {} queued for {}", signal_name(sig), process.id);

        if flags & GEN_DEFER == 0 {
            match process.state() {
                ProcessState::Ready | ProcessState::Running | ProcessState::Blocked => {
                    self.deliver_pending(process);
                }
                // Stopped processes only react to SIGKILL (SIGCONT was
                // handled above); everything else waits for the continue
                ProcessState::Stopped if sig == SIGKILL => {
                    self.deliver_pending(process);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn effectively_ignored(&self, process: &Process, sig: u32) -> bool {
        match process.sigmask.disposition(sig) {
            Disposition::Ignore => true,
            Disposition::Default => default_action(sig) == DefaultAction::Ignore,
            Disposition::Handler { .. } => false,
        }
    }

    /// Sweep `process`'s deliverable signals in priority order, draining
    /// every deliverable occurrence. Returns how many were delivered.
    ///
    /// At most one sweep per process runs at a time; a second caller returns
    /// immediately and the in-flight sweep picks up whatever it enqueued.
    pub fn deliver_pending(&self, process: &Process) -> usize {
        if !self.is_enabled() {
            return 0;
        }
        if !process.signals.begin_delivery() {
            return 0;
        }
        if self.active_sweeps.fetch_add(1, Ordering::AcqRel)
            >= self.max_concurrent.load(Ordering::Relaxed)
        {
            self.active_sweeps.fetch_sub(1, Ordering::AcqRel);
            process.signals.end_delivery();
            return 0;
        }

        let mut delivered = 0;
        'sweep: for prio in PRIO_CRITICAL..=PRIO_MAX {
            for sig in 1..=NSIG {
                if signal_priority(sig) != prio {
                    continue;
                }
                // mask and pending set can change under a handler, so
                // re-check per occurrence
                while process.signals.deliverable().contains(sig) {
                    let occ = process.signals.pop(sig).unwrap_or_else(|| {
                        // deferred marker with no queue entry: synthesize
                        SigOccurrence {
                            signo: sig,
                            info: SigInfo::kernel(sig),
                            priority: prio,
                            seq: 0,
                            enqueued_at: self.now(),
                            flags: 0,
                        }
                    });
                    match self.deliver_one(process, &occ) {
                        Ok(()) => delivered += 1,
                        Err(_) => {
                            // put it back in front and leave this signal
                            // alone for this sweep
                            process.signals.unpop(occ);
                            let mut stats = self.stats.lock();
                            stats.failed += 1;
                            stats.requeued += 1;
                            break;
                        }
                    }
                    if process.is_terminated() {
                        break 'sweep;
                    }
                }
            }
        }

        self.active_sweeps.fetch_sub(1, Ordering::AcqRel);
        process.signals.end_delivery();
        delivered
    }

    /// Dispatch one occurrence according to the current disposition.
    fn deliver_one(&self, process: &Process, occ: &SigOccurrence) -> Result<(), SignalError> {
        let sig = occ.signo;
        process.signals.set_current_signal(Some(sig));
        let result = match process.sigmask.disposition(sig) {
            Disposition::Ignore => {
                self.stats.lock().discarded += 1;
                Ok(())
            }
            Disposition::Default => {
                self.apply_default(process, occ);
                self.finish_delivery(process, occ);
                Ok(())
            }
            Disposition::Handler { addr, mask, flags } => {
                match self.run_handler(process, occ, addr, mask, flags) {
                    Ok(()) => {
                        self.finish_delivery(process, occ);
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        };
        process.signals.set_current_signal(None);
        result
    }

    fn apply_default(&self, process: &Process, occ: &SigOccurrence) {
        let sig = occ.signo;
        match default_action(sig) {
            DefaultAction::Terminate => {
                process.exit(128 + sig as i32);
                process.signals.clear_all();
                self.stats.lock().terminated += 1;
                log::info!(
                    "process {} killed by {} (exit code {})",
                    process.id,
                    signal_name(sig),
                    128 + sig
                );
            }
            DefaultAction::Stop => {
                process.set_state(ProcessState::Stopped);
                log::debug!("process {} stopped by {}", process.id, signal_name(sig));
            }
            DefaultAction::Continue => {
                if process.state() == ProcessState::Stopped {
                    process.set_state(ProcessState::Ready);
                    self.wake(process.id);
                }
            }
            DefaultAction::Ignore => {}
        }
    }

    fn run_handler(
        &self,
        process: &Process,
        occ: &SigOccurrence,
        addr: u64,
        handler_mask: SignalSet,
        flags: u64,
    ) -> Result<(), SignalError> {
        let sig = occ.signo;
        let old_mask = process.sigmask.blocked();

        // mask for handler duration: old | sa_mask | sig (unless SA_NODEFER)
        let mut during = old_mask.union(handler_mask);
        if flags & SA_NODEFER == 0 {
            let _ = during.add(sig);
        }
        process.sigmask.set_blocked(during);
        process.signals.sync_blocked(process.sigmask.blocked());

        let alt = process.sigmask.alt_stack();
        let use_alt_stack = flags & SA_ONSTACK != 0 && !alt.is_disabled() && !alt.on_stack;
        if use_alt_stack {
            let mut on = alt;
            on.on_stack = true;
            process.sigmask.set_alt_stack(on);
        }

        let invocation = HandlerInvocation {
            signo: sig,
            handler_addr: addr,
            info: occ.info,
            old_mask,
            flags,
            use_alt_stack,
            alt_stack_base: alt.base,
            alt_stack_size: alt.size,
        };

        let result = match self.trampoline.read().as_ref() {
            Some(t) => t.invoke(process, &invocation),
            None => Err(SignalError::DeliverFailed),
        };

        // handler has run to completion (or never started); unwind
        if use_alt_stack {
            let mut off = process.sigmask.alt_stack();
            off.on_stack = false;
            process.sigmask.set_alt_stack(off);
        }
        process.sigmask.set_blocked(old_mask);
        process.signals.sync_blocked(process.sigmask.blocked());

        if result.is_ok() && flags & SA_RESETHAND != 0 {
            let _ = process.sigmask.set_disposition(sig, Disposition::Default);
        }
        result
    }

    fn finish_delivery(&self, process: &Process, occ: &SigOccurrence) {
        let now = self.now();
        process.signals.record_delivery(now);
        let mut stats = self.stats.lock();
        stats.delivered += 1;
        stats.record_latency(now.saturating_sub(occ.enqueued_at));
    }

    /// Apply a sigprocmask-style change. Returns the previous blocked set.
    /// Anything newly unblocked and pending is delivered before returning.
    pub fn change_mask(
        &self,
        process: &Process,
        how: i32,
        set: SignalSet,
    ) -> Result<SignalSet, SignalError> {
        let old = process.sigmask.blocked();
        let new = match how {
            SIG_BLOCK => old.union(set),
            SIG_UNBLOCK => old.intersect(set.complement()),
            SIG_SETMASK => set,
            _ => return Err(SignalError::InvalidSignal),
        };
        process.sigmask.set_blocked(new);
        process.signals.sync_blocked(process.sigmask.blocked());

        if process.signals.has_deliverable() {
            self.deliver_pending(process);
        }
        Ok(old)
    }

    /// Replace a disposition. Setting Ignore discards anything already
    /// pending for that signal.
    pub fn set_disposition(
        &self,
        process: &Process,
        sig: u32,
        disposition: Disposition,
    ) -> Result<Disposition, SignalError> {
        let old = process.sigmask.set_disposition(sig, disposition)?;
        if disposition == Disposition::Ignore {
            let dropped = process.signals.discard(sig);
            if dropped > 0 {
                self.stats.lock().discarded += dropped as u64;
            }
        }
        Ok(old)
    }

    /// sigsuspend: install `temp_mask`, wait for a delivery, restore the
    /// original mask. Always returns `Err(Interrupted)`; there is no success
    /// path by contract.
    pub fn suspend(&self, process: &Process, temp_mask: SignalSet) -> Result<(), SignalError> {
        process.sigmask.save_and_install(temp_mask);
        process.signals.sync_blocked(process.sigmask.blocked());
        process.set_state(ProcessState::Blocked);

        loop {
            if process.signals.has_deliverable() {
                self.deliver_pending(process);
                break;
            }
            if process.is_terminated() {
                break;
            }
            self.yield_now();
        }

        if process.sigmask.restore_saved().is_some() {
            process.signals.sync_blocked(process.sigmask.blocked());
        }
        if !process.is_terminated() {
            process.set_state(ProcessState::Ready);
        }
        Err(SignalError::Interrupted)
    }

    /// pause: wait until any signal is delivered. Always `Err(Interrupted)`.
    pub fn pause(&self, process: &Process) -> Result<(), SignalError> {
        process.set_state(ProcessState::Blocked);
        loop {
            if process.signals.has_deliverable() {
                self.deliver_pending(process);
                break;
            }
            if process.is_terminated() {
                break;
            }
            self.yield_now();
        }
        if !process.is_terminated() {
            process.set_state(ProcessState::Ready);
        }
        Err(SignalError::Interrupted)
    }

    /// sigwait core: synchronously take the highest-priority pending signal
    /// in `wanted`, bypassing dispositions and the blocked mask. Waits until
    /// `deadline` (monotonic ms; None waits forever), then `WouldBlock`.
    pub fn take_pending(
        &self,
        process: &Process,
        wanted: SignalSet,
        deadline: Option<u64>,
    ) -> Result<SigInfo, SignalError> {
        loop {
            let candidates = process.signals.pending().intersect(wanted);
            if !candidates.is_empty() {
                for prio in PRIO_CRITICAL..=PRIO_MAX {
                    for sig in 1..=NSIG {
                        if signal_priority(sig) != prio || !candidates.contains(sig) {
                            continue;
                        }
                        let info = match process.signals.pop(sig) {
                            Some(occ) => occ.info,
                            None => SigInfo::kernel(sig),
                        };
                        return Ok(info);
                    }
                }
            }
            if process.is_terminated() {
                return Err(SignalError::Interrupted);
            }
            if let Some(deadline) = deadline {
                if self.now() >= deadline {
                    return Err(SignalError::WouldBlock);
                }
            }
            self.yield_now();
        }
    }
}

impl Default for DeliveryEngine {
    fn default() -> Self {
        Self::new()
    }
}
