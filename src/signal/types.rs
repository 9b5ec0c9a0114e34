//! Signal-related data structures: occurrence payloads, dispositions, the
//! alternate stack, and the per-process mask/action table.

use alloc::boxed::Box;
use spin::Mutex;

use super::constants::*;
use super::sigset::SignalSet;
use super::SignalError;
use crate::process::ProcessId;

/// Origin kind of a generated signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigSource {
    /// Sent by a process (kill/raise).
    User { pid: ProcessId, uid: u32 },
    /// Raised by kernel code.
    Kernel,
    /// Queued with an attached value (sigqueue).
    Queue { pid: ProcessId, uid: u32, value: u64 },
    /// Timer expiration (alarm).
    Timer,
    /// Hardware fault (bad memory access, arithmetic error, ...).
    Fault { addr: u64 },
}

/// si_code values identifying the origin of a signal.
pub mod si_code {
    /// Sent by kill/raise.
    pub const USER: i32 = 0;
    /// Sent by the kernel.
    pub const KERNEL: i32 = 0x80;
    /// Sent by sigqueue.
    pub const QUEUE: i32 = -1;
    /// Sent by timer expiration.
    pub const TIMER: i32 = -2;
    /// Raised by a hardware fault.
    pub const FAULT: i32 = -3;

    // SIGCHLD si_codes
    pub const CLD_EXITED: i32 = 1;
    pub const CLD_KILLED: i32 = 2;
    pub const CLD_STOPPED: i32 = 5;
    pub const CLD_CONTINUED: i32 = 6;
}

/// Structured payload carried by one signal occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigInfo {
    pub signo: u32,
    /// Origin kind (see [`si_code`]).
    pub code: i32,
    /// Sender, 0 for the kernel.
    pub sender_pid: u64,
    pub sender_uid: u32,
    /// Faulting address for fault-sourced signals.
    pub fault_addr: u64,
    /// Child exit status for SIGCHLD.
    pub exit_status: i32,
    /// Attached value for real-time signals.
    pub value: u64,
}

impl SigInfo {
    pub fn kernel(signo: u32) -> Self {
        SigInfo {
            signo,
            code: si_code::KERNEL,
            sender_pid: 0,
            sender_uid: 0,
            fault_addr: 0,
            exit_status: 0,
            value: 0,
        }
    }

    pub fn user(signo: u32, pid: ProcessId, uid: u32) -> Self {
        SigInfo {
            code: si_code::USER,
            sender_pid: pid.as_u64(),
            sender_uid: uid,
            ..Self::kernel(signo)
        }
    }

    pub fn queued(signo: u32, pid: ProcessId, uid: u32, value: u64) -> Self {
        SigInfo {
            code: si_code::QUEUE,
            sender_pid: pid.as_u64(),
            sender_uid: uid,
            value,
            ..Self::kernel(signo)
        }
    }

    pub fn timer(signo: u32) -> Self {
        SigInfo {
            code: si_code::TIMER,
            ..Self::kernel(signo)
        }
    }

    pub fn fault(signo: u32, addr: u64) -> Self {
        SigInfo {
            code: si_code::FAULT,
            fault_addr: addr,
            ..Self::kernel(signo)
        }
    }

    /// Child-status payload for SIGCHLD.
    pub fn child(pid: ProcessId, uid: u32, code: i32, status: i32) -> Self {
        SigInfo {
            code,
            sender_pid: pid.as_u64(),
            sender_uid: uid,
            exit_status: status,
            ..Self::kernel(SIGCHLD)
        }
    }

    /// Build the delivery-info record for a source when the caller supplied
    /// none.
    pub fn from_source(signo: u32, source: SigSource) -> Self {
        match source {
            SigSource::User { pid, uid } => Self::user(signo, pid, uid),
            SigSource::Kernel => Self::kernel(signo),
            SigSource::Queue { pid, uid, value } => Self::queued(signo, pid, uid, value),
            SigSource::Timer => Self::timer(signo),
            SigSource::Fault { addr } => Self::fault(signo, addr),
        }
    }
}

/// siginfo as copied out to userspace by sigtimedwait/sigwaitinfo.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SigInfoRaw {
    pub si_signo: i32,
    pub si_code: i32,
    pub si_pid: u64,
    pub si_uid: u32,
    pub _pad: u32,
    pub si_addr: u64,
    pub si_status: i32,
    pub _pad2: i32,
    pub si_value: u64,
}

impl From<SigInfo> for SigInfoRaw {
    fn from(info: SigInfo) -> Self {
        SigInfoRaw {
            si_signo: info.signo as i32,
            si_code: info.code,
            si_pid: info.sender_pid,
            si_uid: info.sender_uid,
            _pad: 0,
            si_addr: info.fault_addr,
            si_status: info.exit_status,
            _pad2: 0,
            si_value: info.value,
        }
    }
}

/// POSIX timespec for the sigtimedwait deadline.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Timespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

impl Timespec {
    /// Milliseconds, or None if the fields are out of range.
    pub fn to_millis(&self) -> Option<u64> {
        if self.tv_sec < 0 || self.tv_nsec < 0 || self.tv_nsec >= 1_000_000_000 {
            return None;
        }
        Some(self.tv_sec as u64 * 1000 + self.tv_nsec as u64 / 1_000_000)
    }
}

/// One queued signal occurrence.
///
/// Owned exclusively by the queue that holds it; moved (not copied) to the
/// caller on dequeue.
#[derive(Debug, Clone, Copy)]
pub struct SigOccurrence {
    pub signo: u32,
    pub info: SigInfo,
    /// Band from the fixed priority table; lower delivers first.
    pub priority: u8,
    /// Monotonic per-queue sequence, the FIFO tie-break.
    pub seq: u64,
    /// Enqueue timestamp (monotonic ms), feeds the latency stats.
    pub enqueued_at: u64,
    pub flags: u32,
}

/// Per-signal, per-process configured reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Run the fixed default action.
    Default,
    /// Discard on delivery.
    Ignore,
    /// Hand off to a user handler via the trampoline collaborator.
    Handler {
        addr: u64,
        /// Signals additionally blocked while the handler runs.
        mask: SignalSet,
        /// SA_* flags.
        flags: u64,
    },
}

impl Disposition {
    /// Decode from the sigaction ABI (0 = default, 1 = ignore, else handler).
    pub fn from_action(action: &SigAction) -> Disposition {
        match action.handler {
            SIG_DFL => Disposition::Default,
            SIG_IGN => Disposition::Ignore,
            addr => Disposition::Handler {
                addr,
                // A handler may never block SIGKILL/SIGSTOP
                mask: SignalSet::from_mask(action.mask & !UNBLOCKABLE_SIGNALS),
                flags: action.flags,
            },
        }
    }

    /// Encode to the sigaction ABI.
    pub fn to_action(&self) -> SigAction {
        match *self {
            Disposition::Default => SigAction::default(),
            Disposition::Ignore => SigAction {
                handler: SIG_IGN,
                ..SigAction::default()
            },
            Disposition::Handler { addr, mask, flags } => SigAction {
                handler: addr,
                mask: mask.to_mask(),
                flags,
                restorer: 0,
            },
        }
    }

    /// The handler sentinel returned by the simple signal() call.
    pub fn handler_sentinel(&self) -> u64 {
        match *self {
            Disposition::Default => SIG_DFL,
            Disposition::Ignore => SIG_IGN,
            Disposition::Handler { addr, .. } => addr,
        }
    }
}

/// Signal handler configuration at the copy boundary (matches the Linux
/// sigaction structure layout).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SigAction {
    /// SIG_DFL, SIG_IGN, or a user function pointer.
    pub handler: u64,
    /// Signals to block during handler execution.
    pub mask: u64,
    /// SA_* flags.
    pub flags: u64,
    /// Restorer for sigreturn; owned by the trampoline collaborator.
    pub restorer: u64,
}

impl Default for SigAction {
    fn default() -> Self {
        SigAction {
            handler: SIG_DFL,
            mask: 0,
            flags: 0,
            restorer: 0,
        }
    }
}

/// Alternate signal stack configuration at the copy boundary (matches the
/// Linux stack_t layout).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct StackT {
    pub ss_sp: u64,
    pub ss_flags: i32,
    pub _pad: i32,
    pub ss_size: usize,
}

impl Default for StackT {
    fn default() -> Self {
        StackT {
            ss_sp: 0,
            ss_flags: SS_DISABLE as i32,
            _pad: 0,
            ss_size: 0,
        }
    }
}

/// Per-process alternate signal stack state. The memory itself is user
/// memory; this descriptor never owns it.
#[derive(Debug, Clone, Copy, Default)]
pub struct AltStack {
    pub base: u64,
    pub size: usize,
    pub flags: u32,
    /// True while a handler is executing on this stack.
    pub on_stack: bool,
}

impl AltStack {
    pub fn is_disabled(&self) -> bool {
        self.base == 0 || self.flags & SS_DISABLE != 0
    }

    pub fn to_stackt(&self) -> StackT {
        StackT {
            ss_sp: self.base,
            ss_flags: if self.base == 0 {
                SS_DISABLE as i32
            } else if self.on_stack {
                SS_ONSTACK as i32
            } else {
                self.flags as i32
            },
            _pad: 0,
            ss_size: self.size,
        }
    }
}

/// Fixed default action classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultAction {
    /// Terminate the process with exit code 128+signal.
    Terminate,
    /// Transition the process to Stopped.
    Stop,
    /// Transition a Stopped process back to Ready.
    Continue,
    /// Discard.
    Ignore,
}

/// The fixed default-action table.
///
/// Real-time signals fall into the trailing no-op class; the upstream table
/// is preserved literally rather than adopting POSIX's kill-by-default.
pub const fn default_action(sig: u32) -> DefaultAction {
    match sig {
        SIGSTOP | SIGTSTP | SIGTTIN | SIGTTOU => DefaultAction::Stop,
        SIGCONT => DefaultAction::Continue,
        SIGCHLD | SIGURG | SIGWINCH => DefaultAction::Ignore,
        _ if sig >= SIGRTMIN => DefaultAction::Ignore,
        _ => DefaultAction::Terminate,
    }
}

struct MaskInner {
    /// The blocked set. Never contains SIGKILL/SIGSTOP.
    blocked: SignalSet,
    /// One-slot save area for sigsuspend; `Some` while a temporary mask is
    /// installed.
    saved: Option<SignalSet>,
    /// Disposition per signal, indexed by signal number (entry 0 unused).
    /// Boxed: 64 entries inline would bloat every Process.
    dispositions: Box<[Disposition; 64]>,
    alt_stack: AltStack,
}

/// Per-process blocked-set, action table, and alternate-stack descriptor.
///
/// Lives and dies with its Process; the blocked set is mirrored into
/// `ProcessSignalState` by every mutation path so the delivery sweep can
/// check it under the state lock alone.
pub struct SignalMaskState {
    inner: Mutex<MaskInner>,
}

impl SignalMaskState {
    pub fn new() -> Self {
        SignalMaskState {
            inner: Mutex::new(MaskInner {
                blocked: SignalSet::empty(),
                saved: None,
                dispositions: Box::new([Disposition::Default; 64]),
                alt_stack: AltStack::default(),
            }),
        }
    }

    pub fn blocked(&self) -> SignalSet {
        self.inner.lock().blocked
    }

    /// Install a new blocked set. SIGKILL/SIGSTOP bits are silently
    /// stripped; this is the single choke point enforcing the invariant.
    /// Returns the previous mask.
    pub fn set_blocked(&self, set: SignalSet) -> SignalSet {
        let mut inner = self.inner.lock();
        let old = inner.blocked;
        inner.blocked = SignalSet::from_mask(set.to_mask() & !UNBLOCKABLE_SIGNALS);
        old
    }

    pub fn disposition(&self, sig: u32) -> Disposition {
        if !is_valid_signal(sig) {
            return Disposition::Default;
        }
        self.inner.lock().dispositions[sig as usize]
    }

    /// Replace a disposition, returning the previous one. SIGKILL and
    /// SIGSTOP are immutable `Default` by policy, enforced here.
    pub fn set_disposition(&self, sig: u32, action: Disposition) -> Result<Disposition, SignalError> {
        if !is_valid_signal(sig) || !is_catchable(sig) {
            return Err(SignalError::InvalidSignal);
        }
        let mut inner = self.inner.lock();
        let old = inner.dispositions[sig as usize];
        inner.dispositions[sig as usize] = action;
        Ok(old)
    }

    /// Save the current mask and install a temporary one (sigsuspend entry).
    pub fn save_and_install(&self, temp: SignalSet) -> SignalSet {
        let mut inner = self.inner.lock();
        inner.saved = Some(inner.blocked);
        inner.blocked = SignalSet::from_mask(temp.to_mask() & !UNBLOCKABLE_SIGNALS);
        inner.blocked
    }

    /// Restore the mask saved by `save_and_install`. Returns the restored
    /// mask, or None if no suspend was active.
    pub fn restore_saved(&self) -> Option<SignalSet> {
        let mut inner = self.inner.lock();
        let saved = inner.saved.take()?;
        inner.blocked = saved;
        Some(saved)
    }

    pub fn suspend_active(&self) -> bool {
        self.inner.lock().saved.is_some()
    }

    pub fn alt_stack(&self) -> AltStack {
        self.inner.lock().alt_stack
    }

    pub fn set_alt_stack(&self, stack: AltStack) {
        self.inner.lock().alt_stack = stack;
    }

    /// Child state for fork: blocked mask, dispositions, and alt stack are
    /// inherited; nothing pending carries over (pending state lives in
    /// `ProcessSignalState`, which the child creates fresh).
    pub fn fork_from(&self) -> SignalMaskState {
        let inner = self.inner.lock();
        SignalMaskState {
            inner: Mutex::new(MaskInner {
                blocked: inner.blocked,
                saved: None,
                dispositions: inner.dispositions.clone(),
                alt_stack: inner.alt_stack,
            }),
        }
    }

    /// Reset for exec: caught handlers drop to Default, Ignore is kept, the
    /// alternate stack is cleared (its memory belonged to the old image).
    pub fn exec_reset(&self) {
        let mut inner = self.inner.lock();
        for entry in inner.dispositions.iter_mut() {
            if matches!(entry, Disposition::Handler { .. }) {
                *entry = Disposition::Default;
            }
        }
        inner.alt_stack = AltStack::default();
        inner.saved = None;
    }
}

impl Default for SignalMaskState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_action_table() {
        assert_eq!(default_action(SIGKILL), DefaultAction::Terminate);
        assert_eq!(default_action(SIGTERM), DefaultAction::Terminate);
        assert_eq!(default_action(SIGSTOP), DefaultAction::Stop);
        assert_eq!(default_action(SIGTSTP), DefaultAction::Stop);
        assert_eq!(default_action(SIGCONT), DefaultAction::Continue);
        assert_eq!(default_action(SIGCHLD), DefaultAction::Ignore);
        assert_eq!(default_action(SIGWINCH), DefaultAction::Ignore);
        assert_eq!(default_action(SIGRTMIN), DefaultAction::Ignore);
    }

    #[test]
    fn disposition_abi_round_trip() {
        let action = SigAction {
            handler: 0x40_1000,
            mask: sig_mask(SIGUSR1) | UNBLOCKABLE_SIGNALS,
            flags: SA_RESTART,
            restorer: 0,
        };
        let disp = Disposition::from_action(&action);
        match disp {
            Disposition::Handler { addr, mask, flags } => {
                assert_eq!(addr, 0x40_1000);
                // KILL/STOP must have been stripped from the handler mask
                assert!(!mask.contains(SIGKILL));
                assert!(!mask.contains(SIGSTOP));
                assert!(mask.contains(SIGUSR1));
                assert_eq!(flags, SA_RESTART);
            }
            other => panic!("expected handler disposition, got {:?}", other),
        }
        assert_eq!(Disposition::from_action(&SigAction::default()), Disposition::Default);
        assert_eq!(
            Disposition::from_action(&Disposition::Ignore.to_action()),
            Disposition::Ignore
        );
    }

    #[test]
    fn kill_stop_dispositions_immutable() {
        let state = SignalMaskState::new();
        assert_eq!(
            state.set_disposition(SIGKILL, Disposition::Ignore),
            Err(SignalError::InvalidSignal)
        );
        assert_eq!(
            state.set_disposition(SIGSTOP, Disposition::Ignore),
            Err(SignalError::InvalidSignal)
        );
        assert_eq!(state.disposition(SIGKILL), Disposition::Default);
        assert_eq!(state.disposition(SIGSTOP), Disposition::Default);
    }

    #[test]
    fn blocked_never_contains_unblockable() {
        let state = SignalMaskState::new();
        state.set_blocked(SignalSet::full());
        assert!(!state.blocked().contains(SIGKILL));
        assert!(!state.blocked().contains(SIGSTOP));
        let installed = state.save_and_install(SignalSet::full());
        assert!(!installed.contains(SIGKILL));
        assert!(!installed.contains(SIGSTOP));
    }

    #[test]
    fn suspend_save_restore() {
        let state = SignalMaskState::new();
        let mut blocked = SignalSet::empty();
        blocked.add(SIGUSR1).unwrap();
        state.set_blocked(blocked);

        let mut temp = SignalSet::empty();
        temp.add(SIGUSR2).unwrap();
        state.save_and_install(temp);
        assert!(state.suspend_active());
        assert!(state.blocked().contains(SIGUSR2));
        assert!(!state.blocked().contains(SIGUSR1));

        assert_eq!(state.restore_saved(), Some(blocked));
        assert!(!state.suspend_active());
        assert_eq!(state.restore_saved(), None);
    }

    #[test]
    fn fork_inherits_exec_resets() {
        let parent = SignalMaskState::new();
        let mut blocked = SignalSet::empty();
        blocked.add(SIGTERM).unwrap();
        parent.set_blocked(blocked);
        parent
            .set_disposition(
                SIGUSR1,
                Disposition::Handler {
                    addr: 0x1000,
                    mask: SignalSet::empty(),
                    flags: 0,
                },
            )
            .unwrap();
        parent.set_disposition(SIGINT, Disposition::Ignore).unwrap();

        let child = parent.fork_from();
        assert_eq!(child.blocked(), blocked);
        assert!(matches!(child.disposition(SIGUSR1), Disposition::Handler { .. }));

        child.exec_reset();
        assert_eq!(child.disposition(SIGUSR1), Disposition::Default);
        assert_eq!(child.disposition(SIGINT), Disposition::Ignore);
        assert_eq!(child.blocked(), blocked);
    }
}
