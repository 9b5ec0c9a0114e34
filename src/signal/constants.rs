//! Signal numbers, masks, and the fixed policy tables.
//!
//! The priority table, coalescible set, and default-action table are
//! immutable lookups constructed at compile time; readers need no
//! synchronization.

// Standard signals (1-31)
pub const SIGHUP: u32 = 1;
pub const SIGINT: u32 = 2;
pub const SIGQUIT: u32 = 3;
pub const SIGILL: u32 = 4;
pub const SIGTRAP: u32 = 5;
pub const SIGABRT: u32 = 6;
pub const SIGBUS: u32 = 7;
pub const SIGFPE: u32 = 8;
pub const SIGKILL: u32 = 9; // Cannot be caught or blocked
pub const SIGUSR1: u32 = 10;
pub const SIGSEGV: u32 = 11;
pub const SIGUSR2: u32 = 12;
pub const SIGPIPE: u32 = 13;
pub const SIGALRM: u32 = 14;
pub const SIGTERM: u32 = 15;
pub const SIGSTKFLT: u32 = 16;
pub const SIGCHLD: u32 = 17;
pub const SIGCONT: u32 = 18;
pub const SIGSTOP: u32 = 19; // Cannot be caught or blocked
pub const SIGTSTP: u32 = 20;
pub const SIGTTIN: u32 = 21;
pub const SIGTTOU: u32 = 22;
pub const SIGURG: u32 = 23;
pub const SIGXCPU: u32 = 24;
pub const SIGXFSZ: u32 = 25;
pub const SIGVTALRM: u32 = 26;
pub const SIGPROF: u32 = 27;
pub const SIGWINCH: u32 = 28;
pub const SIGIO: u32 = 29;
pub const SIGPWR: u32 = 30;
pub const SIGSYS: u32 = 31;

// Real-time signals (32-63): queued, never coalesced, carry a value
pub const SIGRTMIN: u32 = 32;
pub const SIGRTMAX: u32 = 63;

/// Maximum signal number supported. Signal 0 is reserved/invalid.
pub const NSIG: u32 = 63;

// Handler sentinels at the sigaction ABI boundary
/// Default action for the signal
pub const SIG_DFL: u64 = 0;
/// Ignore the signal
pub const SIG_IGN: u64 = 1;

// sigprocmask "how" values
pub const SIG_BLOCK: i32 = 0;
pub const SIG_UNBLOCK: i32 = 1;
pub const SIG_SETMASK: i32 = 2;

// sigaction flags
/// Restart interrupted syscalls
pub const SA_RESTART: u64 = 0x10000000;
/// Don't block the signal itself during handler execution
pub const SA_NODEFER: u64 = 0x40000000;
/// Handler takes three arguments (siginfo form)
pub const SA_SIGINFO: u64 = 0x00000004;
/// Run the handler on the alternate signal stack
pub const SA_ONSTACK: u64 = 0x08000000;
/// Reset the disposition to default on handler entry
pub const SA_RESETHAND: u64 = 0x80000000;

// Alternate stack flags and minimum size
pub const SS_ONSTACK: u32 = 1;
pub const SS_DISABLE: u32 = 2;
pub const MINSIGSTKSZ: usize = 2048;

// Generation flags (the `flags` argument of `DeliveryEngine::generate`)
/// Bypass the blocked mask: queue even while blocked.
pub const GEN_FORCE: u32 = 1 << 0;
/// Merge with an already-pending occurrence of a coalescible signal.
/// Without this flag each unblocked send queues its own occurrence;
/// blocked standard signals merge into the pending bit regardless.
pub const GEN_COALESCE: u32 = 1 << 1;
/// Do not attempt inline delivery after enqueuing.
pub const GEN_DEFER: u32 = 1 << 2;
/// Always queue a distinct occurrence (sigqueue path).
pub const GEN_QUEUE: u32 = 1 << 3;

/// Convert a signal number to its mask bit: bit *i* corresponds to signal
/// *i*, so bit 0 is never set.
///
/// Returns 0 for invalid signal numbers (0 or > NSIG).
#[inline]
pub const fn sig_mask(sig: u32) -> u64 {
    if sig == 0 || sig > NSIG {
        0
    } else {
        1u64 << sig
    }
}

/// Signals that can never be blocked, caught, or ignored.
pub const UNBLOCKABLE_SIGNALS: u64 = sig_mask(SIGKILL) | sig_mask(SIGSTOP);

/// Mask of every standard (non-real-time) signal.
pub const STANDARD_SIGNALS: u64 = {
    let mut mask = 0u64;
    let mut sig = 1u32;
    while sig < SIGRTMIN {
        mask |= sig_mask(sig);
        sig += 1;
    }
    mask
};

/// Standard signals eligible for coalescing. Real-time signals never
/// coalesce; SIGKILL/SIGSTOP are delivered individually as well.
pub const COALESCIBLE_SIGNALS: u64 = STANDARD_SIGNALS & !UNBLOCKABLE_SIGNALS;

#[inline]
pub const fn is_valid_signal(sig: u32) -> bool {
    sig > 0 && sig <= NSIG
}

#[inline]
pub const fn is_realtime(sig: u32) -> bool {
    sig >= SIGRTMIN && sig <= SIGRTMAX
}

/// Whether a signal's disposition may be changed and its delivery blocked.
#[inline]
pub const fn is_catchable(sig: u32) -> bool {
    sig != SIGKILL && sig != SIGSTOP
}

#[inline]
pub const fn is_coalescible(sig: u32) -> bool {
    COALESCIBLE_SIGNALS & sig_mask(sig) != 0
}

// Priority bands, ascending = delivered first.
pub const PRIO_CRITICAL: u8 = 0;
pub const PRIO_HIGH: u8 = 1;
pub const PRIO_NORMAL: u8 = 2;
pub const PRIO_LOW: u8 = 3;
/// Base band for real-time signals: signal 32+n maps to PRIO_RT_BASE+n.
///
/// This places every RT band after Low, replicating the upstream table
/// literally. Consumers must rely on relative order only.
pub const PRIO_RT_BASE: u8 = 4;
/// Highest band in the table (SIGRTMAX's band).
pub const PRIO_MAX: u8 = PRIO_RT_BASE + (SIGRTMAX - SIGRTMIN) as u8;

/// Fixed signal-to-priority-band table.
pub const fn signal_priority(sig: u32) -> u8 {
    match sig {
        SIGKILL | SIGSTOP => PRIO_CRITICAL,
        SIGILL | SIGTRAP | SIGABRT | SIGBUS | SIGFPE | SIGSEGV | SIGSTKFLT | SIGSYS => PRIO_HIGH,
        SIGCHLD | SIGURG | SIGWINCH => PRIO_LOW,
        _ if is_realtime(sig) => PRIO_RT_BASE + (sig - SIGRTMIN) as u8,
        _ => PRIO_NORMAL,
    }
}

/// Get signal name for debugging
pub fn signal_name(sig: u32) -> &'static str {
    match sig {
        SIGHUP => "SIGHUP",
        SIGINT => "SIGINT",
        SIGQUIT => "SIGQUIT",
        SIGILL => "SIGILL",
        SIGTRAP => "SIGTRAP",
        SIGABRT => "SIGABRT",
        SIGBUS => "SIGBUS",
        SIGFPE => "SIGFPE",
        SIGKILL => "SIGKILL",
        SIGUSR1 => "SIGUSR1",
        SIGSEGV => "SIGSEGV",
        SIGUSR2 => "SIGUSR2",
        SIGPIPE => "SIGPIPE",
        SIGALRM => "SIGALRM",
        SIGTERM => "SIGTERM",
        SIGSTKFLT => "SIGSTKFLT",
        SIGCHLD => "SIGCHLD",
        SIGCONT => "SIGCONT",
        SIGSTOP => "SIGSTOP",
        SIGTSTP => "SIGTSTP",
        SIGTTIN => "SIGTTIN",
        SIGTTOU => "SIGTTOU",
        SIGURG => "SIGURG",
        SIGXCPU => "SIGXCPU",
        SIGXFSZ => "SIGXFSZ",
        SIGVTALRM => "SIGVTALRM",
        SIGPROF => "SIGPROF",
        SIGWINCH => "SIGWINCH",
        SIGIO => "SIGIO",
        SIGPWR => "SIGPWR",
        SIGSYS => "SIGSYS",
        _ if is_realtime(sig) => "SIGRT",
        _ => "UNKNOWN",
    }
}
