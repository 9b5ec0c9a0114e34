//! Syscall boundary: numbers, errno values, result encoding, and the
//! dispatcher that routes raw register arguments to the facade.

pub mod alarm;
pub mod signal;
pub mod userptr;

/// Signal-family system call numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SyscallNumber {
    Signal = 48,
    SigAction = 49,
    Kill = 50,
    SigProcMask = 51,
    SigPending = 52,
    SigSuspend = 53,
    SigQueue = 54,
    SigTimedWait = 55,
    SigWaitInfo = 56,
    SigAltStack = 57,
    Alarm = 58,
    Pause = 59,
}

impl SyscallNumber {
    pub fn from_u64(value: u64) -> Option<Self> {
        match value {
            48 => Some(Self::Signal),
            49 => Some(Self::SigAction),
            50 => Some(Self::Kill),
            51 => Some(Self::SigProcMask),
            52 => Some(Self::SigPending),
            53 => Some(Self::SigSuspend),
            54 => Some(Self::SigQueue),
            55 => Some(Self::SigTimedWait),
            56 => Some(Self::SigWaitInfo),
            57 => Some(Self::SigAltStack),
            58 => Some(Self::Alarm),
            59 => Some(Self::Pause),
            _ => None,
        }
    }
}

/// POSIX errno values surfaced by the signal syscalls.
pub mod errno {
    /// Operation not permitted
    pub const EPERM: u64 = 1;
    /// No such process
    pub const ESRCH: u64 = 3;
    /// Interrupted system call
    pub const EINTR: u64 = 4;
    /// I/O error
    pub const EIO: u64 = 5;
    /// Resource temporarily unavailable (would block)
    pub const EAGAIN: u64 = 11;
    /// Cannot allocate memory
    pub const ENOMEM: u64 = 12;
    /// Bad address
    pub const EFAULT: u64 = 14;
    /// Invalid argument
    pub const EINVAL: u64 = 22;
    /// Function not implemented
    pub const ENOSYS: u64 = 38;
}

/// System call result, encoded as a negative errno in a register on the
/// error path (Linux convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallResult {
    Ok(u64),
    Err(u64),
}

impl SyscallResult {
    pub fn as_isize(self) -> isize {
        match self {
            SyscallResult::Ok(v) => v as isize,
            SyscallResult::Err(e) => -(e as isize),
        }
    }
}

impl From<Result<u64, crate::signal::SignalError>> for SyscallResult {
    fn from(r: Result<u64, crate::signal::SignalError>) -> Self {
        match r {
            Ok(v) => SyscallResult::Ok(v),
            Err(e) => SyscallResult::Err(e.errno()),
        }
    }
}

/// Route a raw syscall to the global facade. Unknown numbers get ENOSYS.
pub fn dispatch(num: u64, arg1: u64, arg2: u64, arg3: u64, arg4: u64) -> SyscallResult {
    let facade = crate::facade();
    let Some(num) = SyscallNumber::from_u64(num) else {
        log::warn!("unknown syscall number {}", num);
        return SyscallResult::Err(errno::ENOSYS);
    };
    match num {
        SyscallNumber::Signal => facade.sys_signal(arg1 as u32, arg2),
        SyscallNumber::SigAction => facade.sys_sigaction(arg1 as u32, arg2, arg3),
        SyscallNumber::Kill => facade.sys_kill(arg1 as i64, arg2 as u32),
        SyscallNumber::SigProcMask => facade.sys_sigprocmask(arg1 as i32, arg2, arg3),
        SyscallNumber::SigPending => facade.sys_sigpending(arg1),
        SyscallNumber::SigSuspend => facade.sys_sigsuspend(arg1),
        SyscallNumber::SigQueue => facade.sys_sigqueue(arg1 as i64, arg2 as u32, arg3),
        SyscallNumber::SigTimedWait => facade.sys_sigtimedwait(arg1, arg2, arg3),
        SyscallNumber::SigWaitInfo => facade.sys_sigwaitinfo(arg1, arg2),
        SyscallNumber::SigAltStack => facade.sys_sigaltstack(arg1, arg2),
        SyscallNumber::Alarm => facade.sys_alarm(arg1 as u32),
        SyscallNumber::Pause => facade.sys_pause(),
    }
    .into()
}

pub use signal::SyscallFacade;
