//! Signal engine core: sets, queues, per-process state, delivery pipeline.

pub mod constants;
pub mod delivery;
pub mod queue;
pub mod sigset;
pub mod state;
pub mod types;

pub use constants::*;
pub use sigset::SignalSet;
pub use types::{Disposition, SigInfo, SigOccurrence, SigSource};

/// Closed error taxonomy for the engine and its syscall boundary.
///
/// Expected conditions (full queue, invalid signal number, denied kill) are
/// values of this enum, never panics. Corrupted internal invariants are
/// programming errors and trap via `unreachable!`/`debug_assert!` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalError {
    /// Signal number outside [1,63], or a mutation attempt on an immutable
    /// disposition (SIGKILL/SIGSTOP).
    InvalidSignal,
    /// Enqueue hit the queue's fixed capacity; the occurrence is discarded
    /// and counted, not retried.
    QueueFull,
    /// The referenced process (or its signal state) does not exist.
    NotFound,
    /// kill-family permission check failed.
    PermissionDenied,
    /// User/kernel boundary copy failed validation.
    CopyFault,
    /// Disposition dispatch reported failure; the occurrence is requeued.
    DeliverFailed,
    /// A blocking wait was interrupted by signal arrival. This is the
    /// *normal* outcome of sigsuspend/pause, by contract.
    Interrupted,
    /// A bounded wait reached its deadline with nothing deliverable.
    WouldBlock,
    /// Alternate-stack installation below MINSIGSTKSZ.
    NoMemory,
}

impl SignalError {
    /// The errno this error surfaces as at the syscall boundary.
    pub fn errno(self) -> u64 {
        use crate::syscall::errno;
        match self {
            SignalError::InvalidSignal => errno::EINVAL,
            SignalError::QueueFull => errno::EAGAIN,
            SignalError::NotFound => errno::ESRCH,
            SignalError::PermissionDenied => errno::EPERM,
            SignalError::CopyFault => errno::EFAULT,
            SignalError::DeliverFailed => errno::EIO,
            SignalError::Interrupted => errno::EINTR,
            SignalError::WouldBlock => errno::EAGAIN,
            SignalError::NoMemory => errno::ENOMEM,
        }
    }
}
