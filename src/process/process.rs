//! A single process: identity, lifecycle state, and its signal state.

use alloc::string::String;
use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use spin::{Mutex, RwLock};

use super::ProcessId;
use crate::signal::state::ProcessSignalState;
use crate::signal::types::SignalMaskState;

/// Scheduler-visible lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Runnable, not on a CPU.
    Ready,
    /// Currently on a CPU.
    Running,
    /// Sleeping in a blocking call (sigsuspend, sigtimedwait, pause).
    Blocked,
    /// Stopped by SIGSTOP/SIGTSTP; only SIGCONT or SIGKILL act on it.
    Stopped,
    /// Exited; kept in the table until reaped.
    Terminated,
}

pub struct Process {
    pub id: ProcessId,
    pub name: String,
    /// Effective uid, for kill permission checks.
    pub uid: AtomicU32,
    pub pgid: AtomicU64,
    /// Session id; grants SIGCONT within the session.
    pub sid: AtomicU64,
    state: RwLock<ProcessState>,
    exit_code: Mutex<Option<i32>>,
    /// Pending signals and queues.
    pub signals: ProcessSignalState,
    /// Blocked set, dispositions, alternate stack.
    pub sigmask: SignalMaskState,
}

impl Process {
    pub fn new(id: ProcessId, name: String, uid: u32) -> Self {
        Process {
            id,
            name,
            uid: AtomicU32::new(uid),
            // each process starts as its own group and session leader
            pgid: AtomicU64::new(id.as_u64()),
            sid: AtomicU64::new(id.as_u64()),
            state: RwLock::new(ProcessState::Ready),
            exit_code: Mutex::new(None),
            signals: ProcessSignalState::new(),
            sigmask: SignalMaskState::new(),
        }
    }

    pub fn state(&self) -> ProcessState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ProcessState) {
        *self.state.write() = state;
    }

    /// Move to Terminated and record the exit code. The first exit wins;
    /// later calls are no-ops so a kill racing a voluntary exit cannot
    /// rewrite the code.
    pub fn exit(&self, code: i32) {
        let mut exit_code = self.exit_code.lock();
        if exit_code.is_some() {
            return;
        }
        *exit_code = Some(code);
        *self.state.write() = ProcessState::Terminated;
        log::debug!("process {} ({}) exited with code {}", self.id, self.name, code);
    }

    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_code.lock()
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ProcessState::Terminated
    }

    pub fn uid(&self) -> u32 {
        self.uid.load(Ordering::Relaxed)
    }

    pub fn pgid(&self) -> u64 {
        self.pgid.load(Ordering::Relaxed)
    }

    pub fn sid(&self) -> u64 {
        self.sid.load(Ordering::Relaxed)
    }
}
