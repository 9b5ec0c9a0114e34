//! The process table.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use super::{Process, ProcessId};
use crate::signal::SignalError;

pub struct ProcessManager {
    processes: Mutex<BTreeMap<ProcessId, Arc<Process>>>,
    next_pid: AtomicU64,
    /// Pid whose syscall context "current" accessors resolve to.
    current: Mutex<Option<ProcessId>>,
}

impl ProcessManager {
    pub fn new() -> Self {
        ProcessManager {
            processes: Mutex::new(BTreeMap::new()),
            next_pid: AtomicU64::new(1),
            current: Mutex::new(None),
        }
    }

    pub fn create_process(&self, name: String, uid: u32) -> Arc<Process> {
        let pid = ProcessId::new(self.next_pid.fetch_add(1, Ordering::Relaxed));
        let process = Arc::new(Process::new(pid, name, uid));
        self.processes.lock().insert(pid, process.clone());
        log::debug!("created process {} ({})", pid, process.name);
        process
    }

    /// Clone `parent` into a new process: mask, dispositions, and alternate
    /// stack are inherited; pending signals are not.
    pub fn fork(&self, parent: ProcessId) -> Result<Arc<Process>, SignalError> {
        let parent = self.get(parent).ok_or(SignalError::NotFound)?;
        let child = self.create_process(parent.name.clone(), parent.uid());
        child.pgid.store(parent.pgid(), Ordering::Relaxed);
        child.sid.store(parent.sid(), Ordering::Relaxed);
        let inherited = parent.sigmask.fork_from();
        child.sigmask.set_blocked(inherited.blocked());
        for sig in 1..=crate::signal::constants::NSIG {
            if crate::signal::constants::is_catchable(sig) {
                // propagating each entry keeps SignalMaskState's KILL/STOP
                // enforcement on the one write path
                let _ = child.sigmask.set_disposition(sig, inherited.disposition(sig));
            }
        }
        child.sigmask.set_alt_stack(inherited.alt_stack());
        child.signals.sync_blocked(child.sigmask.blocked());
        Ok(child)
    }

    pub fn get(&self, pid: ProcessId) -> Option<Arc<Process>> {
        self.processes.lock().get(&pid).cloned()
    }

    /// Drop a process from the table, discarding anything still pending for
    /// it. Queued occurrences die with the process.
    pub fn remove_process(&self, pid: ProcessId) -> Option<Arc<Process>> {
        let process = self.processes.lock().remove(&pid)?;
        let dropped = process.signals.clear_all();
        if dropped > 0 {
            log::debug!("process {} removed with {} pending signals discarded", pid, dropped);
        }
        Some(process)
    }

    pub fn snapshot(&self) -> Vec<Arc<Process>> {
        self.processes.lock().values().cloned().collect()
    }

    pub fn group_members(&self, pgid: u64) -> Vec<Arc<Process>> {
        self.processes
            .lock()
            .values()
            .filter(|p| p.pgid() == pgid)
            .cloned()
            .collect()
    }

    pub fn set_current(&self, pid: Option<ProcessId>) {
        *self.current.lock() = pid;
    }

    pub fn current_pid(&self) -> Option<ProcessId> {
        *self.current.lock()
    }

    pub fn current_process(&self) -> Option<Arc<Process>> {
        let pid = self.current_pid()?;
        self.get(pid)
    }

    pub fn len(&self) -> usize {
        self.processes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.lock().is_empty()
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}
