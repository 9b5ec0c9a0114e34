//! alarm(2): one pending SIGALRM deadline per process.

use alloc::collections::BTreeMap;
use spin::Mutex;

use crate::process::{ProcessId, ProcessManager};
use crate::signal::constants::{GEN_COALESCE, SIGALRM};
use crate::signal::delivery::DeliveryEngine;
use crate::signal::SigSource;

pub struct AlarmClock {
    /// Absolute expiry, monotonic ms, one slot per process.
    deadlines: Mutex<BTreeMap<ProcessId, u64>>,
}

impl AlarmClock {
    pub fn new() -> Self {
        AlarmClock {
            deadlines: Mutex::new(BTreeMap::new()),
        }
    }

    /// Arm (or with `seconds == 0` cancel) the alarm for `pid`. Returns the
    /// whole seconds left on any previously armed alarm, rounded up, which
    /// is what the syscall hands back to userspace.
    pub fn arm(&self, pid: ProcessId, seconds: u32, now_ms: u64) -> u32 {
        let mut deadlines = self.deadlines.lock();
        let previous = if seconds == 0 {
            deadlines.remove(&pid)
        } else {
            deadlines.insert(pid, now_ms + seconds as u64 * 1000)
        };
        match previous {
            Some(deadline) if deadline > now_ms => {
                (((deadline - now_ms) + 999) / 1000) as u32
            }
            _ => 0,
        }
    }

    pub fn cancel(&self, pid: ProcessId) {
        self.deadlines.lock().remove(&pid);
    }

    /// Fire expired alarms. Called from the timer tick path; a dead target
    /// just loses its alarm.
    pub fn tick(&self, engine: &DeliveryEngine, manager: &ProcessManager, now_ms: u64) {
        let expired: alloc::vec::Vec<ProcessId> = {
            let mut deadlines = self.deadlines.lock();
            let fired: alloc::vec::Vec<ProcessId> = deadlines
                .iter()
                .filter(|&(_, &deadline)| deadline <= now_ms)
                .map(|(&pid, _)| pid)
                .collect();
            for pid in &fired {
                deadlines.remove(pid);
            }
            fired
        };
        for pid in expired {
            if let Some(process) = manager.get(pid) {
                let _ = engine.generate(&process, SIGALRM, SigSource::Timer, GEN_COALESCE);
            }
        }
    }
}

impl Default for AlarmClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn arm_returns_remaining_rounded_up() {
        let clock = AlarmClock::new();
        let pid = ProcessId::new(1);
        assert_eq!(clock.arm(pid, 10, 0), 0);
        // 9.5s remain after 500ms; rounds up to 10
        assert_eq!(clock.arm(pid, 5, 500), 10);
        // cancel reports the 5s alarm armed at t=500
        assert_eq!(clock.arm(pid, 0, 1000), 5);
        assert_eq!(clock.arm(pid, 0, 1000), 0);
    }

    #[test]
    fn long_alarms_report_remaining_without_truncation() {
        let clock = AlarmClock::new();
        let pid = ProcessId::new(1);
        // 60 days: the remaining-ms value exceeds u32::MAX
        let sixty_days = 60 * 24 * 3600;
        assert_eq!(clock.arm(pid, sixty_days, 0), 0);
        assert_eq!(clock.arm(pid, 0, 0), sixty_days);
    }

    #[test]
    fn tick_fires_sigalrm_once() {
        let engine = DeliveryEngine::new();
        let mgr = ProcessManager::new();
        let clock = AlarmClock::new();
        let p = mgr.create_process("sleeper".to_string(), 1000);
        // install a handler and block it so the firing parks as pending
        // instead of terminating the process
        engine
            .set_disposition(&p, SIGALRM, crate::signal::Disposition::Handler {
                addr: 0x1000,
                mask: crate::signal::SignalSet::empty(),
                flags: 0,
            })
            .unwrap();
        let mut mask = crate::signal::SignalSet::empty();
        mask.add(SIGALRM).unwrap();
        engine
            .change_mask(&p, crate::signal::constants::SIG_BLOCK, mask)
            .unwrap();

        clock.arm(p.id, 2, 0);
        clock.tick(&engine, &mgr, 1000);
        assert!(!p.signals.pending().contains(SIGALRM));
        clock.tick(&engine, &mgr, 2000);
        assert!(p.signals.pending().contains(SIGALRM));
        // deadline consumed; no refire
        let stats_before = engine.stats();
        clock.tick(&engine, &mgr, 3000);
        assert_eq!(engine.stats().generated, stats_before.generated);
    }
}
