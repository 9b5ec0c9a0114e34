//! The signal syscall facade: POSIX-shaped entry points over the engine,
//! process table, and alarm clock.
//!
//! All handlers act on behalf of the manager's current process, take raw
//! userspace addresses for pointer arguments, and report errors as
//! `SignalError` (mapped to negative errno by the dispatcher).

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::alarm::AlarmClock;
use super::userptr::{copy_from_user, copy_to_user};
use crate::process::{Process, ProcessManager};
use crate::signal::constants::*;
use crate::signal::delivery::DeliveryEngine;
use crate::signal::sigset::SignalSet;
use crate::signal::types::{AltStack, Disposition, SigAction, SigInfoRaw, StackT, Timespec};
use crate::signal::{SigSource, SignalError};

pub struct SyscallFacade<'a> {
    engine: &'a DeliveryEngine,
    manager: &'a ProcessManager,
    alarms: &'a AlarmClock,
}

impl<'a> SyscallFacade<'a> {
    pub fn new(
        engine: &'a DeliveryEngine,
        manager: &'a ProcessManager,
        alarms: &'a AlarmClock,
    ) -> Self {
        SyscallFacade {
            engine,
            manager,
            alarms,
        }
    }

    fn current(&self) -> Result<Arc<Process>, SignalError> {
        self.manager.current_process().ok_or(SignalError::NotFound)
    }

    /// signal(2): shorthand sigaction. Returns the previous handler
    /// sentinel (SIG_DFL, SIG_IGN, or the old handler address).
    pub fn sys_signal(&self, sig: u32, handler: u64) -> Result<u64, SignalError> {
        let process = self.current()?;
        let disposition = match handler {
            SIG_DFL => Disposition::Default,
            SIG_IGN => Disposition::Ignore,
            addr => Disposition::Handler {
                addr,
                mask: SignalSet::empty(),
                flags: 0,
            },
        };
        let old = self.engine.set_disposition(&process, sig, disposition)?;
        Ok(old.handler_sentinel())
    }

    /// sigaction(2). `new_ptr`/`old_ptr` are userspace `SigAction` pointers;
    /// either may be null. The old action is captured before the new one is
    /// installed.
    pub fn sys_sigaction(&self, sig: u32, new_ptr: u64, old_ptr: u64) -> Result<u64, SignalError> {
        if !is_valid_signal(sig) {
            return Err(SignalError::InvalidSignal);
        }
        let process = self.current()?;
        let old = process.sigmask.disposition(sig);

        if new_ptr != 0 {
            let action: SigAction = copy_from_user(new_ptr as *const SigAction)?;
            self.engine
                .set_disposition(&process, sig, Disposition::from_action(&action))?;
        }
        if old_ptr != 0 {
            copy_to_user(old_ptr as *mut SigAction, &old.to_action())?;
        }
        Ok(0)
    }

    /// kill(2) with the full pid encoding: `pid > 0` one process, `pid == 0`
    /// the sender's group, `pid == -1` everyone but pid 1 and the sender,
    /// `pid < -1` the group `-pid`. `sig == 0` probes permissions without
    /// generating.
    pub fn sys_kill(&self, pid: i64, sig: u32) -> Result<u64, SignalError> {
        if sig != 0 && !is_valid_signal(sig) {
            return Err(SignalError::InvalidSignal);
        }
        let sender = self.manager.current_process();

        let targets: Vec<Arc<Process>> = match pid {
            p if p > 0 => {
                let id = crate::process::ProcessId::new(p as u64);
                match self.manager.get(id) {
                    Some(t) if !t.is_terminated() => alloc::vec![t],
                    _ => Vec::new(),
                }
            }
            0 => {
                let sender = sender.as_ref().ok_or(SignalError::NotFound)?;
                self.manager.group_members(sender.pgid())
            }
            -1 => self
                .manager
                .snapshot()
                .into_iter()
                .filter(|t| {
                    t.id.as_u64() != 1
                        && sender.as_ref().map_or(true, |s| s.id != t.id)
                        && !t.is_terminated()
                })
                .collect(),
            p => self.manager.group_members((-p) as u64),
        };

        if targets.is_empty() {
            return Err(SignalError::NotFound);
        }

        let mut accepted = 0usize;
        for target in &targets {
            if !Self::can_signal(sender.as_deref(), target, sig) {
                continue;
            }
            accepted += 1;
            if sig == 0 {
                continue;
            }
            let source = match sender.as_ref() {
                Some(s) => SigSource::User {
                    pid: s.id,
                    uid: s.uid(),
                },
                None => SigSource::Kernel,
            };
            // per-target queue-full is not surfaced to a broadcast sender
            let _ = self.engine.generate(target, sig, source, 0);
        }

        if accepted == 0 {
            return Err(SignalError::PermissionDenied);
        }
        Ok(0)
    }

    /// Unprivileged senders may signal processes sharing their uid; SIGCONT
    /// additionally reaches anything in the sender's session. No sender
    /// means kernel context, which may signal anyone.
    fn can_signal(sender: Option<&Process>, target: &Process, sig: u32) -> bool {
        let Some(sender) = sender else { return true };
        if sender.uid() == 0 {
            return true;
        }
        if sender.id == target.id || sender.uid() == target.uid() {
            return true;
        }
        sig == SIGCONT && sender.sid() == target.sid()
    }

    /// sigprocmask(2). Pointers are userspace `u64` bitmasks; either may be
    /// null. Unblocking with deliverable signals pending delivers them
    /// before this returns.
    pub fn sys_sigprocmask(&self, how: i32, set_ptr: u64, old_ptr: u64) -> Result<u64, SignalError> {
        let process = self.current()?;
        let old = process.sigmask.blocked();

        if set_ptr != 0 {
            let mask: u64 = copy_from_user(set_ptr as *const u64)?;
            self.engine
                .change_mask(&process, how, SignalSet::from_mask(mask))?;
        }
        if old_ptr != 0 {
            copy_to_user(old_ptr as *mut u64, &old.to_mask())?;
        }
        Ok(0)
    }

    /// sigpending(2): the full pending set, including deferred markers.
    pub fn sys_sigpending(&self, set_ptr: u64) -> Result<u64, SignalError> {
        let process = self.current()?;
        copy_to_user(set_ptr as *mut u64, &process.signals.pending().to_mask())?;
        Ok(0)
    }

    /// sigsuspend(2): atomically swap in a temporary mask and wait for a
    /// delivery. Never returns success; EINTR is the contract.
    pub fn sys_sigsuspend(&self, mask_ptr: u64) -> Result<u64, SignalError> {
        let process = self.current()?;
        let mask: u64 = copy_from_user(mask_ptr as *const u64)?;
        self.engine
            .suspend(&process, SignalSet::from_mask(mask))
            .map(|_| 0)
    }

    /// sigqueue(2): real-time signal with an attached value. Standard
    /// signals are rejected; a full queue surfaces as EAGAIN.
    pub fn sys_sigqueue(&self, pid: i64, sig: u32, value: u64) -> Result<u64, SignalError> {
        if !is_realtime(sig) {
            return Err(SignalError::InvalidSignal);
        }
        if pid <= 0 {
            return Err(SignalError::InvalidSignal);
        }
        let sender = self.manager.current_process();
        let target = self
            .manager
            .get(crate::process::ProcessId::new(pid as u64))
            .filter(|t| !t.is_terminated())
            .ok_or(SignalError::NotFound)?;
        if !Self::can_signal(sender.as_deref(), &target, sig) {
            return Err(SignalError::PermissionDenied);
        }
        let (spid, uid) = sender
            .as_ref()
            .map(|s| (s.id, s.uid()))
            .unwrap_or((crate::process::ProcessId::new(0), 0));
        self.engine.generate(
            &target,
            sig,
            SigSource::Queue {
                pid: spid,
                uid,
                value,
            },
            GEN_QUEUE,
        )?;
        Ok(0)
    }

    /// sigtimedwait(2). Null timeout waits forever; a zero timeout polls.
    /// Returns the taken signal number; the blocked mask is not consulted.
    pub fn sys_sigtimedwait(
        &self,
        set_ptr: u64,
        info_ptr: u64,
        timeout_ptr: u64,
    ) -> Result<u64, SignalError> {
        let process = self.current()?;
        let mask: u64 = copy_from_user(set_ptr as *const u64)?;
        let wanted = SignalSet::from_mask(mask);
        if wanted.is_empty() {
            return Err(SignalError::InvalidSignal);
        }

        let deadline = if timeout_ptr != 0 {
            let ts: Timespec = copy_from_user(timeout_ptr as *const Timespec)?;
            let ms = ts.to_millis().ok_or(SignalError::InvalidSignal)?;
            Some(self.engine.now() + ms)
        } else {
            None
        };

        let info = self.engine.take_pending(&process, wanted, deadline)?;
        if info_ptr != 0 {
            copy_to_user(info_ptr as *mut SigInfoRaw, &SigInfoRaw::from(info))?;
        }
        Ok(info.signo as u64)
    }

    /// sigwaitinfo(2): sigtimedwait without a deadline.
    pub fn sys_sigwaitinfo(&self, set_ptr: u64, info_ptr: u64) -> Result<u64, SignalError> {
        self.sys_sigtimedwait(set_ptr, info_ptr, 0)
    }

    /// sigaltstack(2). Rejects changes while the alternate stack is in use
    /// and installations smaller than MINSIGSTKSZ.
    pub fn sys_sigaltstack(&self, new_ptr: u64, old_ptr: u64) -> Result<u64, SignalError> {
        let process = self.current()?;
        let old = process.sigmask.alt_stack();

        if new_ptr != 0 {
            if old.on_stack {
                return Err(SignalError::PermissionDenied);
            }
            let ss: StackT = copy_from_user(new_ptr as *const StackT)?;
            let flags = ss.ss_flags as u32;
            if flags & !(SS_DISABLE) != 0 {
                return Err(SignalError::InvalidSignal);
            }
            if flags & SS_DISABLE != 0 {
                process.sigmask.set_alt_stack(AltStack::default());
            } else {
                if ss.ss_size < MINSIGSTKSZ {
                    return Err(SignalError::NoMemory);
                }
                process.sigmask.set_alt_stack(AltStack {
                    base: ss.ss_sp,
                    size: ss.ss_size,
                    flags: 0,
                    on_stack: false,
                });
            }
        }
        if old_ptr != 0 {
            copy_to_user(old_ptr as *mut StackT, &old.to_stackt())?;
        }
        Ok(0)
    }

    /// alarm(2). Returns whole seconds left on any previously armed alarm.
    pub fn sys_alarm(&self, seconds: u32) -> Result<u64, SignalError> {
        let process = self.current()?;
        Ok(self.alarms.arm(process.id, seconds, self.engine.now()) as u64)
    }

    /// pause(2): wait for any delivery. Always EINTR.
    pub fn sys_pause(&self) -> Result<u64, SignalError> {
        let process = self.current()?;
        self.engine.pause(&process).map(|_| 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::delivery::{HandlerInvocation, Trampoline};
    use alloc::boxed::Box;
    use alloc::string::ToString;

    struct NullTrampoline;
    impl Trampoline for NullTrampoline {
        fn invoke(&self, _p: &Process, _i: &HandlerInvocation) -> Result<(), SignalError> {
            Ok(())
        }
    }

    struct Fixture {
        engine: DeliveryEngine,
        manager: ProcessManager,
        alarms: AlarmClock,
    }

    impl Fixture {
        fn new() -> Self {
            let engine = DeliveryEngine::new();
            engine.set_trampoline(Box::new(NullTrampoline));
            Fixture {
                engine,
                manager: ProcessManager::new(),
                alarms: AlarmClock::new(),
            }
        }

        fn facade(&self) -> SyscallFacade<'_> {
            SyscallFacade::new(&self.engine, &self.manager, &self.alarms)
        }

        fn spawn(&self, name: &str, uid: u32) -> Arc<Process> {
            self.manager.create_process(name.to_string(), uid)
        }
    }

    #[test]
    fn kill_terminates_with_128_plus_signal() {
        let fx = Fixture::new();
        let killer = fx.spawn("root-shell", 0);
        let victim = fx.spawn("victim", 1000);
        fx.manager.set_current(Some(killer.id));

        let facade = fx.facade();
        assert_eq!(facade.sys_kill(victim.id.as_u64() as i64, SIGTERM), Ok(0));
        assert!(victim.is_terminated());
        assert_eq!(victim.exit_code(), Some(143));
    }

    #[test]
    fn kill_permission_checks() {
        let fx = Fixture::new();
        let alice = fx.spawn("alice", 1000);
        let bob = fx.spawn("bob", 1001);
        let alice2 = fx.spawn("alice2", 1000);
        fx.manager.set_current(Some(alice.id));

        let facade = fx.facade();
        // different uid, not root
        assert_eq!(
            facade.sys_kill(bob.id.as_u64() as i64, SIGTERM),
            Err(SignalError::PermissionDenied)
        );
        assert!(!bob.is_terminated());
        // same uid is allowed
        assert_eq!(facade.sys_kill(alice2.id.as_u64() as i64, SIGTERM), Ok(0));
        assert!(alice2.is_terminated());
        // nonexistent pid
        assert_eq!(
            facade.sys_kill(9999, SIGTERM),
            Err(SignalError::NotFound)
        );
    }

    #[test]
    fn kill_sig_zero_probes_without_generating() {
        let fx = Fixture::new();
        let alice = fx.spawn("alice", 1000);
        let bob = fx.spawn("bob", 1001);
        fx.manager.set_current(Some(alice.id));

        let facade = fx.facade();
        assert_eq!(facade.sys_kill(alice.id.as_u64() as i64, 0), Ok(0));
        assert_eq!(
            facade.sys_kill(bob.id.as_u64() as i64, 0),
            Err(SignalError::PermissionDenied)
        );
        assert_eq!(fx.engine.stats().generated, 0);
    }

    #[test]
    fn kill_negative_pid_signals_the_group() {
        let fx = Fixture::new();
        // occupy pid 1 so the leader's pgid is > 1 and -pgid takes the
        // group branch rather than the broadcast one
        let init = fx.spawn("init", 0);
        let leader = fx.spawn("leader", 1000);
        let member = fx.spawn("member", 1000);
        member
            .pgid
            .store(leader.pgid(), core::sync::atomic::Ordering::Relaxed);
        let outsider = fx.spawn("outsider", 1000);
        fx.manager.set_current(Some(leader.id));
        assert!(leader.pgid() > 1);

        let facade = fx.facade();
        assert_eq!(facade.sys_kill(-(leader.pgid() as i64), SIGTERM), Ok(0));
        assert!(leader.is_terminated());
        assert!(member.is_terminated());
        assert!(!init.is_terminated());
        assert!(!outsider.is_terminated());
    }

    #[test]
    fn kill_minus_one_spares_init_and_sender() {
        let fx = Fixture::new();
        let init = fx.spawn("init", 0); // pid 1
        let root = fx.spawn("root-shell", 0);
        let other = fx.spawn("other", 1000);
        assert_eq!(init.id.as_u64(), 1);
        fx.manager.set_current(Some(root.id));

        let facade = fx.facade();
        assert_eq!(facade.sys_kill(-1, SIGTERM), Ok(0));
        assert!(!init.is_terminated());
        assert!(!root.is_terminated());
        assert!(other.is_terminated());
    }

    #[test]
    fn sigprocmask_round_trips_through_user_pointers() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        let set: u64 = sig_mask(SIGINT) | sig_mask(SIGKILL);
        let mut old: u64 = u64::MAX;
        facade
            .sys_sigprocmask(SIG_BLOCK, &set as *const u64 as u64, &mut old as *mut u64 as u64)
            .unwrap();
        assert_eq!(old, 0);
        // KILL silently stripped from the installed mask
        assert!(p.sigmask.blocked().contains(SIGINT));
        assert!(!p.sigmask.blocked().contains(SIGKILL));

        let mut now: u64 = 0;
        facade
            .sys_sigprocmask(SIG_SETMASK, 0, &mut now as *mut u64 as u64)
            .unwrap();
        assert_eq!(now, sig_mask(SIGINT));

        assert_eq!(
            facade.sys_sigprocmask(99, &set as *const u64 as u64, 0),
            Err(SignalError::InvalidSignal)
        );
    }

    #[test]
    fn sigaction_reports_previous_action() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        let new = SigAction {
            handler: 0x5000,
            mask: sig_mask(SIGUSR2),
            flags: SA_RESTART,
            restorer: 0,
        };
        let mut old = SigAction::default();
        facade
            .sys_sigaction(
                SIGUSR1,
                &new as *const SigAction as u64,
                &mut old as *mut SigAction as u64,
            )
            .unwrap();
        assert_eq!(old.handler, SIG_DFL);

        let mut old2 = SigAction::default();
        facade
            .sys_sigaction(SIGUSR1, 0, &mut old2 as *mut SigAction as u64)
            .unwrap();
        assert_eq!(old2.handler, 0x5000);
        assert_eq!(old2.flags, SA_RESTART);

        // KILL's action can be queried but never replaced
        assert!(facade.sys_sigaction(SIGKILL, 0, 0).is_ok());
        assert_eq!(
            facade.sys_sigaction(SIGKILL, &new as *const SigAction as u64, 0),
            Err(SignalError::InvalidSignal)
        );
    }

    #[test]
    fn signal_returns_old_sentinel() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        assert_eq!(facade.sys_signal(SIGHUP, SIG_IGN), Ok(SIG_DFL));
        assert_eq!(facade.sys_signal(SIGHUP, 0x7000), Ok(SIG_IGN));
        assert_eq!(facade.sys_signal(SIGHUP, SIG_DFL), Ok(0x7000));
    }

    #[test]
    fn sigpending_reflects_deferred_signals() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        let block: u64 = sig_mask(SIGINT);
        facade
            .sys_sigprocmask(SIG_BLOCK, &block as *const u64 as u64, 0)
            .unwrap();
        facade.sys_signal(SIGINT, 0x7000).unwrap();
        fx.engine
            .generate(&p, SIGINT, SigSource::Kernel, 0)
            .unwrap();

        let mut pending: u64 = 0;
        facade.sys_sigpending(&mut pending as *mut u64 as u64).unwrap();
        assert_eq!(pending, sig_mask(SIGINT));
    }

    #[test]
    fn sigqueue_is_realtime_only() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        assert_eq!(
            facade.sys_sigqueue(p.id.as_u64() as i64, SIGUSR1, 42),
            Err(SignalError::InvalidSignal)
        );

        // block it so the value stays observable in the queue
        let block: u64 = sig_mask(SIGRTMIN);
        facade
            .sys_sigprocmask(SIG_BLOCK, &block as *const u64 as u64, 0)
            .unwrap();
        facade.sys_signal(SIGRTMIN, 0x7000).unwrap();
        facade
            .sys_sigqueue(p.id.as_u64() as i64, SIGRTMIN, 42)
            .unwrap();
        let occ = p.signals.queue(SIGRTMIN).peek().unwrap();
        assert_eq!(occ.info.value, 42);
    }

    #[test]
    fn sigtimedwait_polls_and_reports_value() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        let wanted: u64 = sig_mask(SIGRTMIN);
        facade
            .sys_sigprocmask(SIG_BLOCK, &wanted as *const u64 as u64, 0)
            .unwrap();
        // a default-disposition real-time signal would be discarded as
        // ignored at generation, so install a handler
        facade.sys_signal(SIGRTMIN, 0x7000).unwrap();
        let zero = Timespec::default();

        // nothing pending: a zero timeout polls and gets EAGAIN
        assert_eq!(
            facade.sys_sigtimedwait(
                &wanted as *const u64 as u64,
                0,
                &zero as *const Timespec as u64
            ),
            Err(SignalError::WouldBlock)
        );

        facade
            .sys_sigqueue(p.id.as_u64() as i64, SIGRTMIN, 7)
            .unwrap();
        let mut info = SigInfoRaw::default();
        let got = facade
            .sys_sigtimedwait(
                &wanted as *const u64 as u64,
                &mut info as *mut SigInfoRaw as u64,
                &zero as *const Timespec as u64,
            )
            .unwrap();
        assert_eq!(got, SIGRTMIN as u64);
        assert_eq!(info.si_signo, SIGRTMIN as i32);
        assert_eq!(info.si_value, 7);
    }

    #[test]
    fn sigaltstack_validates_size_and_busy_stack() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        let small = StackT {
            ss_sp: 0x10_0000,
            ss_flags: 0,
            _pad: 0,
            ss_size: MINSIGSTKSZ - 1,
        };
        assert_eq!(
            facade.sys_sigaltstack(&small as *const StackT as u64, 0),
            Err(SignalError::NoMemory)
        );

        let ok = StackT {
            ss_size: 16 * 1024,
            ..small
        };
        let mut old = StackT::default();
        facade
            .sys_sigaltstack(&ok as *const StackT as u64, &mut old as *mut StackT as u64)
            .unwrap();
        assert_eq!(old.ss_flags, SS_DISABLE as i32);

        // changes are refused while a handler runs on the stack
        let mut busy = p.sigmask.alt_stack();
        busy.on_stack = true;
        p.sigmask.set_alt_stack(busy);
        assert_eq!(
            facade.sys_sigaltstack(&ok as *const StackT as u64, 0),
            Err(SignalError::PermissionDenied)
        );
        let mut seen = StackT::default();
        facade.sys_sigaltstack(0, &mut seen as *mut StackT as u64).unwrap();
        assert_eq!(seen.ss_flags, SS_ONSTACK as i32);
    }

    #[test]
    fn alarm_reports_previous_remaining() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        assert_eq!(facade.sys_alarm(30), Ok(0));
        assert_eq!(facade.sys_alarm(0), Ok(30));
        assert_eq!(facade.sys_alarm(0), Ok(0));
    }

    #[test]
    fn suspend_contract_is_eintr() {
        let fx = Fixture::new();
        let p = fx.spawn("proc", 1000);
        fx.manager.set_current(Some(p.id));
        let facade = fx.facade();

        let block: u64 = sig_mask(SIGUSR1);
        facade
            .sys_sigprocmask(SIG_BLOCK, &block as *const u64 as u64, 0)
            .unwrap();
        facade.sys_signal(SIGUSR1, 0x7000).unwrap();
        fx.engine
            .generate(&p, SIGUSR1, SigSource::Kernel, 0)
            .unwrap();

        let empty: u64 = 0;
        assert_eq!(
            facade.sys_sigsuspend(&empty as *const u64 as u64),
            Err(SignalError::Interrupted)
        );
        // temporary mask gone, original restored
        assert!(p.sigmask.blocked().contains(SIGUSR1));
    }
}
