//! Thin wrapper around `nix::sys::wait::WaitStatus`, named after (and
//! grounded on) `crate::wait_status::WaitStatus` as referenced by the
//! teacher's `thread_group.rs`/`task.rs`. Where rd's own `WaitStatus`
//! carries rr-specific replay bookkeeping, this one carries exactly what
//! the stop-reason decoder in spec §4.2 needs: the raw kernel status plus
//! whichever `PTRACE_EVENT_*` code accompanied a `SIGTRAP` stop.
use libc::{c_int, pid_t};
use nix::sys::wait::WaitStatus as NixWaitStatus;
use nix::unistd::Pid;

/// `PTRACE_EVENT_*` codes, decoded out of the raw wait status's high byte
/// the way `PTRACE_GETEVENTMSG`/`status >> 8` does in the original
/// `linux_ptrace_event`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PtraceEvent {
    Fork,
    Vfork,
    Clone,
    Exec,
    VforkDone,
    Exit,
    Seccomp,
    None,
}

impl PtraceEvent {
    fn from_raw(event: c_int) -> PtraceEvent {
        match event {
            libc::PTRACE_EVENT_FORK => PtraceEvent::Fork,
            libc::PTRACE_EVENT_VFORK => PtraceEvent::Vfork,
            libc::PTRACE_EVENT_CLONE => PtraceEvent::Clone,
            libc::PTRACE_EVENT_EXEC => PtraceEvent::Exec,
            libc::PTRACE_EVENT_VFORK_DONE => PtraceEvent::VforkDone,
            libc::PTRACE_EVENT_EXIT => PtraceEvent::Exit,
            libc::PTRACE_EVENT_SECCOMP => PtraceEvent::Seccomp,
            _ => PtraceEvent::None,
        }
    }
}

/// The classification of a single `waitpid` result, already split into
/// "what happened" and "to which tid", independent of the raw
/// `nix::sys::wait::WaitStatus` representation so the decoder in
/// `debugger.rs` doesn't need to pattern-match nix types directly.
#[derive(Copy, Clone, Debug)]
pub enum WaitOutcome {
    Exited { tid: pid_t, status: i32 },
    Signaled { tid: pid_t, signal: i32, core_dumped: bool },
    Stopped { tid: pid_t, signal: i32, event: PtraceEvent },
    PtraceSyscall { tid: pid_t },
    Continued { tid: pid_t },
    StillAlive,
}

impl WaitOutcome {
    pub fn tid(&self) -> Option<pid_t> {
        match *self {
            WaitOutcome::Exited { tid, .. }
            | WaitOutcome::Signaled { tid, .. }
            | WaitOutcome::Stopped { tid, .. }
            | WaitOutcome::PtraceSyscall { tid } => Some(tid),
            WaitOutcome::Continued { tid } => Some(tid),
            WaitOutcome::StillAlive => None,
        }
    }
}

/// Convert a raw `nix` wait status (as produced by `waitpid(-1, WUNTRACED |
/// __WALL, ...)`) into our [`WaitOutcome`]. `raw_status` is the second
/// return of `libc::waitpid`, needed to pull out the ptrace event-msg byte
/// that `nix::sys::wait::WaitStatus::PtraceEvent` otherwise drops.
pub fn classify(status: NixWaitStatus) -> WaitOutcome {
    match status {
        NixWaitStatus::Exited(pid, code) => WaitOutcome::Exited {
            tid: pid.as_raw(),
            status: code,
        },
        NixWaitStatus::Signaled(pid, sig, core) => WaitOutcome::Signaled {
            tid: pid.as_raw(),
            signal: sig as i32,
            core_dumped: core,
        },
        NixWaitStatus::Stopped(pid, sig) => WaitOutcome::Stopped {
            tid: pid.as_raw(),
            signal: sig as i32,
            event: PtraceEvent::None,
        },
        NixWaitStatus::PtraceEvent(pid, sig, event) => WaitOutcome::Stopped {
            tid: pid.as_raw(),
            signal: sig as i32,
            event: PtraceEvent::from_raw(event),
        },
        NixWaitStatus::PtraceSyscall(pid) => WaitOutcome::PtraceSyscall { tid: pid.as_raw() },
        NixWaitStatus::Continued(pid) => WaitOutcome::Continued { tid: pid.as_raw() },
        NixWaitStatus::StillAlive => WaitOutcome::StillAlive,
    }
}

/// `waitpid(-1, ...)`, waiting for any tracked child. Used by the decoder
/// when scheduling hands control back to the kernel (spec §4.2 step 2).
pub fn wait_any(flags: nix::sys::wait::WaitPidFlag) -> nix::Result<WaitOutcome> {
    let status = nix::sys::wait::waitpid(Pid::from_raw(-1), Some(flags))?;
    Ok(classify(status))
}

pub fn wait_for(tid: pid_t, flags: nix::sys::wait::WaitPidFlag) -> nix::Result<WaitOutcome> {
    let status = nix::sys::wait::waitpid(Pid::from_raw(tid), Some(flags))?;
    Ok(classify(status))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exited_classifies_by_tid_and_status() {
        let pid = Pid::from_raw(42);
        let outcome = classify(NixWaitStatus::Exited(pid, 7));
        match outcome {
            WaitOutcome::Exited { tid, status } => {
                assert_eq!(tid, 42);
                assert_eq!(status, 7);
            }
            _ => panic!("expected Exited"),
        }
    }

    #[test]
    fn ptrace_event_decodes_known_codes() {
        assert_eq!(PtraceEvent::from_raw(libc::PTRACE_EVENT_CLONE), PtraceEvent::Clone);
        assert_eq!(PtraceEvent::from_raw(libc::PTRACE_EVENT_EXIT), PtraceEvent::Exit);
        assert_eq!(PtraceEvent::from_raw(9999), PtraceEvent::None);
    }
}
