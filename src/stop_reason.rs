//! The uniform stop-reason classification described in spec §3/§4.2 — the
//! whole point of this crate is collapsing three OS event models down to
//! this one enum.

use libc::pid_t;

/// Discriminated classification of why the inferior is currently not
/// running (or, for `Dead`, no longer exists). See spec.md §3 "StopReason"
/// and the decoder rules in §4.2.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopReasonKind {
    Unknown,
    Error,
    /// A silent event was fully absorbed and re-selection succeeded; the
    /// outer loop should continue transparently.
    None,
    Signal,
    BreakpointHit,
    Trap,
    SegFault,
    Abort,
    StepComplete,
    NewPid,
    NewTid,
    ExitTid,
    NewLib,
    ExitLib,
    UserSuspend,
    MachReceiveInterrupted,
    Dead,
}

/// The reason the inferior stopped, together with which thread the kernel
/// reported the event for and, for signal-carrying reasons, the signal
/// number. Recorded on the `Debugger` after every `wait()` per spec §4.2
/// rule 7.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StopReason {
    pub kind: StopReasonKind,
    pub tid: pid_t,
    pub signum: i32,
}

impl StopReason {
    pub fn new(kind: StopReasonKind, tid: pid_t, signum: i32) -> StopReason {
        StopReason { kind, tid, signum }
    }

    pub fn dead() -> StopReason {
        StopReason {
            kind: StopReasonKind::Dead,
            tid: -1,
            signum: 0,
        }
    }

    pub fn unknown() -> StopReason {
        StopReason {
            kind: StopReasonKind::Unknown,
            tid: -1,
            signum: 0,
        }
    }

    pub fn error() -> StopReason {
        StopReason {
            kind: StopReasonKind::Error,
            tid: -1,
            signum: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind == StopReasonKind::Dead
    }

    /// True for reasons §4.2 rule 4 calls "silent" when they occur on a tid
    /// other than the one the user had selected: the caller never asked to
    /// see this thread's lifecycle, so it's swallowed and reselection is
    /// attempted.
    pub fn is_candidate_for_silent_absorption(&self) -> bool {
        matches!(
            self.kind,
            StopReasonKind::NewTid | StopReasonKind::ExitTid | StopReasonKind::NewLib | StopReasonKind::ExitLib
        )
    }
}
