//! Forks a real child, attaches to it with `PTRACE_ATTACH`, and drives it
//! through step/continue/kill, asserting the decoded `StopReason`
//! sequence. Grounded on the fork-based `#[cfg(test)]` module in the
//! headcrab Linux backend (`examples/other_examples`
//! Stupremee-headcrab `src/target/linux.rs`).

#![cfg(target_os = "linux")]

use native_dbg::debugger::{Debugger, DebuggerState};
use native_dbg::stop_reason::StopReasonKind;
use native_dbg::Config;

/// Forks a child that stops itself (`raise(SIGSTOP)`) and then spins, so
/// the parent can `PTRACE_ATTACH` to an already-known-stopped, still-alive
/// process without a launch-time race.
fn spawn_stopped_child() -> libc::pid_t {
    unsafe {
        let pid = libc::fork();
        if pid == 0 {
            libc::raise(libc::SIGSTOP);
            loop {
                libc::sched_yield();
            }
        }
        pid
    }
}

#[test]
fn attach_step_and_kill() {
    let child = spawn_stopped_child();
    let mut status = 0i32;
    // Reap the self-inflicted SIGSTOP before attaching, the standard
    // race-free handshake for a debugger attaching to its own fork.
    unsafe { libc::waitpid(child, &mut status, libc::WUNTRACED) };

    let mut dbg = Debugger::for_host(Config::default());
    dbg.attach(child).expect("attach");
    assert_eq!(dbg.state(), DebuggerState::Stopped);
    assert_eq!(dbg.pid(), Some(child));

    let regs = dbg.get_registers().expect("get_registers");
    assert_ne!(regs.pc(), 0);

    let tid = dbg.single_step(0).expect("single_step");
    assert_eq!(tid, child);
    assert_eq!(
        dbg.last_stop_reason().unwrap().kind,
        StopReasonKind::StepComplete
    );

    dbg.kill().expect("kill");
    unsafe { libc::waitpid(child, &mut status, 0) };
}

#[test]
fn select_same_tid_twice_is_idempotent() {
    let child = spawn_stopped_child();
    let mut status = 0i32;
    unsafe { libc::waitpid(child, &mut status, libc::WUNTRACED) };

    let mut dbg = Debugger::for_host(Config::default());
    dbg.attach(child).expect("attach");

    dbg.select(child).expect("select");
    assert_eq!(dbg.selected_tid(), Some(child));
    dbg.select(child).expect("select again");
    assert_eq!(dbg.selected_tid(), Some(child));

    dbg.kill().expect("kill");
    unsafe { libc::waitpid(child, &mut status, 0) };
}

#[test]
fn select_unknown_tid_is_invalid() {
    let child = spawn_stopped_child();
    let mut status = 0i32;
    unsafe { libc::waitpid(child, &mut status, libc::WUNTRACED) };

    let mut dbg = Debugger::for_host(Config::default());
    dbg.attach(child).expect("attach");

    assert!(dbg.select(999_999).is_err());

    dbg.kill().expect("kill");
    unsafe { libc::waitpid(child, &mut status, 0) };
}

#[test]
fn detach_returns_to_detached_state() {
    let child = spawn_stopped_child();
    let mut status = 0i32;
    unsafe { libc::waitpid(child, &mut status, libc::WUNTRACED) };

    let mut dbg = Debugger::for_host(Config::default());
    dbg.attach(child).expect("attach");
    dbg.detach().expect("detach");
    assert_eq!(dbg.state(), DebuggerState::Detached);

    unsafe {
        libc::kill(child, libc::SIGKILL);
        libc::waitpid(child, &mut status, 0);
    }
}
