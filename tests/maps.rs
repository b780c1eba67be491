//! Exercises process/map enumeration and the mmap/munmap injection round
//! trip against a real traced child. Grounded on `r_debug_native_map_get`
//! (the `/proc/<pid>/maps` parse) and the headcrab `Target::mmap` test.

#![cfg(target_os = "linux")]

use native_dbg::debugger::Debugger;
use native_dbg::Config;

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
fn list_maps_includes_own_executable() {
    let child = spawn_stopped_child();
    let mut status = 0i32;
    unsafe { libc::waitpid(child, &mut status, libc::WUNTRACED) };

    let mut dbg = Debugger::for_host(Config::default());
    dbg.attach(child).expect("attach");

    let (maps, _skipped) = dbg.list_maps().expect("list_maps");
    assert!(!maps.is_empty());

    dbg.kill().expect("kill");
    unsafe { libc::waitpid(child, &mut status, 0) };
}

#[test]
fn mmap_then_munmap_round_trips() {
    let child = spawn_stopped_child();
    let mut status = 0i32;
    unsafe { libc::waitpid(child, &mut status, libc::WUNTRACED) };

    let mut dbg = Debugger::for_host(Config::default());
    dbg.attach(child).expect("attach");

    let size = 4096u64;
    let addr = dbg.map_alloc(size, false).expect("map_alloc");
    assert_ne!(addr, 0);

    let (maps, _skipped) = dbg.list_maps().expect("list_maps");
    assert!(maps.iter().any(|m| m.contains(addr)));

    dbg.map_dealloc(addr, size).expect("map_dealloc");

    dbg.kill().expect("kill");
    unsafe { libc::waitpid(child, &mut status, 0) };
}

#[test]
fn list_processes_includes_self() {
    let (procs, _skipped) =
        native_dbg::process_info::list_processes(std::process::id() as libc::pid_t)
            .expect("list_processes");
    assert!(procs.iter().any(|p| p.pid == std::process::id() as libc::pid_t));
}
