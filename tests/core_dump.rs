//! Exercises `Debugger::core_dump` end-to-end against a real traced
//! child, checking the emitted file starts with a valid ELF `ET_CORE`
//! header. Grounded on `r_debug_gcore` in the original `debug_native.c`.

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
fn core_dump_writes_a_valid_elf_core_header() {
    let child = spawn_stopped_child();
    let mut status = 0i32;
    unsafe { libc::waitpid(child, &mut status, libc::WUNTRACED) };

    let mut dbg = Debugger::for_host(Config::default());
    dbg.attach(child).expect("attach");

    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("child.core");
    dbg.core_dump(&out).expect("core_dump");

    let bytes = std::fs::read(&out).expect("read core file");
    assert!(bytes.len() > 64);
    assert_eq!(&bytes[0..4], &[0x7f, b'E', b'L', b'F']);
    assert_eq!(bytes[4], 2); // ELFCLASS64
    let e_type = u16::from_le_bytes([bytes[16], bytes[17]]);
    assert_eq!(e_type, 4); // ET_CORE

    dbg.kill().expect("kill");
    unsafe { libc::waitpid(child, &mut status, 0) };
}
