//! Inferior code injection: performing mmap/munmap/mprotect/madvise
//! *inside* the tracee by temporarily overwriting its next instruction
//! with a syscall opcode, single-stepping it, and restoring everything
//! afterwards.
//!
//! Grounded on the headcrab Linux backend's `Target::syscall` (save
//! registers, patch in `0x050f` at `rip`, single-step, read `rax`, restore
//! the old instruction word and registers) and on the "arena push/pop"
//! framing of `r_reg_arena_push`/`r_reg_arena_pop` around
//! `linux_map_alloc`/`linux_map_dealloc`/`r_debug_native_map_protect` in
//! the original `debug_native.c`: registers are restored even when the
//! syscall itself reports failure, so a failed mmap never leaves the
//! tracee's register file corrupted.

use libc::pid_t;

use crate::arch::Arch;
use crate::collaborators::SyscallTable;
use crate::error::{Error, Result};
use crate::register_bank::RegisterBank;

/// What [`Injector`] needs from the backend: raw word-granularity memory
/// access and register save/restore for one thread. Kept as a trait so
/// `injector.rs` has no direct ptrace dependency and can be exercised
/// against a fake in tests.
pub trait InferiorControl {
    fn peek_word(&self, tid: pid_t, addr: u64) -> Result<u64>;
    fn poke_word(&self, tid: pid_t, addr: u64, value: u64) -> Result<()>;
    fn get_registers(&self, tid: pid_t) -> Result<RegisterBank>;
    fn set_registers(&self, tid: pid_t, regs: &RegisterBank) -> Result<()>;
    fn single_step(&self, tid: pid_t) -> Result<()>;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InjectedSyscall {
    Mmap,
    Munmap,
    Mprotect,
    Madvise,
}

/// The raw machine word to drop at the instruction pointer to perform a
/// syscall on this arch: `syscall` (`0x0f 0x05`) on x86_64, `int $0x80`
/// (`0xcd 0x80`) on x86, `svc #0` (`0xd4000001`) on AArch64.
fn syscall_opcode(arch: Arch) -> u64 {
    match arch {
        Arch::X86_64 => 0x0000_0000_0000_050f,
        Arch::X86 => 0x0000_0000_0000_80cd,
        Arch::Aarch64 => 0xd400_0001,
        Arch::Arm => 0,
    }
}

pub struct Injector<'a> {
    control: &'a dyn InferiorControl,
    syscalls: &'a dyn SyscallTable,
}

impl<'a> Injector<'a> {
    pub fn new(control: &'a dyn InferiorControl, syscalls: &'a dyn SyscallTable) -> Injector<'a> {
        Injector { control, syscalls }
    }

    /// Executes `which(args...)` inside the tracee at `tid` and returns its
    /// raw return value (the caller maps negative values to `Error::OsError`
    /// per their own syscall's convention). Registers and the instruction
    /// at the saved `pc` are always restored before returning, success or
    /// error — this is the "arena push/pop" transaction.
    pub fn syscall(
        &self,
        tid: pid_t,
        arch: Arch,
        which: InjectedSyscall,
        args: &[u64],
    ) -> Result<i64> {
        if arch == Arch::Arm {
            return Err(Error::NotImplemented);
        }

        let saved_regs = self.control.get_registers(tid)?;
        let pc = saved_regs.pc();
        let saved_word = self.control.peek_word(tid, pc)?;

        let result = self.run_patched(tid, arch, which, args, &saved_regs, pc);

        // Restore unconditionally, even if `run_patched` failed partway.
        let restore_word = self.control.poke_word(tid, pc, saved_word);
        let restore_regs = self.control.set_registers(tid, &saved_regs);
        restore_word?;
        restore_regs?;

        result
    }

    fn run_patched(
        &self,
        tid: pid_t,
        arch: Arch,
        which: InjectedSyscall,
        args: &[u64],
        saved_regs: &RegisterBank,
        pc: u64,
    ) -> Result<i64> {
        let number = match which {
            InjectedSyscall::Mmap => self.syscalls.mmap(arch)?,
            InjectedSyscall::Munmap => self.syscalls.munmap(arch)?,
            InjectedSyscall::Mprotect => self.syscalls.mprotect(arch)?,
            InjectedSyscall::Madvise => self.syscalls.madvise(arch)?,
        };

        let mut regs = saved_regs.clone();
        regs.set_syscall_number(number);
        for (i, &arg) in args.iter().enumerate() {
            regs.set_argument(i as u8, arg);
        }
        self.control.set_registers(tid, &regs)?;
        self.control.poke_word(tid, pc, syscall_opcode(arch))?;
        self.control.single_step(tid)?;

        let after = self.control.get_registers(tid)?;
        Ok(after.syscall_return() as i64)
    }

    pub fn mmap(
        &self,
        tid: pid_t,
        arch: Arch,
        addr: u64,
        len: u64,
        prot: u64,
        flags: u64,
        fd: i64,
        offset: u64,
    ) -> Result<u64> {
        let ret = self.syscall(
            tid,
            arch,
            InjectedSyscall::Mmap,
            &[addr, len, prot, flags, fd as u64, offset],
        )?;
        if ret < 0 {
            return Err(Error::from_errno(nix::errno::Errno::from_i32(-ret as i32)));
        }
        Ok(ret as u64)
    }

    pub fn munmap(&self, tid: pid_t, arch: Arch, addr: u64, len: u64) -> Result<()> {
        let ret = self.syscall(tid, arch, InjectedSyscall::Munmap, &[addr, len])?;
        if ret < 0 {
            return Err(Error::from_errno(nix::errno::Errno::from_i32(-ret as i32)));
        }
        Ok(())
    }

    pub fn mprotect(&self, tid: pid_t, arch: Arch, addr: u64, len: u64, prot: u64) -> Result<()> {
        let ret = self.syscall(tid, arch, InjectedSyscall::Mprotect, &[addr, len, prot])?;
        if ret < 0 {
            return Err(Error::from_errno(nix::errno::Errno::from_i32(-ret as i32)));
        }
        Ok(())
    }

    pub fn madvise(&self, tid: pid_t, arch: Arch, addr: u64, len: u64, advice: u64) -> Result<()> {
        let ret = self.syscall(tid, arch, InjectedSyscall::Madvise, &[addr, len, advice])?;
        if ret < 0 {
            return Err(Error::from_errno(nix::errno::Errno::from_i32(-ret as i32)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// A fake tracee: registers plus a sparse word-addressed memory image,
    /// enough to exercise the save/patch/restore sequence without a real
    /// ptrace target.
    struct FakeInferior {
        regs: RefCell<RegisterBank>,
        mem: RefCell<HashMap<u64, u64>>,
        syscall_result: i64,
    }

    impl InferiorControl for FakeInferior {
        fn peek_word(&self, _tid: pid_t, addr: u64) -> Result<u64> {
            Ok(*self.mem.borrow().get(&addr).unwrap_or(&0xAAAA_AAAA_AAAA_AAAA))
        }
        fn poke_word(&self, _tid: pid_t, addr: u64, value: u64) -> Result<()> {
            self.mem.borrow_mut().insert(addr, value);
            Ok(())
        }
        fn get_registers(&self, _tid: pid_t) -> Result<RegisterBank> {
            Ok(self.regs.borrow().clone())
        }
        fn set_registers(&self, _tid: pid_t, regs: &RegisterBank) -> Result<()> {
            *self.regs.borrow_mut() = regs.clone();
            Ok(())
        }
        fn single_step(&self, _tid: pid_t) -> Result<()> {
            // Simulate the kernel having completed the syscall: only rax
            // (syscall-return register) changes.
            let mut regs = self.regs.borrow_mut();
            regs.set_named("rax", self.syscall_result as u64).unwrap();
            Ok(())
        }
    }

    fn fake(arch: Arch, syscall_result: i64) -> FakeInferior {
        let mut regs = RegisterBank::zeroed(arch);
        regs.set_pc(0x4000);
        FakeInferior {
            regs: RefCell::new(regs),
            mem: RefCell::new(HashMap::new()),
            syscall_result,
        }
    }

    #[test]
    fn mmap_success_returns_mapped_address() {
        let inferior = fake(Arch::X86_64, 0x7f00_0000);
        let syscalls = crate::collaborators::DefaultSyscallTable;
        let injector = Injector::new(&inferior, &syscalls);
        let addr = injector
            .mmap(1234, Arch::X86_64, 0, 4096, 3, 0x22, -1, 0)
            .unwrap();
        assert_eq!(addr, 0x7f00_0000);
    }

    #[test]
    fn mmap_failure_maps_to_os_error() {
        let inferior = fake(Arch::X86_64, -12); // -ENOMEM
        let syscalls = crate::collaborators::DefaultSyscallTable;
        let injector = Injector::new(&inferior, &syscalls);
        let err = injector.mmap(1234, Arch::X86_64, 0, 4096, 3, 0x22, -1, 0);
        assert!(matches!(err, Err(Error::OsError { .. })));
    }

    #[test]
    fn original_instruction_word_is_restored_after_syscall() {
        let inferior = fake(Arch::X86_64, 0);
        inferior.mem.borrow_mut().insert(0x4000, 0xdead_beef_cafe_babe);
        let syscalls = crate::collaborators::DefaultSyscallTable;
        let injector = Injector::new(&inferior, &syscalls);
        injector.munmap(1234, Arch::X86_64, 0x1000, 4096).unwrap();
        assert_eq!(*inferior.mem.borrow().get(&0x4000).unwrap(), 0xdead_beef_cafe_babe);
    }

    #[test]
    fn registers_are_restored_to_pre_syscall_values() {
        let inferior = fake(Arch::X86_64, 0);
        inferior
            .regs
            .borrow_mut()
            .set_named("rbx", 0x1234)
            .unwrap();
        let syscalls = crate::collaborators::DefaultSyscallTable;
        let injector = Injector::new(&inferior, &syscalls);
        injector.munmap(1234, Arch::X86_64, 0x1000, 4096).unwrap();
        assert_eq!(inferior.regs.borrow().get_named("rbx").unwrap(), 0x1234);
        assert_eq!(inferior.regs.borrow().pc(), 0x4000);
    }
}
