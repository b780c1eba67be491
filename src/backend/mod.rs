//! The `OsBackend` capability trait from spec §9's redesign flag: one
//! trait object selected at construction time (`Debugger::for_host`)
//! instead of a `#[cfg(target_os = ...)]` mosaic spread through every
//! operation. [`linux`] is the fully implemented primary target;
//! [`unsupported`] answers every call with [`crate::error::Error::NotImplemented`]
//! for the OSes this crate doesn't carry a real backend for yet.

#[cfg(target_os = "linux")]
pub mod linux;
pub mod unsupported;

use libc::pid_t;

use crate::arch::Arch;
use crate::breakpoint::HwDebugState;
use crate::descriptor::Descriptor;
use crate::error::{Result, SkippedLines};
use crate::memory_map::MemoryMap;
use crate::process_info::ProcessInfo;
use crate::register_bank::RegisterBank;
use crate::stop_reason::StopReason;

/// Everything the [`crate::debugger::Debugger`] facade needs from the
/// underlying OS debug API. Each method corresponds to one family of
/// operations named in spec.md's `[MODULE]` blocks (§4 attach/step/wait,
/// §3 registers/maps/processes/descriptors, §5 hardware breakpoints, §6
/// code injection).
pub trait OsBackend {
    fn arch_of(&self, pid: pid_t) -> Result<Arch>;

    fn attach(&self, pid: pid_t) -> Result<()>;
    fn detach(&self, tid: pid_t) -> Result<()>;
    fn kill(&self, pid: pid_t) -> Result<()>;

    fn cont(&self, tid: pid_t, signal: i32) -> Result<()>;
    /// Resumes with syscall-entry/exit stops enabled (`PTRACE_SYSCALL` on
    /// Linux), per spec §4.1's `continue_syscall`.
    fn cont_syscall(&self, tid: pid_t, signal: i32) -> Result<()>;
    fn single_step(&self, tid: pid_t, signal: i32) -> Result<()>;
    fn wait(&self, tid: Option<pid_t>) -> Result<StopReason>;

    fn get_registers(&self, tid: pid_t) -> Result<RegisterBank>;
    fn set_registers(&self, tid: pid_t, regs: &RegisterBank) -> Result<()>;

    fn read_memory(&self, tid: pid_t, addr: u64, buf: &mut [u8]) -> Result<usize>;
    fn write_memory(&self, tid: pid_t, addr: u64, buf: &[u8]) -> Result<usize>;

    fn list_processes(&self, own_pid: pid_t) -> Result<(Vec<ProcessInfo>, SkippedLines)>;
    fn list_threads(&self, pid: pid_t) -> Result<(Vec<pid_t>, SkippedLines)>;
    fn list_maps(&self, pid: pid_t) -> Result<(Vec<MemoryMap>, SkippedLines)>;
    fn list_descriptors(&self, pid: pid_t) -> Result<(Vec<Descriptor>, SkippedLines)>;

    fn commit_hw_debug_state(&self, tid: pid_t, state: &HwDebugState) -> Result<()>;

    fn map_alloc(&self, tid: pid_t, size: u64, executable: bool) -> Result<u64>;
    fn map_dealloc(&self, tid: pid_t, addr: u64, size: u64) -> Result<()>;
    fn map_protect(&self, tid: pid_t, addr: u64, size: u64, rwx: u8) -> Result<()>;
    fn map_promote_huge(&self, tid: pid_t, addr: u64, size: u64) -> Result<()>;

    fn core_dump(&self, pid: pid_t, out_path: &std::path::Path) -> Result<()>;
}
