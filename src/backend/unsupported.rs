//! Placeholder backend for OSes without a real implementation yet (Darwin
//! Mach exceptions, Windows `DebugActiveProcess`/`WaitForDebugEvent`).
//! Every operation returns [`Error::NotImplemented`], matching spec §9's
//! redesign flag: callers get one uniform error rather than a
//! compile-time absence of the API on non-Linux targets.

use libc::pid_t;
use std::path::Path;

use super::OsBackend;
use crate::arch::Arch;
use crate::breakpoint::HwDebugState;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result, SkippedLines};
use crate::memory_map::MemoryMap;
use crate::process_info::ProcessInfo;
use crate::register_bank::RegisterBank;
use crate::stop_reason::StopReason;

pub struct UnsupportedBackend;

impl OsBackend for UnsupportedBackend {
    fn arch_of(&self, _pid: pid_t) -> Result<Arch> {
        Err(Error::NotImplemented)
    }
    fn attach(&self, _pid: pid_t) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn detach(&self, _tid: pid_t) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn kill(&self, _pid: pid_t) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn cont(&self, _tid: pid_t, _signal: i32) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn cont_syscall(&self, _tid: pid_t, _signal: i32) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn single_step(&self, _tid: pid_t, _signal: i32) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn wait(&self, _tid: Option<pid_t>) -> Result<StopReason> {
        Err(Error::NotImplemented)
    }
    fn get_registers(&self, _tid: pid_t) -> Result<RegisterBank> {
        Err(Error::NotImplemented)
    }
    fn set_registers(&self, _tid: pid_t, _regs: &RegisterBank) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn read_memory(&self, _tid: pid_t, _addr: u64, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::NotImplemented)
    }
    fn write_memory(&self, _tid: pid_t, _addr: u64, _buf: &[u8]) -> Result<usize> {
        Err(Error::NotImplemented)
    }
    fn list_processes(&self, _own_pid: pid_t) -> Result<(Vec<ProcessInfo>, SkippedLines)> {
        Err(Error::NotImplemented)
    }
    fn list_threads(&self, _pid: pid_t) -> Result<(Vec<pid_t>, SkippedLines)> {
        Err(Error::NotImplemented)
    }
    fn list_maps(&self, _pid: pid_t) -> Result<(Vec<MemoryMap>, SkippedLines)> {
        Err(Error::NotImplemented)
    }
    fn list_descriptors(&self, _pid: pid_t) -> Result<(Vec<Descriptor>, SkippedLines)> {
        Err(Error::NotImplemented)
    }
    fn commit_hw_debug_state(&self, _tid: pid_t, _state: &HwDebugState) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn map_alloc(&self, _tid: pid_t, _size: u64, _executable: bool) -> Result<u64> {
        Err(Error::NotImplemented)
    }
    fn map_dealloc(&self, _tid: pid_t, _addr: u64, _size: u64) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn map_protect(&self, _tid: pid_t, _addr: u64, _size: u64, _rwx: u8) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn map_promote_huge(&self, _tid: pid_t, _addr: u64, _size: u64) -> Result<()> {
        Err(Error::NotImplemented)
    }
    fn core_dump(&self, _pid: pid_t, _out_path: &Path) -> Result<()> {
        Err(Error::NotImplemented)
    }
}
