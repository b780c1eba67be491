//! The `Debugger` facade: the single entry point spec §4 describes,
//! wrapping an [`OsBackend`] with the attach/stop/continue state machine,
//! hardware breakpoint bookkeeping, and the silent-event absorption loop
//! from §4.2. Grounded on the overall shape of rr's top-level session
//! object in the teacher (construct once, drive attach/wait/continue in a
//! loop) generalized away from record/replay toward a live debugger.

use std::collections::HashMap;
use std::path::Path;

use libc::pid_t;

use crate::arch::Arch;
#[cfg(target_os = "linux")]
use crate::backend::linux::LinuxBackend;
use crate::backend::unsupported::UnsupportedBackend;
use crate::backend::OsBackend;
use crate::breakpoint::{HwBreakpoint, HwBreakpointManager};
use crate::collaborators::CancellationToken;
use crate::config::Config;
use crate::descriptor::Descriptor;
use crate::error::{Error, Result, SkippedLines};
use crate::memory_map::MemoryMap;
use crate::process_info::ProcessInfo;
use crate::register_bank::RegisterBank;
use crate::stop_reason::{StopReason, StopReasonKind};

/// The debugger's own lifecycle, independent of the inferior's: spec §4.1
/// names these four states explicitly.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DebuggerState {
    Detached,
    Stopped,
    Running,
    Dead,
}

pub struct Debugger {
    backend: Box<dyn OsBackend>,
    config: Config,
    state: DebuggerState,
    pid: Option<pid_t>,
    selected_tid: Option<pid_t>,
    last_stop: Option<StopReason>,
    hw_breakpoints: HashMap<pid_t, HwBreakpointManager>,
    cancel: CancellationToken,
}

impl Debugger {
    pub fn new(backend: Box<dyn OsBackend>, config: Config) -> Debugger {
        Debugger {
            backend,
            config,
            state: DebuggerState::Detached,
            pid: None,
            selected_tid: None,
            last_stop: None,
            hw_breakpoints: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a handle the host can call `.cancel()` on (from a `Ctrl-C`
    /// handler, a GUI stop button, anywhere) to make the next `wait` loop
    /// iteration return early with `UserSuspend` instead of blocking for
    /// another OS event. Only takes effect when
    /// `config.break_on_console_interrupt` is set.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Picks the real Linux ptrace backend on Linux, and the
    /// always-`NotImplemented` stub everywhere else, per spec §9's
    /// `OsBackend` redesign.
    pub fn for_host(config: Config) -> Debugger {
        #[cfg(target_os = "linux")]
        let backend: Box<dyn OsBackend> = Box::new(LinuxBackend::new());
        #[cfg(not(target_os = "linux"))]
        let backend: Box<dyn OsBackend> = Box::new(UnsupportedBackend);
        Debugger::new(backend, config)
    }

    pub fn state(&self) -> DebuggerState {
        self.state
    }

    pub fn pid(&self) -> Option<pid_t> {
        self.pid
    }

    pub fn selected_tid(&self) -> Option<pid_t> {
        self.selected_tid
    }

    pub fn last_stop_reason(&self) -> Option<StopReason> {
        self.last_stop
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn arch(&self) -> Result<Arch> {
        let pid = self.require_attached()?;
        self.backend.arch_of(pid)
    }

    fn require_attached(&self) -> Result<pid_t> {
        self.pid.ok_or(Error::InferiorDead)
    }

    fn require_selected(&self) -> Result<pid_t> {
        self.selected_tid.ok_or(Error::InferiorDead)
    }

    /// Attaches to `pid`: `PTRACE_ATTACH` + the initial stop wait, per
    /// spec §4.1. Transitions `Detached -> Stopped`.
    pub fn attach(&mut self, pid: pid_t) -> Result<()> {
        self.backend.attach(pid)?;
        self.pid = Some(pid);
        self.selected_tid = Some(pid);
        self.hw_breakpoints.insert(pid, HwBreakpointManager::new(Arch::host()));
        self.state = DebuggerState::Stopped;
        self.last_stop = Some(StopReason::new(StopReasonKind::Signal, pid, 0));
        Ok(())
    }

    /// Detaches every tracked thread and returns to `Detached`.
    pub fn detach(&mut self) -> Result<()> {
        let pid = self.require_attached()?;
        self.backend.detach(pid)?;
        self.pid = None;
        self.selected_tid = None;
        self.last_stop = None;
        self.hw_breakpoints.clear();
        self.state = DebuggerState::Detached;
        Ok(())
    }

    pub fn kill(&mut self) -> Result<()> {
        let pid = self.require_attached()?;
        self.backend.kill(pid)?;
        self.state = DebuggerState::Dead;
        self.last_stop = Some(StopReason::dead());
        Ok(())
    }

    /// Selects a new current thread without resuming the inferior. Fails
    /// if `tid` isn't one of `pid`'s threads at this stop, per spec §4.1.
    pub fn select(&mut self, tid: pid_t) -> Result<()> {
        let pid = self.require_attached()?;
        let (threads, _) = self.backend.list_threads(pid)?;
        if !threads.contains(&tid) {
            return Err(Error::Invalid(format!("tid {} is not a thread of {}", tid, pid)));
        }
        self.selected_tid = Some(tid);
        Ok(())
    }

    /// Resumes execution (every tracked thread if
    /// `config.continue_all_threads`, else just the selected one) and
    /// blocks until the next reportable stop, absorbing silent events per
    /// §4.2 rule 4 along the way. Returns the tid the reported stop
    /// belongs to.
    pub fn cont(&mut self, signal: i32) -> Result<pid_t> {
        self.resume_selected_or_all(signal)?;
        self.state = DebuggerState::Running;
        self.drive_to_next_report()
    }

    /// Like `cont`, but arms syscall-entry/exit stops per spec §4.1's
    /// `continue_syscall`.
    pub fn continue_syscall(&mut self) -> Result<pid_t> {
        let tid = self.require_selected()?;
        self.backend.cont_syscall(tid, 0)?;
        self.state = DebuggerState::Running;
        self.drive_to_next_report()
    }

    pub fn single_step(&mut self, signal: i32) -> Result<pid_t> {
        let tid = self.require_selected()?;
        self.backend.single_step(tid, signal)?;
        self.state = DebuggerState::Running;
        self.drive_to_next_report()
    }

    /// Resumes `tid` (or every tracked thread of `pid` when
    /// `continue_all_threads` is set) with `signal`, per spec §4.1's
    /// `continue(signal?)` contract: "if continue-all-threads is true,
    /// every tracked tid is resumed with the same signal; otherwise only
    /// tid."
    fn resume_selected_or_all(&mut self, signal: i32) -> Result<()> {
        let tid = self.require_selected()?;
        if self.config.continue_all_threads {
            let pid = self.require_attached()?;
            let (threads, _) = self.backend.list_threads(pid)?;
            for t in threads {
                self.backend.cont(t, signal)?;
            }
            Ok(())
        } else {
            self.backend.cont(tid, signal)
        }
    }

    /// The §4.2 wait loop: keep calling the backend's `wait` and
    /// re-issuing it whenever the decoded reason is a silent one
    /// (`is_candidate_for_silent_absorption`) on a tid the caller never
    /// selected, until either a reportable stop or process death.
    fn drive_to_next_report(&mut self) -> Result<pid_t> {
        loop {
            if self.config.break_on_console_interrupt && self.cancel.is_cancelled() {
                self.cancel.reset();
                let tid = self.selected_tid.unwrap_or(-1);
                self.state = DebuggerState::Stopped;
                let reason = StopReason::new(StopReasonKind::UserSuspend, tid, 0);
                self.last_stop = Some(reason);
                return Ok(tid);
            }
            let reason = self.backend.wait(None)?;
            if reason.is_terminal() {
                self.state = DebuggerState::Dead;
                self.last_stop = Some(reason);
                return Ok(reason.tid);
            }
            if reason.is_candidate_for_silent_absorption() {
                // Silently absorbed: the event-bearing tid is ptrace-stopped
                // right now, so it must be resumed before the next wait or
                // the kernel has nothing left to report on. Let it run free
                // rather than surfacing the event to the caller.
                self.backend.cont(reason.tid, 0)?;
                continue;
            }
            self.state = DebuggerState::Stopped;
            self.selected_tid = Some(reason.tid);
            self.last_stop = Some(reason);
            return Ok(reason.tid);
        }
    }

    pub fn get_registers(&self) -> Result<RegisterBank> {
        let tid = self.require_selected()?;
        self.backend.get_registers(tid)
    }

    pub fn set_registers(&mut self, regs: &RegisterBank) -> Result<()> {
        let tid = self.require_selected()?;
        self.backend.set_registers(tid, regs)
    }

    pub fn read_memory(&self, addr: u64, buf: &mut [u8]) -> Result<usize> {
        let tid = self.require_selected()?;
        self.backend.read_memory(tid, addr, buf)
    }

    pub fn write_memory(&mut self, addr: u64, buf: &[u8]) -> Result<usize> {
        let tid = self.require_selected()?;
        self.backend.write_memory(tid, addr, buf)
    }

    pub fn list_processes(&self) -> Result<(Vec<ProcessInfo>, SkippedLines)> {
        self.backend.list_processes(std::process::id() as pid_t)
    }

    pub fn list_threads(&self) -> Result<(Vec<pid_t>, SkippedLines)> {
        let pid = self.require_attached()?;
        self.backend.list_threads(pid)
    }

    pub fn list_maps(&self) -> Result<(Vec<MemoryMap>, SkippedLines)> {
        let pid = self.require_attached()?;
        self.backend.list_maps(pid)
    }

    /// The first map per distinct backing path, per spec §4.4's "module
    /// list derived from the map list" rule.
    pub fn list_modules(&self) -> Result<(Vec<crate::memory_map::ModuleInfo>, SkippedLines)> {
        let (maps, skipped) = self.list_maps()?;
        Ok((crate::memory_map::list_modules(&maps), skipped))
    }

    pub fn list_descriptors(&self) -> Result<(Vec<Descriptor>, SkippedLines)> {
        let pid = self.require_attached()?;
        self.backend.list_descriptors(pid)
    }

    /// Installs a hardware breakpoint/watchpoint on the selected thread
    /// and commits the resulting [`crate::breakpoint::HwDebugState`] to
    /// the backend, per spec §5.
    pub fn set_hw_breakpoint(&mut self, bp: HwBreakpoint) -> Result<usize> {
        let tid = self.require_selected()?;
        let arch = self.backend.arch_of(tid)?;
        let mgr = self
            .hw_breakpoints
            .entry(tid)
            .or_insert_with(|| HwBreakpointManager::new(arch));
        let slot = mgr.set(bp)?;
        let state = mgr.commit();
        self.backend.commit_hw_debug_state(tid, &state)?;
        Ok(slot)
    }

    pub fn clear_hw_breakpoint(&mut self, slot: usize) -> Result<()> {
        let tid = self.require_selected()?;
        let mgr = self
            .hw_breakpoints
            .get_mut(&tid)
            .ok_or(Error::Invalid("no hardware breakpoints installed".to_string()))?;
        mgr.clear(slot)?;
        let state = mgr.commit();
        self.backend.commit_hw_debug_state(tid, &state)
    }

    pub fn map_alloc(&mut self, size: u64, executable: bool) -> Result<u64> {
        let tid = self.require_selected()?;
        let size = crate::memory_map::round_up_to_page(size);
        self.backend.map_alloc(tid, size, executable)
    }

    pub fn map_dealloc(&mut self, addr: u64, size: u64) -> Result<()> {
        let tid = self.require_selected()?;
        self.backend.map_dealloc(tid, addr, size)
    }

    pub fn map_protect(&mut self, addr: u64, size: u64, rwx: u8) -> Result<()> {
        let tid = self.require_selected()?;
        self.backend.map_protect(tid, addr, size, rwx)
    }

    /// Promotes a mapping to transparent huge pages via `madvise`, per
    /// SPEC_FULL §4.6 (the Linux branch of the original's promote-huge
    /// tie-break; FreeBSD is not implemented, see DESIGN.md).
    pub fn map_promote_huge(&mut self, addr: u64, size: u64) -> Result<()> {
        if size % crate::memory_map::HUGE_PAGE_SIZE != 0 {
            return Err(Error::Invalid(
                "huge page promotion requires a 2 MiB multiple size".to_string(),
            ));
        }
        let tid = self.require_selected()?;
        self.backend.map_promote_huge(tid, addr, size)
    }

    pub fn core_dump(&self, out_path: &Path) -> Result<()> {
        let pid = self.require_attached()?;
        self.backend.core_dump(pid, out_path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::unsupported::UnsupportedBackend;

    #[test]
    fn starts_detached() {
        let dbg = Debugger::new(Box::new(UnsupportedBackend), Config::default());
        assert_eq!(dbg.state(), DebuggerState::Detached);
        assert!(dbg.pid().is_none());
    }

    #[test]
    fn operations_before_attach_report_inferior_dead() {
        let dbg = Debugger::new(Box::new(UnsupportedBackend), Config::default());
        assert!(matches!(dbg.get_registers(), Err(Error::InferiorDead)));
    }

    #[test]
    fn attach_on_unsupported_backend_surfaces_not_implemented() {
        let mut dbg = Debugger::new(Box::new(UnsupportedBackend), Config::default());
        assert!(matches!(dbg.attach(1), Err(Error::NotImplemented)));
    }

    #[test]
    fn select_before_attach_reports_inferior_dead() {
        let mut dbg = Debugger::new(Box::new(UnsupportedBackend), Config::default());
        assert!(matches!(dbg.select(1), Err(Error::InferiorDead)));
    }

    #[test]
    fn continue_syscall_before_attach_reports_inferior_dead() {
        let mut dbg = Debugger::new(Box::new(UnsupportedBackend), Config::default());
        assert!(matches!(dbg.continue_syscall(), Err(Error::InferiorDead)));
    }
}
