//! The host-provided collaborators from spec §6, modeled as traits so the
//! debugger core can be exercised without a live inferior. Where the
//! original dispatches through r_egg to assemble a syscall stub for
//! whatever host arch it's running on, this crate only needs four fixed
//! syscalls (mmap/mmap2/munmap/mprotect/madvise) for code injection, so
//! [`DefaultSyscallTable`] hand-maps those numbers per arch instead of
//! carrying an assembler dependency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::arch::Arch;
use crate::error::{Error, Result};

/// The "console break" collaborator from spec §6, redesigned per §9 away
/// from an installed `SIGINT` handler toward a plain cancellation token:
/// the host hands the debugger a [`CancellationToken`] (or the debugger
/// mints its own), sets it from wherever it's watching Ctrl-C, and
/// `Debugger::cont`'s wait loop polls it between retries instead of the
/// original's `r_cons_singleton()->breaked` flag toggled from a signal
/// handler.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Syscall numbers needed by [`crate::injector::Injector`]. A host
/// embedding this crate for an arch/ABI combination we don't hardcode can
/// supply its own implementation.
pub trait SyscallTable {
    fn mmap(&self, arch: Arch) -> Result<u64>;
    fn munmap(&self, arch: Arch) -> Result<u64>;
    fn mprotect(&self, arch: Arch) -> Result<u64>;
    fn madvise(&self, arch: Arch) -> Result<u64>;
}

/// Syscall numbers as assigned by the Linux kernel's syscall tables for
/// x86_64, i386, and aarch64. x86_64 uses the 6-argument `mmap`; i386 uses
/// the historical `mmap2` (page-granularity offset) the way `linux_map_alloc`
/// in the original does for 32-bit targets.
pub struct DefaultSyscallTable;

impl SyscallTable for DefaultSyscallTable {
    fn mmap(&self, arch: Arch) -> Result<u64> {
        match arch {
            Arch::X86_64 => Ok(9),
            Arch::X86 => Ok(192), // mmap2
            Arch::Aarch64 => Ok(222),
            Arch::Arm => Err(Error::NotImplemented),
        }
    }

    fn munmap(&self, arch: Arch) -> Result<u64> {
        match arch {
            Arch::X86_64 => Ok(11),
            Arch::X86 => Ok(91),
            Arch::Aarch64 => Ok(215),
            Arch::Arm => Err(Error::NotImplemented),
        }
    }

    fn mprotect(&self, arch: Arch) -> Result<u64> {
        match arch {
            Arch::X86_64 => Ok(10),
            Arch::X86 => Ok(125),
            Arch::Aarch64 => Ok(226),
            Arch::Arm => Err(Error::NotImplemented),
        }
    }

    fn madvise(&self, arch: Arch) -> Result<u64> {
        match arch {
            Arch::X86_64 => Ok(28),
            Arch::X86 => Ok(219),
            Arch::Aarch64 => Ok(233),
            Arch::Arm => Err(Error::NotImplemented),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn x86_64_mmap_is_syscall_9() {
        let table = DefaultSyscallTable;
        assert_eq!(table.mmap(Arch::X86_64).unwrap(), 9);
    }

    #[test]
    fn arm32_is_not_implemented() {
        let table = DefaultSyscallTable;
        assert!(matches!(table.mmap(Arch::Arm), Err(Error::NotImplemented)));
    }
}
