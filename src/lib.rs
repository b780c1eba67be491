//! Native debugger backend: a uniform facade over ptrace (Linux), Mach
//! exceptions (Darwin), and the Win32 Debug API, covering attach/detach,
//! step/continue/wait, register access, process/thread/map/descriptor
//! enumeration, hardware breakpoints, inferior code injection for
//! mmap/munmap/mprotect/madvise, and ELF core dump generation.
//!
//! Linux is the only fully implemented [`backend::OsBackend`] today;
//! other targets answer every call with [`error::Error::NotImplemented`]
//! (see `backend::unsupported`).

#[macro_use]
pub mod log;

pub mod arch;
pub mod backend;
pub mod breakpoint;
pub mod collaborators;
pub mod config;
pub mod core_dump;
pub mod debugger;
pub mod descriptor;
pub mod error;
pub mod injector;
pub mod memory_map;
pub mod process_info;
pub mod register_bank;
pub mod stop_reason;
pub mod wait_status;

pub use config::Config;
pub use debugger::{Debugger, DebuggerState};
pub use error::{Error, Result};
