use std::fmt;

/// Every public operation on [`crate::Debugger`] returns one of these kinds.
/// No operation in this crate panics; anything the kernel reports is folded
/// into one of these variants instead of bubbling up a raw OS error code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// This OS/arch combination has no implementation for the requested
    /// operation.
    #[error("not implemented on this backend")]
    NotImplemented,

    #[error("no such process")]
    NoSuchProcess,

    #[error("permission denied")]
    PermissionDenied,

    /// The inferior has exited or was never attached; the debugger is in
    /// the terminal `Dead` state (or `Detached`).
    #[error("inferior is dead or not attached")]
    InferiorDead,

    /// A raw kernel error that doesn't map to a more specific variant.
    #[error("os error {code}: {message}")]
    OsError { code: i32, message: String },

    #[error("invalid argument: {0}")]
    Invalid(String),

    /// No free hardware breakpoint slot was available.
    #[error("no free hardware breakpoint slot")]
    Full,

    /// The register-bank arena push/pop stack overflowed its implementation
    /// cap.
    #[error("register bank snapshot arena overflowed")]
    SnapshotOverflow,
}

impl Error {
    pub fn from_errno(errno: nix::errno::Errno) -> Error {
        match errno {
            nix::errno::Errno::ESRCH => Error::NoSuchProcess,
            nix::errno::Errno::EPERM | nix::errno::Errno::EACCES => Error::PermissionDenied,
            other => Error::OsError {
                code: other as i32,
                message: std::io::Error::from_raw_os_error(other as i32).to_string(),
            },
        }
    }
}

impl From<nix::Error> for Error {
    fn from(e: nix::Error) -> Error {
        Error::from_errno(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NoSuchProcess,
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied,
            _ => Error::OsError {
                code: e.raw_os_error().unwrap_or(-1),
                message: e.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A malformed line in a `/proc` file is skipped, not propagated as an
/// [`Error`]. Enumerators count how many lines they had to skip so callers
/// can decide whether to be suspicious of the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SkippedLines(pub usize);

impl fmt::Display for SkippedLines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} malformed line(s) skipped", self.0)
    }
}
