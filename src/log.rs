//! Minimal internal logging, in the style the teacher crate references
//! (`crate::log::LogLevel::LogDebug` + a `log!` macro) rather than an
//! external logging facade. Severity threshold is controlled by the
//! `NATIVE_DBG_LOG` environment variable (`error`, `warn`, `info`, `debug`),
//! read once and cached.

use std::env;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(usize)]
pub enum LogLevel {
    LogError = 0,
    LogWarn = 1,
    LogInfo = 2,
    LogDebug = 3,
}

impl LogLevel {
    fn from_env(s: &str) -> LogLevel {
        match s.to_ascii_lowercase().as_str() {
            "error" => LogLevel::LogError,
            "warn" | "warning" => LogLevel::LogWarn,
            "debug" | "trace" => LogLevel::LogDebug,
            _ => LogLevel::LogInfo,
        }
    }
}

static THRESHOLD: AtomicUsize = AtomicUsize::new(usize::MAX);

fn threshold() -> LogLevel {
    let mut cur = THRESHOLD.load(Ordering::Relaxed);
    if cur == usize::MAX {
        let lvl = match env::var("NATIVE_DBG_LOG") {
            Ok(v) => LogLevel::from_env(&v),
            Err(_) => LogLevel::LogWarn,
        };
        cur = lvl as usize;
        THRESHOLD.store(cur, Ordering::Relaxed);
    }
    match cur {
        0 => LogLevel::LogError,
        1 => LogLevel::LogWarn,
        2 => LogLevel::LogInfo,
        _ => LogLevel::LogDebug,
    }
}

#[doc(hidden)]
pub fn enabled(level: LogLevel) -> bool {
    level <= threshold()
}

#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)*) => {{
        if $crate::log::enabled($level) {
            eprintln!("[{:?}] {}", $level, format!($($arg)*));
        }
    }};
}
