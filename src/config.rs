//! The `Config` collaborator from spec §6: a small set of host-provided
//! toggles. Mirrors the teacher's `Flags` singleton (`lazy_static`-backed,
//! read once) but scoped to exactly what this crate's debugger core
//! consumes.

use std::env;

/// Host-provided configuration consumed by the debugger core. In the
/// original this lives on the hosting application (r2's `core->config`);
/// here it's a small struct the caller constructs (or loads from the
/// environment via [`Config::from_env`]) and hands to [`crate::Debugger`].
#[derive(Clone, Debug)]
pub struct Config {
    /// Whether to attempt symbol loading (PDB on Windows) on library-load
    /// events. Corresponds to the `pdb.autoload` key in spec §6.
    pub pdb_autoload: bool,
    /// Debugger flag: resume every tracked tid on `continue`, not just the
    /// selected one.
    pub continue_all_threads: bool,
    /// Debugger flag: install a console-interrupt (`SIGINT`/Mach interrupt)
    /// handler while `wait` blocks.
    pub break_on_console_interrupt: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            pdb_autoload: false,
            continue_all_threads: false,
            break_on_console_interrupt: false,
        }
    }
}

impl Config {
    /// Reads overrides from the environment, falling back to
    /// [`Config::default`] for anything unset. Recognizes
    /// `NATIVE_DBG_PDB_AUTOLOAD`, `NATIVE_DBG_CONTINUE_ALL_THREADS`,
    /// `NATIVE_DBG_CONSBREAK`, each parsed as a boolean (`1`/`true`).
    pub fn from_env() -> Config {
        let mut cfg = Config::default();
        cfg.pdb_autoload = env_bool("NATIVE_DBG_PDB_AUTOLOAD", cfg.pdb_autoload);
        cfg.continue_all_threads =
            env_bool("NATIVE_DBG_CONTINUE_ALL_THREADS", cfg.continue_all_threads);
        cfg.break_on_console_interrupt =
            env_bool("NATIVE_DBG_CONSBREAK", cfg.break_on_console_interrupt);
        cfg
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => default,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let cfg = Config::default();
        assert!(!cfg.pdb_autoload);
        assert!(!cfg.continue_all_threads);
        assert!(!cfg.break_on_console_interrupt);
    }
}
