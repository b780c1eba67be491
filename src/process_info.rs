//! Process enumeration, grounded on `r_debug_native_pids` in the original
//! `debug_native.c` (iterates `/proc/*/stat`, labels the debugger's own
//! pid `(current)` and its ppid `(ppid)`) and on `procfs::process::all_processes`
//! as used in the headcrab Linux backend.

use libc::pid_t;
use std::fs;

use crate::error::{Error, Result, SkippedLines};

/// One row of a process listing. `label` carries the `(current)`/`(ppid)`
/// annotation the original CLI printed inline; kept as structured data
/// here instead of baking it into a display string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProcessInfo {
    pub pid: pid_t,
    pub ppid: pid_t,
    pub comm: String,
    pub label: ProcessLabel,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProcessLabel {
    None,
    Current,
    Parent,
}

/// Lists every process visible under `/proc`, the way
/// `r_debug_native_pids(0)` does. Unreadable/malformed entries (a process
/// that exited mid-scan, a `/proc/<n>/stat` line that doesn't parse) are
/// skipped rather than aborting the whole enumeration, matching spec §7's
/// "enumerators skip malformed lines" rule; the skip count is returned
/// alongside the list.
pub fn list_processes(own_pid: pid_t) -> Result<(Vec<ProcessInfo>, SkippedLines)> {
    let own_ppid = parent_pid(own_pid).unwrap_or(-1);
    let mut out = Vec::new();
    let mut skipped = 0usize;

    let entries = fs::read_dir("/proc").map_err(|_| Error::OsError {
        code: libc::ENOENT,
        message: "/proc is not mounted".to_string(),
    })?;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(n) => n,
            None => {
                skipped += 1;
                continue;
            }
        };
        let pid: pid_t = match name.parse() {
            Ok(p) => p,
            Err(_) => continue, // not a pid directory, not a malformed line
        };
        match read_stat(pid) {
            Some((comm, ppid)) => {
                let label = if pid == own_pid {
                    ProcessLabel::Current
                } else if pid == own_ppid {
                    ProcessLabel::Parent
                } else {
                    ProcessLabel::None
                };
                out.push(ProcessInfo {
                    pid,
                    ppid,
                    comm,
                    label,
                });
            }
            None => skipped += 1,
        }
    }

    out.sort_by_key(|p| p.pid);
    Ok((out, SkippedLines(skipped)))
}

/// Lists the task (thread) ids of a single process, from `/proc/<pid>/task`,
/// as `r_debug_native_threads` does via `/proc/<pid>/task`.
pub fn list_threads(pid: pid_t) -> Result<(Vec<pid_t>, SkippedLines)> {
    let dir = format!("/proc/{}/task", pid);
    let entries = fs::read_dir(&dir).map_err(Error::from)?;
    let mut out = Vec::new();
    let mut skipped = 0usize;
    for entry in entries.flatten() {
        match entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            Some(tid) => out.push(tid),
            None => skipped += 1,
        }
    }
    out.sort();
    Ok((out, SkippedLines(skipped)))
}

fn parent_pid(pid: pid_t) -> Option<pid_t> {
    read_stat(pid).map(|(_, ppid)| ppid)
}

/// Parses the fields of `/proc/<pid>/stat` we need: comm (field 2, inside
/// parens, may itself contain spaces/parens) and ppid (field 4).
fn read_stat(pid: pid_t) -> Option<(String, pid_t)> {
    let content = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    if close <= open {
        return None;
    }
    let comm = content[open + 1..close].to_string();
    let rest = content[close + 1..].trim_start();
    let mut fields = rest.split_whitespace();
    fields.next()?; // state
    let ppid: pid_t = fields.next()?.parse().ok()?;
    Some((comm, ppid))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn self_appears_labeled_current() {
        let pid = std::process::id() as pid_t;
        let (procs, _skipped) = list_processes(pid).expect("list_processes");
        let me = procs.iter().find(|p| p.pid == pid);
        assert!(me.is_some());
        assert_eq!(me.unwrap().label, ProcessLabel::Current);
    }

    #[test]
    fn self_has_at_least_one_thread() {
        let pid = std::process::id() as pid_t;
        let (threads, _skipped) = list_threads(pid).expect("list_threads");
        assert!(threads.contains(&pid));
    }

    #[test]
    fn stat_parsing_handles_parens_in_comm() {
        // comm fields can legitimately contain parens, e.g. "(ab (cd) ef)".
        // rfind(')') + find('(') must bracket the outermost pair.
        let synthetic = "123 (ab (cd) ef) S 1 123 123 0 -1 0 0 0 0 0 0 0 0 0 20 0 1 0 0";
        let open = synthetic.find('(').unwrap();
        let close = synthetic.rfind(')').unwrap();
        assert_eq!(&synthetic[open + 1..close], "ab (cd) ef");
    }
}
