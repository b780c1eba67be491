//! Memory map enumeration, grounded on `r_debug_native_map_get` in
//! `debug_native.c` (parses `/proc/<pid>/maps`, synthesizes `unk0`/`unk1`/…
//! names for anonymous regions, and derives "modules" as the first mapping
//! per backing path) and on `procfs::process::Process::maps()` as used by
//! the headcrab Linux backend for the actual parse.

use libc::pid_t;
use std::collections::HashSet;

use lazy_static::lazy_static;

use crate::error::{Error, Result, SkippedLines};

lazy_static! {
    /// The host's page size, queried once via `sysconf(_SC_PAGESIZE)` the
    /// way the headcrab Linux backend's `lazy_static! { PAGE_SIZE }` does.
    /// Used to round `map_alloc` requests up to a whole number of pages
    /// before they're handed to the injected `mmap` call.
    pub static ref PAGE_SIZE: u64 = unsafe { libc::sysconf(libc::_SC_PAGESIZE) as u64 };
}

/// Rounds `size` up to the next multiple of [`PAGE_SIZE`].
pub fn round_up_to_page(size: u64) -> u64 {
    let page = *PAGE_SIZE;
    (size + page - 1) / page * page
}

/// The Linux transparent-huge-page size, used to gate
/// `Debugger::map_promote_huge` on the original's "size must be a 2 MiB
/// multiple" rule (spec §4.6 step 7).
pub const HUGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;

bitflags::bitflags! {
    pub struct MapPerms: u8 {
        const READ    = 0b0001;
        const WRITE   = 0b0010;
        const EXEC    = 0b0100;
        const PRIVATE = 0b1000;
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemoryMap {
    pub start: u64,
    pub end: u64,
    pub perms: MapPerms,
    pub offset: u64,
    /// Backing file path, or a synthetic `unkN` name for anonymous/unlabeled
    /// regions, matching the original's fallback naming.
    pub name: String,
}

impl MemoryMap {
    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// A loaded module: the lowest-addressed mapping for a given backing file,
/// the way `r_debug_native_modules_get` treats "first map with this path"
/// as the module's load address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModuleInfo {
    pub name: String,
    pub base: u64,
    pub size: u64,
}

pub fn list_maps(pid: pid_t) -> Result<(Vec<MemoryMap>, SkippedLines)> {
    let content = std::fs::read_to_string(format!("/proc/{}/maps", pid))
        .map_err(Error::from)?;
    let mut maps = Vec::new();
    let mut skipped = 0usize;
    let mut unk = 0usize;

    for line in content.lines() {
        match parse_map_line(line, &mut unk) {
            Some(m) => maps.push(m),
            None => skipped += 1,
        }
    }

    Ok((maps, SkippedLines(skipped)))
}

fn parse_map_line(line: &str, unk: &mut usize) -> Option<MemoryMap> {
    // Format: "start-end perms offset dev inode pathname"
    let mut parts = line.splitn(6, ' ').filter(|s| !s.is_empty());
    let range = parts.next()?;
    let perms = parts.next()?;
    let offset = parts.next()?;
    let _dev = parts.next()?;
    let _inode = parts.next()?;
    let pathname = parts.next().unwrap_or("").trim();

    let (start_s, end_s) = range.split_once('-')?;
    let start = u64::from_str_radix(start_s, 16).ok()?;
    let end = u64::from_str_radix(end_s, 16).ok()?;
    let offset = u64::from_str_radix(offset, 16).ok()?;

    // `r_debug_native_map_get` skips these as degenerate ranges rather
    // than reporting a zero-length or nonexistent mapping (spec §4.4).
    if start == end || end == 0 {
        return None;
    }

    if perms.len() < 4 {
        return None;
    }
    let mut p = MapPerms::empty();
    let bytes = perms.as_bytes();
    if bytes[0] == b'r' {
        p |= MapPerms::READ;
    }
    if bytes[1] == b'w' {
        p |= MapPerms::WRITE;
    }
    if bytes[2] == b'x' {
        p |= MapPerms::EXEC;
    }
    if bytes[3] == b'p' {
        p |= MapPerms::PRIVATE;
    }

    let name = if pathname.is_empty() {
        let n = format!("unk{}", *unk);
        *unk += 1;
        n
    } else {
        pathname.to_string()
    };

    Some(MemoryMap {
        start,
        end,
        perms: p,
        offset,
        name,
    })
}

/// Collapses a map listing down to one entry per distinct backing path,
/// keeping the lowest-addressed mapping as the module's base — the same
/// rule `r_debug_native_modules_get` applies, skipping synthetic `unkN`
/// anonymous regions and the handful of pseudo-paths procfs emits
/// (`[heap]`, `[stack]`, `[vdso]`, ...).
pub fn list_modules(maps: &[MemoryMap]) -> Vec<ModuleInfo> {
    let mut seen = HashSet::new();
    let mut modules = Vec::new();
    for m in maps {
        if m.name.starts_with("unk") || m.name.starts_with('[') || m.name.is_empty() {
            continue;
        }
        if seen.insert(m.name.clone()) {
            modules.push(ModuleInfo {
                name: m.name.clone(),
                base: m.start,
                size: m.size(),
            });
        }
    }
    modules
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_a_realistic_maps_line() {
        let mut unk = 0;
        let line = "7f0a1c000000-7f0a1c021000 r-xp 00000000 08:01 131073 /usr/lib/libc.so.6";
        let m = parse_map_line(line, &mut unk).unwrap();
        assert_eq!(m.start, 0x7f0a1c000000);
        assert_eq!(m.end, 0x7f0a1c021000);
        assert!(m.perms.contains(MapPerms::READ | MapPerms::EXEC));
        assert!(!m.perms.contains(MapPerms::WRITE));
        assert_eq!(m.name, "/usr/lib/libc.so.6");
    }

    #[test]
    fn anonymous_regions_get_successive_unk_names() {
        let mut unk = 0;
        let a = parse_map_line("7f00-7f01 rw-p 0 00:00 0", &mut unk).unwrap();
        let b = parse_map_line("7f02-7f03 rw-p 0 00:00 0", &mut unk).unwrap();
        assert_eq!(a.name, "unk0");
        assert_eq!(b.name, "unk1");
    }

    #[test]
    fn modules_collapse_to_first_map_per_path() {
        let mut unk = 0;
        let maps = vec![
            parse_map_line("1000-2000 r-xp 0 00:00 0 /lib/foo.so", &mut unk).unwrap(),
            parse_map_line("3000-4000 r--p 1000 00:00 0 /lib/foo.so", &mut unk).unwrap(),
        ];
        let modules = list_modules(&maps);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].base, 0x1000);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let mut unk = 0;
        assert!(parse_map_line("not a maps line", &mut unk).is_none());
    }

    #[test]
    fn degenerate_ranges_are_skipped() {
        let mut unk = 0;
        assert!(parse_map_line("1000-1000 rw-p 0 00:00 0", &mut unk).is_none());
        assert!(parse_map_line("1000-0 rw-p 0 00:00 0", &mut unk).is_none());
    }
}
