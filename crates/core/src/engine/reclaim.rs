//! Returning freed heap pages to the OS.

use super::actions::MemoryReclaimer;

const MB: u64 = 1024 * 1024;

/// Asks the allocator to release free heap memory (glibc `malloc_trim`)
/// and reports the drop in resident set size.
///
/// ballast keeps no caches of its own, so this is the only lever it has.
/// On targets without `malloc_trim` it does nothing and reports `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrimReclaimer;

impl TrimReclaimer {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryReclaimer for TrimReclaimer {
    fn reclaim(&self, target_mb: u64) -> Option<u64> {
        let before = resident_bytes()?;
        if !trim() {
            return None;
        }
        let after = resident_bytes()?;
        let freed_mb = before.saturating_sub(after) / MB;
        tracing::debug!(target_mb, freed_mb, "heap trimmed");
        Some(freed_mb)
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
fn trim() -> bool {
    // SAFETY: malloc_trim only walks allocator state and takes no pointers.
    unsafe { libc::malloc_trim(0) };
    true
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
fn trim() -> bool {
    false
}

/// Resident set size of this process.
fn resident_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    Some(parse_statm_resident(&statm)? * page_size())
}

/// Second field of `/proc/self/statm`, in pages.
fn parse_statm_resident(statm: &str) -> Option<u64> {
    statm.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(unix)]
fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(size).ok().filter(|&s| s > 0).unwrap_or(4096)
}

#[cfg(not(unix))]
fn page_size() -> u64 {
    4096
}
