//! Thin operating-system shim for page size queries and paging advice.
//!
//! All calls here are advisory. On unix they map to `sysconf(_SC_PAGESIZE)` and `madvise`;
//! elsewhere they degrade to a fixed page size and no-ops. Failures are reported through
//! `tracing` at trace level and otherwise ignored, since advice only affects performance.

use std::sync::OnceLock;

/// Page size assumed where the platform cannot be queried.
const FALLBACK_PAGE_SIZE: usize = 4096;

/// Access-pattern advice for a range of the container buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Advice {
    /// No special treatment
    Normal,
    /// Expect sequential access; read ahead aggressively
    Sequential,
    /// Expect random access; disable read-ahead
    Random,
    /// The range will be needed soon; start paging it in
    WillNeed,
    /// The range will not be needed; resident pages may be dropped
    DontNeed,
}

/// Returns the page size of the running system.
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(query_page_size)
}

#[cfg(unix)]
fn query_page_size() -> usize {
    // SAFETY: sysconf has no preconditions for _SC_PAGESIZE
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    match usize::try_from(size) {
        Ok(size) if size.is_power_of_two() => size,
        _ => FALLBACK_PAGE_SIZE,
    }
}

#[cfg(not(unix))]
fn query_page_size() -> usize {
    FALLBACK_PAGE_SIZE
}

/// Issues `advice` for the address range `[addr, addr + len)`.
///
/// `addr` must be page aligned. The range is never dereferenced.
#[cfg(unix)]
pub fn advise(addr: usize, len: usize, advice: Advice) {
    if len == 0 {
        return;
    }
    debug_assert_eq!(addr % page_size(), 0, "advice start must be page aligned");

    let flag = match advice {
        Advice::Normal => libc::MADV_NORMAL,
        Advice::Sequential => libc::MADV_SEQUENTIAL,
        Advice::Random => libc::MADV_RANDOM,
        Advice::WillNeed => libc::MADV_WILLNEED,
        Advice::DontNeed => libc::MADV_DONTNEED,
    };

    // SAFETY: madvise only updates kernel paging hints for the range; the addresses are not
    // accessed. Destructive advice is filtered by callers to file-backed mappings.
    let result = unsafe { libc::madvise(addr as *mut libc::c_void, len, flag) };
    if result != 0 {
        tracing::trace!(
            addr,
            len,
            %advice,
            error = %std::io::Error::last_os_error(),
            "madvise failed, ignoring"
        );
    }
}

#[cfg(not(unix))]
pub fn advise(addr: usize, len: usize, advice: Advice) {
    let _ = (addr, len, advice);
}

/// Asks the OS to start paging in `[addr, addr + len)`.
pub fn prefetch(addr: usize, len: usize) {
    advise(addr, len, Advice::WillNeed);
}
