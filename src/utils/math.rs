//! Alignment arithmetic shared by the layout walker and the residency advisor.

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. Returns `None` if the result does not fit `usize`.
///
/// # Examples
///
/// ```rust,ignore
/// assert_eq!(align_up(5, 4), Some(8));
/// assert_eq!(align_up(8, 4), Some(8));
/// ```
#[must_use]
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    let mask = alignment - 1;
    value.checked_add(mask).map(|v| v & !mask)
}

/// Rounds `value` down to the enclosing multiple of `alignment` (a power of two).
#[must_use]
pub fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}

/// Moves the start of the region `[addr, addr + len)` down to its page boundary and grows
/// `len` by the same amount, so the region still ends at the same address.
///
/// The start is never rounded up: that would drop the first partial page from the region.
#[must_use]
pub fn page_align_down(addr: usize, len: usize, page_size: usize) -> (usize, usize) {
    let aligned = align_down(addr, page_size);
    (aligned, len + (addr - aligned))
}
