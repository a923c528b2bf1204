//! Internal helpers: alignment arithmetic and the OS paging shim.

mod math;
pub(crate) mod os;

#[cfg(test)]
pub(crate) use math::align_down;
pub(crate) use math::{align_up, page_align_down};
