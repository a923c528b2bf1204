//! Paging advice for the container buffer.
//!
//! Every call here is a hint: failures never surface, and a provider that failed validation
//! simply skips the section-specific advice. Ranges are rounded down to the enclosing page
//! start before they reach the OS.

use crate::{
    format::{BytecodeForm, Record, SmallFuncHeader},
    layout::{layout, Layout, SectionKind},
    provider::{BytecodeProvider, Hardening},
    utils::{
        os::{self, Advice},
        page_align_down,
    },
    Error, Result,
};

use std::ops::{Range, RangeInclusive};

/// Page-aligned `(addr, len)` covering `range` of a buffer that starts at `base`.
///
/// Only the start moves: it is rounded down to its page and `len` grows by the same
/// amount, so the end address is unchanged. Returns `None` for an empty range.
fn page_span(base: usize, range: Range<usize>, page_size: usize) -> Option<(usize, usize)> {
    if range.is_empty() {
        return None;
    }
    Some(page_align_down(base + range.start, range.len(), page_size))
}

/// Round `range` of `data` out to page granularity and hand it to the OS.
fn advise_range(data: &[u8], range: Range<usize>, advice: Advice) {
    let Some((addr, len)) = page_span(data.as_ptr() as usize, range.clone(), os::page_size())
    else {
        return;
    };
    tracing::trace!(offset = range.start, len = range.len(), %advice, "advising span");
    os::advise(addr, len, advice);
}

/// Like [`advise_range`], as a prefetch request.
fn prefetch_range(data: &[u8], range: Range<usize>) {
    let Some((addr, len)) = page_span(data.as_ptr() as usize, range.clone(), os::page_size())
    else {
        return;
    };
    tracing::trace!(offset = range.start, len = range.len(), "prefetching span");
    os::prefetch(addr, len);
}

/// Byte span from the start of the first to the end of the last section in `kinds`.
///
/// The sections in between, empty ones included, must tile the span exactly.
fn contiguous_span(layout: &Layout, kinds: RangeInclusive<SectionKind>) -> Range<usize> {
    let span = layout.range(*kinds.start()).start..layout.range(*kinds.end()).end;

    debug_assert!(
        SectionKind::all()
            .filter(|kind| kinds.contains(kind))
            .all(|kind| span.start <= layout.range(kind).start && layout.range(kind).end <= span.end),
        "sections must lie inside the advised span"
    );
    debug_assert_eq!(
        span.len(),
        SectionKind::all()
            .filter(|kind| kinds.contains(kind))
            .map(|kind| layout.range(kind).len())
            .sum::<usize>(),
        "sections must be contiguous"
    );
    span
}

/// String kinds through the overflow string table, ending where string storage begins.
fn sequential_span(layout: &Layout) -> Range<usize> {
    let span = contiguous_span(
        layout,
        SectionKind::StringKinds..=SectionKind::OverflowStringTable,
    );
    let storage = layout.range(SectionKind::StringStorage).start;
    debug_assert_eq!(span.end, storage, "string storage must follow the overflow table");
    span.start..storage
}

/// The two string tables, then string storage.
fn random_spans(layout: &Layout) -> [Range<usize>; 2] {
    [
        contiguous_span(
            layout,
            SectionKind::StringTable..=SectionKind::OverflowStringTable,
        ),
        layout.range(SectionKind::StringStorage),
    ]
}

fn will_need_span(layout: &Layout) -> Range<usize> {
    contiguous_span(
        layout,
        SectionKind::StringKinds..=SectionKind::OverflowStringTable,
    )
}

impl BytecodeProvider {
    /// Advise sequential access for the string kinds, identifier translations and string
    /// tables, read front to back during startup.
    pub fn advise_string_table_sequential(&self) {
        if let Ok(layout) = self.layout() {
            advise_range(self.data(), sequential_span(layout), Advice::Sequential);
        }
    }

    /// Advise random access for the string tables and string storage, which are looked up by
    /// id once the runtime is up.
    pub fn advise_string_table_random(&self) {
        if let Ok(layout) = self.layout() {
            for span in random_spans(layout) {
                advise_range(self.data(), span, Advice::Random);
            }
        }
    }

    /// Ask the OS to page in the string kinds through the overflow string table.
    pub fn will_need_string_table(&self) {
        if let Ok(layout) = self.layout() {
            prefetch_range(self.data(), will_need_span(layout));
        }
    }

    /// Apply `advice` to the whole buffer.
    ///
    /// [`Advice::DontNeed`] is only forwarded for memory-mapped files; on owned memory it
    /// would discard the container.
    pub fn madvise(&self, advice: Advice) {
        if advice == Advice::DontNeed && !self.data.is_mapped() {
            tracing::trace!("ignoring DontNeed advice on owned memory");
            return;
        }

        advise_range(self.data(), 0..self.data().len(), advice);
    }

    /// Start paging in the parts of `buffer` needed to begin execution: the string table and
    /// the global function's bytecode.
    ///
    /// Works on a raw buffer, before any provider exists, and expects the execution form.
    /// Under [`Hardening::Relaxed`] layout and lookup failures are ignored; under
    /// [`Hardening::Strict`] they are returned.
    ///
    /// # Errors
    /// Under [`Hardening::Strict`], any error from laying out the container or resolving the
    /// global function.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use hbcscope::{BytecodeProvider, Hardening};
    ///
    /// let data = std::fs::read("index.hbc")?;
    /// BytecodeProvider::prefetch(&data, Hardening::Relaxed)?;
    /// # Ok::<(), hbcscope::Error>(())
    /// ```
    pub fn prefetch(buffer: &[u8], hardening: Hardening) -> Result<()> {
        harden(prefetch_container(buffer, BytecodeForm::Execution), hardening)
    }

    /// [`BytecodeProvider::prefetch`] over this provider's own buffer, using the form and
    /// hardening from its [`crate::ProviderConfig`].
    ///
    /// The buffer is laid out again, so a provider that failed validation reports the
    /// layout error under [`Hardening::Strict`].
    ///
    /// # Errors
    /// Under [`Hardening::Strict`], any error from laying out the container or resolving the
    /// global function.
    pub fn prefetch_contents(&self) -> Result<()> {
        harden(
            prefetch_container(self.data(), self.config.form),
            self.config.hardening,
        )
    }
}

fn harden(result: Result<()>, hardening: Hardening) -> Result<()> {
    match (result, hardening) {
        (Ok(()), _) => Ok(()),
        (Err(error), Hardening::Strict) => Err(error),
        (Err(error), Hardening::Relaxed) => {
            tracing::trace!(%error, "prefetch skipped");
            Ok(())
        }
    }
}

fn prefetch_container(buffer: &[u8], form: BytecodeForm) -> Result<()> {
    let layout = layout(buffer, form)?;
    prefetch_range(buffer, layout.range(SectionKind::StringTable));

    let global = layout.header().global_code_index;
    let headers = layout.range(SectionKind::FunctionHeaders);
    let mut offset = (global as usize)
        .checked_mul(SmallFuncHeader::SIZE)
        .and_then(|at| at.checked_add(headers.start))
        .filter(|&at| at + SmallFuncHeader::SIZE <= headers.end)
        .ok_or(Error::FunctionOutOfRange {
            id: global,
            count: layout.header().function_count,
        })?;

    let small = SmallFuncHeader::read(buffer, &mut offset)?;
    let header = super::resolve_function_header(buffer, small)?;
    let start = header.offset() as usize;
    let end = start
        .checked_add(header.bytecode_size_in_bytes() as usize)
        .filter(|&end| end <= buffer.len())
        .ok_or_else(|| malformed_error!("global function bytecode lies outside the buffer"))?;

    prefetch_range(buffer, start..end);
    Ok(())
}
