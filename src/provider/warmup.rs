//! Background page warmup.
//!
//! A single worker thread reads one byte per page of the leading part of the buffer so the
//! OS faults it in before the interpreter needs it. The worker polls an abort flag every
//! [`CHECK_INTERVAL_PAGES`] pages.

use std::{
    hint::black_box,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crate::{provider::BytecodeProvider, utils::os};

/// Pages touched between two checks of the abort flag.
const CHECK_INTERVAL_PAGES: usize = 64;

pub(super) struct Warmup {
    abort: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Touch one byte per page of `data[..size]`, stopping early once `abort` is set.
///
/// Returns the number of pages touched.
fn touch_pages(data: &[u8], size: usize, page_size: usize, abort: &AtomicBool) -> usize {
    let size = size.min(data.len());
    let check_every = CHECK_INTERVAL_PAGES * page_size;
    let mut next_check = check_every;
    let mut touched = 0;

    let mut i = 0;
    while i < size {
        if i >= next_check {
            if abort.load(Ordering::Acquire) {
                break;
            }
            next_check += check_every;
        }
        black_box(data[i]);
        touched += 1;
        i += page_size;
    }
    touched
}

impl BytecodeProvider {
    /// Start faulting in the first `percent` percent of the buffer on a background thread.
    ///
    /// Values above 100 are treated as 100. At most one warmup runs at a time; a call while
    /// one is running does nothing. Works on invalid providers too, since it only needs the
    /// buffer.
    pub fn start_warmup(&self, percent: u8) {
        let percent = u64::from(percent.min(100));
        let len = self.data.len() as u64;
        #[allow(clippy::cast_possible_truncation)]
        let size = (len * percent / 100) as usize;
        if size == 0 {
            return;
        }

        let mut warmup = lock!(self.warmup);
        if warmup.is_some() {
            return;
        }

        let abort = Arc::new(AtomicBool::new(false));
        let data = Arc::clone(&self.data);
        let flag = Arc::clone(&abort);
        let spawned = thread::Builder::new()
            .name("hbc-warmup".to_string())
            .spawn(move || {
                let touched = touch_pages(data.data(), size, os::page_size(), &flag);
                tracing::trace!(touched, size, "warmup finished");
            });

        match spawned {
            Ok(handle) => {
                tracing::debug!(size, "warmup started");
                *warmup = Some(Warmup { abort, handle });
            }
            Err(error) => tracing::debug!(%error, "could not spawn warmup thread"),
        }
    }

    /// Stop a running warmup and wait for its thread to exit. Does nothing if none is running.
    pub fn stop_warmup(&self) {
        let mut warmup = lock!(self.warmup);
        if let Some(Warmup { abort, handle }) = warmup.take() {
            abort.store(true, Ordering::Release);
            if handle.join().is_err() {
                tracing::debug!("warmup thread panicked");
            }
            tracing::debug!("warmup stopped");
        }
    }

    /// Returns `true` while a warmup thread has been started and not yet stopped.
    #[must_use]
    pub fn is_warming_up(&self) -> bool {
        lock!(self.warmup).is_some()
    }
}
