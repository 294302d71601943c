//! Cooperative cancellation and progress reporting.
//!
//! A [`CancellationToken`] is shared between whoever may interrupt a
//! generation (the RPC reader thread) and the generation itself. The flag
//! is only observed inside the progress callback, so compute between two
//! callbacks runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::models::Tick;

/// Shared interrupt flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clears the flag so the token can be reused for the next request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Cancellation token and progress callback for one generation call.
///
/// Reported progress never goes backwards even if the model restarts its
/// count (e.g. between a prompt prefix and the continuation), and it never
/// exceeds the total. After reporting, the token is checked.
pub struct ProgressMonitor<'a> {
    token: &'a CancellationToken,
    on_progress: &'a mut dyn FnMut(usize, usize),
    max_generated: usize,
    ticks: usize,
}

impl<'a> ProgressMonitor<'a> {
    pub fn new(token: &'a CancellationToken, on_progress: &'a mut dyn FnMut(usize, usize)) -> Self {
        Self {
            token,
            on_progress,
            max_generated: 0,
            ticks: 0,
        }
    }

    /// Handles one progress callback from the model.
    pub fn tick(&mut self, generated: usize, total: usize) -> Tick {
        self.ticks += 1;
        self.max_generated = self.max_generated.max(generated);
        (self.on_progress)(self.max_generated.min(total), total);

        if self.token.is_cancelled() {
            Tick::Stop
        } else {
            Tick::Continue
        }
    }

    /// Number of callbacks received so far.
    pub fn ticks(&self) -> usize {
        self.ticks
    }
}
