//! Cancellation and deadline handle threaded through every git operation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why an operation stopped waiting on its child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Cancelled,
    DeadlineExceeded,
}

/// Execution context for a git operation.
///
/// Clones share one cancellation flag, so cancelling any clone interrupts
/// every operation that was handed a copy.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl ExecContext {
    /// A context without a deadline that is only interrupted by `cancel`.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Keeps the earlier of the existing and the given deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the reason this context should stop, if any.
    pub fn interruption(&self) -> Option<Interruption> {
        if self.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::DeadlineExceeded),
            _ => None,
        }
    }
}
