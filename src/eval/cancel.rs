//! Run cancellation
//!
//! A `CancelToken` is shared by the executor and every evaluator of a run.
//! It trips when `cancel()` is called or when its deadline passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::expr::{ExprError, ExprResult};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

/// Cloneable cancellation handle
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    /// Token that only trips on `cancel()`
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that also trips at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            state: Arc::new(CancelState {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
            }),
        }
    }

    /// Token that trips `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Cancel the run
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
    }

    /// Whether the run was cancelled or its deadline passed
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
            || self
                .state
                .deadline
                .map_or(false, |deadline| Instant::now() >= deadline)
    }

    /// `Err(Cancelled)` once tripped
    pub fn check(&self) -> ExprResult<()> {
        if self.is_cancelled() {
            Err(ExprError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(clone.check().is_ok());

        token.cancel();
        assert!(clone.is_cancelled());
        assert_eq!(clone.check(), Err(ExprError::Cancelled));
    }

    #[test]
    fn test_deadline() {
        let past = CancelToken::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(past.is_cancelled());

        let future = CancelToken::with_timeout(Duration::from_secs(3600));
        assert!(!future.is_cancelled());
        assert!(future.deadline().is_some());
    }
}
