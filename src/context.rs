//! Per-call deadline and cancellation, threaded through every store operation.

use std::fmt;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::storage::StoreError;

/// Why an operation stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// The caller's cancellation token fired.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cancellation::Cancelled => write!(f, "operation cancelled"),
            Cancellation::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

/// Deadline plus cancellation token for a single call.
///
/// Stores check the context when a transaction begins and again right before
/// it commits. A write transaction that fails the second check is aborted, so
/// a cancelled call never leaves a partial write behind.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Context {
    /// A context with no deadline that is never cancelled unless its token is.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    /// Replace the token, e.g. with a child of a request-scoped token.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Return the cancellation condition, if any, without erroring.
    pub fn state(&self) -> Option<Cancellation> {
        if self.token.is_cancelled() {
            return Some(Cancellation::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Cancellation::DeadlineExceeded),
            _ => None,
        }
    }

    /// Fail with [`StoreError::Cancelled`] when the token fired or the deadline passed.
    pub fn check(&self) -> Result<(), StoreError> {
        match self.state() {
            Some(reason) => Err(StoreError::Cancelled(reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_context_is_live() {
        let ctx = Context::background();
        assert!(ctx.check().is_ok());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn cancelled_token_is_reported() {
        let ctx = Context::background();
        ctx.cancel();
        assert_eq!(ctx.state(), Some(Cancellation::Cancelled));
        assert!(matches!(
            ctx.check(),
            Err(StoreError::Cancelled(Cancellation::Cancelled))
        ));
    }

    #[test]
    fn elapsed_deadline_is_reported() {
        let ctx = Context::with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(ctx.state(), Some(Cancellation::DeadlineExceeded));
    }

    #[test]
    fn cancellation_wins_over_deadline() {
        let ctx = Context::with_deadline(Instant::now() - Duration::from_millis(1));
        ctx.cancel();
        assert_eq!(ctx.state(), Some(Cancellation::Cancelled));
    }

    #[test]
    fn child_token_follows_parent() {
        let parent = CancellationToken::new();
        let ctx = Context::with_timeout(Duration::from_secs(60)).with_token(parent.child_token());
        assert!(ctx.check().is_ok());
        parent.cancel();
        assert!(ctx.check().is_err());
    }
}
