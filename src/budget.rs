// src/budget.rs
//! Deadline and cancellation carried through a chain of remote calls.
//!
//! A `RequestBudget` is created once per request and passed by reference to
//! every provider call in the chain. Each call sizes its own HTTP timeout
//! from `remaining()`, and the owner of the budget wraps the whole chain in
//! `run()`, which resolves to an error as soon as the deadline passes or the
//! token is cancelled. Work still in flight is dropped at that point.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetExceeded {
    #[error("deadline elapsed")]
    Deadline,
    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RequestBudget {
    deadline: Instant,
    cancel: CancellationToken,
}

impl RequestBudget {
    pub fn new(total: Duration) -> Self {
        Self::with_token(total, CancellationToken::new())
    }

    pub fn with_token(total: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + total,
            cancel,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// True once the deadline has passed or the token was cancelled.
    pub fn is_exhausted(&self) -> bool {
        self.cancel.is_cancelled() || self.remaining().is_zero()
    }

    /// Drives `work` until it finishes, the deadline passes, or the token is cancelled.
    pub async fn run<F, T>(&self, work: F) -> Result<T, BudgetExceeded>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BudgetExceeded::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(BudgetExceeded::Deadline),
            out = work => Ok(out),
        }
    }
}
