//! Per-operation deadline threaded through every collaborator call

use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::error::{DelegationError, Result};

/// Absolute deadline shared by all I/O of one engine operation
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// Deadline `budget` from now
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Effectively unbounded, for callers that manage time themselves
    pub fn none() -> Self {
        Self::after(Duration::from_secs(60 * 60 * 24 * 365))
    }

    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_elapsed(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Run `fut` unless the deadline passes first
    pub async fn run<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(DelegationError::DeadlineExceeded(operation.to_string())),
        }
    }
}
