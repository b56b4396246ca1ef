//! Per-request deadline and cancellation, passed explicitly through every node.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::WorkflowError;
use crate::graph::NodeKind;

/// Deadline and cancellation handle for one workflow run.
///
/// Every external call a node makes goes through [`RunContext::guard`], which
/// is the only place a run can be suspended.
#[derive(Clone, Debug, Default)]
pub struct RunContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            cancel: CancellationToken::new(),
        }
    }

    /// Same cancellation token, with a deadline added if none is set.
    pub fn or_timeout(&self, timeout: Option<Duration>) -> Self {
        let deadline = match (self.deadline, timeout) {
            (Some(d), _) => Some(d),
            (None, Some(t)) => Some(Instant::now() + t),
            (None, None) => None,
        };
        Self {
            deadline,
            cancel: self.cancel.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Token that cancels this run when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail fast if the run was cancelled or its deadline has passed.
    pub fn check(&self, node: NodeKind) -> Result<(), WorkflowError> {
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }
        if matches!(self.deadline, Some(d) if Instant::now() >= d) {
            return Err(WorkflowError::DeadlineExceeded {
                node: node.as_str().to_string(),
            });
        }
        Ok(())
    }

    /// Run an external call, racing it against cancellation and the deadline.
    pub async fn guard<F, T>(&self, node: NodeKind, fut: F) -> Result<T, WorkflowError>
    where
        F: Future<Output = T>,
    {
        self.check(node)?;

        let bounded = async {
            match self.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut).await.map_err(|_| {
                    WorkflowError::DeadlineExceeded {
                        node: node.as_str().to_string(),
                    }
                }),
                None => Ok(fut.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(WorkflowError::Cancelled),
            result = bounded => result,
        }
    }
}
