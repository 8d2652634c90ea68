//! Cancellation context attached to a request.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Cancellation signal and optional deadline for one request.
///
/// Cancelling the context (or letting its deadline pass) stops the current
/// attempt or backoff wait and prevents any further attempts.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Uses `token` as the cancellation signal.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancels the context.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns a handle that cancels this context.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the context error if it has already fired.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Runs `fut` to completion unless the context fires first.
    pub(crate) async fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Error::Cancelled),
            _ = deadline => Err(Error::DeadlineExceeded),
            value = fut => Ok(value),
        }
    }

    /// Sleeps for `wait` unless the context fires first.
    pub(crate) async fn sleep(&self, wait: Duration) -> Result<()> {
        self.run(tokio::time::sleep(wait)).await
    }
}
