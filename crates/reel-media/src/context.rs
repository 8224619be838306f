//! Job-scoped cancellation and deadline.
//!
//! One [`JobContext`] is created per pipeline run and cloned into every
//! suspension point: subprocesses, HTTP calls and backoff sleeps.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{MediaError, MediaResult};

/// Cancellation and deadline for one job.
#[derive(Debug, Clone)]
pub struct JobContext {
    cancel_rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Owner side of a [`JobContext`]'s cancel flag.
#[derive(Debug)]
pub struct CancelHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every clone of the context.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

impl JobContext {
    /// Create a context together with the handle that cancels it.
    pub fn new() -> (Self, CancelHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                cancel_rx,
                deadline: None,
            },
            CancelHandle { cancel_tx },
        )
    }

    /// A context that is never cancelled.
    pub fn background() -> Self {
        Self::new().0
    }

    /// Set an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Fail fast if the job was cancelled or its deadline has passed.
    pub fn check(&self) -> MediaResult<()> {
        if self.is_cancelled() {
            return Err(MediaError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(MediaError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// Race `fut` against cancellation and the deadline.
    ///
    /// Dropping the losing future is how in-flight work is abandoned, so
    /// subprocesses must be spawned with `kill_on_drop`.
    pub async fn run<T, E, F>(&self, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<MediaError>,
    {
        self.check().map_err(E::from)?;

        tokio::select! {
            result = fut => result,
            _ = self.cancelled() => Err(E::from(MediaError::Cancelled)),
            _ = self.deadline_reached() => Err(E::from(MediaError::DeadlineExceeded)),
        }
    }

    /// Sleep for `duration` unless the job is interrupted first.
    ///
    /// Returns `false` when the sleep was cut short.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
            _ = self.deadline_reached() => false,
        }
    }

    /// Resolves once the cancel flag is raised. Never resolves if the
    /// handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    async fn deadline_reached(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}
