//! Cancellation and deadlines for a run.
//!
//! Every oracle and endpoint call of a run goes through [`RunGuard::call`],
//! which races the call against the run's cancellation token, the run's
//! wall-clock deadline and a per-call timeout. Dropping the losing future
//! aborts the in-flight request.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Cloneable cancellation handle. Cancelling is idempotent.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: std::sync::Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: std::sync::Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so `changed` cannot fail while we wait.
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Stand-in deadline for budgets too large to represent.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Why a guarded call did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    Deadline,
    Timeout(Duration),
}

/// Cancellation token plus wall-clock deadline for one run.
#[derive(Debug, Clone)]
pub struct RunGuard {
    cancel: CancelToken,
    deadline: Instant,
    budget: Duration,
}

impl RunGuard {
    pub fn new(cancel: CancelToken, budget: Duration) -> Self {
        let now = Instant::now();
        let deadline = now
            .checked_add(budget)
            .unwrap_or_else(|| now + FAR_FUTURE);
        Self {
            cancel,
            deadline,
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Fails fast when the run is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        if Instant::now() >= self.deadline {
            return Err(Interrupt::Deadline);
        }
        Ok(())
    }

    /// Run `fut` unless the run is cancelled or the deadline passes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = tokio::time::sleep_until(self.deadline) => Err(Interrupt::Deadline),
            out = fut => Ok(out),
        }
    }

    /// Like [`run`](Self::run), with a per-call `timeout` as well.
    pub async fn call<F: Future>(&self, timeout: Duration, fut: F) -> Result<F::Output, Interrupt> {
        self.run(tokio::time::timeout(timeout, fut))
            .await?
            .map_err(|_| Interrupt::Timeout(timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_when_nothing_interrupts() {
        let guard = RunGuard::new(CancelToken::new(), Duration::from_secs(5));
        let out = guard.call(Duration::from_secs(1), async { 7 }).await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test]
    async fn per_call_timeout_fires() {
        let guard = RunGuard::new(CancelToken::new(), Duration::from_secs(5));
        let out = guard
            .call(
                Duration::from_millis(20),
                tokio::time::sleep(Duration::from_secs(5)),
            )
            .await;
        assert_eq!(out, Err(Interrupt::Timeout(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn deadline_beats_long_call_timeout() {
        let guard = RunGuard::new(CancelToken::new(), Duration::from_millis(20));
        let out = guard
            .call(Duration::from_secs(5), tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(Interrupt::Deadline));
    }

    #[tokio::test]
    async fn cancellation_interrupts_pending_call() {
        let token = CancelToken::new();
        let guard = RunGuard::new(token.clone(), Duration::from_secs(5));
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let out = guard
            .call(Duration::from_secs(5), tokio::time::sleep(Duration::from_secs(5)))
            .await;
        assert_eq!(out, Err(Interrupt::Cancelled));
        assert!(guard.check().is_err());
    }

    #[tokio::test]
    async fn already_cancelled_fails_fast() {
        let token = CancelToken::new();
        token.cancel();
        let guard = RunGuard::new(token, Duration::from_secs(5));
        assert_eq!(guard.check(), Err(Interrupt::Cancelled));
    }
}
