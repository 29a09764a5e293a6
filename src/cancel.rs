//! Cancellation scope shared by one plan execution.
//!
//! The first failure cancels the scope with itself as the cause; every
//! worker and tracker observes the same scope.

use std::sync::Arc;
use tokio::sync::watch;

/// A cloneable, first-cause-wins cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelScope {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl CancelScope {
    /// Creates a live (not cancelled) scope.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Cancels the scope. Returns false if it was already cancelled, in which
    /// case the original cause is kept.
    pub fn cancel(&self, cause: impl Into<String>) -> bool {
        let cause = cause.into();
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        })
    }

    /// Returns true once the scope is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Cause of the cancellation, if any.
    #[must_use]
    pub fn cause(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Resolves once the scope is cancelled, yielding the cause.
    pub async fn cancelled(&self) -> String {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(cause) => cause.clone().unwrap_or_default(),
            // sender dropped
            Err(_) => String::new(),
        }
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_cause_wins() {
        let scope = CancelScope::new();
        assert!(!scope.is_cancelled());

        assert!(scope.cancel("first"));
        assert!(!scope.cancel("second"));
        assert_eq!(scope.cause().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let scope = CancelScope::new();
        let waiter = {
            let scope = scope.clone();
            tokio::spawn(async move { scope.cancelled().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        scope.cancel("boom");

        let cause = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter finished")
            .expect("task joined");
        assert_eq!(cause, "boom");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let scope = CancelScope::new();
        scope.cancel("done");
        assert_eq!(scope.cancelled().await, "done");
    }
}
