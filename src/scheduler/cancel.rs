//! Run-wide cancellation signal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

/// Why a run was cancelled. The first reason recorded wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CancelReason {
    /// A lookup failed authentication.
    AuthFailure { ordinal: usize, platform: String },
    /// The run exceeded its time budget.
    Timeout,
    /// The caller aborted the run.
    Aborted,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::AuthFailure { ordinal, platform } => {
                write!(f, "authentication failed for {platform} (record {ordinal})")
            }
            CancelReason::Timeout => write!(f, "run timed out"),
            CancelReason::Aborted => write!(f, "aborted by caller"),
        }
    }
}

struct Inner {
    tx: watch::Sender<bool>,
    reason: OnceLock<CancelReason>,
}

/// Cloneable handle shared by the pool, its workers and the caller.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tx,
                reason: OnceLock::new(),
            }),
        }
    }

    /// Signals cancellation. Returns `true` for the call that cancelled first.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let first = self.inner.reason.set(reason).is_ok();
        self.inner.tx.send_replace(true);
        first
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
    }

    pub fn reason(&self) -> Option<&CancelReason> {
        self.inner.reason.get()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.tx.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_first_reason_wins() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.cancel(CancelReason::Timeout));
        assert!(!token.cancel(CancelReason::Aborted));
        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(&CancelReason::Timeout));
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::task::yield_now().await;
        token.cancel(CancelReason::Aborted);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .expect("task ok");
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel(CancelReason::Aborted);
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already cancelled");
    }

    #[test]
    fn test_reason_display() {
        let reason = CancelReason::AuthFailure {
            ordinal: 4,
            platform: "github".into(),
        };
        assert_eq!(reason.to_string(), "authentication failed for github (record 4)");
    }
}
