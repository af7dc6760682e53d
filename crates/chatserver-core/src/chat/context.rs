//! Per-call context: the caller's deadline and cancellation signal.
//!
//! The deadline is fixed when the context is created, so every step of a call
//! (waiting for the writer, running statements) draws on the same budget.
//! Write operations bound their transaction body with [`CallContext::run`],
//! check [`CallContext::ensure_live`] once before committing, and then let the
//! commit finish: a reported deadline or cancellation always means nothing was
//! stored.

use std::future::Future;
use std::time::Duration;

use chatserver_types::error::ChatError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation token for one inbound request.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Maximum wall time the call may spend in the store.
    pub deadline: Duration,
    /// Cancelled when the caller gives up (client disconnect, Ctrl+C, shutdown).
    pub cancellation: CancellationToken,
    expires_at: Instant,
}

impl CallContext {
    /// A context with its own, unshared cancellation token.
    pub fn new(deadline: Duration) -> Self {
        Self::with_token(CancellationToken::new(), deadline)
    }

    /// A context whose token is a child of `parent`: cancelling the parent
    /// cancels this call, not vice versa.
    pub fn child_of(parent: &CancellationToken, deadline: Duration) -> Self {
        Self::with_token(parent.child_token(), deadline)
    }

    fn with_token(cancellation: CancellationToken, deadline: Duration) -> Self {
        Self {
            deadline,
            cancellation,
            expires_at: Instant::now() + deadline,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// `Cancelled` or `DeadlineExceeded` if the call may no longer proceed.
    pub fn ensure_live(&self, operation: &'static str) -> Result<(), ChatError> {
        if self.is_cancelled() {
            return Err(ChatError::Cancelled { operation });
        }
        if self.is_expired() {
            return Err(ChatError::DeadlineExceeded { operation });
        }
        Ok(())
    }

    /// Run `fut` until it completes, the deadline passes, or the call is
    /// cancelled. In the latter two cases `fut` is dropped before returning.
    pub async fn run<T, F>(&self, operation: &'static str, fut: F) -> Result<T, ChatError>
    where
        F: Future<Output = Result<T, ChatError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(ChatError::Cancelled { operation }),
            result = tokio::time::timeout_at(self.expires_at, fut) => match result {
                Ok(result) => result,
                Err(_) => Err(ChatError::DeadlineExceeded { operation }),
            },
        }
    }
}
