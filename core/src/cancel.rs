//! Cancellation tokens for view-scoped async work.
//!
//! A view that starts a fetch or a mutation holds a token; when the view goes
//! away it cancels the token and every task waiting on it stops at its next
//! suspension point. Cancellation only stops the *local* effect of the work:
//! a request that already left the process is not aborted.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::watch;

/// Returned when a task stopped because its token was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Operation cancelled")]
pub struct Cancelled;

#[derive(Debug)]
struct Inner {
    tx: watch::Sender<bool>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        // send_replace never fails, even with no receivers
        let was_cancelled = self.tx.send_replace(true);
        if was_cancelled {
            return;
        }

        let children = std::mem::take(
            &mut *self
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

/// Clonable cancellation signal
///
/// Clones share the same signal. Child tokens are cancelled together with
/// their parent but can also be cancelled on their own.
///
/// # Example
///
/// ```
/// use eventdesk_core::cancel::{Cancelled, CancellationToken};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancellationToken::new();
/// token.cancel();
/// let outcome = token.run_until_cancelled(async { 42 }).await;
/// assert_eq!(outcome, Err(Cancelled));
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// New, uncancelled token
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tx,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Token cancelled whenever `self` is cancelled
    #[must_use]
    pub fn child(&self) -> Self {
        let child = Self::new();
        {
            let mut children = self.inner.children.lock().unwrap_or_else(PoisonError::into_inner);
            // Forget children that have been dropped
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }

        // Parent may have been cancelled before registration
        if self.is_cancelled() {
            child.cancel();
        }
        child
    }

    /// Signal cancellation to every holder of this token and its children
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Whether cancellation has been signalled
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.inner.tx.subscribe();
        // The sender lives in `self.inner`, so the channel cannot close here
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `fut` unless the token is (or becomes) cancelled first
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if the token fires before `fut` completes.
    /// `fut` is dropped at that point.
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(Cancelled);
        }

        tokio::select! {
            biased;
            () = self.cancelled() => Err(Cancelled),
            output = fut => Ok(output),
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
