//! Deferred Results
//!
//! A one-shot result paired with the resources that must be released when it
//! settles. Any number of producers may race to resolve or reject; the first
//! one wins, every registered release runs exactly once, and the remaining
//! producers become no-ops.
//!
//! Releases run before the outcome is delivered, so a caller awaiting a
//! [`DeferredResult`] observes every resource already released.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::application::services::FeedError;

type Release = Box<dyn FnOnce() + Send>;

struct Shared<T> {
    sender: Option<oneshot::Sender<Result<T, FeedError>>>,
    releases: Vec<Release>,
}

/// Producer side of a deferred result.
pub struct Deferred<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Deferred<T> {
    /// Whether the result has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.lock().sender.is_none()
    }
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T: Send + 'static> Deferred<T> {
    /// Create a producer and the future it settles.
    #[must_use]
    pub fn new() -> (Self, DeferredResult<T>) {
        let (sender, receiver) = oneshot::channel();
        let deferred = Self {
            shared: Arc::new(Mutex::new(Shared {
                sender: Some(sender),
                releases: Vec::new(),
            })),
        };

        let result = DeferredResult {
            receiver,
            deferred: deferred.clone(),
        };

        (deferred, result)
    }

    /// Acquire a resource whose release is tied to settlement.
    ///
    /// `acquire` runs immediately and returns the release action. If the
    /// result has already settled (possibly from inside `acquire`), the
    /// release runs right away.
    pub fn use_resource<A, R>(&self, acquire: A)
    where
        A: FnOnce() -> R,
        R: FnOnce() + Send + 'static,
    {
        let release = acquire();

        let mut shared = self.shared.lock();
        if shared.sender.is_some() {
            shared.releases.push(Box::new(release));
        } else {
            drop(shared);
            release();
        }
    }

    /// Settle successfully. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with an error. Returns `false` if already settled.
    pub fn reject(&self, error: FeedError) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T, FeedError>) -> bool {
        let (sender, releases) = {
            let mut shared = self.shared.lock();
            let Some(sender) = shared.sender.take() else {
                return false;
            };
            (sender, std::mem::take(&mut shared.releases))
        };

        // Release in reverse acquisition order
        for release in releases.into_iter().rev() {
            release();
        }

        // The receiver may already be gone
        let _ = sender.send(outcome);

        true
    }
}

impl<T> std::fmt::Debug for DeferredResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredResult").finish_non_exhaustive()
    }
}

/// Consumer side of a deferred result.
///
/// Dropping it before settlement releases every resource without delivering
/// an outcome.
#[must_use = "dropping the result releases its resources immediately"]
pub struct DeferredResult<T> {
    receiver: oneshot::Receiver<Result<T, FeedError>>,
    deferred: Deferred<T>,
}

impl<T> Future for DeferredResult<T> {
    type Output = Result<T, FeedError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(FeedError::Aborted)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for DeferredResult<T> {
    fn drop(&mut self) {
        let (sender, releases) = {
            let mut shared = self.deferred.shared.lock();
            (shared.sender.take(), std::mem::take(&mut shared.releases))
        };

        if sender.is_some() {
            for release in releases.into_iter().rev() {
                release();
            }
        }
    }
}
