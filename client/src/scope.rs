use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifetime of a controller's background work.
///
/// Tasks spawned here stop at their next await point once the scope is
/// cancelled. Dropping the scope cancels it.
#[derive(Debug, Default)]
pub struct TaskScope {
    token: CancellationToken,
}

impl TaskScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that is cancelled together with this one.
    pub fn child(&self) -> TaskScope {
        TaskScope {
            token: self.token.child_token(),
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `fut` until it finishes or the scope is cancelled. Yields `None` when cancelled.
    pub fn spawn<F>(&self, fut: F) -> JoinHandle<Option<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                out = fut => Some(out),
            }
        })
    }
}

impl Drop for TaskScope {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Source of increasing sequence numbers, taken when a request is issued.
#[derive(Debug, Default)]
pub struct SequenceClock {
    last: AtomicU64,
}

impl SequenceClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }
}
