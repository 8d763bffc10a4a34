use tokio::sync::oneshot;

use crate::error::{Error, Result};

/// Handle to the value of a query submitted to the host thread.
///
/// Resolves to [`Error::QueryAbandoned`] if the query was displaced from the
/// mailbox or dropped before the host ran it.
#[must_use = "a query handle does nothing unless awaited"]
pub struct QueryHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> QueryHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { rx }
    }

    /// Wait for the host thread to run the query.
    pub async fn wait(self) -> Result<T> {
        self.rx.await.unwrap_or(Err(Error::QueryAbandoned))
    }

    /// Blocking variant of [`wait`](Self::wait). Must not be called from
    /// within an async runtime.
    pub fn blocking_wait(self) -> Result<T> {
        self.rx.blocking_recv().unwrap_or(Err(Error::QueryAbandoned))
    }
}

impl<T> std::fmt::Debug for QueryHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle").finish_non_exhaustive()
    }
}
