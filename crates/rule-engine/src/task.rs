//! Single-slot holder for cancellable background tasks

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Holds at most one background task
///
/// Every task gets a child of the slot's parent token, so cancelling the
/// process root stops it as well. Starting a task cancels the one already
/// in the slot; dropping the slot cancels whatever is running.
#[derive(Debug)]
pub struct TaskSlot {
    name: String,
    parent: CancellationToken,
    current: Option<(CancellationToken, JoinHandle<()>)>,
}

impl TaskSlot {
    #[must_use]
    pub fn new(name: impl Into<String>, parent: CancellationToken) -> Self {
        Self {
            name: name.into(),
            parent,
            current: None,
        }
    }

    /// Cancel the running task, if any, and spawn a new one
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let token = self.parent.child_token();
        let handle = tokio::spawn(task(token.clone()));
        tracing::debug!("Started background task {}", self.name);
        self.current = Some((token, handle));
    }

    /// Cancel the running task, if any
    pub fn cancel(&mut self) {
        if let Some((token, _handle)) = self.current.take() {
            token.cancel();
            tracing::debug!("Cancelled background task {}", self.name);
        }
    }

    /// Whether a task is held and has not finished yet
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|(token, handle)| !token.is_cancelled() && !handle.is_finished())
    }
}

impl Drop for TaskSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}
