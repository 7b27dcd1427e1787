//! Completion handles for background operations

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::{PhoneError, PhoneResult};

/// Result of work running on a background task
///
/// Awaiting yields the result. Dropping the handle, or calling
/// [`cancel`](PendingOperation::cancel), abandons it: the background task
/// runs to completion and its result is discarded.
#[must_use = "dropping a PendingOperation discards its result"]
pub struct PendingOperation<T> {
    operation: &'static str,
    rx: oneshot::Receiver<PhoneResult<T>>,
}

impl<T: Send + 'static> PendingOperation<T> {
    /// Run `work` on the current tokio runtime
    pub(crate) fn spawn<F>(operation: &'static str, work: F) -> PhoneResult<Self>
    where
        F: Future<Output = PhoneResult<T>> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| PhoneError::internal_error(format!("{} needs a tokio runtime: {}", operation, e)))?;

        let (tx, rx) = oneshot::channel();
        runtime.spawn(async move {
            let result = work.await;
            if tx.send(result).is_err() {
                tracing::debug!(operation, "Result discarded, caller abandoned the operation");
            }
        });

        Ok(Self { operation, rx })
    }
}

impl<T> PendingOperation<T> {
    /// Abandon the operation
    pub fn cancel(mut self) {
        self.rx.close();
    }

    /// Result if the operation has already finished
    pub fn try_result(&mut self) -> Option<PhoneResult<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(PhoneError::cancelled(self.operation))),
        }
    }
}

impl<T> Future for PendingOperation<T> {
    type Output = PhoneResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let operation = self.operation;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(PhoneError::cancelled(operation))),
            Poll::Pending => Poll::Pending,
        }
    }
}
