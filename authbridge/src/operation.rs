//! Outstanding native operations.
//!
//! [`PendingOperation`] is what every asynchronous bridge call returns: a
//! future for the typed result plus the [`AsyncOperation`] handle through
//! which the native call can be cancelled. The two have independent
//! lifetimes; disposing the handle never drops the result, and a completion
//! that arrives after cancellation is still delivered.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::errors::{BridgeError, BridgeResult};
use crate::handle::{AsyncKind, NativeHandle};

/// Cancellable handle to one outstanding native call.
#[derive(Debug)]
pub struct AsyncOperation {
    handle: NativeHandle<AsyncKind>,
}

impl AsyncOperation {
    pub(crate) const fn new(handle: NativeHandle<AsyncKind>) -> Self {
        Self { handle }
    }

    /// Asks the native runtime to cancel the call. Best effort: does nothing
    /// once the handle is released, and the call may still complete normally.
    pub fn cancel(&self) -> BridgeResult<()> {
        let module = self.handle.module();
        match self
            .handle
            .with_raw(|raw| module.call(|api| api.cancel_async_operation(raw)))
        {
            Ok(()) => {
                debug!("requested cancellation of native operation");
                Ok(())
            }
            Err(BridgeError::HandleReleased { .. }) => Ok(()),
            Err(e) => {
                warn!(error = %e, "cancellation request failed");
                Err(e)
            }
        }
    }

    /// Releases the native handle. Safe to call at any time, more than once,
    /// and from several threads.
    pub fn dispose(&self) -> BridgeResult<()> {
        self.handle.dispose()
    }

    /// Whether the handle has been released.
    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }
}

/// The eventual result of a native call, without its cancellation handle.
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct Completion<T> {
    receiver: oneshot::Receiver<BridgeResult<T>>,
}

impl<T> Completion<T> {
    pub(crate) const fn new(receiver: oneshot::Receiver<BridgeResult<T>>) -> Self {
        Self { receiver }
    }

    /// A completion that has already failed.
    pub fn failed(error: BridgeError) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Err(error));
        Self::new(receiver)
    }
}

impl<T> Unpin for Completion<T> {}

impl<T> Future for Completion<T> {
    type Output = BridgeResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(BridgeError::OperationAbandoned)))
    }
}

/// A native call in flight.
///
/// Resolves to the converted result, or to the native error. The async
/// handle is released when the future resolves, or earlier through
/// [`cancel`](Self::cancel) or [`detach`](Self::detach).
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct PendingOperation<T> {
    completion: Completion<T>,
    operation: Option<AsyncOperation>,
}

impl<T> PendingOperation<T> {
    pub(crate) const fn new(completion: Completion<T>, operation: Option<AsyncOperation>) -> Self {
        Self {
            completion,
            operation,
        }
    }

    /// An operation that failed before reaching the native layer.
    pub fn failed(error: BridgeError) -> Self {
        Self::new(Completion::failed(error), None)
    }

    /// The async handle. `None` if the call failed synchronously or the handle
    /// was already released.
    pub const fn async_handle(&self) -> Option<&AsyncOperation> {
        self.operation.as_ref()
    }

    /// Requests cancellation and releases the async handle at once. The
    /// future stays pending until the native runtime completes the call.
    pub fn cancel(&mut self) {
        if let Some(operation) = self.operation.take() {
            // Failures are logged by cancel; the handle is released regardless.
            let _ = operation.cancel();
        }
    }

    /// Releases the async handle and returns the bare result future.
    pub fn detach(mut self) -> Completion<T> {
        self.operation = None;
        self.completion
    }

    /// Awaits the result, cancelling the native call if `signal` completes
    /// first. After cancellation the completion is still awaited.
    pub async fn cancel_on<S>(mut self, signal: S) -> BridgeResult<T>
    where
        S: Future<Output = ()>,
    {
        tokio::select! {
            result = &mut self => return result,
            () = signal => {}
        }
        debug!("cancellation signal fired");
        self.cancel();
        self.await
    }
}

impl<T> Unpin for PendingOperation<T> {}

impl<T> Future for PendingOperation<T> {
    type Output = BridgeResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.completion).poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };
        self.operation = None;
        Poll::Ready(result)
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use tokio_test::{assert_pending, assert_ready, task};

    use super::*;

    #[test]
    fn failed_operation_is_ready_without_a_handle() {
        let pending = PendingOperation::<()>::failed(BridgeError::OperationAbandoned);

        assert!(pending.async_handle().is_none());
        let outcome = pending.now_or_never().expect("failed operations are ready at once");
        assert!(matches!(outcome, Err(BridgeError::OperationAbandoned)));
    }

    #[test]
    fn completion_resolves_when_the_sender_delivers() {
        let (sender, receiver) = oneshot::channel();
        let mut completion = task::spawn(Completion::<u32>::new(receiver));

        assert_pending!(completion.poll());
        sender.send(Ok(7)).unwrap();

        assert!(completion.is_woken());
        assert_eq!(assert_ready!(completion.poll()).unwrap(), 7);
    }

    #[test]
    fn dropped_sender_abandons_the_completion() {
        let (sender, receiver) = oneshot::channel::<BridgeResult<u32>>();
        let mut completion = task::spawn(Completion::new(receiver));
        assert_pending!(completion.poll());

        drop(sender);

        assert!(matches!(
            assert_ready!(completion.poll()),
            Err(BridgeError::OperationAbandoned)
        ));
    }

    #[tokio::test]
    async fn detached_completion_still_resolves() {
        let (sender, receiver) = oneshot::channel();
        let pending = PendingOperation::new(Completion::<&str>::new(receiver), None);

        let completion = pending.detach();
        sender.send(Ok("done")).unwrap();

        assert_eq!(completion.await.unwrap(), "done");
    }
}
