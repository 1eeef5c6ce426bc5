//! The callback bridge.
//!
//! Native asynchronous entry points take a completion routine and a context
//! value, and call the routine later from a thread of their choosing. The
//! bridge hands them [`completion_trampoline`] and a fresh
//! [`CompletionToken`], and parks the continuation for the call in a
//! process-wide table under that token. The trampoline removes the
//! continuation atomically, so a call resolves at most once no matter how
//! often the native side fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error_channel;
use crate::errors::{BridgeError, BridgeResult};
use crate::handle::NativeHandle;
use crate::module::{ModuleRef, NativeModule};
use crate::native::NativeApi;
use crate::operation::{AsyncOperation, Completion, PendingOperation};
use crate::types::{CompletionRoutine, CompletionToken, RawHandle};

trait Continuation: Send + Sync {
    fn resolve(self: Box<Self>, result: RawHandle);
    fn reject(self: Box<Self>, error: BridgeError);
}

struct Waiting<T, F> {
    operation: &'static str,
    // Keeps the module started until the call completes; handed to the
    // result handle.
    lease: ModuleRef,
    convert: F,
    sender: oneshot::Sender<BridgeResult<T>>,
}

impl<T, F> Continuation for Waiting<T, F>
where
    T: Send + 'static,
    F: FnOnce(ModuleRef, RawHandle) -> BridgeResult<T> + Send + Sync + 'static,
{
    fn resolve(self: Box<Self>, result: RawHandle) {
        let Self {
            operation,
            lease,
            convert,
            sender,
        } = *self;
        let converted = if result.is_null() {
            Err(lease
                .module()
                .protocol_violation(format!("{operation} completed without a result handle")))
        } else {
            convert(lease, result)
        };
        debug!(operation, success = converted.is_ok(), "native operation completed");
        if sender.send(converted).is_err() {
            // The result is dropped here, releasing its handle.
            debug!(operation, "completion arrived after the caller went away");
        }
    }

    fn reject(self: Box<Self>, error: BridgeError) {
        let _ = self.sender.send(Err(error));
    }
}

static PENDING: Lazy<DashMap<CompletionToken, Box<dyn Continuation>>> = Lazy::new(DashMap::new);
static ORPHANED: AtomicU64 = AtomicU64::new(0);

/// The completion routine handed to every native asynchronous entry point.
pub fn completion_trampoline(result: RawHandle, token: CompletionToken) {
    match PENDING.remove(&token) {
        Some((_, continuation)) => continuation.resolve(result),
        None => {
            ORPHANED.fetch_add(1, Ordering::Relaxed);
            warn!(%token, ?result, "completion for unknown or already completed call ignored");
        }
    }
}

/// Number of calls waiting for their completion, process-wide.
pub fn pending_completions() -> usize {
    PENDING.len()
}

/// Number of completions that found no waiting call, process-wide.
pub fn orphaned_completions() -> u64 {
    ORPHANED.load(Ordering::Relaxed)
}

fn leases(module: &Arc<NativeModule>) -> BridgeResult<[ModuleRef; 3]> {
    Ok([module.acquire()?, module.acquire()?, module.acquire()?])
}

/// Issues a native asynchronous call.
///
/// `entry` receives the routine, the token and the slot for the async
/// handle, and returns the error handle of the immediate outcome. `convert`
/// turns the raw result handle into the typed result; it receives the lease
/// that kept the module started during the call.
pub(crate) fn invoke<T, E, F>(
    module: &Arc<NativeModule>,
    operation: &'static str,
    entry: E,
    convert: F,
) -> PendingOperation<T>
where
    T: Send + 'static,
    E: FnOnce(&dyn NativeApi, CompletionRoutine, CompletionToken, &mut RawHandle) -> RawHandle,
    F: FnOnce(ModuleRef, RawHandle) -> BridgeResult<T> + Send + Sync + 'static,
{
    let [lease, error_lease, async_lease] = match leases(module) {
        Ok(leases) => leases,
        Err(e) => return PendingOperation::failed(e),
    };

    let (sender, receiver) = oneshot::channel();
    let token = CompletionToken::next();
    PENDING.insert(
        token,
        Box::new(Waiting {
            operation,
            lease,
            convert,
            sender,
        }),
    );
    debug!(operation, %token, "issuing native operation");

    let mut async_raw = RawHandle::NULL;
    let error_raw = entry(module.api(), completion_trampoline, token, &mut async_raw);
    let async_handle = NativeHandle::owned(async_lease, async_raw);

    let failure = match error_channel::check(NativeHandle::owned(error_lease, error_raw)) {
        Err(e) => e,
        Ok(()) if async_raw.is_null() => {
            module.protocol_violation(format!("{operation} started without an async handle"))
        }
        Ok(()) => {
            return PendingOperation::new(Completion::new(receiver), Some(AsyncOperation::new(async_handle)));
        }
    };

    debug!(operation, %token, error = %failure, "native operation failed to start");
    if let Some((_, continuation)) = PENDING.remove(&token) {
        continuation.reject(failure);
    }
    PendingOperation::new(Completion::new(receiver), None)
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;

    #[test]
    #[traced_test]
    fn completion_for_unknown_token_is_counted_and_logged() {
        let before = orphaned_completions();

        completion_trampoline(RawHandle::new(0x40), CompletionToken::next());

        assert!(orphaned_completions() > before);
        assert!(logs_contain("completion for unknown or already completed call ignored"));
    }
}
