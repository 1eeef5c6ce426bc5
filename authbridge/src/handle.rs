//! Owned native resource handles.
//!
//! A [`NativeHandle`] owns one opaque native resource and releases it exactly
//! once: on [`dispose`](NativeHandle::dispose) or on drop, whichever comes
//! first. Every use of the raw value happens under a shared lock and the
//! release under the exclusive lock, so a release never overlaps a native
//! call made with the same handle.
//!
//! The kind parameter selects the native release function and gives each
//! kind its own type, so an account handle cannot be passed where an auth
//! result is expected.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, error};

use crate::diagnostics::{DiagnosticKind, TrackingId};
use crate::error_channel;
use crate::errors::{BridgeError, BridgeResult};
use crate::module::{ModuleRef, NativeModule};
use crate::native::NativeApi;
use crate::types::RawHandle;

/// Why a native release call failed.
#[derive(Debug)]
pub enum ReleaseFailure {
    /// The release returned a non-success error handle
    Native(RawHandle),
    /// The native layer did not recognise the handle
    Refused,
}

/// A kind of native resource.
pub trait ResourceKind: Send + Sync + 'static {
    /// Name used in logs and errors.
    const NAME: &'static str;

    /// Calls the native release function for this kind.
    fn release(api: &dyn NativeApi, raw: RawHandle) -> Result<(), ReleaseFailure>;
}

fn released_through(error: RawHandle) -> Result<(), ReleaseFailure> {
    if error.is_null() {
        Ok(())
    } else {
        Err(ReleaseFailure::Native(error))
    }
}

/// Native error handles.
#[derive(Debug)]
pub enum ErrorKind {}

impl ResourceKind for ErrorKind {
    const NAME: &'static str = "error";

    fn release(api: &dyn NativeApi, raw: RawHandle) -> Result<(), ReleaseFailure> {
        if api.release_error(raw) {
            Ok(())
        } else {
            Err(ReleaseFailure::Refused)
        }
    }
}

/// Async operation handles.
#[derive(Debug)]
pub enum AsyncKind {}

impl ResourceKind for AsyncKind {
    const NAME: &'static str = "async_operation";

    fn release(api: &dyn NativeApi, raw: RawHandle) -> Result<(), ReleaseFailure> {
        released_through(api.release_async_handle(raw))
    }
}

/// Auth parameter objects.
#[derive(Debug)]
pub enum AuthParametersKind {}

impl ResourceKind for AuthParametersKind {
    const NAME: &'static str = "auth_parameters";

    fn release(api: &dyn NativeApi, raw: RawHandle) -> Result<(), ReleaseFailure> {
        released_through(api.release_auth_parameters(raw))
    }
}

/// Accounts.
#[derive(Debug)]
pub enum AccountKind {}

impl ResourceKind for AccountKind {
    const NAME: &'static str = "account";

    fn release(api: &dyn NativeApi, raw: RawHandle) -> Result<(), ReleaseFailure> {
        released_through(api.release_account(raw))
    }
}

/// Auth results.
#[derive(Debug)]
pub enum AuthResultKind {}

impl ResourceKind for AuthResultKind {
    const NAME: &'static str = "auth_result";

    fn release(api: &dyn NativeApi, raw: RawHandle) -> Result<(), ReleaseFailure> {
        released_through(api.release_auth_result(raw))
    }
}

/// Sign-out results.
#[derive(Debug)]
pub enum SignOutResultKind {}

impl ResourceKind for SignOutResultKind {
    const NAME: &'static str = "sign_out_result";

    fn release(api: &dyn NativeApi, raw: RawHandle) -> Result<(), ReleaseFailure> {
        released_through(api.release_sign_out_result(raw))
    }
}

/// An owned native error handle.
pub type ErrorHandle = NativeHandle<ErrorKind>;

enum HandleState {
    Valid {
        raw: RawHandle,
        lease: Option<ModuleRef>,
        tracking: Option<TrackingId>,
    },
    Released,
}

/// Owner of one native resource of kind `K`.
pub struct NativeHandle<K: ResourceKind> {
    module: Arc<NativeModule>,
    state: RwLock<HandleState>,
    kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> NativeHandle<K> {
    /// Takes ownership of `raw`, holding `lease` until release. The lease
    /// must have been taken before the native call that produced `raw`.
    pub(crate) fn owned(lease: ModuleRef, raw: RawHandle) -> Self {
        let module = Arc::clone(lease.module());
        Self::with_lease(module, Some(lease), raw)
    }

    /// Takes ownership of `raw` without participating in the module count.
    /// Only the error handle returned by native startup is created this way.
    pub(crate) fn exempt(module: Arc<NativeModule>, raw: RawHandle) -> Self {
        Self::with_lease(module, None, raw)
    }

    fn with_lease(module: Arc<NativeModule>, lease: Option<ModuleRef>, raw: RawHandle) -> Self {
        let tracking = if raw.is_null() {
            None
        } else {
            module.diagnostics().track(K::NAME)
        };
        Self {
            module,
            state: RwLock::new(HandleState::Valid { raw, lease, tracking }),
            kind: PhantomData,
        }
    }

    /// The module this handle belongs to.
    pub const fn module(&self) -> &Arc<NativeModule> {
        &self.module
    }

    /// Whether the handle has been released.
    pub fn is_released(&self) -> bool {
        matches!(*self.state.read(), HandleState::Released)
    }

    /// Whether the handle is the null handle, i.e. a success error handle.
    pub fn is_null(&self) -> bool {
        matches!(*self.state.read(), HandleState::Valid { raw, .. } if raw.is_null())
    }

    /// Runs `f` with the raw value while holding off release.
    pub fn with_raw<R>(&self, f: impl FnOnce(RawHandle) -> BridgeResult<R>) -> BridgeResult<R> {
        let state = self.state.read();
        match *state {
            HandleState::Valid { raw, .. } => f(raw),
            HandleState::Released => Err(BridgeError::HandleReleased { kind: K::NAME }),
        }
    }

    /// Reads a string property of this resource.
    pub(crate) fn read_string(
        &self,
        getter: impl Fn(&dyn NativeApi, RawHandle, Option<&mut [u16]>, &mut usize) -> RawHandle,
    ) -> BridgeResult<String> {
        self.with_raw(|raw| {
            self.module
                .read_string(|api, buffer, size| getter(api, raw, buffer, size))
        })
    }

    /// Reads an owned output handle of this resource.
    pub(crate) fn read_handle<O: ResourceKind>(
        &self,
        getter: impl FnOnce(&dyn NativeApi, RawHandle, &mut RawHandle) -> RawHandle,
    ) -> BridgeResult<Option<NativeHandle<O>>> {
        self.with_raw(|raw| {
            self.module
                .call_with_output(|api, output| getter(api, raw, output))
        })
    }

    /// Releases the resource. Later calls do nothing and succeed.
    ///
    /// The handle is released even if the native release fails; the failure
    /// is recorded in the module diagnostics and returned.
    pub fn dispose(&self) -> BridgeResult<()> {
        let previous = mem::replace(&mut *self.state.write(), HandleState::Released);
        let HandleState::Valid { raw, lease, tracking } = previous else {
            return Ok(());
        };
        if let Some(id) = tracking {
            self.module.diagnostics().untrack(id);
        }

        let outcome = if raw.is_null() {
            Ok(())
        } else {
            debug!(kind = K::NAME, handle = ?raw, "releasing native handle");
            K::release(self.module.api(), raw).map_err(|failure| self.lifecycle_error(failure))
        };
        drop(lease);
        outcome
    }

    fn lifecycle_error(&self, failure: ReleaseFailure) -> BridgeError {
        let detail = match failure {
            ReleaseFailure::Refused => "native layer refused the release".to_string(),
            ReleaseFailure::Native(error) => match self.module.acquire() {
                Ok(lease) => match error_channel::decode(NativeHandle::owned(lease, error)) {
                    Ok(Some(value)) => value.to_string(),
                    Ok(None) => "release failed without detail".to_string(),
                    Err(e) => e.to_string(),
                },
                Err(e) => e.to_string(),
            },
        };
        error!(kind = K::NAME, %detail, "failed to release native handle");
        self.module
            .diagnostics()
            .record(DiagnosticKind::HandleLifecycle, format!("{}: {detail}", K::NAME));
        BridgeError::HandleLifecycle { kind: K::NAME, detail }
    }
}

impl<K: ResourceKind> Drop for NativeHandle<K> {
    fn drop(&mut self) {
        // Failures are already recorded and logged by dispose.
        let _ = self.dispose();
    }
}

impl<K: ResourceKind> fmt::Debug for NativeHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let raw = match *self.state.read() {
            HandleState::Valid { raw, .. } => Some(raw),
            HandleState::Released => None,
        };
        f.debug_struct("NativeHandle")
            .field("kind", &K::NAME)
            .field("raw", &raw)
            .finish()
    }
}
