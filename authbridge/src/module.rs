//! The native module and its reference count.
//!
//! The native runtime must be started before its first use and shut down
//! after its last. [`NativeModule`] gates both transitions behind a single
//! counter: every live native handle, every outstanding call and every
//! [`NativeClient`](crate::NativeClient) holds a [`ModuleRef`] lease. Taking
//! the first lease starts the runtime; returning the last one shuts it down.

use std::cell::Cell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::ReentrantMutex;
use tracing::{debug, error};

use crate::config::BridgeConfig;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error_channel;
use crate::errors::{BridgeError, BridgeResult};
use crate::handle::{ErrorHandle, NativeHandle, ResourceKind};
use crate::native::NativeApi;
use crate::platform::NativeLibrary;
use crate::strings;
use crate::types::RawHandle;

/// One loaded native runtime.
pub struct NativeModule {
    api: Arc<dyn NativeApi>,
    library: Option<&'static NativeLibrary>,
    // Re-entrant: decoding a startup error creates counted handles on the
    // thread that holds the lock.
    count: ReentrantMutex<Cell<usize>>,
    diagnostics: Diagnostics,
}

impl NativeModule {
    /// Wraps a native runtime binding with the default configuration.
    pub fn new(api: Arc<dyn NativeApi>) -> Arc<Self> {
        Self::with_config(api, BridgeConfig::default())
    }

    /// Wraps a native runtime binding.
    pub fn with_config(api: Arc<dyn NativeApi>, config: BridgeConfig) -> Arc<Self> {
        Arc::new(Self {
            api,
            library: None,
            count: ReentrantMutex::new(Cell::new(0)),
            diagnostics: Diagnostics::new(config),
        })
    }

    /// Selects the native library for the running architecture and hands it
    /// to `loader`, which produces the binding.
    pub fn for_current_platform<L>(loader: L, config: BridgeConfig) -> BridgeResult<Arc<Self>>
    where
        L: FnOnce(&'static NativeLibrary) -> BridgeResult<Arc<dyn NativeApi>>,
    {
        let library = NativeLibrary::current()?;
        debug!(library = library.name, architecture = %library.architecture, "loading native library");
        let api = loader(library)?;
        Ok(Arc::new(Self {
            api,
            library: Some(library),
            count: ReentrantMutex::new(Cell::new(0)),
            diagnostics: Diagnostics::new(config),
        }))
    }

    /// The library this module was loaded from, if it was selected by
    /// [`for_current_platform`](Self::for_current_platform).
    pub const fn library(&self) -> Option<&'static NativeLibrary> {
        self.library
    }

    /// The native binding.
    pub fn api(&self) -> &dyn NativeApi {
        self.api.as_ref()
    }

    /// The diagnostic sink of this module.
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Number of outstanding leases.
    pub fn handle_count(&self) -> usize {
        self.count.lock().get()
    }

    /// Whether the native runtime is currently started.
    pub fn is_started(&self) -> bool {
        self.handle_count() > 0
    }

    /// Takes a lease, starting the native runtime if this is the first one.
    pub fn acquire(self: &Arc<Self>) -> BridgeResult<ModuleRef> {
        self.add_ref()?;
        Ok(ModuleRef {
            module: Arc::clone(self),
        })
    }

    /// Fails if any lease is still outstanding, or, in strict mode, if a
    /// release or shutdown failure is on record.
    pub fn verify_handle_leaks(&self) -> BridgeResult<()> {
        let count = self.handle_count();
        if count > 0 {
            return Err(BridgeError::HandleLeak {
                count,
                kinds: self.diagnostics.live_kinds(),
            });
        }
        let failures = self.diagnostics.lifecycle_failures();
        if self.diagnostics.config().strict_lifecycle && failures > 0 {
            return Err(BridgeError::HandleLifecycle {
                kind: "module",
                detail: format!("{failures} release failures on record"),
            });
        }
        Ok(())
    }

    fn add_ref(self: &Arc<Self>) -> BridgeResult<()> {
        let count = self.count.lock();
        let previous = count.get();
        count.set(previous + 1);
        if previous > 0 {
            return Ok(());
        }

        debug!("starting native module");
        let raw = self.api.startup();
        if raw.is_null() {
            return Ok(());
        }

        // The startup error handle must not take a lease of its own.
        let failure = error_channel::check(ErrorHandle::exempt(Arc::clone(self), raw));
        count.set(count.get() - 1);
        if let Err(e) = &failure {
            error!(error = %e, "native module startup failed");
        }
        failure
    }

    fn remove_ref(&self) {
        let count = self.count.lock();
        match count.get() {
            0 => {
                error!("module reference returned while none were outstanding");
                self.diagnostics
                    .record(DiagnosticKind::RefCountUnderflow, "remove_ref called at zero");
            }
            1 => {
                count.set(0);
                debug!("shutting down native module");
                let api = &self.api;
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| api.shutdown())) {
                    let detail = panic_message(payload.as_ref());
                    error!(%detail, "native module shutdown failed");
                    self.diagnostics.record(DiagnosticKind::ShutdownFailure, detail);
                }
            }
            n => count.set(n - 1),
        }
    }

    /// Issues a native call returning an error handle. The lease for that
    /// handle is taken before the call.
    pub(crate) fn issue(self: &Arc<Self>, call: impl FnOnce(&dyn NativeApi) -> RawHandle) -> BridgeResult<ErrorHandle> {
        let lease = self.acquire()?;
        let raw = call(self.api());
        Ok(NativeHandle::owned(lease, raw))
    }

    /// Issues a native call and fails with the decoded error, if any.
    pub(crate) fn call(self: &Arc<Self>, call: impl FnOnce(&dyn NativeApi) -> RawHandle) -> BridgeResult<()> {
        error_channel::check(self.issue(call)?)
    }

    /// Issues a native call that writes one output handle. A null output on
    /// success yields `None`.
    pub(crate) fn call_with_output<K: ResourceKind>(
        self: &Arc<Self>,
        call: impl FnOnce(&dyn NativeApi, &mut RawHandle) -> RawHandle,
    ) -> BridgeResult<Option<NativeHandle<K>>> {
        let error_lease = self.acquire()?;
        let output_lease = self.acquire()?;
        let mut output = RawHandle::NULL;
        let error = NativeHandle::owned(error_lease, call(self.api(), &mut output));
        // Owned before checking so a stray output is released on failure.
        let handle = NativeHandle::<K>::owned(output_lease, output);
        error_channel::check(error)?;
        Ok((!output.is_null()).then_some(handle))
    }

    /// Like [`call_with_output`](Self::call_with_output), but a missing output
    /// is a protocol violation.
    pub(crate) fn call_with_required_output<K: ResourceKind>(
        self: &Arc<Self>,
        call: impl FnOnce(&dyn NativeApi, &mut RawHandle) -> RawHandle,
    ) -> BridgeResult<NativeHandle<K>> {
        match self.call_with_output(call)? {
            Some(handle) => Ok(handle),
            None => Err(self.protocol_violation(format!("native call returned no {} handle", K::NAME))),
        }
    }

    /// Reads a string with the two-call buffer convention.
    pub(crate) fn read_string(
        self: &Arc<Self>,
        getter: impl FnMut(&dyn NativeApi, Option<&mut [u16]>, &mut usize) -> RawHandle,
    ) -> BridgeResult<String> {
        strings::read_string(self, getter)
    }

    /// Records and logs a protocol violation, returning it as an error.
    pub(crate) fn protocol_violation(&self, detail: String) -> BridgeError {
        error!(%detail, "native protocol violation");
        self.diagnostics.record(DiagnosticKind::ProtocolViolation, detail.clone());
        BridgeError::ProtocolViolation(detail)
    }
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("library", &self.library)
            .field("handle_count", &self.handle_count())
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "shutdown panicked".to_string())
}

/// A lease on a started native module.
///
/// Dropping the lease returns it; dropping the last lease shuts the native
/// runtime down.
#[must_use = "dropping a module lease immediately returns it"]
pub struct ModuleRef {
    module: Arc<NativeModule>,
}

impl ModuleRef {
    /// The module this lease belongs to.
    pub const fn module(&self) -> &Arc<NativeModule> {
        &self.module
    }
}

impl fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRef").finish_non_exhaustive()
    }
}

impl Drop for ModuleRef {
    fn drop(&mut self) {
        self.module.remove_ref();
    }
}
