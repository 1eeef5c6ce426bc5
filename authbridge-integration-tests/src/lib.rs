//! Integration tests for `authbridge`
//!
//! The tests in `tests/` drive the bridge against the in-memory runtime from
//! `authbridge-memory`. This library holds the fixture they share.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use authbridge::{AuthParameters, BridgeConfig, BridgeResult, CorrelationId, NativeClient, NativeModule};
use authbridge_memory::{CompletionMode, InMemoryNativeRuntime};

/// Client id used by every fixture.
pub const CLIENT_ID: &str = "4b0db8c2-9f26-4417-8bde-3f0e3656f8e0";

/// Authority used by every fixture.
pub const AUTHORITY: &str = "https://login.example.com/common";

/// A runtime together with a module over it.
pub struct Harness {
    /// The simulated runtime, for scripting and inspection
    pub runtime: InMemoryNativeRuntime,
    /// The module the bridge uses
    pub module: Arc<NativeModule>,
}

impl Harness {
    /// A manual-completion runtime with diagnostic configuration.
    pub fn new() -> Self {
        Self::with_mode(CompletionMode::Manual)
    }

    /// A runtime with the given completion mode.
    pub fn with_mode(mode: CompletionMode) -> Self {
        Self::with_config(mode, BridgeConfig::diagnostic())
    }

    /// A runtime with the given completion mode and module configuration.
    pub fn with_config(mode: CompletionMode, config: BridgeConfig) -> Self {
        let runtime = InMemoryNativeRuntime::with_mode(mode);
        let module = NativeModule::with_config(Arc::new(runtime.clone()), config);
        Self { runtime, module }
    }

    /// A client over the module.
    pub fn client(&self) -> BridgeResult<NativeClient> {
        NativeClient::new(Arc::clone(&self.module))
    }

    /// Parameters with the fixture client id and authority.
    pub fn parameters(&self, client: &NativeClient) -> BridgeResult<AuthParameters> {
        client.create_auth_parameters(CLIENT_ID, AUTHORITY)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// A correlation id from a literal.
///
/// # Panics
///
/// Panics if `value` is blank.
pub fn correlation_id(value: &str) -> CorrelationId {
    CorrelationId::try_new(value).expect("fixture correlation ids are not blank")
}
