//! The authentication client.
//!
//! [`NativeClient`] issues the typed asynchronous operations. It holds a
//! module lease for its whole lifetime, so the native runtime stays started
//! between calls instead of cycling on every operation.
//!
//! Every operation returns a [`PendingOperation`] immediately. Failures to
//! start (a released argument, a synchronous native error) surface when the
//! operation is awaited, never as a panic or a missing future.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = NativeClient::new(module)?;
//! let params = client.create_auth_parameters(CLIENT_ID, AUTHORITY)?;
//! params.set_requested_scopes(["user.read"])?;
//!
//! let correlation_id = CorrelationId::generate();
//! let result = client
//!     .sign_in_silently(&params, &correlation_id)
//!     .cancel_on(shutdown.cancelled())
//!     .await?;
//! println!("token: {}", result.access_token()?);
//! ```

use std::sync::Arc;

use tracing::instrument;

use crate::account::Account;
use crate::bridge;
use crate::errors::{BridgeError, BridgeResult};
use crate::handle::NativeHandle;
use crate::module::{ModuleRef, NativeModule};
use crate::operation::PendingOperation;
use crate::parameters::AuthParameters;
use crate::results::{AuthResult, SignOutResult};
use crate::types::{CorrelationId, RawHandle, WindowHandle};

/// Issues authentication operations against one native module.
#[derive(Debug)]
pub struct NativeClient {
    module: Arc<NativeModule>,
    _lease: ModuleRef,
}

impl NativeClient {
    /// Creates a client, starting the native runtime if needed.
    pub fn new(module: Arc<NativeModule>) -> BridgeResult<Self> {
        let lease = module.acquire()?;
        Ok(Self { module, _lease: lease })
    }

    /// The module this client issues calls to.
    pub const fn module(&self) -> &Arc<NativeModule> {
        &self.module
    }

    /// Creates auth parameters for a client id and authority.
    pub fn create_auth_parameters(&self, client_id: &str, authority: &str) -> BridgeResult<AuthParameters> {
        AuthParameters::new(&self.module, client_id, authority)
    }

    /// Signs in, silently if possible and interactively otherwise.
    #[instrument(skip(self, params, correlation_id), fields(correlation_id = %correlation_id))]
    pub fn sign_in(
        &self,
        parent: WindowHandle,
        params: &AuthParameters,
        correlation_id: &CorrelationId,
    ) -> PendingOperation<AuthResult> {
        started(params.handle().with_raw(|params| {
            Ok(bridge::invoke(
                &self.module,
                "sign_in",
                |api, routine, token, async_handle| {
                    api.sign_in(parent, params, correlation_id, routine, token, async_handle)
                },
                auth_result,
            ))
        }))
    }

    /// Signs in without user interaction.
    #[instrument(skip(self, params, correlation_id), fields(correlation_id = %correlation_id))]
    pub fn sign_in_silently(
        &self,
        params: &AuthParameters,
        correlation_id: &CorrelationId,
    ) -> PendingOperation<AuthResult> {
        started(params.handle().with_raw(|params| {
            Ok(bridge::invoke(
                &self.module,
                "sign_in_silently",
                |api, routine, token, async_handle| {
                    api.sign_in_silently(params, correlation_id, routine, token, async_handle)
                },
                auth_result,
            ))
        }))
    }

    /// Signs in with user interaction. `account_hint` pre-fills the account
    /// picker and may be empty.
    #[instrument(skip(self, params, correlation_id), fields(correlation_id = %correlation_id))]
    pub fn sign_in_interactively(
        &self,
        parent: WindowHandle,
        params: &AuthParameters,
        correlation_id: &CorrelationId,
        account_hint: &str,
    ) -> PendingOperation<AuthResult> {
        started(params.handle().with_raw(|params| {
            Ok(bridge::invoke(
                &self.module,
                "sign_in_interactively",
                |api, routine, token, async_handle| {
                    api.sign_in_interactively(
                        parent,
                        params,
                        correlation_id,
                        account_hint,
                        routine,
                        token,
                        async_handle,
                    )
                },
                auth_result,
            ))
        }))
    }

    /// Acquires a token for `account` without user interaction.
    #[instrument(skip(self, params, account, correlation_id), fields(correlation_id = %correlation_id))]
    pub fn acquire_token_silently(
        &self,
        params: &AuthParameters,
        correlation_id: &CorrelationId,
        account: &Account,
    ) -> PendingOperation<AuthResult> {
        started(with_both(params, account, |params, account| {
            bridge::invoke(
                &self.module,
                "acquire_token_silently",
                |api, routine, token, async_handle| {
                    api.acquire_token_silently(params, correlation_id, account, routine, token, async_handle)
                },
                auth_result,
            )
        }))
    }

    /// Acquires a token for `account` with user interaction.
    #[instrument(skip(self, params, account, correlation_id), fields(correlation_id = %correlation_id))]
    pub fn acquire_token_interactively(
        &self,
        parent: WindowHandle,
        params: &AuthParameters,
        correlation_id: &CorrelationId,
        account: &Account,
    ) -> PendingOperation<AuthResult> {
        started(with_both(params, account, |params, account| {
            bridge::invoke(
                &self.module,
                "acquire_token_interactively",
                |api, routine, token, async_handle| {
                    api.acquire_token_interactively(
                        parent,
                        params,
                        correlation_id,
                        account,
                        routine,
                        token,
                        async_handle,
                    )
                },
                auth_result,
            )
        }))
    }

    /// Reads a cached account by id.
    ///
    /// Resolves to `None` if the native runtime found no such account. If the
    /// lookup itself failed, the error carried by the native result is
    /// returned as [`BridgeError::Native`].
    #[instrument(skip(self, correlation_id), fields(correlation_id = %correlation_id))]
    pub fn read_account_by_id(
        &self,
        account_id: &str,
        correlation_id: &CorrelationId,
    ) -> PendingOperation<Option<Account>> {
        bridge::invoke(
            &self.module,
            "read_account_by_id",
            |api, routine, token, async_handle| {
                api.read_account_by_id(account_id, correlation_id, routine, token, async_handle)
            },
            account_from_result,
        )
    }

    /// Signs `account` out of `client_id` without user interaction.
    #[instrument(skip(self, account, correlation_id), fields(correlation_id = %correlation_id))]
    pub fn sign_out_silently(
        &self,
        client_id: &str,
        correlation_id: &CorrelationId,
        account: &Account,
    ) -> PendingOperation<SignOutResult> {
        started(account.handle().with_raw(|account| {
            Ok(bridge::invoke(
                &self.module,
                "sign_out_silently",
                |api, routine, token, async_handle| {
                    api.sign_out_silently(client_id, correlation_id, account, routine, token, async_handle)
                },
                |lease, raw| Ok(SignOutResult::from_handle(NativeHandle::owned(lease, raw))),
            ))
        }))
    }
}

fn started<T>(issued: BridgeResult<PendingOperation<T>>) -> PendingOperation<T> {
    issued.unwrap_or_else(PendingOperation::failed)
}

fn with_both<T>(
    params: &AuthParameters,
    account: &Account,
    issue: impl FnOnce(RawHandle, RawHandle) -> PendingOperation<T>,
) -> BridgeResult<PendingOperation<T>> {
    params
        .handle()
        .with_raw(|params| account.handle().with_raw(|account| Ok(issue(params, account))))
}

fn auth_result(lease: ModuleRef, raw: RawHandle) -> BridgeResult<AuthResult> {
    Ok(AuthResult::from_handle(NativeHandle::owned(lease, raw)))
}

fn account_from_result(lease: ModuleRef, raw: RawHandle) -> BridgeResult<Option<Account>> {
    let result = AuthResult::from_handle(NativeHandle::owned(lease, raw));
    if let Some(error) = result.error()?.cloned() {
        drop(result);
        return Err(BridgeError::Native(error));
    }
    result.into_account()
}
