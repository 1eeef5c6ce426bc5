//! The native layer contract.
//!
//! [`NativeApi`] is everything the bridge consumes from the native
//! authentication runtime. A binding to the real library implements it by
//! forwarding to the library's exports; `authbridge-memory` implements it with
//! an in-process simulation.
//!
//! Conventions shared by every method:
//!
//! - Methods returning [`RawHandle`] return an *error handle*. The null handle
//!   means success; anything else is a native error that the bridge decodes
//!   and releases.
//! - `out` parameters are written only on success. The bridge takes ownership
//!   of every non-null handle written to them.
//! - String getters take an optional UTF-16 buffer and a size in UTF-16 units
//!   including the terminator. Called without a buffer they report the
//!   required size together with an `InsufficientBuffer` error; an empty
//!   string is reported as success with size 0.
//! - Asynchronous entry points take the completion routine and a token, and
//!   write the async operation handle to `async_handle`. On success the
//!   routine is invoked exactly once, later, from any thread.

use crate::types::{CompletionRoutine, CompletionToken, RawHandle, WindowHandle};

/// The native authentication runtime.
pub trait NativeApi: Send + Sync + 'static {
    // Module lifecycle

    /// Starts the native runtime.
    fn startup(&self) -> RawHandle;

    /// Shuts the native runtime down.
    fn shutdown(&self);

    // Error handles

    /// Releases an error handle. Returns `false` if the handle was not live.
    fn release_error(&self, error: RawHandle) -> bool;

    /// Reads the response status of an error.
    fn get_status(&self, error: RawHandle, status: &mut i32) -> RawHandle;

    /// Reads the platform error code of an error.
    fn get_error_code(&self, error: RawHandle, code: &mut i32) -> RawHandle;

    /// Reads the tag of an error.
    fn get_tag(&self, error: RawHandle, tag: &mut i32) -> RawHandle;

    /// Reads the context string of an error.
    fn get_context(&self, error: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle;

    // Async operation handles

    /// Releases an async operation handle.
    fn release_async_handle(&self, async_handle: RawHandle) -> RawHandle;

    /// Requests cancellation of an outstanding operation.
    fn cancel_async_operation(&self, async_handle: RawHandle) -> RawHandle;

    // Auth parameters

    /// Creates an auth parameters object.
    fn create_auth_parameters(&self, client_id: &str, authority: &str, out: &mut RawHandle) -> RawHandle;

    /// Releases an auth parameters object.
    fn release_auth_parameters(&self, params: RawHandle) -> RawHandle;

    /// Sets the space-separated requested scopes.
    fn set_requested_scopes(&self, params: RawHandle, scopes: &str) -> RawHandle;

    /// Sets the redirect URI.
    fn set_redirect_uri(&self, params: RawHandle, redirect_uri: &str) -> RawHandle;

    /// Sets the decoded claims JSON.
    fn set_decoded_claims(&self, params: RawHandle, claims: &str) -> RawHandle;

    /// Sets the access token the request should renew.
    fn set_access_token_to_renew(&self, params: RawHandle, access_token: &str) -> RawHandle;

    /// Sets an additional named parameter.
    fn set_additional_parameter(&self, params: RawHandle, key: &str, value: &str) -> RawHandle;

    // Accounts

    /// Releases an account.
    fn release_account(&self, account: RawHandle) -> RawHandle;

    /// Reads the account id.
    fn get_account_id(&self, account: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle;

    /// Reads the account client info.
    fn get_client_info(&self, account: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle;

    /// Reads a named account property.
    fn get_account_property(
        &self,
        account: RawHandle,
        key: &str,
        buffer: Option<&mut [u16]>,
        size: &mut usize,
    ) -> RawHandle;

    // Auth results

    /// Releases an auth result.
    fn release_auth_result(&self, result: RawHandle) -> RawHandle;

    /// Reads the account of an auth result; writes null when there is none.
    fn get_account(&self, result: RawHandle, account: &mut RawHandle) -> RawHandle;

    /// Reads the access token.
    fn get_access_token(&self, result: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle;

    /// Reads the raw id token.
    fn get_raw_id_token(&self, result: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle;

    /// Reads the granted scopes.
    fn get_granted_scopes(&self, result: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle;

    /// Reads the expiry as seconds since the Unix epoch.
    fn get_expires_on(&self, result: RawHandle, expires_on: &mut i64) -> RawHandle;

    /// Reads the embedded error; writes null when the result succeeded.
    fn get_error(&self, result: RawHandle, error: &mut RawHandle) -> RawHandle;

    /// Reads the telemetry data.
    fn get_telemetry_data(&self, result: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle;

    // Sign-out results

    /// Releases a sign-out result.
    fn release_sign_out_result(&self, result: RawHandle) -> RawHandle;

    /// Reads the embedded error; writes null when sign-out succeeded.
    fn get_sign_out_error(&self, result: RawHandle, error: &mut RawHandle) -> RawHandle;

    /// Reads the sign-out telemetry data.
    fn get_sign_out_telemetry_data(
        &self,
        result: RawHandle,
        buffer: Option<&mut [u16]>,
        size: &mut usize,
    ) -> RawHandle;

    // Asynchronous entry points. Auth-result shaped unless noted.

    /// Signs in, silently if possible.
    fn sign_in(
        &self,
        parent: WindowHandle,
        params: RawHandle,
        correlation_id: &str,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle;

    /// Signs in without user interaction.
    fn sign_in_silently(
        &self,
        params: RawHandle,
        correlation_id: &str,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle;

    /// Signs in with user interaction.
    fn sign_in_interactively(
        &self,
        parent: WindowHandle,
        params: RawHandle,
        correlation_id: &str,
        account_hint: &str,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle;

    /// Acquires a token for an account without user interaction.
    fn acquire_token_silently(
        &self,
        params: RawHandle,
        correlation_id: &str,
        account: RawHandle,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle;

    /// Acquires a token for an account with user interaction.
    fn acquire_token_interactively(
        &self,
        parent: WindowHandle,
        params: RawHandle,
        correlation_id: &str,
        account: RawHandle,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle;

    /// Reads an account by id. Completes with an auth result carrying it.
    fn read_account_by_id(
        &self,
        account_id: &str,
        correlation_id: &str,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle;

    /// Signs an account out. Completes with a sign-out result.
    fn sign_out_silently(
        &self,
        client_id: &str,
        correlation_id: &str,
        account: RawHandle,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle;
}
