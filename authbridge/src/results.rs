//! Operation results.
//!
//! Both result types own one native handle and decode their fields lazily,
//! caching each on first access. A result that carries an error is still a
//! successful completion of the call; check [`AuthResult::error`].

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;

use crate::account::Account;
use crate::error_channel;
use crate::errors::{BridgeResult, ErrorValue};
use crate::handle::{AccountKind, AuthResultKind, ErrorKind, NativeHandle, SignOutResultKind};

/// Result of a sign-in or token acquisition.
#[derive(Debug)]
pub struct AuthResult {
    handle: NativeHandle<AuthResultKind>,
    account: OnceCell<Option<Account>>,
    access_token: OnceCell<String>,
    id_token: OnceCell<String>,
    granted_scopes: OnceCell<String>,
    expires_on: OnceCell<DateTime<Utc>>,
    error: OnceCell<Option<ErrorValue>>,
    telemetry: OnceCell<String>,
}

impl AuthResult {
    pub(crate) fn from_handle(handle: NativeHandle<AuthResultKind>) -> Self {
        Self {
            handle,
            account: OnceCell::new(),
            access_token: OnceCell::new(),
            id_token: OnceCell::new(),
            granted_scopes: OnceCell::new(),
            expires_on: OnceCell::new(),
            error: OnceCell::new(),
            telemetry: OnceCell::new(),
        }
    }

    /// Whether the result carries no error.
    pub fn is_success(&self) -> BridgeResult<bool> {
        Ok(self.error()?.is_none())
    }

    /// The error the operation ended with, if any.
    pub fn error(&self) -> BridgeResult<Option<&ErrorValue>> {
        self.error
            .get_or_try_init(|| {
                match self
                    .handle
                    .read_handle::<ErrorKind>(|api, raw, out| api.get_error(raw, out))?
                {
                    Some(error) => error_channel::decode(error),
                    None => Ok(None),
                }
            })
            .map(Option::as_ref)
    }

    /// The signed-in account, if the result has one.
    pub fn account(&self) -> BridgeResult<Option<&Account>> {
        self.account
            .get_or_try_init(|| {
                let handle = self
                    .handle
                    .read_handle::<AccountKind>(|api, raw, out| api.get_account(raw, out))?;
                Ok(handle.map(Account::from_handle))
            })
            .map(Option::as_ref)
    }

    /// Takes the account out of the result, releasing the result itself.
    pub fn into_account(mut self) -> BridgeResult<Option<Account>> {
        self.account()?;
        Ok(self.account.take().flatten())
    }

    /// The access token.
    pub fn access_token(&self) -> BridgeResult<&str> {
        self.access_token
            .get_or_try_init(|| {
                self.handle
                    .read_string(|api, raw, buffer, size| api.get_access_token(raw, buffer, size))
            })
            .map(String::as_str)
    }

    /// The raw id token.
    pub fn id_token(&self) -> BridgeResult<&str> {
        self.id_token
            .get_or_try_init(|| {
                self.handle
                    .read_string(|api, raw, buffer, size| api.get_raw_id_token(raw, buffer, size))
            })
            .map(String::as_str)
    }

    /// The granted scopes, space-separated.
    pub fn granted_scopes(&self) -> BridgeResult<&str> {
        self.granted_scopes
            .get_or_try_init(|| {
                self.handle
                    .read_string(|api, raw, buffer, size| api.get_granted_scopes(raw, buffer, size))
            })
            .map(String::as_str)
    }

    /// When the access token expires.
    pub fn expires_on(&self) -> BridgeResult<DateTime<Utc>> {
        self.expires_on
            .get_or_try_init(|| {
                let module = self.handle.module();
                let seconds = self.handle.with_raw(|raw| {
                    let mut seconds = 0;
                    module.call(|api| api.get_expires_on(raw, &mut seconds))?;
                    Ok(seconds)
                })?;
                DateTime::from_timestamp(seconds, 0)
                    .ok_or_else(|| module.protocol_violation(format!("expiry {seconds} is out of range")))
            })
            .copied()
    }

    /// Telemetry data reported by the native runtime.
    pub fn telemetry_data(&self) -> BridgeResult<&str> {
        self.telemetry
            .get_or_try_init(|| {
                self.handle
                    .read_string(|api, raw, buffer, size| api.get_telemetry_data(raw, buffer, size))
            })
            .map(String::as_str)
    }

    /// Releases the native object. Cached fields stay readable.
    pub fn dispose(&self) -> BridgeResult<()> {
        self.handle.dispose()
    }
}

/// Result of a sign-out.
#[derive(Debug)]
pub struct SignOutResult {
    handle: NativeHandle<SignOutResultKind>,
    error: OnceCell<Option<ErrorValue>>,
    telemetry: OnceCell<String>,
}

impl SignOutResult {
    pub(crate) fn from_handle(handle: NativeHandle<SignOutResultKind>) -> Self {
        Self {
            handle,
            error: OnceCell::new(),
            telemetry: OnceCell::new(),
        }
    }

    /// Whether the sign-out succeeded.
    pub fn is_success(&self) -> BridgeResult<bool> {
        Ok(self.error()?.is_none())
    }

    /// The error the sign-out ended with, if any.
    pub fn error(&self) -> BridgeResult<Option<&ErrorValue>> {
        self.error
            .get_or_try_init(|| {
                match self
                    .handle
                    .read_handle::<ErrorKind>(|api, raw, out| api.get_sign_out_error(raw, out))?
                {
                    Some(error) => error_channel::decode(error),
                    None => Ok(None),
                }
            })
            .map(Option::as_ref)
    }

    /// Telemetry data reported by the native runtime.
    pub fn telemetry_data(&self) -> BridgeResult<&str> {
        self.telemetry
            .get_or_try_init(|| {
                self.handle.read_string(|api, raw, buffer, size| {
                    api.get_sign_out_telemetry_data(raw, buffer, size)
                })
            })
            .map(String::as_str)
    }

    /// Releases the native object.
    pub fn dispose(&self) -> BridgeResult<()> {
        self.handle.dispose()
    }
}
