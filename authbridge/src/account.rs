//! Accounts.

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::errors::BridgeResult;
use crate::handle::{AccountKind, NativeHandle};

/// A signed-in account.
///
/// Fields are read from the native object on first access and cached. Once
/// the account is disposed, fields that were never read fail with
/// [`HandleReleased`](crate::BridgeError::HandleReleased).
#[derive(Debug)]
pub struct Account {
    handle: NativeHandle<AccountKind>,
    id: OnceCell<String>,
    client_info: OnceCell<String>,
    properties: Mutex<HashMap<String, String>>,
}

impl Account {
    pub(crate) fn from_handle(handle: NativeHandle<AccountKind>) -> Self {
        Self {
            handle,
            id: OnceCell::new(),
            client_info: OnceCell::new(),
            properties: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) const fn handle(&self) -> &NativeHandle<AccountKind> {
        &self.handle
    }

    /// The account id.
    pub fn id(&self) -> BridgeResult<&str> {
        self.id
            .get_or_try_init(|| {
                self.handle
                    .read_string(|api, raw, buffer, size| api.get_account_id(raw, buffer, size))
            })
            .map(String::as_str)
    }

    /// The client info blob.
    pub fn client_info(&self) -> BridgeResult<&str> {
        self.client_info
            .get_or_try_init(|| {
                self.handle
                    .read_string(|api, raw, buffer, size| api.get_client_info(raw, buffer, size))
            })
            .map(String::as_str)
    }

    /// A named account property.
    pub fn property(&self, key: &str) -> BridgeResult<String> {
        if let Some(value) = self.properties.lock().get(key) {
            return Ok(value.clone());
        }
        let value = self
            .handle
            .read_string(|api, raw, buffer, size| api.get_account_property(raw, key, buffer, size))?;
        let mut properties = self.properties.lock();
        Ok(properties.entry(key.to_string()).or_insert(value).clone())
    }

    /// Releases the native object.
    pub fn dispose(&self) -> BridgeResult<()> {
        self.handle.dispose()
    }
}
