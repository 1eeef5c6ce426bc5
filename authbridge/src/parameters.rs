//! Auth parameters.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::BridgeResult;
use crate::handle::{AuthParametersKind, NativeHandle};
use crate::module::NativeModule;
use crate::native::NativeApi;
use crate::types::RawHandle;

#[derive(Debug, Default)]
struct Settings {
    requested_scopes: Option<String>,
    redirect_uri: Option<String>,
    decoded_claims: Option<String>,
    access_token_to_renew: Option<String>,
    properties: HashMap<String, String>,
}

/// Request parameters for sign-in and token acquisition.
///
/// Setters write through to the native object first and only remember the
/// value once the native layer accepted it.
#[derive(Debug)]
pub struct AuthParameters {
    handle: NativeHandle<AuthParametersKind>,
    settings: Mutex<Settings>,
}

impl AuthParameters {
    /// Creates parameters for a client id and authority.
    pub fn new(module: &Arc<NativeModule>, client_id: &str, authority: &str) -> BridgeResult<Self> {
        let handle = module.call_with_required_output(|api, output| {
            api.create_auth_parameters(client_id, authority, output)
        })?;
        Ok(Self {
            handle,
            settings: Mutex::new(Settings::default()),
        })
    }

    pub(crate) const fn handle(&self) -> &NativeHandle<AuthParametersKind> {
        &self.handle
    }

    fn set(&self, setter: impl FnOnce(&dyn NativeApi, RawHandle) -> RawHandle) -> BridgeResult<()> {
        let module = self.handle.module();
        self.handle.with_raw(|raw| module.call(|api| setter(api, raw)))
    }

    /// Sets the requested scopes. They are sent space-separated.
    pub fn set_requested_scopes<I, S>(&self, scopes: I) -> BridgeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = scopes
            .into_iter()
            .map(|scope| scope.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.set(|api, raw| api.set_requested_scopes(raw, &joined))?;
        self.settings.lock().requested_scopes = Some(joined);
        Ok(())
    }

    /// The requested scopes as last set.
    pub fn requested_scopes(&self) -> Option<String> {
        self.settings.lock().requested_scopes.clone()
    }

    /// Sets the redirect URI.
    pub fn set_redirect_uri(&self, redirect_uri: &str) -> BridgeResult<()> {
        self.set(|api, raw| api.set_redirect_uri(raw, redirect_uri))?;
        self.settings.lock().redirect_uri = Some(redirect_uri.to_string());
        Ok(())
    }

    /// The redirect URI as last set.
    pub fn redirect_uri(&self) -> Option<String> {
        self.settings.lock().redirect_uri.clone()
    }

    /// Sets the decoded claims JSON.
    pub fn set_decoded_claims(&self, claims: &str) -> BridgeResult<()> {
        self.set(|api, raw| api.set_decoded_claims(raw, claims))?;
        self.settings.lock().decoded_claims = Some(claims.to_string());
        Ok(())
    }

    /// The decoded claims as last set.
    pub fn decoded_claims(&self) -> Option<String> {
        self.settings.lock().decoded_claims.clone()
    }

    /// Sets the access token to renew.
    pub fn set_access_token_to_renew(&self, access_token: &str) -> BridgeResult<()> {
        self.set(|api, raw| api.set_access_token_to_renew(raw, access_token))?;
        self.settings.lock().access_token_to_renew = Some(access_token.to_string());
        Ok(())
    }

    /// The access token to renew as last set.
    pub fn access_token_to_renew(&self) -> Option<String> {
        self.settings.lock().access_token_to_renew.clone()
    }

    /// Sets an additional named parameter.
    pub fn set_property(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.set(|api, raw| api.set_additional_parameter(raw, key, value))?;
        self.settings
            .lock()
            .properties
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// An additional parameter as last set.
    pub fn property(&self, key: &str) -> Option<String> {
        self.settings.lock().properties.get(key).cloned()
    }

    /// All additional parameters set so far.
    pub fn properties(&self) -> HashMap<String, String> {
        self.settings.lock().properties.clone()
    }

    /// Releases the native object.
    pub fn dispose(&self) -> BridgeResult<()> {
        self.handle.dispose()
    }
}
