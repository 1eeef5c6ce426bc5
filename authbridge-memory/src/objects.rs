//! The simulated runtime's object table.

use std::collections::HashMap;

use authbridge::{CompletionToken, RawHandle, ResponseStatus};

use crate::script::{AccountRecord, NativeErrorSpec};

#[derive(Debug, Clone, Default)]
pub(crate) struct ParametersObject {
    pub client_id: String,
    pub authority: String,
    pub scopes: Option<String>,
    pub redirect_uri: Option<String>,
    pub claims: Option<String>,
    pub access_token_to_renew: Option<String>,
    pub properties: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub(crate) struct AuthResultObject {
    pub account: Option<AccountRecord>,
    pub access_token: String,
    pub id_token: String,
    pub granted_scopes: String,
    pub expires_on: i64,
    pub error: Option<NativeErrorSpec>,
    pub telemetry: String,
}

#[derive(Debug, Clone)]
pub(crate) struct SignOutResultObject {
    pub error: Option<NativeErrorSpec>,
    pub telemetry: String,
}

#[derive(Debug, Clone)]
pub(crate) enum Object {
    Error(NativeErrorSpec),
    Async(CompletionToken),
    Parameters(ParametersObject),
    Account(AccountRecord),
    AuthResult(AuthResultObject),
    SignOutResult(SignOutResultObject),
}

impl Object {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Error(_) => "error",
            Self::Async(_) => "async_operation",
            Self::Parameters(_) => "auth_parameters",
            Self::Account(_) => "account",
            Self::AuthResult(_) => "auth_result",
            Self::SignOutResult(_) => "sign_out_result",
        }
    }
}

#[derive(Debug)]
pub(crate) struct ObjectTable {
    objects: HashMap<usize, Object>,
    next: usize,
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            next: 0x1000,
        }
    }
}

impl ObjectTable {
    pub fn insert(&mut self, object: Object) -> RawHandle {
        let value = self.next;
        self.next += 0x10;
        self.objects.insert(value, object);
        RawHandle::new(value)
    }

    pub fn get(&self, handle: RawHandle) -> Option<&Object> {
        self.objects.get(&handle.value())
    }

    pub fn get_mut(&mut self, handle: RawHandle) -> Option<&mut Object> {
        self.objects.get_mut(&handle.value())
    }

    pub fn remove(&mut self, handle: RawHandle) -> Option<Object> {
        self.objects.remove(&handle.value())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.objects.values().map(Object::kind).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn error(&mut self, status: ResponseStatus, context: impl Into<String>) -> RawHandle {
        self.insert(Object::Error(NativeErrorSpec::new(status, context)))
    }
}

/// Writes `value` with the two-call buffer convention.
///
/// Sizes count UTF-16 units including the terminator. An empty value is
/// reported as success with size 0.
pub(crate) fn write_string(
    value: &str,
    corrupt: bool,
    buffer: Option<&mut [u16]>,
    size: &mut usize,
) -> Result<(), NativeErrorSpec> {
    if value.is_empty() {
        *size = 0;
        return Ok(());
    }

    let mut units: Vec<u16> = value.encode_utf16().collect();
    if corrupt {
        // An unpaired high surrogate.
        units[0] = 0xD800;
    }
    units.push(0);
    *size = units.len();

    match buffer {
        Some(buffer) if buffer.len() >= units.len() => {
            buffer[..units.len()].copy_from_slice(&units);
            Ok(())
        }
        _ => Err(NativeErrorSpec::new(ResponseStatus::InsufficientBuffer, "")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_success_with_zero_size() {
        let mut size = 99;
        assert!(write_string("", false, None, &mut size).is_ok());
        assert_eq!(size, 0);
    }

    #[test]
    fn sizing_call_reports_size_including_terminator() {
        let mut size = 0;
        let error = write_string("héllo", false, None, &mut size).unwrap_err();

        assert_eq!(error.status, ResponseStatus::InsufficientBuffer);
        assert_eq!(size, 6);
    }

    #[test]
    fn second_call_fills_the_buffer() {
        let mut size = 6;
        let mut buffer = vec![0u16; size];
        write_string("héllo", false, Some(&mut buffer), &mut size).unwrap();

        assert_eq!(String::from_utf16(&buffer[..5]).unwrap(), "héllo");
        assert_eq!(buffer[5], 0);
    }

    #[test]
    fn handles_are_unique_and_non_null() {
        let mut table = ObjectTable::default();
        let first = table.error(ResponseStatus::Unexpected, "a");
        let second = table.error(ResponseStatus::Unexpected, "b");

        assert_ne!(first, second);
        assert!(!first.is_null());
        assert_eq!(table.kinds(), ["error", "error"]);
        assert!(table.remove(first).is_some());
        assert!(table.remove(first).is_none());
    }
}
