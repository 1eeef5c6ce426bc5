//! Decoding of native error handles.
//!
//! Every native call reports failure through an error handle. These functions
//! consume the handle, so it is released exactly once whichever way decoding
//! goes, including when one of the getters fails halfway through.
//!
//! The getters used while decoding can fail themselves. Their errors are never
//! decoded in full: a failing context getter is reported by status, code and
//! tag only, and a failing status, code or tag getter is a protocol violation.

use std::sync::Arc;

use tracing::debug;

use crate::errors::{BridgeError, BridgeResult, ErrorValue};
use crate::handle::ErrorHandle;
use crate::module::NativeModule;
use crate::native::NativeApi;
use crate::strings;
use crate::types::{RawHandle, ResponseStatus};

/// Decodes an error handle. The null handle decodes to `None`.
pub fn decode(error: ErrorHandle) -> BridgeResult<Option<ErrorValue>> {
    if error.is_null() {
        return Ok(None);
    }
    let module = error.module();

    let mut value = header(&error)?;
    value.context = error.with_raw(|raw| {
        strings::read_context(module, |api, buffer, size| api.get_context(raw, buffer, size))
    })?;

    debug!(status = %value.status, error_code = value.error_code, tag = value.tag, "decoded native error");
    Ok(Some(value))
}

/// Decodes an error handle without reading its context.
pub(crate) fn decode_shallow(error: ErrorHandle) -> BridgeResult<Option<ErrorValue>> {
    if error.is_null() {
        return Ok(None);
    }
    let value = header(&error)?;
    debug!(status = %value.status, error_code = value.error_code, tag = value.tag, "decoded native error without context");
    Ok(Some(value))
}

/// Reads only the status of a non-null error handle.
pub(crate) fn status(error: &ErrorHandle) -> BridgeResult<ResponseStatus> {
    let module = error.module();
    error.with_raw(|raw| {
        let mut status = 0;
        read_field(module, "status", |api| api.get_status(raw, &mut status))?;
        Ok(ResponseStatus::from_raw(status))
    })
}

/// Fails with the decoded error unless the handle signals success.
pub fn check(error: ErrorHandle) -> BridgeResult<()> {
    match decode(error)? {
        None => Ok(()),
        Some(value) => Err(BridgeError::Native(value)),
    }
}

fn header(error: &ErrorHandle) -> BridgeResult<ErrorValue> {
    let module = error.module();
    let status = status(error)?;
    let (error_code, tag) = error.with_raw(|raw| {
        let mut code = 0;
        read_field(module, "error code", |api| api.get_error_code(raw, &mut code))?;
        let mut tag = 0;
        read_field(module, "tag", |api| api.get_tag(raw, &mut tag))?;
        Ok((code, tag))
    })?;
    Ok(ErrorValue {
        status,
        error_code,
        tag,
        context: String::new(),
    })
}

fn read_field(
    module: &Arc<NativeModule>,
    field: &str,
    getter: impl FnOnce(&dyn NativeApi) -> RawHandle,
) -> BridgeResult<()> {
    let failure = module.issue(getter)?;
    if failure.is_null() {
        return Ok(());
    }
    // Released undecoded.
    drop(failure);
    Err(module.protocol_violation(format!("reading the {field} of a native error failed")))
}
