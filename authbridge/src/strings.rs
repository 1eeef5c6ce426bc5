//! Two-call string retrieval.
//!
//! Native string getters are called once without a buffer to learn the size
//! (in UTF-16 units, terminator included), then again with a buffer of that
//! size. An empty string is reported by the first call as plain success.

use std::sync::Arc;

use crate::error_channel;
use crate::errors::{BridgeError, BridgeResult, ErrorValue};
use crate::handle::ErrorHandle;
use crate::module::NativeModule;
use crate::native::NativeApi;
use crate::types::{RawHandle, ResponseStatus};

type Decoder = fn(ErrorHandle) -> BridgeResult<Option<ErrorValue>>;

pub(crate) fn read_string(
    module: &Arc<NativeModule>,
    getter: impl FnMut(&dyn NativeApi, Option<&mut [u16]>, &mut usize) -> RawHandle,
) -> BridgeResult<String> {
    read_with(module, getter, error_channel::decode)
}

/// Reads the context of an error. Failures of the context getter itself are
/// decoded without their own context, so decoding always terminates.
pub(crate) fn read_context(
    module: &Arc<NativeModule>,
    getter: impl FnMut(&dyn NativeApi, Option<&mut [u16]>, &mut usize) -> RawHandle,
) -> BridgeResult<String> {
    read_with(module, getter, error_channel::decode_shallow)
}

fn read_with(
    module: &Arc<NativeModule>,
    mut getter: impl FnMut(&dyn NativeApi, Option<&mut [u16]>, &mut usize) -> RawHandle,
    decode: Decoder,
) -> BridgeResult<String> {
    let mut size = 0;
    let sizing = module.issue(|api| getter(api, None, &mut size))?;
    if sizing.is_null() {
        return Ok(String::new());
    }
    // The status alone decides; a full decode would read this error's own
    // context through the same convention.
    if size == 0 || error_channel::status(&sizing)? != ResponseStatus::InsufficientBuffer {
        return Err(failure(module, decode, sizing));
    }
    drop(sizing);

    let capacity = size;
    let mut buffer = vec![0u16; capacity];
    let filled = module.issue(|api| getter(api, Some(&mut buffer), &mut size))?;
    if !filled.is_null() {
        return Err(failure(module, decode, filled));
    }

    String::from_utf16(&buffer[..capacity - 1]).map_err(|e| BridgeError::InvalidString { detail: e.to_string() })
}

fn failure(module: &NativeModule, decode: Decoder, error: ErrorHandle) -> BridgeError {
    match decode(error) {
        Ok(Some(value)) => BridgeError::Native(value),
        Ok(None) => module.protocol_violation("string getter failed without an error".to_string()),
        Err(e) => e,
    }
}
