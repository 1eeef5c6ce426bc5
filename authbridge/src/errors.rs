//! Error types for authbridge.
//!
//! Two layers of error live here:
//!
//! - [`ErrorValue`] is the decoded form of a native error handle. It is data,
//!   not a Rust error: "no error" is always expressed as `None`, never as a
//!   zero-valued instance, so that a failure carrying code 0 stays distinct
//!   from success.
//! - [`BridgeError`] is the error every fallible bridge operation returns. A
//!   normal native failure is [`BridgeError::Native`]; the remaining variants
//!   describe failures of the bridge or of the native contract itself.
//!
//! # Example
//!
//! ```rust,ignore
//! match client.sign_in_silently(&params, &correlation_id).await {
//!     Ok(result) => use_result(result),
//!     Err(BridgeError::Native(error)) if error.status == ResponseStatus::InteractionRequired => {
//!         fall_back_to_interactive().await?;
//!     }
//!     Err(e) => return Err(e),
//! }
//! ```

use std::fmt;

use thiserror::Error;

use crate::types::ResponseStatus;

/// A decoded native error.
///
/// Produced by the error channel from a non-success native error handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorValue {
    /// Coarse classification reported by the native module.
    pub status: ResponseStatus,
    /// Platform error code, 0 when the native module did not supply one.
    pub error_code: i32,
    /// Opaque tag identifying the native code site that raised the error.
    pub tag: i32,
    /// Human-readable context supplied by the native module.
    pub context: String,
}

impl ErrorValue {
    /// Creates an error value from its parts.
    pub fn new(status: ResponseStatus, error_code: i32, tag: i32, context: impl Into<String>) -> Self {
        Self {
            status,
            error_code,
            tag,
            context: context.into(),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status: {}", self.status)?;
        if self.error_code != 0 {
            writeln!(f, "Error: 0x{:08x}", self.error_code)?;
        }
        writeln!(f, "Context: {}", self.context)?;
        write!(f, "Tag: 0x{:x}", self.tag)
    }
}

/// Errors returned by bridge operations.
///
/// # Error Handling Strategy
///
/// - **Native**: the expected failure path; inspect `status` to decide
/// - **ProtocolViolation**: the native module broke its contract; log and investigate
/// - **PlatformUnsupported**: no native library exists for this process; not retryable
/// - **HandleLifecycle**: a native release call failed; the handle is released regardless
/// - **HandleReleased**: the caller used a handle after disposing it
/// - **OperationAbandoned**: the continuation was dropped without being resolved
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// A native call reported failure through its error handle.
    #[error("native call failed: {0}")]
    Native(ErrorValue),

    /// The native layer reported success but omitted an expected output.
    #[error("native protocol violation: {0}")]
    ProtocolViolation(String),

    /// No native library variant exists for the running architecture.
    #[error("no native library available for architecture {architecture}")]
    PlatformUnsupported {
        /// The architecture that was detected
        architecture: String,
    },

    /// A native release call failed.
    #[error("failed to release {kind} handle: {detail}")]
    HandleLifecycle {
        /// Kind of the handle being released
        kind: &'static str,
        /// What the native layer reported
        detail: String,
    },

    /// The handle was already released.
    #[error("{kind} handle used after release")]
    HandleReleased {
        /// Kind of the released handle
        kind: &'static str,
    },

    /// A native string could not be decoded.
    #[error("invalid native string: {detail}")]
    InvalidString {
        /// Decoder diagnostic
        detail: String,
    },

    /// The continuation for an operation was dropped without resolving it.
    #[error("operation abandoned before completion")]
    OperationAbandoned,

    /// Live handles remained when a leak check ran.
    #[error("{count} native handles are not released: {kinds:?}")]
    HandleLeak {
        /// Number of outstanding module references
        count: usize,
        /// Kinds of the tracked handles that are still live
        kinds: Vec<&'static str>,
    },
}

impl BridgeError {
    /// The decoded native error, if this is a native failure.
    pub const fn native(&self) -> Option<&ErrorValue> {
        match self {
            Self::Native(value) => Some(value),
            _ => None,
        }
    }

    /// Whether this error signals a defect in the bridge or the native
    /// contract rather than a normal runtime failure.
    pub const fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::ProtocolViolation(_) | Self::HandleLifecycle { .. } | Self::HandleLeak { .. }
        )
    }
}

impl From<ErrorValue> for BridgeError {
    fn from(value: ErrorValue) -> Self {
        Self::Native(value)
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
