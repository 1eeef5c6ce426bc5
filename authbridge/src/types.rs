//! Core types shared by the bridge and the native layer.
//!
//! Values that cross the native boundary ([`RawHandle`], [`CompletionToken`],
//! [`ResponseStatus`]) are plain `Copy` data. Values supplied by callers use
//! smart constructors so that an invalid correlation id can never reach a
//! native call.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use nutype::nutype;
use uuid::Uuid;

/// An opaque reference to a native resource.
///
/// The zero value is the null handle. When a native call returns an error
/// handle, null denotes success.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(usize);

impl RawHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Wraps a raw value received from the native layer.
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    /// The raw value, for handing back to the native layer.
    pub const fn value(self) -> usize {
        self.0
    }

    /// Whether this is the null handle.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle({:#x})", self.0)
    }
}

/// Key correlating one outstanding native call with its continuation.
///
/// Tokens are never zero and never reused within a process.
#[nutype(
    validate(greater = 0),
    derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Into)
)]
pub struct CompletionToken(u64);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

impl CompletionToken {
    /// Allocates a fresh token.
    pub fn next() -> Self {
        let value = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
        Self::try_new(value).expect("token counter starts at 1 and only increases")
    }
}

/// The fixed completion routine handed to native code.
///
/// The native runtime invokes it exactly once per successfully started call,
/// from any thread, with the result handle and the token it was given.
pub type CompletionRoutine = fn(RawHandle, CompletionToken);

/// Caller-supplied identifier threaded through a call for native-side
/// diagnostics.
///
/// Not used for bridge-side correlation; the [`CompletionToken`] does that.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 256),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        AsRef,
        Deref,
        Display,
        Serialize,
        Deserialize
    )
)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a new time-ordered correlation id.
    pub fn generate() -> Self {
        Self::try_new(Uuid::now_v7().to_string()).expect("a UUID string is never empty")
    }
}

/// Opaque parent window for interactive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct WindowHandle(pub isize);

impl WindowHandle {
    /// No parent window; the native module chooses.
    pub const NONE: Self = Self(0);
}

/// Response status reported by the native module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResponseStatus {
    /// Unclassified failure, also used for unknown raw values
    Unexpected = 0,
    /// Reserved by the native module
    Reserved = 1,
    /// The operation needs user interaction
    InteractionRequired = 2,
    /// No network connection
    NoNetwork = 3,
    /// Network is temporarily unavailable
    NetworkTemporarilyUnavailable = 4,
    /// Server is temporarily unavailable
    ServerTemporarilyUnavailable = 5,
    /// The API was called in a way its contract forbids
    ApiContractViolation = 6,
    /// The user cancelled the operation
    UserCanceled = 7,
    /// The application cancelled the operation
    ApplicationCanceled = 8,
    /// Configuration is invalid
    IncorrectConfiguration = 9,
    /// The supplied buffer was too small
    InsufficientBuffer = 10,
    /// The authority is not trusted
    AuthorityUntrusted = 11,
    /// The user switched accounts
    UserSwitch = 12,
    /// The account cannot be used
    AccountUnusable = 13,
}

impl ResponseStatus {
    /// Decodes a raw status value; unknown values become `Unexpected`.
    pub const fn from_raw(raw: i32) -> Self {
        match raw {
            1 => Self::Reserved,
            2 => Self::InteractionRequired,
            3 => Self::NoNetwork,
            4 => Self::NetworkTemporarilyUnavailable,
            5 => Self::ServerTemporarilyUnavailable,
            6 => Self::ApiContractViolation,
            7 => Self::UserCanceled,
            8 => Self::ApplicationCanceled,
            9 => Self::IncorrectConfiguration,
            10 => Self::InsufficientBuffer,
            11 => Self::AuthorityUntrusted,
            12 => Self::UserSwitch,
            13 => Self::AccountUnusable,
            _ => Self::Unexpected,
        }
    }

    /// The raw value for the native layer.
    pub const fn as_raw(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_is_null() {
        assert!(RawHandle::NULL.is_null());
        assert!(RawHandle::default().is_null());
        assert!(!RawHandle::new(0x40).is_null());
    }

    #[test]
    fn tokens_are_unique_and_non_zero() {
        let first = CompletionToken::next();
        let second = CompletionToken::next();

        assert_ne!(first, second);
        assert!(u64::from(first) > 0);
        assert!(CompletionToken::try_new(0).is_err());
    }

    #[test]
    fn correlation_id_is_trimmed_and_non_empty() {
        let id = CorrelationId::try_new("  req-42 ").unwrap();
        assert_eq!(id.as_ref(), "req-42");

        assert!(CorrelationId::try_new("   ").is_err());
        assert!(!CorrelationId::generate().is_empty());
    }

    #[test]
    fn response_status_round_trips_known_values() {
        for raw in 0..=13 {
            assert_eq!(ResponseStatus::from_raw(raw).as_raw(), raw);
        }
        assert_eq!(ResponseStatus::from_raw(99), ResponseStatus::Unexpected);
        assert_eq!(ResponseStatus::from_raw(-1), ResponseStatus::Unexpected);
    }
}
