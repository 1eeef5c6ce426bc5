//! Scripted behaviour of the simulated runtime.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use authbridge::ResponseStatus;

/// Expiry reported for every successful auth result, 2030-01-01T00:00:00Z.
pub const DEFAULT_EXPIRES_ON: i64 = 1_893_456_000;

/// The asynchronous entry points of the native runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `sign_in`
    SignIn,
    /// `sign_in_silently`
    SignInSilently,
    /// `sign_in_interactively`
    SignInInteractively,
    /// `acquire_token_silently`
    AcquireTokenSilently,
    /// `acquire_token_interactively`
    AcquireTokenInteractively,
    /// `read_account_by_id`
    ReadAccountById,
    /// `sign_out_silently`
    SignOutSilently,
}

impl Operation {
    /// Whether the operation completes with a sign-out result rather than an
    /// auth result.
    pub const fn is_sign_out(self) -> bool {
        matches!(self, Self::SignOutSilently)
    }

    /// Snake-case name of the entry point.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SignIn => "sign_in",
            Self::SignInSilently => "sign_in_silently",
            Self::SignInInteractively => "sign_in_interactively",
            Self::AcquireTokenSilently => "acquire_token_silently",
            Self::AcquireTokenInteractively => "acquire_token_interactively",
            Self::ReadAccountById => "read_account_by_id",
            Self::SignOutSilently => "sign_out_silently",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A native error the runtime should raise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeErrorSpec {
    /// Response status
    pub status: ResponseStatus,
    /// Platform error code
    pub error_code: i32,
    /// Site tag
    pub tag: i32,
    /// Context message
    pub context: String,
}

impl NativeErrorSpec {
    /// An error with the given status and context, no code and no tag.
    pub fn new(status: ResponseStatus, context: impl Into<String>) -> Self {
        Self {
            status,
            error_code: 0,
            tag: 0,
            context: context.into(),
        }
    }

    /// Sets the platform error code.
    #[must_use]
    pub const fn with_error_code(mut self, error_code: i32) -> Self {
        self.error_code = error_code;
        self
    }

    /// Sets the site tag.
    #[must_use]
    pub const fn with_tag(mut self, tag: i32) -> Self {
        self.tag = tag;
        self
    }
}

/// An account known to the simulated runtime.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountRecord {
    /// Account id
    pub id: String,
    /// Client info blob
    pub client_info: String,
    /// Additional properties
    pub properties: HashMap<String, String>,
}

impl AccountRecord {
    /// An account with the given id and no other data.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Sets the client info.
    #[must_use]
    pub fn with_client_info(mut self, client_info: impl Into<String>) -> Self {
        self.client_info = client_info.into();
        self
    }

    /// Adds a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// What a completed call delivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Success with the account derived from the request
    Success,
    /// Success with a specific account
    SuccessWith(AccountRecord),
    /// Success without an account
    NoAccount,
    /// A result carrying this error
    Error(NativeErrorSpec),
}

/// How the runtime responds to the next call of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// Start the call and later complete it with the payload
    Complete(Payload),
    /// Fail the entry point itself; no completion follows
    FailSync(NativeErrorSpec),
    /// Fail the entry point but still write an async handle
    FailSyncWithAsyncHandle(NativeErrorSpec),
    /// Report success without writing an async handle
    MissingAsyncHandle,
    /// Start the call and later complete it with a null result handle
    CompleteWithNullResult,
    /// Start the call and never complete it on its own
    Hang,
}

impl Default for Scripted {
    fn default() -> Self {
        Self::Complete(Payload::Success)
    }
}

/// When started calls are completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionMode {
    /// Calls wait until the test completes them
    #[default]
    Manual,
    /// The completion routine runs before the entry point returns
    Inline,
    /// Each call completes on its own thread after a random delay up to the
    /// given maximum
    Threaded {
        /// Upper bound of the delay
        max_delay: Duration,
    },
}

/// The parameters a call was issued with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// Entry point
    pub operation: Operation,
    /// Correlation id passed through
    pub correlation_id: String,
    /// Client id of the parameters, or of the sign-out
    pub client_id: Option<String>,
    /// Authority of the parameters
    pub authority: Option<String>,
    /// Requested scopes
    pub scopes: Option<String>,
    /// Redirect URI
    pub redirect_uri: Option<String>,
    /// Decoded claims
    pub claims: Option<String>,
    /// Access token to renew
    pub access_token_to_renew: Option<String>,
    /// Additional parameters
    pub properties: HashMap<String, String>,
    /// Account id of the account argument, or the id looked up
    pub account_id: Option<String>,
    /// Account hint of interactive sign-in
    pub account_hint: Option<String>,
}

impl RequestRecord {
    pub(crate) fn new(operation: Operation, correlation_id: &str) -> Self {
        Self {
            operation,
            correlation_id: correlation_id.to_string(),
            client_id: None,
            authority: None,
            scopes: None,
            redirect_uri: None,
            claims: None,
            access_token_to_renew: None,
            properties: HashMap::new(),
            account_id: None,
            account_hint: None,
        }
    }
}
