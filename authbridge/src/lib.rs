//! `authbridge` - async bridge over a callback-based native authentication runtime
//!
//! The native runtime exposes "start a call, get a completion callback later"
//! entry points and hands out opaque handles that must each be released
//! exactly once. This crate turns those calls into awaitable, cancellable
//! operations and owns every handle it receives:
//!
//! - [`NativeModule`] starts the runtime on first use and shuts it down after
//!   the last handle is gone.
//! - [`NativeHandle`] releases its resource exactly once and refuses use
//!   after release.
//! - [`NativeClient`] issues the typed operations, each returning a
//!   [`PendingOperation`] that resolves exactly once.
//!
//! The runtime itself is reached through the [`NativeApi`] trait.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod account;
pub mod bridge;
pub mod client;
pub mod config;
pub mod diagnostics;
pub mod error_channel;
pub mod errors;
pub mod handle;
pub mod module;
pub mod native;
pub mod operation;
pub mod parameters;
pub mod platform;
pub mod results;
mod strings;
pub mod types;

pub use account::Account;
pub use bridge::{completion_trampoline, orphaned_completions, pending_completions};
pub use client::NativeClient;
pub use config::{BridgeConfig, DiagnosticHistory};
pub use diagnostics::{DiagnosticEvent, DiagnosticKind, Diagnostics, HandleStats};
pub use errors::{BridgeError, BridgeResult, ErrorValue};
pub use handle::{ErrorHandle, NativeHandle, ResourceKind};
pub use module::{ModuleRef, NativeModule};
pub use native::NativeApi;
pub use operation::{AsyncOperation, Completion, PendingOperation};
pub use parameters::AuthParameters;
pub use platform::{Architecture, NativeLibrary, OperatingSystem};
pub use results::{AuthResult, SignOutResult};
pub use types::{CompletionRoutine, CompletionToken, CorrelationId, RawHandle, ResponseStatus, WindowHandle};
