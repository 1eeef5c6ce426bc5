//! In-memory native runtime for `authbridge`
//!
//! This crate provides an in-process implementation of the
//! [`NativeApi`](authbridge::NativeApi) trait, useful for testing and
//! development where the real native library is unavailable. It keeps every
//! native object in a table so tests can check that the bridge releases what
//! it receives, and it checks the runtime contract (no use before startup, no
//! double release, no double startup) as it goes.
//!
//! Calls can be answered in three ways, see [`CompletionMode`]. Individual
//! calls can be scripted to fail, hang or misbehave with [`Scripted`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::significant_drop_tightening)]

mod objects;
mod runtime;
pub mod script;

pub use runtime::{InMemoryNativeRuntime, PendingCallInfo};
pub use script::{
    AccountRecord, CompletionMode, NativeErrorSpec, Operation, Payload, RequestRecord, Scripted,
    DEFAULT_EXPIRES_ON,
};
