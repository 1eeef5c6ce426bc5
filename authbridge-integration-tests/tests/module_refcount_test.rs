//! Reference counting of the native module lifecycle.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_const_for_fn)]

use std::sync::Arc;
use std::thread;

use authbridge::{BridgeConfig, BridgeError, DiagnosticKind, NativeApi, NativeLibrary, NativeModule, ResponseStatus};
use authbridge_integration_tests::Harness;
use authbridge_memory::{CompletionMode, InMemoryNativeRuntime, NativeErrorSpec};
use proptest::prelude::*;
use rand::Rng;
use tracing_test::traced_test;

#[test]
fn first_lease_starts_and_last_lease_shuts_down() {
    // Given: a module over a fresh runtime
    let harness = Harness::new();
    assert!(!harness.runtime.is_started());

    // When: two leases are taken and returned
    let first = harness.module.acquire().unwrap();
    let second = harness.module.acquire().unwrap();
    assert_eq!(harness.module.handle_count(), 2);
    assert!(harness.runtime.is_started());
    drop(first);
    assert!(harness.runtime.is_started());
    drop(second);

    // Then: the runtime was started and shut down exactly once
    assert!(!harness.runtime.is_started());
    assert_eq!(harness.runtime.startup_calls(), 1);
    assert_eq!(harness.runtime.shutdown_calls(), 1);
    assert!(harness.runtime.contract_violations().is_empty());
    harness.module.verify_handle_leaks().unwrap();
}

#[test]
fn module_restarts_after_full_release() {
    let harness = Harness::new();

    for _ in 0..3 {
        let client = harness.client().unwrap();
        drop(client);
    }

    assert_eq!(harness.runtime.startup_calls(), 3);
    assert_eq!(harness.runtime.shutdown_calls(), 3);
    assert_eq!(harness.module.handle_count(), 0);
}

#[test]
fn failed_startup_rolls_back_and_next_acquire_retries() {
    // Given: a runtime whose startup fails
    let harness = Harness::new();
    harness.runtime.fail_startup(Some(
        NativeErrorSpec::new(ResponseStatus::IncorrectConfiguration, "missing broker").with_tag(0x51),
    ));

    // When: a lease is requested
    let error = harness.module.acquire().unwrap_err();

    // Then: the decoded startup error is returned and nothing stays counted
    let value = error.native().expect("startup failure is a native error");
    assert_eq!(value.status, ResponseStatus::IncorrectConfiguration);
    assert_eq!(value.context, "missing broker");
    assert_eq!(value.tag, 0x51);
    assert_eq!(harness.module.handle_count(), 0);
    assert!(!harness.runtime.is_started());
    assert_eq!(harness.runtime.live_objects(), 0);
    assert_eq!(harness.runtime.shutdown_calls(), 0);

    // When: startup is fixed
    harness.runtime.fail_startup(None);
    let lease = harness.module.acquire().unwrap();

    // Then: startup is attempted again
    assert_eq!(harness.runtime.startup_calls(), 2);
    assert!(harness.runtime.is_started());
    drop(lease);
    assert!(harness.runtime.contract_violations().is_empty());
}

#[test]
fn failing_context_getter_is_reported_without_its_own_context() {
    // Given: startup fails and every error context read fails too
    let harness = Harness::new();
    harness.runtime.fail_startup(Some(
        NativeErrorSpec::new(ResponseStatus::IncorrectConfiguration, "missing broker").with_tag(0x51),
    ));
    harness
        .runtime
        .fail_context_reads(Some(NativeErrorSpec::new(ResponseStatus::Unexpected, "context unavailable").with_tag(0x77)));

    // When: a lease is requested
    let error = harness.module.acquire().unwrap_err();

    // Then: decoding stops at the context getter's own error
    let value = error.native().expect("context read failure is a native error");
    assert_eq!(value.status, ResponseStatus::Unexpected);
    assert_eq!(value.tag, 0x77);
    assert!(value.context.is_empty());

    // And: every error handle involved was released
    assert_eq!(harness.module.handle_count(), 0);
    assert_eq!(harness.runtime.live_objects(), 0);
    assert!(harness.runtime.contract_violations().is_empty());

    // When: context reads work again
    harness.runtime.fail_context_reads(None);
    let error = harness.module.acquire().unwrap_err();

    // Then: the startup error is decoded in full
    assert_eq!(error.native().map(|value| value.context.as_str()), Some("missing broker"));
}

#[test]
#[traced_test]
fn shutdown_failure_is_recorded_not_raised() {
    let harness = Harness::new();
    harness.runtime.panic_on_shutdown(true);

    let lease = harness.module.acquire().unwrap();
    drop(lease);

    assert_eq!(harness.module.handle_count(), 0);
    assert_eq!(harness.module.diagnostics().lifecycle_failures(), 1);
    let kinds: Vec<_> = harness
        .module
        .diagnostics()
        .recent()
        .into_iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(kinds, [DiagnosticKind::ShutdownFailure]);
    assert!(logs_contain("native module shutdown failed"));

    // Strict mode reports the recorded failure.
    assert!(matches!(
        harness.module.verify_handle_leaks(),
        Err(BridgeError::HandleLifecycle { kind: "module", .. })
    ));
}

#[test]
fn production_config_tolerates_recorded_failures() {
    let harness = Harness::with_config(CompletionMode::Manual, BridgeConfig::production());
    harness.runtime.panic_on_shutdown(true);

    drop(harness.module.acquire().unwrap());

    assert_eq!(harness.module.diagnostics().lifecycle_failures(), 1);
    harness.module.verify_handle_leaks().unwrap();
}

#[test]
fn concurrent_leases_never_double_start_or_shut_down() {
    // Given: a module shared by several threads
    let runtime = InMemoryNativeRuntime::new();
    let module = NativeModule::with_config(Arc::new(runtime.clone()), BridgeConfig::diagnostic());

    // When: every thread takes and returns leases in a tight loop
    thread::scope(|scope| {
        for _ in 0..8 {
            let module = Arc::clone(&module);
            scope.spawn(move || {
                let mut rng = rand::rng();
                for _ in 0..200 {
                    let outer = module.acquire().unwrap();
                    if rng.random_bool(0.3) {
                        let inner = module.acquire().unwrap();
                        drop(inner);
                    }
                    drop(outer);
                }
            });
        }
    });

    // Then: every startup was paired with a shutdown and the contract held
    assert_eq!(module.handle_count(), 0);
    assert!(!runtime.is_started());
    assert_eq!(runtime.startup_calls(), runtime.shutdown_calls());
    assert!(runtime.startup_calls() >= 1);
    assert!(runtime.contract_violations().is_empty());
}

#[test]
fn module_for_current_platform_keeps_the_selected_library() {
    let runtime = InMemoryNativeRuntime::new();

    let loaded = NativeModule::for_current_platform(
        |library| {
            assert!(!library.name.is_empty());
            Ok(Arc::new(runtime.clone()) as Arc<dyn NativeApi>)
        },
        BridgeConfig::diagnostic(),
    );

    match loaded {
        Ok(module) => {
            assert_eq!(module.library(), NativeLibrary::current().ok());
            drop(module.acquire().unwrap());
            assert_eq!(runtime.startup_calls(), 1);
        }
        Err(BridgeError::PlatformUnsupported { .. }) => assert_eq!(runtime.startup_calls(), 0),
        Err(other) => panic!("unexpected failure: {other}"),
    }
}

#[test]
fn loader_failure_is_returned_unchanged() {
    let loaded = NativeModule::for_current_platform(
        |_| Err(BridgeError::ProtocolViolation("library missing export".to_string())),
        BridgeConfig::diagnostic(),
    );

    assert!(matches!(
        loaded,
        Err(BridgeError::ProtocolViolation(_) | BridgeError::PlatformUnsupported { .. })
    ));
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Acquire,
    Release(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![Just(Step::Acquire), any::<usize>().prop_map(Step::Release)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn count_tracks_outstanding_leases(steps in prop::collection::vec(step(), 1..64)) {
        let harness = Harness::new();
        let mut leases = Vec::new();

        for step in steps {
            match step {
                Step::Acquire => leases.push(harness.module.acquire().unwrap()),
                Step::Release(index) if !leases.is_empty() => {
                    let index = index % leases.len();
                    drop(leases.swap_remove(index));
                }
                Step::Release(_) => {}
            }
            prop_assert_eq!(harness.module.handle_count(), leases.len());
            prop_assert_eq!(harness.runtime.is_started(), !leases.is_empty());
        }

        leases.clear();
        prop_assert_eq!(harness.module.handle_count(), 0);
        prop_assert_eq!(harness.runtime.startup_calls(), harness.runtime.shutdown_calls());
        prop_assert!(harness.runtime.contract_violations().is_empty());
    }
}
