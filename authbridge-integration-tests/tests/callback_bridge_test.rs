//! Completion delivery through the callback bridge.

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::significant_drop_tightening)]

use std::time::Duration;

use authbridge::{orphaned_completions, pending_completions, BridgeError, ResponseStatus, WindowHandle};
use authbridge_integration_tests::{correlation_id, Harness};
use authbridge_memory::{CompletionMode, NativeErrorSpec, Operation, Scripted};
use futures::future::join_all;
use futures::FutureExt;
use tokio_test::{assert_pending, assert_ready};
use tracing_test::traced_test;

#[tokio::test]
async fn completed_sign_in_resolves_with_result_fields() {
    // Given: a started sign-in
    let harness = Harness::new();
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();
    let pending = client.sign_in(WindowHandle::NONE, &params, &correlation_id("ok-1"));
    assert!(pending.async_handle().is_some());
    assert_eq!(harness.runtime.pending_calls().len(), 1);

    // When: the runtime completes it
    assert!(harness.runtime.complete_next());
    let result = pending.await.unwrap();

    // Then: the result decodes from the native object
    assert!(result.is_success().unwrap());
    assert_eq!(result.access_token().unwrap(), "token-for-ok-1");
    assert_eq!(result.id_token().unwrap(), "id-token-for-ok-1");
    let account = result.account().unwrap().expect("sign-in returns an account");
    assert_eq!(account.id().unwrap(), "account-ok-1");
    assert!(result.telemetry_data().unwrap().contains(r#""correlation_id":"ok-1""#));

    // And: the async handle was released when the future resolved
    assert_eq!(
        harness.runtime.live_object_kinds(),
        ["account", "auth_parameters", "auth_result"]
    );
}

#[tokio::test]
async fn synchronous_failure_is_ready_at_once() {
    // Given: an entry point that fails before starting
    let harness = Harness::new();
    harness.runtime.script(
        Operation::SignInSilently,
        Scripted::FailSync(NativeErrorSpec::new(ResponseStatus::UserCanceled, "closed").with_tag(0x2f)),
    );
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();

    // When: the operation is issued
    let pending = client.sign_in_silently(&params, &correlation_id("sync-1"));

    // Then: no async handle exists and the error is already available
    assert!(pending.async_handle().is_none());
    let error = pending.now_or_never().expect("ready without completion").unwrap_err();
    let value = error.native().unwrap();
    assert_eq!(value.status, ResponseStatus::UserCanceled);
    assert_eq!(value.context, "closed");
    assert_eq!(value.tag, 0x2f);
    assert!(harness.runtime.pending_calls().is_empty());
    assert_eq!(harness.runtime.live_object_kinds(), ["auth_parameters"]);
}

#[tokio::test]
async fn synchronous_failure_still_releases_a_written_async_handle() {
    let harness = Harness::new();
    harness.runtime.script(
        Operation::SignInSilently,
        Scripted::FailSyncWithAsyncHandle(NativeErrorSpec::new(ResponseStatus::NoNetwork, "offline")),
    );
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();

    let error = client
        .sign_in_silently(&params, &correlation_id("sync-2"))
        .await
        .unwrap_err();

    assert_eq!(error.native().unwrap().status, ResponseStatus::NoNetwork);
    assert_eq!(harness.runtime.live_object_kinds(), ["auth_parameters"]);
    assert!(harness.runtime.contract_violations().is_empty());
}

#[tokio::test]
async fn missing_async_handle_is_a_protocol_violation() {
    let harness = Harness::new();
    harness
        .runtime
        .script(Operation::SignInSilently, Scripted::MissingAsyncHandle);
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();

    let error = client
        .sign_in_silently(&params, &correlation_id("missing-1"))
        .await
        .unwrap_err();

    assert!(matches!(error, BridgeError::ProtocolViolation(_)));
    assert!(error.is_defect());
    assert_eq!(harness.module.diagnostics().protocol_violations(), 1);
    assert_eq!(harness.module.handle_count(), 2);
}

#[tokio::test]
async fn null_completion_result_is_a_protocol_violation() {
    let harness = Harness::new();
    harness
        .runtime
        .script(Operation::SignInSilently, Scripted::CompleteWithNullResult);
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();
    let pending = client.sign_in_silently(&params, &correlation_id("null-1"));

    harness.runtime.complete_next();
    let error = pending.await.unwrap_err();

    match error {
        BridgeError::ProtocolViolation(detail) => {
            assert!(detail.contains("sign_in_silently"), "{detail}");
        }
        other => panic!("expected a protocol violation, got {other:?}"),
    }
    assert_eq!(harness.module.diagnostics().protocol_violations(), 1);
    assert_eq!(harness.runtime.live_object_kinds(), ["auth_parameters"]);
    assert_eq!(harness.module.handle_count(), 2);
}

#[tokio::test]
#[traced_test]
async fn duplicate_completion_is_ignored() {
    // Given: a call that already completed
    let harness = Harness::new();
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();
    let pending = client.sign_in_silently(&params, &correlation_id("dup-1"));
    harness.runtime.complete_next();
    let result = pending.await.unwrap();
    let orphaned_before = orphaned_completions();

    // When: the native side fires the same completion again
    assert!(harness.runtime.replay_last_completion());

    // Then: it is counted and logged, and the delivered result is untouched
    assert!(orphaned_completions() > orphaned_before);
    assert!(logs_contain("completion for unknown or already completed call ignored"));
    assert_eq!(result.access_token().unwrap(), "token-for-dup-1");
}

#[tokio::test]
async fn concurrent_operations_receive_their_own_results() {
    // Given: a runtime completing calls from its own threads after random delays
    let harness = Harness::with_mode(CompletionMode::Threaded {
        max_delay: Duration::from_millis(3),
    });
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();
    let ids: Vec<_> = (0..32).map(|i| correlation_id(&format!("req-{i}"))).collect();

    // When: many operations are in flight at once
    let pending: Vec<_> = ids
        .iter()
        .map(|id| client.sign_in_silently(&params, id))
        .collect();
    let results = join_all(pending).await;

    // Then: every caller gets the result of its own call
    for (i, result) in results.into_iter().enumerate() {
        let result = result.unwrap();
        assert_eq!(result.access_token().unwrap(), format!("token-for-req-{i}"));
    }
    assert!(harness.runtime.contract_violations().is_empty());
    assert_eq!(harness.runtime.live_object_kinds(), ["auth_parameters"]);
}

#[tokio::test]
async fn completions_in_any_order_reach_the_right_caller() {
    let harness = Harness::new();
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();
    let ids: Vec<_> = (0..16).map(|i| correlation_id(&format!("shuffled-{i}"))).collect();
    let pending: Vec<_> = ids
        .iter()
        .map(|id| client.sign_in_silently(&params, id))
        .collect();

    assert_eq!(harness.runtime.complete_all_shuffled(), 16);
    let results = join_all(pending).await;

    for (i, result) in results.into_iter().enumerate() {
        assert_eq!(
            result.unwrap().access_token().unwrap(),
            format!("token-for-shuffled-{i}")
        );
    }
}

#[tokio::test]
async fn inline_completion_before_the_entry_point_returns() {
    let harness = Harness::with_mode(CompletionMode::Inline);
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();

    let pending = client.sign_in_silently(&params, &correlation_id("inline-1"));

    assert!(harness.runtime.pending_calls().is_empty());
    let result = pending.now_or_never().expect("completed inline").unwrap();
    assert_eq!(result.access_token().unwrap(), "token-for-inline-1");
}

#[tokio::test]
async fn result_of_an_abandoned_call_is_released() {
    // Given: a call whose future is dropped before completion
    let harness = Harness::new();
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();
    drop(client.sign_in_silently(&params, &correlation_id("gone-1")));
    assert_eq!(harness.runtime.live_object_kinds(), ["auth_parameters"]);

    // When: the completion arrives
    assert!(harness.runtime.complete_next());

    // Then: the result is released straight away
    assert_eq!(harness.runtime.live_object_kinds(), ["auth_parameters"]);
    assert_eq!(harness.module.handle_count(), 2);
    assert!(harness.runtime.contract_violations().is_empty());
}

#[test]
fn future_stays_pending_until_completion_wakes_it() {
    let harness = Harness::new();
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();
    let mut task = tokio_test::task::spawn(client.sign_in_silently(&params, &correlation_id("wake-1")));

    assert_pending!(task.poll());
    assert!(pending_completions() >= 1);

    harness.runtime.complete_next();

    assert!(task.is_woken());
    let result = assert_ready!(task.poll()).unwrap();
    assert_eq!(result.access_token().unwrap(), "token-for-wake-1");
}

#[tokio::test]
async fn operations_keep_the_module_started_without_a_client() {
    // Given: an operation issued by a client that is then dropped
    let harness = Harness::new();
    let client = harness.client().unwrap();
    let params = harness.parameters(&client).unwrap();
    let pending = client.sign_in_silently(&params, &correlation_id("keep-1"));
    drop(client);
    drop(params);

    // Then: the outstanding call holds the runtime open
    assert!(harness.runtime.is_started());
    harness.runtime.complete_next();
    let result = pending.await.unwrap();
    assert_eq!(result.access_token().unwrap(), "token-for-keep-1");

    // And: the runtime shuts down with the last result
    drop(result);
    assert!(!harness.runtime.is_started());
    assert_eq!(harness.runtime.shutdown_calls(), 1);
    assert!(harness.runtime.contract_violations().is_empty());
}
