//! The simulated native runtime.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use authbridge::{CompletionRoutine, CompletionToken, NativeApi, RawHandle, ResponseStatus, WindowHandle};
use parking_lot::{Mutex, MutexGuard};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, warn};

use crate::objects::{write_string, AuthResultObject, Object, ObjectTable, ParametersObject, SignOutResultObject};
use crate::script::{
    AccountRecord, CompletionMode, NativeErrorSpec, Operation, Payload, RequestRecord, Scripted, DEFAULT_EXPIRES_ON,
};

/// A started call waiting for its completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCallInfo {
    /// Entry point
    pub operation: Operation,
    /// Token the call was started with
    pub token: CompletionToken,
    /// Correlation id of the request
    pub correlation_id: String,
    /// Whether cancellation was requested
    pub cancel_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Payload,
    NullResult,
}

#[derive(Debug, Clone)]
struct PendingCall {
    token: CompletionToken,
    routine: CompletionRoutine,
    request: RequestRecord,
    payload: Payload,
    outcome: Outcome,
    hang: bool,
}

#[derive(Debug, Default)]
struct State {
    mode: CompletionMode,
    objects: ObjectTable,
    started: bool,
    startup_calls: usize,
    shutdown_calls: usize,
    violations: Vec<String>,
    scripts: HashMap<Operation, VecDeque<Scripted>>,
    pending: VecDeque<PendingCall>,
    cancelled: HashSet<CompletionToken>,
    cancel_requests: usize,
    honor_cancellation: bool,
    startup_failure: Option<NativeErrorSpec>,
    failing_releases: HashSet<&'static str>,
    panic_on_shutdown: bool,
    corrupt_strings: bool,
    context_failure: Option<NativeErrorSpec>,
    requests: Vec<RequestRecord>,
    accounts: HashMap<String, AccountRecord>,
    last_delivery: Option<(CompletionRoutine, RawHandle, CompletionToken)>,
}

impl State {
    fn record_violation(&mut self, detail: String) {
        warn!(%detail, "native contract violation");
        self.violations.push(detail);
    }

    /// Records a violation and raises it as an `ApiContractViolation` error.
    fn violation(&mut self, detail: String) -> RawHandle {
        self.record_violation(detail.clone());
        self.objects.error(ResponseStatus::ApiContractViolation, detail)
    }

    fn bad_handle(&mut self, call: &str, handle: RawHandle) -> RawHandle {
        self.violation(format!("{call}: {handle:?} is not a live handle of the expected kind"))
    }

    fn not_started(&mut self, call: &str) -> Option<RawHandle> {
        (!self.started).then(|| self.violation(format!("{call} called while the runtime is not started")))
    }

    fn raise(&mut self, error: NativeErrorSpec) -> RawHandle {
        self.objects.insert(Object::Error(error))
    }

    fn account_for(&self, request: &RequestRecord) -> AccountRecord {
        let id = request
            .account_id
            .clone()
            .unwrap_or_else(|| format!("account-{}", request.correlation_id));
        self.accounts
            .get(&id)
            .cloned()
            .unwrap_or_else(|| AccountRecord::new(id))
    }

    fn build_result(&mut self, call: &PendingCall) -> RawHandle {
        if call.outcome == Outcome::NullResult {
            return RawHandle::NULL;
        }
        if !self.started {
            self.record_violation(format!("{} completed after shutdown", call.request.operation));
        }

        let payload = if self.honor_cancellation && self.cancelled.contains(&call.token) {
            Payload::Error(NativeErrorSpec::new(
                ResponseStatus::ApplicationCanceled,
                "the operation was cancelled",
            ))
        } else {
            call.payload.clone()
        };
        let request = &call.request;
        let telemetry = format!(
            r#"{{"operation":"{}","correlation_id":"{}"}}"#,
            request.operation, request.correlation_id
        );

        if request.operation.is_sign_out() {
            let error = match payload {
                Payload::Error(error) => Some(error),
                _ => None,
            };
            return self
                .objects
                .insert(Object::SignOutResult(SignOutResultObject { error, telemetry }));
        }

        let (account, error) = match payload {
            Payload::Success => (Some(self.account_for(request)), None),
            Payload::SuccessWith(account) => (Some(account), None),
            Payload::NoAccount => (None, None),
            Payload::Error(error) => (None, Some(error)),
        };
        let succeeded = error.is_none();
        let token_for = |prefix: &str| {
            if succeeded {
                format!("{prefix}-for-{}", request.correlation_id)
            } else {
                String::new()
            }
        };
        let result = AuthResultObject {
            account,
            access_token: token_for("token"),
            id_token: token_for("id-token"),
            granted_scopes: request.scopes.clone().unwrap_or_default(),
            expires_on: DEFAULT_EXPIRES_ON,
            error,
            telemetry,
        };
        self.objects.insert(Object::AuthResult(result))
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn deliver(&self, call: PendingCall) {
        let result = {
            let mut state = self.state.lock();
            let result = state.build_result(&call);
            state.last_delivery = Some((call.routine, result, call.token));
            result
        };
        debug!(operation = %call.request.operation, token = %call.token, "delivering completion");
        (call.routine)(result, call.token);
    }

    fn schedule(self: &Arc<Self>, call: PendingCall, mut state: MutexGuard<'_, State>) {
        let mode = state.mode;
        if call.hang {
            state.pending.push_back(call);
            return;
        }
        match mode {
            CompletionMode::Manual => state.pending.push_back(call),
            CompletionMode::Inline => {
                drop(state);
                self.deliver(call);
            }
            CompletionMode::Threaded { max_delay } => {
                drop(state);
                let max = u64::try_from(max_delay.as_micros()).unwrap_or(u64::MAX);
                let delay = Duration::from_micros(rand::rng().random_range(0..=max));
                let shared = Arc::clone(self);
                thread::spawn(move || {
                    thread::sleep(delay);
                    shared.deliver(call);
                });
            }
        }
    }
}

/// Simulated native authentication runtime.
///
/// Cloning yields another handle to the same runtime.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNativeRuntime {
    shared: Arc<Shared>,
}

impl InMemoryNativeRuntime {
    /// A runtime whose calls wait for the test to complete them.
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime with the given completion mode.
    pub fn with_mode(mode: CompletionMode) -> Self {
        let runtime = Self::new();
        runtime.set_completion_mode(mode);
        runtime
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock()
    }

    // Configuration

    /// Changes how subsequently started calls complete.
    pub fn set_completion_mode(&self, mode: CompletionMode) {
        self.state().mode = mode;
    }

    /// Queues a response for the next call of `operation`. Unscripted calls
    /// complete successfully.
    pub fn script(&self, operation: Operation, response: Scripted) {
        self.state()
            .scripts
            .entry(operation)
            .or_default()
            .push_back(response);
    }

    /// Registers an account so results for its id carry its data.
    pub fn add_account(&self, account: AccountRecord) {
        self.state().accounts.insert(account.id.clone(), account);
    }

    /// Whether cancelled calls complete with `ApplicationCanceled`.
    pub fn honor_cancellation(&self, honor: bool) {
        self.state().honor_cancellation = honor;
    }

    /// Makes startup fail with `error` until cleared with `None`.
    pub fn fail_startup(&self, error: Option<NativeErrorSpec>) {
        self.state().startup_failure = error;
    }

    /// Makes releases of objects of `kind` fail. The object is freed anyway.
    pub fn fail_releases_of(&self, kind: &'static str) {
        self.state().failing_releases.insert(kind);
    }

    /// Stops all injected release failures.
    pub fn clear_release_failures(&self) {
        self.state().failing_releases.clear();
    }

    /// Makes shutdown panic.
    pub fn panic_on_shutdown(&self, panic: bool) {
        self.state().panic_on_shutdown = panic;
    }

    /// Makes string getters return invalid UTF-16. Error contexts are not
    /// affected.
    pub fn corrupt_strings(&self, corrupt: bool) {
        self.state().corrupt_strings = corrupt;
    }

    /// Makes every `get_context` call fail with `error` until cleared with
    /// `None`. The other error getters keep working.
    pub fn fail_context_reads(&self, error: Option<NativeErrorSpec>) {
        self.state().context_failure = error;
    }

    // Inspection

    /// Whether the runtime is started.
    pub fn is_started(&self) -> bool {
        self.state().started
    }

    /// How often startup was called.
    pub fn startup_calls(&self) -> usize {
        self.state().startup_calls
    }

    /// How often shutdown was called.
    pub fn shutdown_calls(&self) -> usize {
        self.state().shutdown_calls
    }

    /// Contract violations observed so far.
    pub fn contract_violations(&self) -> Vec<String> {
        self.state().violations.clone()
    }

    /// Number of native objects not yet released.
    pub fn live_objects(&self) -> usize {
        self.state().objects.len()
    }

    /// Kinds of the native objects not yet released, sorted.
    pub fn live_object_kinds(&self) -> Vec<&'static str> {
        self.state().objects.kinds()
    }

    /// Every request issued so far, oldest first.
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.state().requests.clone()
    }

    /// How many cancellation requests arrived.
    pub fn cancel_requests(&self) -> usize {
        self.state().cancel_requests
    }

    /// Calls started but not yet completed, oldest first.
    pub fn pending_calls(&self) -> Vec<PendingCallInfo> {
        let state = self.state();
        state
            .pending
            .iter()
            .map(|call| PendingCallInfo {
                operation: call.request.operation,
                token: call.token,
                correlation_id: call.request.correlation_id.clone(),
                cancel_requested: state.cancelled.contains(&call.token),
            })
            .collect()
    }

    // Completion

    /// Completes the oldest pending call. Returns `false` if none is pending.
    pub fn complete_next(&self) -> bool {
        let Some(call) = self.state().pending.pop_front() else {
            return false;
        };
        self.shared.deliver(call);
        true
    }

    /// Completes the oldest pending call with the given correlation id.
    pub fn complete_for(&self, correlation_id: &str) -> bool {
        let call = {
            let mut state = self.state();
            let position = state
                .pending
                .iter()
                .position(|call| call.request.correlation_id == correlation_id);
            position.and_then(|index| state.pending.remove(index))
        };
        let Some(call) = call else {
            return false;
        };
        self.shared.deliver(call);
        true
    }

    /// Completes every pending call in start order.
    pub fn complete_all(&self) -> usize {
        let calls: Vec<_> = self.state().pending.drain(..).collect();
        let count = calls.len();
        for call in calls {
            self.shared.deliver(call);
        }
        count
    }

    /// Completes every pending call in random order.
    pub fn complete_all_shuffled(&self) -> usize {
        let mut calls: Vec<_> = self.state().pending.drain(..).collect();
        calls.shuffle(&mut rand::rng());
        let count = calls.len();
        for call in calls {
            self.shared.deliver(call);
        }
        count
    }

    /// Invokes the completion routine of the last delivered call again, with
    /// the same result handle.
    pub fn replay_last_completion(&self) -> bool {
        let Some((routine, result, token)) = self.state().last_delivery else {
            return false;
        };
        routine(result, token);
        true
    }

    // Shared entry point logic

    fn start(
        &self,
        request: RequestRecord,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle {
        let operation = request.operation;
        let mut state = self.state();
        if let Some(error) = state.not_started(operation.name()) {
            return error;
        }
        let response = state
            .scripts
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();
        state.requests.push(request.clone());
        debug!(%operation, %token, ?response, "native call started");

        let (payload, outcome, hang) = match response {
            Scripted::FailSync(error) => return state.raise(error),
            Scripted::FailSyncWithAsyncHandle(error) => {
                *async_handle = state.objects.insert(Object::Async(token));
                return state.raise(error);
            }
            Scripted::MissingAsyncHandle => return RawHandle::NULL,
            Scripted::Complete(payload) => (payload, Outcome::Payload, false),
            Scripted::CompleteWithNullResult => (Payload::Success, Outcome::NullResult, false),
            Scripted::Hang => (Payload::Success, Outcome::Payload, true),
        };

        *async_handle = state.objects.insert(Object::Async(token));
        let call = PendingCall {
            token,
            routine,
            request,
            payload,
            outcome,
            hang,
        };
        self.shared.schedule(call, state);
        RawHandle::NULL
    }

    fn request_for(&self, operation: Operation, correlation_id: &str, params: RawHandle) -> Result<RequestRecord, RawHandle> {
        let mut state = self.state();
        let mut request = RequestRecord::new(operation, correlation_id);
        match state.objects.get(params) {
            Some(Object::Parameters(parameters)) => {
                request.client_id = Some(parameters.client_id.clone());
                request.authority = Some(parameters.authority.clone());
                request.scopes.clone_from(&parameters.scopes);
                request.redirect_uri.clone_from(&parameters.redirect_uri);
                request.claims.clone_from(&parameters.claims);
                request.access_token_to_renew.clone_from(&parameters.access_token_to_renew);
                request.properties.clone_from(&parameters.properties);
                Ok(request)
            }
            _ => Err(state.bad_handle(operation.name(), params)),
        }
    }

    fn account_id_of(&self, call: &str, account: RawHandle) -> Result<String, RawHandle> {
        let mut state = self.state();
        match state.objects.get(account) {
            Some(Object::Account(record)) => Ok(record.id.clone()),
            _ => Err(state.bad_handle(call, account)),
        }
    }

    fn release(&self, call: &str, handle: RawHandle, kind: &'static str) -> RawHandle {
        let mut state = self.state();
        if let Some(error) = state.not_started(call) {
            return error;
        }
        match state.objects.get(handle) {
            Some(object) if object.kind() == kind => {}
            _ => return state.bad_handle(call, handle),
        }
        state.objects.remove(handle);
        if state.failing_releases.contains(kind) {
            return state.raise(NativeErrorSpec::new(
                ResponseStatus::Unexpected,
                format!("simulated failure releasing {kind}"),
            ));
        }
        RawHandle::NULL
    }

    fn read_string(
        &self,
        call: &str,
        handle: RawHandle,
        buffer: Option<&mut [u16]>,
        size: &mut usize,
        select: impl FnOnce(&Object) -> Option<&str>,
    ) -> RawHandle {
        let mut state = self.state();
        let is_error = matches!(state.objects.get(handle), Some(Object::Error(_)));
        if !is_error {
            if let Some(error) = state.not_started(call) {
                return error;
            }
        }
        let corrupt = state.corrupt_strings && !is_error;
        let written = match state.objects.get(handle).and_then(select) {
            Some(value) => write_string(value, corrupt, buffer, size),
            None => return state.bad_handle(call, handle),
        };
        match written {
            Ok(()) => RawHandle::NULL,
            Err(error) => state.raise(error),
        }
    }

    fn read_error(&self, call: &str, error: RawHandle, read: impl FnOnce(&NativeErrorSpec)) -> RawHandle {
        let mut state = self.state();
        match state.objects.get(error) {
            Some(Object::Error(spec)) => {
                read(spec);
                RawHandle::NULL
            }
            _ => state.bad_handle(call, error),
        }
    }

    fn update_parameters(&self, call: &str, params: RawHandle, update: impl FnOnce(&mut ParametersObject)) -> RawHandle {
        let mut state = self.state();
        if let Some(error) = state.not_started(call) {
            return error;
        }
        match state.objects.get_mut(params) {
            Some(Object::Parameters(parameters)) => {
                update(parameters);
                RawHandle::NULL
            }
            _ => state.bad_handle(call, params),
        }
    }

    fn embedded_error(&self, call: &str, result: RawHandle, output: &mut RawHandle) -> RawHandle {
        let mut state = self.state();
        if let Some(error) = state.not_started(call) {
            return error;
        }
        let embedded = match state.objects.get(result) {
            Some(Object::AuthResult(result)) => result.error.clone(),
            Some(Object::SignOutResult(result)) => result.error.clone(),
            _ => return state.bad_handle(call, result),
        };
        if let Some(error) = embedded {
            *output = state.raise(error);
        }
        RawHandle::NULL
    }
}

impl NativeApi for InMemoryNativeRuntime {
    fn startup(&self) -> RawHandle {
        let mut state = self.state();
        state.startup_calls += 1;
        if state.started {
            state.record_violation("startup called while already started".to_string());
        }
        if let Some(error) = state.startup_failure.clone() {
            debug!("simulated startup failure");
            return state.raise(error);
        }
        state.started = true;
        RawHandle::NULL
    }

    fn shutdown(&self) {
        let mut state = self.state();
        state.shutdown_calls += 1;
        if !state.started {
            state.record_violation("shutdown called while not started".to_string());
        }
        state.started = false;
        let panic = state.panic_on_shutdown;
        drop(state);
        if panic {
            panic!("simulated shutdown failure");
        }
    }

    fn release_error(&self, error: RawHandle) -> bool {
        let mut state = self.state();
        if !matches!(state.objects.get(error), Some(Object::Error(_))) {
            state.record_violation(format!("release_error: {error:?} is not a live error"));
            return false;
        }
        state.objects.remove(error);
        !state.failing_releases.contains("error")
    }

    fn get_status(&self, error: RawHandle, status: &mut i32) -> RawHandle {
        self.read_error("get_status", error, |spec| *status = spec.status.as_raw())
    }

    fn get_error_code(&self, error: RawHandle, code: &mut i32) -> RawHandle {
        self.read_error("get_error_code", error, |spec| *code = spec.error_code)
    }

    fn get_tag(&self, error: RawHandle, tag: &mut i32) -> RawHandle {
        self.read_error("get_tag", error, |spec| *tag = spec.tag)
    }

    fn get_context(&self, error: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle {
        {
            let mut state = self.state();
            if let Some(failure) = state.context_failure.clone() {
                debug!("simulated context read failure");
                return state.raise(failure);
            }
        }
        self.read_string("get_context", error, buffer, size, |object| match object {
            Object::Error(spec) => Some(spec.context.as_str()),
            _ => None,
        })
    }

    fn release_async_handle(&self, async_handle: RawHandle) -> RawHandle {
        self.release("release_async_handle", async_handle, "async_operation")
    }

    fn cancel_async_operation(&self, async_handle: RawHandle) -> RawHandle {
        let mut state = self.state();
        if let Some(error) = state.not_started("cancel_async_operation") {
            return error;
        }
        let token = match state.objects.get(async_handle) {
            Some(Object::Async(token)) => *token,
            _ => return state.bad_handle("cancel_async_operation", async_handle),
        };
        state.cancel_requests += 1;
        state.cancelled.insert(token);
        debug!(%token, "cancellation requested");
        RawHandle::NULL
    }

    fn create_auth_parameters(&self, client_id: &str, authority: &str, out: &mut RawHandle) -> RawHandle {
        let mut state = self.state();
        if let Some(error) = state.not_started("create_auth_parameters") {
            return error;
        }
        *out = state.objects.insert(Object::Parameters(ParametersObject {
            client_id: client_id.to_string(),
            authority: authority.to_string(),
            ..ParametersObject::default()
        }));
        RawHandle::NULL
    }

    fn release_auth_parameters(&self, params: RawHandle) -> RawHandle {
        self.release("release_auth_parameters", params, "auth_parameters")
    }

    fn set_requested_scopes(&self, params: RawHandle, scopes: &str) -> RawHandle {
        self.update_parameters("set_requested_scopes", params, |p| p.scopes = Some(scopes.to_string()))
    }

    fn set_redirect_uri(&self, params: RawHandle, redirect_uri: &str) -> RawHandle {
        self.update_parameters("set_redirect_uri", params, |p| {
            p.redirect_uri = Some(redirect_uri.to_string());
        })
    }

    fn set_decoded_claims(&self, params: RawHandle, claims: &str) -> RawHandle {
        self.update_parameters("set_decoded_claims", params, |p| p.claims = Some(claims.to_string()))
    }

    fn set_access_token_to_renew(&self, params: RawHandle, access_token: &str) -> RawHandle {
        self.update_parameters("set_access_token_to_renew", params, |p| {
            p.access_token_to_renew = Some(access_token.to_string());
        })
    }

    fn set_additional_parameter(&self, params: RawHandle, key: &str, value: &str) -> RawHandle {
        self.update_parameters("set_additional_parameter", params, |p| {
            p.properties.insert(key.to_string(), value.to_string());
        })
    }

    fn release_account(&self, account: RawHandle) -> RawHandle {
        self.release("release_account", account, "account")
    }

    fn get_account_id(&self, account: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle {
        self.read_string("get_account_id", account, buffer, size, |object| match object {
            Object::Account(record) => Some(record.id.as_str()),
            _ => None,
        })
    }

    fn get_client_info(&self, account: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle {
        self.read_string("get_client_info", account, buffer, size, |object| match object {
            Object::Account(record) => Some(record.client_info.as_str()),
            _ => None,
        })
    }

    fn get_account_property(
        &self,
        account: RawHandle,
        key: &str,
        buffer: Option<&mut [u16]>,
        size: &mut usize,
    ) -> RawHandle {
        self.read_string("get_account_property", account, buffer, size, |object| match object {
            Object::Account(record) => Some(record.properties.get(key).map_or("", String::as_str)),
            _ => None,
        })
    }

    fn release_auth_result(&self, result: RawHandle) -> RawHandle {
        self.release("release_auth_result", result, "auth_result")
    }

    fn get_account(&self, result: RawHandle, account: &mut RawHandle) -> RawHandle {
        let mut state = self.state();
        if let Some(error) = state.not_started("get_account") {
            return error;
        }
        let record = match state.objects.get(result) {
            Some(Object::AuthResult(result)) => result.account.clone(),
            _ => return state.bad_handle("get_account", result),
        };
        if let Some(record) = record {
            *account = state.objects.insert(Object::Account(record));
        }
        RawHandle::NULL
    }

    fn get_access_token(&self, result: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle {
        self.read_string("get_access_token", result, buffer, size, |object| match object {
            Object::AuthResult(result) => Some(result.access_token.as_str()),
            _ => None,
        })
    }

    fn get_raw_id_token(&self, result: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle {
        self.read_string("get_raw_id_token", result, buffer, size, |object| match object {
            Object::AuthResult(result) => Some(result.id_token.as_str()),
            _ => None,
        })
    }

    fn get_granted_scopes(&self, result: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle {
        self.read_string("get_granted_scopes", result, buffer, size, |object| match object {
            Object::AuthResult(result) => Some(result.granted_scopes.as_str()),
            _ => None,
        })
    }

    fn get_expires_on(&self, result: RawHandle, expires_on: &mut i64) -> RawHandle {
        let mut state = self.state();
        if let Some(error) = state.not_started("get_expires_on") {
            return error;
        }
        match state.objects.get(result) {
            Some(Object::AuthResult(result)) => {
                *expires_on = result.expires_on;
                RawHandle::NULL
            }
            _ => state.bad_handle("get_expires_on", result),
        }
    }

    fn get_error(&self, result: RawHandle, error: &mut RawHandle) -> RawHandle {
        self.embedded_error("get_error", result, error)
    }

    fn get_telemetry_data(&self, result: RawHandle, buffer: Option<&mut [u16]>, size: &mut usize) -> RawHandle {
        self.read_string("get_telemetry_data", result, buffer, size, |object| match object {
            Object::AuthResult(result) => Some(result.telemetry.as_str()),
            _ => None,
        })
    }

    fn release_sign_out_result(&self, result: RawHandle) -> RawHandle {
        self.release("release_sign_out_result", result, "sign_out_result")
    }

    fn get_sign_out_error(&self, result: RawHandle, error: &mut RawHandle) -> RawHandle {
        self.embedded_error("get_sign_out_error", result, error)
    }

    fn get_sign_out_telemetry_data(
        &self,
        result: RawHandle,
        buffer: Option<&mut [u16]>,
        size: &mut usize,
    ) -> RawHandle {
        self.read_string("get_sign_out_telemetry_data", result, buffer, size, |object| match object {
            Object::SignOutResult(result) => Some(result.telemetry.as_str()),
            _ => None,
        })
    }

    fn sign_in(
        &self,
        _parent: WindowHandle,
        params: RawHandle,
        correlation_id: &str,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle {
        match self.request_for(Operation::SignIn, correlation_id, params) {
            Ok(request) => self.start(request, routine, token, async_handle),
            Err(error) => error,
        }
    }

    fn sign_in_silently(
        &self,
        params: RawHandle,
        correlation_id: &str,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle {
        match self.request_for(Operation::SignInSilently, correlation_id, params) {
            Ok(request) => self.start(request, routine, token, async_handle),
            Err(error) => error,
        }
    }

    fn sign_in_interactively(
        &self,
        _parent: WindowHandle,
        params: RawHandle,
        correlation_id: &str,
        account_hint: &str,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle {
        match self.request_for(Operation::SignInInteractively, correlation_id, params) {
            Ok(mut request) => {
                request.account_hint = Some(account_hint.to_string());
                self.start(request, routine, token, async_handle)
            }
            Err(error) => error,
        }
    }

    fn acquire_token_silently(
        &self,
        params: RawHandle,
        correlation_id: &str,
        account: RawHandle,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle {
        let request = self
            .request_for(Operation::AcquireTokenSilently, correlation_id, params)
            .and_then(|mut request| {
                request.account_id = Some(self.account_id_of("acquire_token_silently", account)?);
                Ok(request)
            });
        match request {
            Ok(request) => self.start(request, routine, token, async_handle),
            Err(error) => error,
        }
    }

    fn acquire_token_interactively(
        &self,
        _parent: WindowHandle,
        params: RawHandle,
        correlation_id: &str,
        account: RawHandle,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle {
        let request = self
            .request_for(Operation::AcquireTokenInteractively, correlation_id, params)
            .and_then(|mut request| {
                request.account_id = Some(self.account_id_of("acquire_token_interactively", account)?);
                Ok(request)
            });
        match request {
            Ok(request) => self.start(request, routine, token, async_handle),
            Err(error) => error,
        }
    }

    fn read_account_by_id(
        &self,
        account_id: &str,
        correlation_id: &str,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle {
        let mut request = RequestRecord::new(Operation::ReadAccountById, correlation_id);
        request.account_id = Some(account_id.to_string());
        self.start(request, routine, token, async_handle)
    }

    fn sign_out_silently(
        &self,
        client_id: &str,
        correlation_id: &str,
        account: RawHandle,
        routine: CompletionRoutine,
        token: CompletionToken,
        async_handle: &mut RawHandle,
    ) -> RawHandle {
        match self.account_id_of("sign_out_silently", account) {
            Ok(account_id) => {
                let mut request = RequestRecord::new(Operation::SignOutSilently, correlation_id);
                request.client_id = Some(client_id.to_string());
                request.account_id = Some(account_id);
                self.start(request, routine, token, async_handle)
            }
            Err(error) => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_routine(_result: RawHandle, _token: CompletionToken) {}

    #[test]
    fn contract_checks_flag_use_before_startup() {
        let runtime = InMemoryNativeRuntime::new();
        let mut params = RawHandle::NULL;

        let error = runtime.create_auth_parameters("client", "authority", &mut params);

        assert!(!error.is_null());
        assert!(params.is_null());
        assert_eq!(runtime.contract_violations().len(), 1);
    }

    #[test]
    fn double_release_is_a_contract_violation() {
        let runtime = InMemoryNativeRuntime::new();
        assert!(runtime.startup().is_null());
        let mut params = RawHandle::NULL;
        assert!(runtime.create_auth_parameters("client", "authority", &mut params).is_null());

        assert!(runtime.release_auth_parameters(params).is_null());
        let second = runtime.release_auth_parameters(params);

        assert!(!second.is_null());
        assert_eq!(runtime.contract_violations().len(), 1);
        assert!(runtime.release_error(second));
        assert_eq!(runtime.live_objects(), 0);
    }

    #[test]
    fn manual_calls_wait_for_completion() {
        let runtime = InMemoryNativeRuntime::new();
        runtime.startup();
        let mut async_handle = RawHandle::NULL;

        let error = runtime.read_account_by_id(
            "account-7",
            "cid-1",
            noop_routine,
            CompletionToken::next(),
            &mut async_handle,
        );

        assert!(error.is_null());
        assert!(!async_handle.is_null());
        assert_eq!(runtime.pending_calls().len(), 1);
        assert!(runtime.complete_next());
        assert!(runtime.pending_calls().is_empty());
        assert_eq!(runtime.live_object_kinds(), ["async_operation", "auth_result"]);
    }

    #[test]
    fn scripted_sync_failure_writes_no_async_handle() {
        let runtime = InMemoryNativeRuntime::new();
        runtime.startup();
        runtime.script(
            Operation::ReadAccountById,
            Scripted::FailSync(NativeErrorSpec::new(ResponseStatus::UserCanceled, "closed")),
        );
        let mut async_handle = RawHandle::NULL;

        let error = runtime.read_account_by_id("a", "cid", noop_routine, CompletionToken::next(), &mut async_handle);

        assert!(!error.is_null());
        assert!(async_handle.is_null());
        assert!(runtime.pending_calls().is_empty());
    }

    #[test]
    fn shutdown_panics_when_asked_to() {
        let runtime = InMemoryNativeRuntime::new();
        runtime.startup();
        runtime.panic_on_shutdown(true);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| runtime.shutdown()));

        assert!(outcome.is_err());
        assert!(!runtime.is_started());
    }
}
