//! Diagnostic sink and live-handle registry.
//!
//! Failures that cannot be returned to a caller (a release failing on drop, a
//! native shutdown panicking, a completion arriving for nobody) end up here.
//! Each native module owns one [`Diagnostics`]; its counters never reset, and
//! a bounded history of recent events is kept for inspection.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::config::BridgeConfig;

/// What a diagnostic event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// A native release call failed
    HandleLifecycle,
    /// The native layer broke its contract
    ProtocolViolation,
    /// A module reference was returned while the count was already zero
    RefCountUnderflow,
    /// Native shutdown panicked
    ShutdownFailure,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticEvent {
    /// Classification
    pub kind: DiagnosticKind,
    /// Free-form description
    pub detail: String,
    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Identifies a tracked handle in the live-handle registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackingId(u64);

#[derive(Debug, Clone, Copy)]
struct LiveHandle {
    kind: &'static str,
    created_at: Instant,
}

/// Snapshot of the live-handle registry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HandleStats {
    /// Number of tracked live handles
    pub total_live: usize,
    /// Live handles per kind
    pub by_kind: HashMap<&'static str, usize>,
    /// Age of the oldest tracked handle
    pub oldest_age: Duration,
}

/// Per-module diagnostic state.
#[derive(Debug)]
pub struct Diagnostics {
    config: BridgeConfig,
    lifecycle_failures: AtomicU64,
    protocol_violations: AtomicU64,
    recent: Mutex<VecDeque<DiagnosticEvent>>,
    live: Mutex<HashMap<TrackingId, LiveHandle>>,
    next_id: AtomicU64,
}

impl Diagnostics {
    /// Creates an empty sink.
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            lifecycle_failures: AtomicU64::new(0),
            protocol_violations: AtomicU64::new(0),
            recent: Mutex::new(VecDeque::new()),
            live: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The configuration this sink was created with.
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Records an event, evicting the oldest one when the history is full.
    pub fn record(&self, kind: DiagnosticKind, detail: impl Into<String>) {
        match kind {
            DiagnosticKind::HandleLifecycle | DiagnosticKind::ShutdownFailure => {
                self.lifecycle_failures.fetch_add(1, Ordering::Relaxed);
            }
            DiagnosticKind::ProtocolViolation => {
                self.protocol_violations.fetch_add(1, Ordering::Relaxed);
            }
            DiagnosticKind::RefCountUnderflow => {}
        }

        let capacity: usize = self.config.diagnostic_history.into();
        let mut recent = self.recent.lock();
        while recent.len() >= capacity {
            recent.pop_front();
        }
        recent.push_back(DiagnosticEvent {
            kind,
            detail: detail.into(),
            recorded_at: Utc::now(),
        });
    }

    /// Release and shutdown failures recorded so far.
    pub fn lifecycle_failures(&self) -> u64 {
        self.lifecycle_failures.load(Ordering::Relaxed)
    }

    /// Protocol violations recorded so far.
    pub fn protocol_violations(&self) -> u64 {
        self.protocol_violations.load(Ordering::Relaxed)
    }

    /// Recent events, oldest first.
    pub fn recent(&self) -> Vec<DiagnosticEvent> {
        self.recent.lock().iter().cloned().collect()
    }

    /// Registers a newly created handle. Returns `None` when tracking is off.
    pub fn track(&self, kind: &'static str) -> Option<TrackingId> {
        if !self.config.track_handles {
            return None;
        }
        let id = TrackingId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.live.lock().insert(
            id,
            LiveHandle {
                kind,
                created_at: Instant::now(),
            },
        );
        Some(id)
    }

    /// Removes a released handle from the registry.
    pub fn untrack(&self, id: TrackingId) {
        self.live.lock().remove(&id);
    }

    /// Kinds of all tracked live handles, sorted.
    pub fn live_kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.live.lock().values().map(|handle| handle.kind).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Statistics about the tracked live handles.
    pub fn handle_stats(&self) -> HandleStats {
        let live = self.live.lock();
        let mut stats = HandleStats {
            total_live: live.len(),
            ..HandleStats::default()
        };
        for handle in live.values() {
            *stats.by_kind.entry(handle.kind).or_insert(0) += 1;
            stats.oldest_age = stats.oldest_age.max(handle.created_at.elapsed());
        }
        stats
    }

    /// Kinds of tracked handles older than `threshold`.
    pub fn find_potential_leaks(&self, threshold: Duration) -> Vec<&'static str> {
        self.live
            .lock()
            .values()
            .filter(|handle| handle.created_at.elapsed() > threshold)
            .map(|handle| handle.kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiagnosticHistory;

    #[test]
    fn history_is_bounded_and_counters_are_not() {
        let config = BridgeConfig::diagnostic().with_diagnostic_history(DiagnosticHistory::try_new(2).unwrap());
        let diagnostics = Diagnostics::new(config);

        diagnostics.record(DiagnosticKind::HandleLifecycle, "first");
        diagnostics.record(DiagnosticKind::ProtocolViolation, "second");
        diagnostics.record(DiagnosticKind::HandleLifecycle, "third");

        let details: Vec<_> = diagnostics.recent().into_iter().map(|event| event.detail).collect();
        assert_eq!(details, ["second", "third"]);
        assert_eq!(diagnostics.lifecycle_failures(), 2);
        assert_eq!(diagnostics.protocol_violations(), 1);
    }

    #[test]
    fn tracking_respects_configuration() {
        let off = Diagnostics::new(BridgeConfig::production());
        assert!(off.track("account").is_none());
        assert_eq!(off.handle_stats().total_live, 0);

        let on = Diagnostics::new(BridgeConfig::diagnostic());
        let account = on.track("account").unwrap();
        let _result = on.track("auth_result").unwrap();
        assert_eq!(on.live_kinds(), ["account", "auth_result"]);

        on.untrack(account);
        let stats = on.handle_stats();
        assert_eq!(stats.total_live, 1);
        assert_eq!(stats.by_kind.get("auth_result"), Some(&1));
    }

    #[test]
    fn potential_leaks_are_filtered_by_age() {
        let diagnostics = Diagnostics::new(BridgeConfig::diagnostic());
        diagnostics.track("async_operation");
        std::thread::sleep(Duration::from_millis(2));

        assert!(diagnostics.find_potential_leaks(Duration::from_secs(3600)).is_empty());
        assert_eq!(diagnostics.find_potential_leaks(Duration::ZERO).len(), 1);
    }
}
