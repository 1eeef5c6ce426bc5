//! Bridge configuration.
//!
//! All knobs concern diagnostics; the bridge's lifetime rules are not
//! configurable. Values are validated at construction so an invalid
//! configuration cannot exist.

use nutype::nutype;
use serde::{Deserialize, Serialize};

/// Number of diagnostic records kept for inspection.
///
/// Validated to be between 1 and 4096 so the history stays bounded.
#[nutype(
    validate(greater_or_equal = 1, less_or_equal = 4096),
    derive(
        Debug,
        Clone,
        Copy,
        PartialEq,
        Eq,
        PartialOrd,
        Ord,
        Into,
        Serialize,
        Deserialize
    )
)]
pub struct DiagnosticHistory(usize);

impl Default for DiagnosticHistory {
    fn default() -> Self {
        Self::try_new(64).expect("64 is within the valid history range")
    }
}

/// Configuration for a [`NativeModule`](crate::NativeModule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Record every live handle with its kind so leak checks can name them.
    pub track_handles: bool,
    /// Fail leak checks while any handle release failure is on record.
    pub strict_lifecycle: bool,
    /// How many diagnostic records to retain.
    pub diagnostic_history: DiagnosticHistory,
}

impl BridgeConfig {
    /// Configuration suited to diagnostic and test builds.
    pub fn diagnostic() -> Self {
        Self {
            track_handles: true,
            strict_lifecycle: true,
            diagnostic_history: DiagnosticHistory::default(),
        }
    }

    /// Configuration suited to production builds.
    pub fn production() -> Self {
        Self {
            track_handles: false,
            strict_lifecycle: false,
            diagnostic_history: DiagnosticHistory::default(),
        }
    }

    /// Enables or disables live-handle tracking.
    #[must_use]
    pub const fn with_handle_tracking(mut self, enabled: bool) -> Self {
        self.track_handles = enabled;
        self
    }

    /// Enables or disables strict lifecycle checking.
    #[must_use]
    pub const fn with_strict_lifecycle(mut self, enabled: bool) -> Self {
        self.strict_lifecycle = enabled;
        self
    }

    /// Sets the diagnostic history size.
    #[must_use]
    pub const fn with_diagnostic_history(mut self, history: DiagnosticHistory) -> Self {
        self.diagnostic_history = history;
        self
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::diagnostic()
        } else {
            Self::production()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_history_bounds() {
        assert!(DiagnosticHistory::try_new(0).is_err());
        assert!(DiagnosticHistory::try_new(1).is_ok());
        assert!(DiagnosticHistory::try_new(4096).is_ok());
        assert!(DiagnosticHistory::try_new(4097).is_err());
        assert_eq!(usize::from(DiagnosticHistory::default()), 64);
    }

    #[test]
    fn builders_override_presets() {
        let config = BridgeConfig::production()
            .with_handle_tracking(true)
            .with_diagnostic_history(DiagnosticHistory::try_new(8).unwrap());

        assert!(config.track_handles);
        assert!(!config.strict_lifecycle);
        assert_eq!(usize::from(config.diagnostic_history), 8);
    }

    #[test]
    fn default_follows_build_profile() {
        let config = BridgeConfig::default();
        assert_eq!(config.track_handles, cfg!(debug_assertions));
        assert_eq!(config.strict_lifecycle, cfg!(debug_assertions));
    }
}
