#![forbid(unsafe_code)]

//! Runtime configuration as data.
//!
//! [`RuntimeConfig`] collects the tunables of a presentation context. It can
//! be built in code, loaded from JSON, or (with the `config-file` feature)
//! loaded from TOML, and then adjusted from the environment.
//!
//! ```toml
//! # portage.toml
//! min_operation_gap_ms = 150
//! watchdog_timeout_ms = 2500
//! header_height = 52.0
//! ```
//!
//! # Environment overrides
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `PORTAGE_MIN_GAP_MS` | minimum gap after a native transition |
//! | `PORTAGE_WATCHDOG_MS` | watchdog timeout; `0` disables the watchdog |
//! | `PORTAGE_DIAGNOSTICS` | `0`/`false` silences `onDiagnostic` events |

#[cfg(feature = "config-file")]
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a presentation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Pause between the end of a native transition and the next dispatch.
    pub min_operation_gap_ms: u64,
    /// How long an operation may wait for its native callback.
    /// `None` disables the watchdog.
    pub watchdog_timeout_ms: Option<u64>,
    /// Height of the fixed header band, in points.
    pub header_height: f64,
    /// Number of surface transitions retained for inspection.
    pub transition_history: usize,
    /// Emit `onDiagnostic` events for failures.
    pub emit_diagnostics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_operation_gap_ms: 0,
            watchdog_timeout_ms: Some(3_000),
            header_height: 56.0,
            transition_history: 256,
            emit_diagnostics: true,
        }
    }
}

impl RuntimeConfig {
    #[must_use]
    pub fn min_operation_gap(mut self, gap: Duration) -> Self {
        self.min_operation_gap_ms = u64::try_from(gap.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn watchdog_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.watchdog_timeout_ms = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn header_height(mut self, height: f64) -> Self {
        self.header_height = height;
        self
    }

    #[must_use]
    pub fn emit_diagnostics(mut self, enabled: bool) -> Self {
        self.emit_diagnostics = enabled;
        self
    }

    /// Gap as a duration.
    pub fn gap(&self) -> Duration {
        Duration::from_millis(self.min_operation_gap_ms)
    }

    /// Watchdog timeout as a duration.
    pub fn watchdog(&self) -> Option<Duration> {
        self.watchdog_timeout_ms.map(Duration::from_millis)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).map_err(ConfigError::Json)?;
        config.checked()
    }

    /// Load from a TOML string.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(ConfigError::Toml)?;
        config.checked()
    }

    /// Load from a TOML file on disk.
    #[cfg(feature = "config-file")]
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Apply `PORTAGE_*` environment variables. Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, e.g. a map in tests.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(gap) = lookup("PORTAGE_MIN_GAP_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
            self.min_operation_gap_ms = gap;
        }
        if let Some(ms) = lookup("PORTAGE_WATCHDOG_MS").and_then(|v| v.trim().parse::<u64>().ok()) {
            self.watchdog_timeout_ms = (ms > 0).then_some(ms);
        }
        if let Some(raw) = lookup("PORTAGE_DIAGNOSTICS") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" => self.emit_diagnostics = false,
                "1" | "true" | "on" => self.emit_diagnostics = true,
                _ => {}
            }
        }
        self
    }

    /// Validate ranges. An empty list means the config is usable.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if !(self.header_height.is_finite() && self.header_height >= 0.0) {
            errors.push(format!(
                "header_height must be a non-negative number, got {}",
                self.header_height
            ));
        }
        if self.watchdog_timeout_ms == Some(0) {
            errors.push("watchdog_timeout_ms must be positive; use null to disable".into());
        }
        if self.transition_history == 0 {
            errors.push("transition_history must be at least 1".into());
        }
        errors
    }

    fn checked(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Errors from loading a [`RuntimeConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    #[cfg(feature = "config-file")]
    Toml(toml::de::Error),
    /// JSON parse error.
    Json(serde_json::Error),
    /// Values parsed but are out of range.
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            #[cfg(feature = "config-file")]
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
            Self::Validation(errors) => write!(f, "validation errors: {}", errors.join("; ")),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            #[cfg(feature = "config-file")]
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Validation(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = RuntimeConfig::default();
        assert!(config.validate().is_empty());
        assert_eq!(config.gap(), Duration::ZERO);
        assert_eq!(config.watchdog(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = RuntimeConfig::from_json_str(r#"{"min_operation_gap_ms": 120}"#).unwrap();
        assert_eq!(config.min_operation_gap_ms, 120);
        assert_eq!(config.header_height, 56.0);
    }

    #[test]
    fn json_null_disables_watchdog() {
        let config = RuntimeConfig::from_json_str(r#"{"watchdog_timeout_ms": null}"#).unwrap();
        assert_eq!(config.watchdog(), None);
    }

    #[test]
    fn invalid_json_values_fail_validation() {
        let err = RuntimeConfig::from_json_str(r#"{"watchdog_timeout_ms": 0, "transition_history": 0}"#)
            .unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            RuntimeConfig::from_json_str("{not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("PORTAGE_MIN_GAP_MS", "250"),
            ("PORTAGE_WATCHDOG_MS", "0"),
            ("PORTAGE_DIAGNOSTICS", "off"),
        ]
        .into_iter()
        .collect();
        let config = RuntimeConfig::default()
            .with_overrides_from(|key| vars.get(key).map(|v| (*v).to_owned()));
        assert_eq!(config.min_operation_gap_ms, 250);
        assert_eq!(config.watchdog_timeout_ms, None);
        assert!(!config.emit_diagnostics);
    }

    #[test]
    fn garbage_env_values_are_ignored() {
        let config = RuntimeConfig::default().with_overrides_from(|key| match key {
            "PORTAGE_MIN_GAP_MS" => Some("soon".into()),
            "PORTAGE_DIAGNOSTICS" => Some("maybe".into()),
            _ => None,
        });
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn builders_convert_durations() {
        let config = RuntimeConfig::default()
            .min_operation_gap(Duration::from_millis(80))
            .watchdog_timeout(None);
        assert_eq!(config.min_operation_gap_ms, 80);
        assert_eq!(config.watchdog_timeout_ms, None);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portage.toml");
        std::fs::write(&path, "min_operation_gap_ms = 40\nheader_height = 44.0\n").unwrap();
        let config = RuntimeConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.min_operation_gap_ms, 40);
        assert_eq!(config.header_height, 44.0);
        assert!(matches!(
            RuntimeConfig::from_toml_file(dir.path().join("missing.toml")),
            Err(ConfigError::Io(_))
        ));
    }
}
