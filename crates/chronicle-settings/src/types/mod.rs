//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file format.
//! Each type implements [`Default`] with production default values, and
//! `#[serde(default)]` lets a partial file fill in the rest.

use serde::{Deserialize, Serialize};

/// Root settings type for the chronicle engine.
///
/// Built once by the host (see [`crate::load_settings_from_path`]) and passed
/// by reference into the reducer and the replay engine. There is no global
/// instance.
///
/// ```json
/// {
///   "reducer": { "shortTermEnabled": false },
///   "replay": { "maxCheckpoints": 4 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// State reducer toggles.
    pub reducer: ReducerSettings,
    /// Checkpoint and replay behaviour.
    pub replay: ReplaySettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl EngineSettings {
    /// Correct invalid values in place.
    ///
    /// Called automatically during loading. Out-of-range values are clamped
    /// with a warning rather than rejected.
    pub fn validate(&mut self) {
        if self.replay.max_checkpoints == 0 {
            tracing::warn!("replay.maxCheckpoints is 0, clamped to 1");
            self.replay.max_checkpoints = 1;
        }
        if self.logging.level.trim().is_empty() {
            tracing::warn!("logging.level is empty, using \"warn\"");
            self.logging.level = LoggingSettings::default().level;
        }
    }
}

/// Feature toggles consumed by the state reducer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReducerSettings {
    /// Whether ops on short-term parameters are applied at all.
    pub short_term_enabled: bool,
}

impl Default for ReducerSettings {
    fn default() -> Self {
        Self {
            short_term_enabled: true,
        }
    }
}

/// Checkpoint and replay behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplaySettings {
    /// Write a checkpoint at the target position after every rebuild.
    pub persist_checkpoints: bool,
    /// Upper bound on checkpoints held by the in-memory store.
    pub max_checkpoints: usize,
    /// Skip entries authored by the querying party.
    pub skip_user_entries: bool,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            persist_checkpoints: true,
            max_checkpoints: 16,
            skip_user_entries: true,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults() {
        let s = EngineSettings::default();
        assert!(s.reducer.short_term_enabled);
        assert!(s.replay.persist_checkpoints);
        assert!(s.replay.skip_user_entries);
        assert_eq!(s.replay.max_checkpoints, 16);
        assert_eq!(s.logging.level, "warn");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: EngineSettings =
            serde_json::from_value(json!({"replay": {"maxCheckpoints": 3}})).unwrap();
        assert_eq!(s.replay.max_checkpoints, 3);
        assert!(s.replay.persist_checkpoints);
        assert!(s.reducer.short_term_enabled);
    }

    #[test]
    fn serializes_camel_case() {
        let v = serde_json::to_value(EngineSettings::default()).unwrap();
        assert_eq!(v["reducer"]["shortTermEnabled"], true);
        assert_eq!(v["replay"]["persistCheckpoints"], true);
        assert_eq!(v["replay"]["skipUserEntries"], true);
    }

    #[test]
    fn validate_clamps_zero_checkpoints() {
        let mut s = EngineSettings::default();
        s.replay.max_checkpoints = 0;
        s.validate();
        assert_eq!(s.replay.max_checkpoints, 1);
    }

    #[test]
    fn validate_restores_empty_level() {
        let mut s = EngineSettings::default();
        s.logging.level = "  ".into();
        s.validate();
        assert_eq!(s.logging.level, "warn");
    }
}
