//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`EngineSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `CHRONICLE_*` environment variable overrides (highest priority)
//! 4. [`EngineSettings::validate`]
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::EngineSettings;

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults (plus overrides). If the file
/// contains invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<EngineSettings> {
    let user = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        Some(serde_json::from_str::<Value>(&content)?)
    } else {
        debug!(?path, "settings file not found, using defaults");
        None
    };
    let mut settings = merge_over_defaults(user)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Parse settings from a JSON string, deep-merged over defaults.
///
/// Environment overrides are not applied.
pub fn load_settings_from_str(json: &str) -> Result<EngineSettings> {
    let user: Value = serde_json::from_str(json)?;
    let mut settings = merge_over_defaults(Some(user))?;
    settings.validate();
    Ok(settings)
}

fn merge_over_defaults(user: Option<Value>) -> Result<EngineSettings> {
    let defaults = serde_json::to_value(EngineSettings::default())?;
    let merged = match user {
        Some(user) => deep_merge(defaults, user),
        None => defaults,
    };
    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHRONICLE_*` environment variable overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut EngineSettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`.
///
/// Parsing is strict:
/// - Integers must be valid and within the specified range
/// - Booleans accept: `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`
/// - Invalid values are ignored (fall back to file/default)
pub fn apply_overrides(settings: &mut EngineSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = read_bool(&lookup, "CHRONICLE_SHORT_TERM_ENABLED") {
        settings.reducer.short_term_enabled = v;
    }
    if let Some(v) = read_bool(&lookup, "CHRONICLE_PERSIST_CHECKPOINTS") {
        settings.replay.persist_checkpoints = v;
    }
    if let Some(v) = read_bool(&lookup, "CHRONICLE_SKIP_USER_ENTRIES") {
        settings.replay.skip_user_entries = v;
    }
    if let Some(v) = read_usize(&lookup, "CHRONICLE_MAX_CHECKPOINTS", 1, 100_000) {
        settings.replay.max_checkpoints = v;
    }
    if let Some(v) = read_string(&lookup, "CHRONICLE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn read_string(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    let raw = lookup(key)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn read_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = read_string(lookup, key)?;
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => {
            debug!(key, value = %raw, "ignoring unparseable boolean override");
            None
        }
    }
}

fn read_usize(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    min: usize,
    max: usize,
) -> Option<usize> {
    let raw = read_string(lookup, key)?;
    match raw.parse::<usize>() {
        Ok(v) if (min..=max).contains(&v) => Some(v),
        _ => {
            debug!(key, value = %raw, "ignoring out-of-range integer override");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
