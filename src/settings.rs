//! Tunable engine parameters loaded from TOML.
//!
//! - `init_custom(toml_content)` sets a custom TOML before first `settings()` call
//! - `settings()` returns `&'static Settings` (lazy-init singleton)
//! - Default values are embedded via `include_str!("default_settings.toml")`

use std::sync::OnceLock;

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

static CUSTOM_TOML: OnceLock<String> = OnceLock::new();

/// Set custom TOML before first `settings()` call.
pub fn init_custom(toml_content: String) -> Result<(), SettingsError> {
    parse_settings_toml(&toml_content)?;
    CUSTOM_TOML
        .set(toml_content)
        .map_err(|_| SettingsError::AlreadyInitialized)
}

/// Get or initialize the global settings singleton.
pub fn settings() -> &'static Settings {
    static INSTANCE: OnceLock<Settings> = OnceLock::new();
    INSTANCE.get_or_init(|| {
        let toml_str = CUSTOM_TOML
            .get()
            .map(|s| s.as_str())
            .unwrap_or(DEFAULT_SETTINGS_TOML);
        parse_settings_toml(toml_str).expect("settings TOML must be valid")
    })
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("settings already initialized")]
    AlreadyInitialized,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub probability: ProbabilitySettings,
    pub capacity: CapacitySettings,
    pub gc: GcSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbabilitySettings {
    /// Added to a bigram probability before blending with the unigram value.
    /// Tunable ranking weight, not a correctness constant.
    pub bigram_boost: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CapacitySettings {
    /// Hard ceiling for the trie buffer; positions are 32-bit offsets.
    pub max_trie_buffer_size: u32,
    pub max_unigram_count: u32,
    pub max_bigram_count: u32,
    /// Dynamic operations are refused within this margin of the maximum.
    pub margin_to_refuse_dynamic_operations: u32,
    /// Below this buffer size, GC is not worth the cost.
    pub min_dict_size_to_refuse_dynamic_operations: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GcSettings {
    /// Dead-to-total node ratio past which a non-blocking caller gets GC.
    pub dead_ratio_threshold: f64,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    if s.probability.bigram_boost > 255 {
        return Err(SettingsError::InvalidValue {
            field: "probability.bigram_boost".into(),
            reason: "must be <= 255".into(),
        });
    }
    if s.capacity.margin_to_refuse_dynamic_operations >= s.capacity.max_trie_buffer_size {
        return Err(SettingsError::InvalidValue {
            field: "capacity.margin_to_refuse_dynamic_operations".into(),
            reason: "must be smaller than max_trie_buffer_size".into(),
        });
    }
    if !(0.0..1.0).contains(&s.gc.dead_ratio_threshold) {
        return Err(SettingsError::InvalidValue {
            field: "gc.dead_ratio_threshold".into(),
            reason: "must be in [0, 1)".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let s = parse_settings_toml(DEFAULT_SETTINGS_TOML).unwrap();
        assert!(s.probability.bigram_boost <= 255);
        assert!(s.capacity.margin_to_refuse_dynamic_operations < s.capacity.max_trie_buffer_size);
    }

    #[test]
    fn test_rejects_bad_ratio() {
        let toml = DEFAULT_SETTINGS_TOML.replace(
            "dead_ratio_threshold = 0.25",
            "dead_ratio_threshold = 1.5",
        );
        assert!(parse_settings_toml(&toml).is_err());
    }
}
