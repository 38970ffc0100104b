//! Build configuration.
//!
//! Loaded from an optional `icons.toml`. Stock defaults are serialized to a
//! TOML value, the user file is merged on top, and the result is
//! deserialized and validated. A missing file means stock defaults.
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [processing]
//! max_processes = 4          # Max parallel workers (omit for auto = CPU cores)
//!
//! [render]
//! quality = 95               # JPEG quality of 512px renders (1-100)
//!
//! [reaction]
//! unknown_race = "fallback"  # "fallback" or "error"
//! ```
//!
//! Files are sparse: override just the values you want. Unknown keys are
//! rejected to catch typos early.

use crate::classify::{ClassifyOptions, UnknownRacePolicy};
use crate::imaging::{EncodeParams, Quality};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILENAME: &str = "icons.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub processing: ProcessingConfig,
    pub render: RenderConfig,
    pub reaction: ReactionConfig,
}

impl BuildConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.render.quality) {
            return Err(ConfigError::Validation(
                "render.quality must be 1-100".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn encode_params(&self) -> EncodeParams {
        EncodeParams {
            render_quality: Quality::new(self.render.quality),
        }
    }

    pub fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions {
            unknown_race: self.reaction.unknown_race,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers. When absent, defaults to the
    /// number of CPU cores. Larger values are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// JPEG quality for render-scale outputs.
    pub quality: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            quality: Quality::default().value(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReactionConfig {
    /// Policy for reactions whose race has no background.
    pub unknown_race: UnknownRacePolicy,
}

pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(BuildConfig::default())?)
}

/// Deep-merge two TOML values: tables merge recursively, anything else in
/// `overlay` replaces `base`.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read the file at `path` as raw TOML, or `None` if it does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<BuildConfig, ConfigError> {
    let overlay = load_raw_config(path)?;
    if overlay.is_none() {
        tracing::debug!(path = %path.display(), "no config file, using stock defaults");
    }
    resolve_config(stock_defaults_value()?, overlay)
}

/// Documented stock config, printed by `gen-config`.
pub fn stock_config_toml() -> &'static str {
    r##"# Icon Builder Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel composition workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# ---------------------------------------------------------------------------
# Render outputs (512px JPEG)
# ---------------------------------------------------------------------------
[render]
# JPEG encoding quality (1 = worst, 100 = best).
# Changing it rebuilds every render on the next run.
quality = 95

# ---------------------------------------------------------------------------
# Reactions
# ---------------------------------------------------------------------------
[reaction]
# What to do with a reaction whose race has no dedicated background:
#   "fallback" - use the generic background and log a warning
#   "error"    - fail the item with UnknownRace
unknown_race = "fallback"
"##
}
