//! Game configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. User values are
//! layered over stock defaults, so a config file only needs the keys it
//! wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! image_dir = "img"       # Directory holding the base images
//! bind = "0.0.0.0"
//! port = 8080
//! grid = "2x2"            # Which entry of [grid_options] to play
//! jpeg_quality = 95       # JPEG quality of cropped derivatives (1-100)
//! max_sessions = 10000    # Games kept in memory; least recently used go first
//!
//! [grid_options."2x2"]
//! width = 2
//! height = 2
//!
//! [grid_options."4x3"]
//! width = 4
//! height = 3
//!
//! [grid_options."6x5"]
//! width = 6
//! height = 5
//! ```
//!
//! User-defined grids are added next to the stock ones. A `grid` name that
//! is not defined falls back to `2x2`. Unknown keys are rejected to catch
//! typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Largest board a grid option may describe.
pub const MAX_CARDS: u32 = 400;

/// Grid name used when the configured one is not defined.
pub const FALLBACK_GRID: &str = "2x2";

/// Card grid dimensions. `width * height` cards hold `width * height / 2` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardSize {
    pub width: u32,
    pub height: u32,
}

impl BoardSize {
    pub fn cards(self) -> u32 {
        self.width.saturating_mul(self.height)
    }

    /// Number of distinct images a full board needs.
    pub fn pairs(self) -> usize {
        (self.cards() / 2) as usize
    }
}

impl Default for BoardSize {
    fn default() -> Self {
        Self {
            width: 2,
            height: 2,
        }
    }
}

/// Configuration loaded from `config.toml`.
///
/// All fields have sensible defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    /// Directory holding the base images; derivatives go to `<image_dir>/squared/`.
    pub image_dir: String,
    pub bind: String,
    pub port: u16,
    /// Name of the grid to play, a key of `grid_options`.
    pub grid: String,
    /// JPEG quality for cropped and re-encoded derivatives.
    pub jpeg_quality: u32,
    /// Number of game sessions kept in memory.
    pub max_sessions: usize,
    /// Named grid sizes.
    pub grid_options: BTreeMap<String, BoardSize>,
}

impl Default for GameConfig {
    fn default() -> Self {
        let grid_options = [("2x2", 2, 2), ("4x3", 4, 3), ("6x5", 6, 5)]
            .into_iter()
            .map(|(name, width, height)| (name.to_string(), BoardSize { width, height }))
            .collect();
        Self {
            image_dir: "img".to_string(),
            bind: "0.0.0.0".to_string(),
            port: 8080,
            grid: FALLBACK_GRID.to_string(),
            jpeg_quality: 95,
            max_sessions: crate::store::DEFAULT_MAX_SESSIONS,
            grid_options,
        }
    }
}

impl GameConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ConfigError::Validation(
                "jpeg_quality must be 1-100".into(),
            ));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Validation(
                "max_sessions must be at least 1".into(),
            ));
        }
        if self.image_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "image_dir must not be empty".into(),
            ));
        }
        for (name, size) in &self.grid_options {
            if size.cards() < 2 {
                return Err(ConfigError::Validation(format!(
                    "grid_options.{name} must have at least 2 cards"
                )));
            }
            if size.cards() > MAX_CARDS {
                return Err(ConfigError::Validation(format!(
                    "grid_options.{name} has more than {MAX_CARDS} cards ({}x{})",
                    size.width, size.height
                )));
            }
            if size.cards() % 2 != 0 {
                return Err(ConfigError::Validation(format!(
                    "grid_options.{name} has an odd number of cards ({}x{})",
                    size.width, size.height
                )));
            }
        }
        Ok(())
    }

    /// The board to deal: the selected grid, else `2x2`, else the stock 2x2.
    pub fn board(&self) -> BoardSize {
        self.grid_options
            .get(&self.grid)
            .or_else(|| self.grid_options.get(FALLBACK_GRID))
            .copied()
            .unwrap_or_default()
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(GameConfig::default())
        .map_err(|e| ConfigError::Validation(format!("stock defaults: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
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

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Load config from the given file.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<GameConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match load_raw_config(path)? {
        Some(overlay) => merge_toml(base, overlay),
        None => base,
    };
    let config: GameConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Memory Match Configuration
# ==========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Directory holding the base images. Cropped square copies are cached in
# <image_dir>/squared/ and reused on later games.
image_dir = "img"

# HTTP listener. The PORT environment variable and --port flag override port.
bind = "0.0.0.0"
port = 8080

# Which grid to play; must name an entry of [grid_options].
# Undefined names fall back to "2x2".
grid = "2x2"

# JPEG quality (1-100) for cropped and re-encoded square images.
jpeg_quality = 95

# Game sessions kept in memory. When full, the least recently used game is
# dropped and that browser starts over.
max_sessions = 10000

# ---------------------------------------------------------------------------
# Grid sizes. width * height must be even and at most 400; it holds
# width * height / 2 pairs.
# Add your own entries alongside these.
# ---------------------------------------------------------------------------
[grid_options."2x2"]
width = 2
height = 2

[grid_options."4x3"]
width = 4
height = 3

[grid_options."6x5"]
width = 6
height = 5
"##
}
