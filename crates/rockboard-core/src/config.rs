//! Overlay configuration, stored as JSON.

use crate::marker::{MarkerColor, MarkerKind};
use crate::overlay::DEFAULT_GLYPH_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default cap on rendered markers per client.
pub const DEFAULT_MAX_MARKERS: usize = 500;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the feedback overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Highlight color stamped on placed markers (`#RRGGBB`).
    pub marker_color: String,
    /// Glyph edge length in local pixels.
    pub glyph_size: f64,
    /// Maximum rendered markers; the oldest are dropped first. `null` disables the cap.
    pub max_markers: Option<usize>,
    /// Marker armed when the overlay opens.
    pub default_marker: MarkerKind,
    /// Recipient connection ids; empty addresses the whole session.
    pub recipients: Vec<String>,
    /// Drop annotations whose glyph is not a known marker kind.
    pub known_markers_only: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            marker_color: MarkerColor::default().to_hex(),
            glyph_size: DEFAULT_GLYPH_SIZE,
            max_markers: Some(DEFAULT_MAX_MARKERS),
            default_marker: MarkerKind::default(),
            recipients: Vec::new(),
            known_markers_only: false,
        }
    }
}

impl OverlayConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> ConfigResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from a file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let json = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Load from a file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::info!("No overlay config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ConfigError::Io(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        fs::write(path, self.to_json()?)
            .map_err(|e| ConfigError::Io(format!("Failed to write {}: {}", path.display(), e)))
    }

    /// Default config location.
    ///
    /// On Unix: `~/.config/rockboard/overlay.json`
    /// On Windows: `%APPDATA%\rockboard\overlay.json`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .map(|base| base.join("rockboard").join("overlay.json"))
    }

    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if MarkerColor::parse_hex(&self.marker_color).is_none() {
            return Err(ConfigError::Invalid(format!(
                "marker_color is not a hex color: {}",
                self.marker_color
            )));
        }
        if !(self.glyph_size.is_finite() && self.glyph_size > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "glyph_size must be positive, got {}",
                self.glyph_size
            )));
        }
        if self.max_markers == Some(0) {
            return Err(ConfigError::Invalid(
                "max_markers must be at least 1 (use null for no limit)".to_string(),
            ));
        }
        Ok(())
    }

    /// Parsed marker color, or the default when unparseable.
    pub fn color(&self) -> MarkerColor {
        MarkerColor::parse_hex(&self.marker_color).unwrap_or_default()
    }
}
