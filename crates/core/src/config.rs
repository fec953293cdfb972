//! Overlay configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) gives the
//! stock setup: 60° camera, 0.3 model scale, 640x480 stream request.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::scene::MAX_GRID;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Vertical field of view in degrees, for both the 3D camera and the
    /// tracker.
    pub fov_degrees: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
    /// Uniform scale of the placeholder content.
    pub model_scale: f32,
    /// Landscape stream resolution to request.
    pub requested_width: u32,
    pub requested_height: u32,
    /// Replicate the placeholder on an N x N grid. 0 disables.
    pub debug_grid: u32,
    /// Pose updates per FPS report.
    pub stats_window: u32,
    /// RGBA clear color behind the video layer.
    pub clear_color: [f32; 4],
}

fn default_fov_degrees() -> f32 { 60.0 }
fn default_near() -> f32 { 0.01 }
fn default_far() -> f32 { 1000.0 }
fn default_model_scale() -> f32 { 0.3 }
fn default_requested_width() -> u32 { 640 }
fn default_requested_height() -> u32 { 480 }
fn default_stats_window() -> u32 { 60 }

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            fov_degrees: default_fov_degrees(),
            near: default_near(),
            far: default_far(),
            model_scale: default_model_scale(),
            requested_width: default_requested_width(),
            requested_height: default_requested_height(),
            debug_grid: 0,
            stats_window: default_stats_window(),
            clear_color: [0.0; 4],
        }
    }
}

impl OverlayConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: OverlayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load `path`, falling back to defaults when it is missing or broken.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("{e}; using defaults");
                Self::default()
            }
        }
    }

    /// Stream resolution to request in landscape.
    pub fn requested(&self) -> (u32, u32) {
        (self.requested_width, self.requested_height)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "fov_degrees must be in (0, 180), got {}",
                self.fov_degrees
            )));
        }
        if !(self.near > 0.0 && self.far > self.near) {
            return Err(ConfigError::Invalid(format!(
                "clip planes must satisfy 0 < near < far, got {}..{}",
                self.near, self.far
            )));
        }
        if self.requested_width == 0 || self.requested_height == 0 {
            return Err(ConfigError::Invalid("requested resolution must be nonzero".into()));
        }
        if self.debug_grid > MAX_GRID {
            return Err(ConfigError::Invalid(format!(
                "debug_grid must be at most {MAX_GRID}, got {}",
                self.debug_grid
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = OverlayConfig::from_toml("").unwrap();
        assert_eq!(config, OverlayConfig::default());
        assert_eq!(config.fov_degrees, 60.0);
        assert_eq!(config.model_scale, 0.3);
        assert_eq!(config.requested(), (640, 480));
        assert_eq!(config.stats_window, 60);
    }

    #[test]
    fn partial_document_overrides() {
        let config = OverlayConfig::from_toml(
            r#"
            model_scale = 0.5
            debug_grid = 3
            clear_color = [0.0, 0.0, 0.0, 1.0]
            "#,
        )
        .unwrap();
        assert_eq!(config.model_scale, 0.5);
        assert_eq!(config.debug_grid, 3);
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.near, 0.01);
    }

    #[test]
    fn bad_documents_are_rejected() {
        assert!(matches!(
            OverlayConfig::from_toml("fov_degrees = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            OverlayConfig::from_toml("near = 10.0\nfar = 1.0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn oversized_debug_grid_is_rejected() {
        assert!(OverlayConfig::from_toml("debug_grid = 64").is_ok());
        assert!(matches!(
            OverlayConfig::from_toml("debug_grid = 70000"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn missing_file_falls_back() {
        let config = OverlayConfig::load_or_default("/nonexistent/poseview.toml");
        assert_eq!(config, OverlayConfig::default());
    }
}
