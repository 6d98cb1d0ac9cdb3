// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Graphics settings
///
/// The present mode is not configurable: the renderer always uses FIFO.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: 2,
        }
    }
}

/// Paths to the compiled SPIR-V shader binaries
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: String,
    pub fragment: String,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: "shaders/triangle.vert.spv".to_string(),
            fragment: "shaders/triangle.frag.spv".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { show_fps: true }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.shaders.vertex, "shaders/triangle.vert.spv");
    }

    #[test]
    fn frames_in_flight_is_configurable() {
        let config: Config = toml::from_str(
            r#"
            [graphics]
            max_frames_in_flight = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.max_frames_in_flight, 3);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]); // default kept
    }

    #[test]
    fn partial_toml_only_overrides_named_keys() {
        let config: Config = toml::from_str(
            r#"
            [window]
            width = 800
            height = 600

            [graphics]
            clear_color = [0.1, 0.2, 0.3, 1.0]
            "#,
        )
        .unwrap();

        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.title, "Vulkan Triangle"); // default kept
        assert_eq!(config.graphics.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.shaders.fragment, "shaders/triangle.frag.spv");
    }
}
