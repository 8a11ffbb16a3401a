// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and key is optional. A missing or broken config file falls
// back to the defaults below.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub assets: AssetsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Template".to_string(),
            width: 1280,
            height: 720,
            resizable: true,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.85, 0.5, 0.7, 1.0],
            max_frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
        }
    }
}

/// Files loaded at startup, relative to the working directory
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub texture: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            vertex_shader: PathBuf::from("res/shader.vert.spv"),
            fragment_shader: PathBuf::from("res/shader.frag.spv"),
            texture: PathBuf::from("res/texture.png"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub show_overlay: bool,
    pub show_fps_in_title: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            show_overlay: true,
            show_fps_in_title: true,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Where the active configuration came from
#[derive(Debug)]
pub enum ConfigSource {
    File(PathBuf),
    Missing(PathBuf),
    Invalid(anyhow::Error),
}

impl ConfigSource {
    pub fn log(&self) {
        match self {
            ConfigSource::File(path) => log::info!("Loaded configuration from {:?}", path),
            ConfigSource::Missing(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            ConfigSource::Invalid(e) => {
                log::warn!("Failed to load config.toml: {:#}. Using defaults.", e)
            }
        }
    }
}

impl Config {
    /// Load configuration from `config.toml`, falling back to defaults on error
    pub fn load() -> (Self, ConfigSource) {
        Self::load_or_default("config.toml")
    }

    /// Load `path`, or the defaults when it is missing or broken. Nothing is
    /// logged here because this runs before the logger exists.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, ConfigSource) {
        let path = path.as_ref();

        if !path.exists() {
            return (Config::default(), ConfigSource::Missing(path.to_path_buf()));
        }

        match Self::load_from_path(path) {
            Ok(config) => (config, ConfigSource::File(path.to_path_buf())),
            Err(e) => (Config::default(), ConfigSource::Invalid(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Requested present mode. The swapchain falls back to FIFO when the
    /// surface does not offer it.
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        match self.graphics.max_frames_in_flight {
            0 => {
                log::warn!(
                    "max_frames_in_flight must be at least 1, using {}",
                    DEFAULT_FRAMES_IN_FLIGHT
                );
                DEFAULT_FRAMES_IN_FLIGHT
            }
            n => n,
        }
    }

    /// Validation layers are only ever enabled in debug builds
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.width, 1280);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.assets.vertex_shader, PathBuf::from("res/shader.vert.spv"));
        assert!(config.debug.log_file.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Quad"

            [graphics]
            present_mode = "Mailbox"
            "#,
        )
        .unwrap();
        assert_eq!(config.window.title, "Quad");
        assert_eq!(config.window.width, 1280);
        assert!(config.window.resizable);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.graphics.clear_color, [0.85, 0.5, 0.7, 1.0]);
    }

    #[test]
    fn unknown_present_mode_is_fifo() {
        let config = Config::parse("[graphics]\npresent_mode = \"vsync-please\"").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn zero_frames_in_flight_is_replaced() {
        let config = Config::parse("[graphics]\nmax_frames_in_flight = 0").unwrap();
        assert_eq!(config.frames_in_flight(), 2);

        let config = Config::parse("[graphics]\nmax_frames_in_flight = 3").unwrap();
        assert_eq!(config.frames_in_flight(), 3);
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(Config::parse("[window]\nwidth = \"wide\"").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let (config, source) = Config::load_or_default("definitely/not/here/config.toml");
        assert_eq!(config.window.title, "Vulkan Template");
        assert!(matches!(source, ConfigSource::Missing(_)));
    }

    #[test]
    fn broken_file_falls_back_and_keeps_the_error() {
        let path = std::env::temp_dir().join(format!("vulkan-template-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = \"wide\"").unwrap();

        let (config, source) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 1280);
        let ConfigSource::Invalid(error) = source else {
            panic!("expected the broken file to be reported");
        };
        assert!(format!("{:#}", error).contains("Failed to parse config file"));
    }

    #[test]
    fn readable_file_is_used() {
        let path = std::env::temp_dir().join(format!("vulkan-template-ok-{}.toml", std::process::id()));
        std::fs::write(&path, "[window]\nwidth = 640").unwrap();

        let (config, source) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.window.width, 640);
        assert!(matches!(source, ConfigSource::File(p) if p == path));
    }
}
