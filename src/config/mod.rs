//! Application Configuration
//!
//! User settings and preferences stored in TOML format.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::camera::FacingMode;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Camera settings
    pub camera: CameraSettings,
    /// Text recognition settings
    pub recognition: RecognitionSettings,
    /// Dashboard window settings
    pub dashboard: DashboardSettings,
}

/// Which camera backend feeds the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraBackendKind {
    /// Live device read through an ffmpeg child process
    #[default]
    Ffmpeg,
    /// A fixed picture served as if it were a live stream
    StillImage,
}

/// Camera-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Preferred camera when opening a session
    pub facing_mode: FacingMode,
    /// Backend used to acquire the stream
    pub backend: CameraBackendKind,
    /// Device used for the rear ("environment") camera
    pub environment_device: String,
    /// Device used for the front ("user") camera
    pub user_device: String,
    /// ffmpeg executable name or path
    pub ffmpeg_path: String,
    /// Picture served by the still-image backend
    pub still_image: Option<PathBuf>,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            backend: CameraBackendKind::Ffmpeg,
            environment_device: "/dev/video0".to_string(),
            user_device: "/dev/video1".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            still_image: None,
        }
    }
}

impl CameraSettings {
    /// Device path for the given facing mode
    pub fn device_for(&self, facing: FacingMode) -> &str {
        match facing {
            FacingMode::Environment => &self.environment_device,
            FacingMode::User => &self.user_device,
        }
    }
}

/// Text recognition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionSettings {
    /// tesseract executable name or path
    pub tesseract_path: String,
    /// Upper bound on a single recognition call
    pub timeout_secs: u64,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Dashboard window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Initial window width
    pub window_width: f32,
    /// Initial window height
    pub window_height: f32,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            window_width: 720.0,
            window_height: 760.0,
        }
    }
}

/// Get the configuration directory
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "tirescanner", "TireScanner")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
