//! Configuration management.
//!
//! TOML-backed settings for the bench: which device to open, the preferred
//! color mode and the initial sensor values. Missing files fall back to
//! defaults so a fresh checkout runs without any setup.

use crate::acquisition::ConnectOptions;
use crate::types::ColorMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    pub camera: CameraSection,
    pub capture: CaptureSection,
}

/// Camera selection and initial sensor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSection {
    /// Device index within the selected backend.
    pub device_index: usize,
    /// Preferred color mode; falls back along the chain if rejected.
    pub preferred_color_mode: ColorMode,
    /// Initial exposure in microseconds, clamped into the driver range.
    pub initial_exposure_us: f64,
    /// Initial frame rate; `None` keeps the driver default.
    pub initial_frame_rate_hz: Option<f64>,
}

/// Capture-side behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSection {
    /// Display frame queue capacity (oldest frames drop beyond this).
    pub queue_capacity: usize,
    /// Pixel offset used for the chart neighborhood samples.
    pub neighborhood_offset: u32,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            camera: CameraSection {
                device_index: 0,
                preferred_color_mode: ColorMode::Mono12,
                initial_exposure_us: 100_000.0,
                initial_frame_rate_hz: None,
            },
            capture: CaptureSection {
                queue_capacity: 8,
                neighborhood_offset: 5,
            },
        }
    }
}

impl BenchConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("config file not found at {path:?}, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        let config: BenchConfig = toml::from_str(&contents)?;
        log::info!("loaded configuration from {path:?}");
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        log::info!("saved configuration to {path:?}");
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("cmosbench.toml")
    }

    /// Load from the default location, falling back to defaults on any error.
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("failed to load config, using defaults: {e}");
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.camera.initial_exposure_us <= 0.0 {
            return Err("initial exposure must be positive".to_string());
        }
        if let Some(rate) = self.camera.initial_frame_rate_hz {
            if rate <= 0.0 {
                return Err("initial frame rate must be positive".to_string());
            }
        }
        if self.capture.queue_capacity == 0 {
            return Err("queue capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

impl From<&CameraSection> for ConnectOptions {
    fn from(section: &CameraSection) -> Self {
        Self {
            device_index: section.device_index,
            preferred_mode: section.preferred_color_mode,
            initial_exposure_us: section.initial_exposure_us,
            initial_frame_rate_hz: section.initial_frame_rate_hz,
        }
    }
}
