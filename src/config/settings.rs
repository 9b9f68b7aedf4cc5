use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::depth::{DepthSettings, TimingSettings};
use super::hardware::{EmulatorSettings, SerialSettings};

/// Controller settings, loaded once at startup and shared read-only
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Physical device on the serial port
    pub serial: SerialSettings,
    /// Development emulator over UDP
    pub emulator: EmulatorSettings,
    /// Pixel-to-elevation mapping
    pub depth: DepthSettings,
    /// Loop periods
    pub timing: TimingSettings,
    /// Device-side elevation rate limit in units per second
    #[serde(default = "default_max_elevation_speed")]
    pub max_elevation_speed: f32,
    /// Log file mirror; defaults to the cache directory
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_max_elevation_speed() -> f32 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            emulator: EmulatorSettings::default(),
            depth: DepthSettings::default(),
            timing: TimingSettings::default(),
            max_elevation_speed: default_max_elevation_speed(),
            log_file: None,
        }
    }
}

impl Settings {
    /// Get the path to the YAML settings file
    pub fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("touchpoint").join("settings.yaml"))
    }

    /// Where log lines are mirrored
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file
            .clone()
            .or_else(|| dirs::cache_dir().map(|p| p.join("touchpoint").join("touchpoint.log")))
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let mut settings = Self::file_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default();
        settings.sanitize();
        settings
    }

    /// Load raw settings from a specific file without sanitization
    pub fn load_from(path: &std::path::Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return Self::default(),
        };
        match serde_yml::from_str(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring unreadable settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Fix values that would break the loops or the device
    pub fn sanitize(&mut self) {
        self.serial.sanitize();
        self.depth.sanitize();
        if !self.max_elevation_speed.is_finite() || self.max_elevation_speed <= 0.0 {
            log::warn!(
                "max_elevation_speed {} is invalid, using {}",
                self.max_elevation_speed,
                default_max_elevation_speed()
            );
            self.max_elevation_speed = default_max_elevation_speed();
        }
    }

    /// Save settings to disk (YAML format)
    pub fn save(&self) -> Result<(), String> {
        let path = Self::file_path().ok_or("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        let contents =
            serde_yml::to_string(self).map_err(|e| format!("Failed to serialize: {}", e))?;

        std::fs::write(path, contents).map_err(|e| format!("Failed to write settings: {}", e))
    }
}
