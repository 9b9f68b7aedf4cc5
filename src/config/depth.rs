//! Depth mapping and loop timing settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How captured pixels become elevation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DepthSettings {
    /// Elevation at full brightness; output spans [-scale, scale]
    pub elevation_scale: f32,
    /// Treat dark pixels as high
    pub invert: bool,
    /// Side of the square Gaussian blur kernel (odd)
    pub blur_kernel: u32,
}

impl Default for DepthSettings {
    fn default() -> Self {
        Self {
            elevation_scale: 0.5,
            invert: false,
            blur_kernel: 7,
        }
    }
}

impl DepthSettings {
    pub fn sanitize(&mut self) {
        if self.blur_kernel == 0 {
            self.blur_kernel = 1;
        }
        if self.blur_kernel % 2 == 0 {
            log::warn!("depth.blur_kernel must be odd, using {}", self.blur_kernel + 1);
            self.blur_kernel += 1;
        }
        if !self.elevation_scale.is_finite() || self.elevation_scale < 0.0 {
            log::warn!("depth.elevation_scale {} is invalid, using 0.5", self.elevation_scale);
            self.elevation_scale = 0.5;
        }
    }
}

/// Loop periods
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingSettings {
    /// Coordinator poll period
    pub tick_interval_ms: u64,
    /// Capture loop period while regions are registered
    pub capture_active_interval_ms: u64,
    /// Capture loop period with nothing to capture
    pub capture_idle_interval_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            capture_active_interval_ms: 10,
            capture_idle_interval_ms: 50,
        }
    }
}

impl TimingSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn capture_active_interval(&self) -> Duration {
        Duration::from_millis(self.capture_active_interval_ms)
    }

    pub fn capture_idle_interval(&self) -> Duration {
        Duration::from_millis(self.capture_idle_interval_ms.max(1))
    }
}
