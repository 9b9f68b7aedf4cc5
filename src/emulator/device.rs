use std::time::Duration;

use serde::Serialize;

use crate::protocol::Command;

/// Device model driven by received commands
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatedDevice {
    controller_connected: bool,
    hardware_connected: bool,
    target_elevation: f32,
    current_elevation: f32,
    max_elevation_speed: f32,
    vibration: Option<Command>,
}

impl Default for EmulatedDevice {
    fn default() -> Self {
        Self {
            controller_connected: false,
            hardware_connected: false,
            target_elevation: 0.0,
            current_elevation: 0.0,
            max_elevation_speed: 1.0,
            vibration: None,
        }
    }
}

impl EmulatedDevice {
    pub fn controller_connected(&self) -> bool {
        self.controller_connected
    }

    pub fn hardware_connected(&self) -> bool {
        self.hardware_connected
    }

    pub fn target_elevation(&self) -> f32 {
        self.target_elevation
    }

    pub fn current_elevation(&self) -> f32 {
        self.current_elevation
    }

    pub fn max_elevation_speed(&self) -> f32 {
        self.max_elevation_speed
    }

    /// Last non-stop vibration, cleared by a stop
    pub fn vibration(&self) -> Option<Command> {
        self.vibration
    }

    pub fn apply(&mut self, command: Command) -> EmulatorEvent {
        match command {
            Command::Ping => self.controller_connected = true,
            Command::Elevation { value } => self.target_elevation = value,
            Command::ElevationSpeed { units_per_sec } => self.max_elevation_speed = units_per_sec,
            Command::Vibration {
                amplitude,
                frequency_hz,
                ..
            } => {
                self.vibration = if amplitude == 0.0 || frequency_hz == 0.0 {
                    None
                } else {
                    Some(command)
                };
            }
            Command::Status { hardware_connected } => self.hardware_connected = hardware_connected,
        }
        EmulatorEvent {
            timestamp: chrono::Local::now().format("%H:%M:%S%.3f").to_string(),
            command,
            current_elevation: self.current_elevation,
        }
    }

    /// Move the current elevation toward the target, at most
    /// `max_elevation_speed * dt` per step
    pub fn advance(&mut self, dt: Duration) {
        let max_change = self.max_elevation_speed * dt.as_secs_f32();
        let diff = self.target_elevation - self.current_elevation;
        if diff.abs() <= max_change {
            self.current_elevation = self.target_elevation;
        } else {
            self.current_elevation += max_change.copysign(diff);
        }
    }
}

/// One received command, as reported
#[derive(Debug, Clone, Serialize)]
pub struct EmulatorEvent {
    pub timestamp: String,
    #[serde(flatten)]
    pub command: Command,
    pub current_elevation: f32,
}

impl EmulatorEvent {
    pub fn describe(&self) -> String {
        match self.command {
            Command::Ping => "Ping from controller".to_string(),
            Command::Elevation { value } => format!("Target elevation: {:.3}", value),
            Command::ElevationSpeed { units_per_sec } => {
                format!("Max elevation speed: {} units/sec", units_per_sec)
            }
            Command::Vibration {
                amplitude,
                frequency_hz,
                duration_pulses,
            } => {
                if amplitude == 0.0 || frequency_hz == 0.0 {
                    return "Vibration stopped".to_string();
                }
                let duration = if duration_pulses == 0 {
                    "indefinite".to_string()
                } else {
                    format!("{} pulses", duration_pulses)
                };
                format!(
                    "Amp: {:.3}  Freq: {:6.1}Hz  Dur: {}",
                    amplitude, frequency_hz, duration
                )
            }
            Command::Status { hardware_connected } => format!(
                "Hardware status: {}",
                if hardware_connected { "Connected" } else { "Not Connected" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_is_rate_limited() {
        let mut device = EmulatedDevice::default();
        device.apply(Command::ElevationSpeed { units_per_sec: 0.5 });
        device.apply(Command::Elevation { value: -0.4 });

        device.advance(Duration::from_millis(400));
        assert!((device.current_elevation() + 0.2).abs() < 1e-6);
        device.advance(Duration::from_secs(1));
        assert_eq!(device.current_elevation(), -0.4);
    }

    #[test]
    fn test_stop_clears_vibration() {
        let mut device = EmulatedDevice::default();
        let buzz = Command::Vibration {
            amplitude: 0.1,
            frequency_hz: 200.0,
            duration_pulses: 0,
        };
        let event = device.apply(buzz);
        assert_eq!(device.vibration(), Some(buzz));
        assert_eq!(event.describe(), "Amp: 0.100  Freq:  200.0Hz  Dur: indefinite");

        let event = device.apply(Command::Vibration {
            amplitude: 0.0,
            frequency_hz: 0.0,
            duration_pulses: 0,
        });
        assert!(device.vibration().is_none());
        assert_eq!(event.describe(), "Vibration stopped");
    }

    #[test]
    fn test_json_event_is_flat() {
        let mut device = EmulatedDevice::default();
        let event = device.apply(Command::Elevation { value: 0.25 });
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["command"], "elevation");
        assert_eq!(json["value"], 0.25);
        assert_eq!(json["current_elevation"], 0.0);
        assert!(json["timestamp"].is_string());
    }
}
