//! Serial device and emulator channel settings

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for the physical device on the serial port
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SerialSettings {
    /// Try to open the device at startup
    pub enabled: bool,
    /// Device node or COM port name
    pub port: String,
    pub baud_rate: u32,
    /// Wait after opening before listening for the device ping (the board resets on open)
    pub settle_delay_ms: u64,
    /// Number of ping waits before giving up on the device
    pub handshake_attempts: u32,
    /// Per-attempt ping wait
    pub handshake_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_serial_port().to_string(),
            baud_rate: 460_800,
            settle_delay_ms: 1000,
            handshake_attempts: 10,
            handshake_timeout_ms: 1000,
        }
    }
}

fn default_serial_port() -> &'static str {
    if cfg!(windows) {
        "COM6"
    } else if cfg!(target_os = "macos") {
        "/dev/cu.usbmodem1"
    } else {
        "/dev/ttyACM0"
    }
}

impl SerialSettings {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn sanitize(&mut self) {
        if self.handshake_attempts == 0 {
            log::warn!("serial.handshake_attempts was 0, using 1");
            self.handshake_attempts = 1;
        }
        if self.handshake_timeout_ms == 0 {
            log::warn!("serial.handshake_timeout_ms was 0, using 1000");
            self.handshake_timeout_ms = 1000;
        }
    }
}

/// Settings for the software emulator reached over UDP
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmulatorSettings {
    /// Mirror commands to the emulator
    pub enabled: bool,
    /// Port the controller listens on
    pub listen_port: u16,
    pub remote_host: String,
    /// Port the emulator listens on
    pub remote_port: u16,
}

impl Default for EmulatorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_port: 7420,
            remote_host: "127.0.0.1".to_string(),
            remote_port: 7421,
        }
    }
}

impl EmulatorSettings {
    /// Resolve the emulator address
    pub fn remote_addr(&self) -> Result<SocketAddr, String> {
        (self.remote_host.as_str(), self.remote_port)
            .to_socket_addrs()
            .map_err(|e| format!("Invalid emulator address {}:{}: {}", self.remote_host, self.remote_port, e))?
            .next()
            .ok_or_else(|| format!("No address for {}:{}", self.remote_host, self.remote_port))
    }

    /// Address of the controller as seen from the emulator side
    pub fn controller_addr(&self) -> Result<SocketAddr, String> {
        (self.remote_host.as_str(), self.listen_port)
            .to_socket_addrs()
            .map_err(|e| format!("Invalid controller address: {}", e))?
            .next()
            .ok_or_else(|| "No controller address".to_string())
    }
}
