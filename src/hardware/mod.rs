//! Touchpoint device and emulator driver

mod channel;
mod driver;

pub use channel::{ConnectionState, EmulatorState, UartState};
pub use driver::{HardwareDriver, StartupReport};
