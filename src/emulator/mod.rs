//! Headless stand-in for the Touchpoint device
//!
//! Listens where the controller mirrors its commands, pings the controller
//! until it answers, and models the device's rate-limited elevation so the
//! controller can be exercised without hardware.

mod device;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

pub use device::{EmulatedDevice, EmulatorEvent};

use crate::error::TransportError;
use crate::protocol::{header, Command, FramedLink, Packet, PacketTransport};

const PING_INTERVAL_DISCONNECTED: Duration = Duration::from_secs(2);
const PING_INTERVAL_CONNECTED: Duration = Duration::from_secs(5);
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// How received commands are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Human-readable log lines
    Log,
    /// One JSON object per line on stdout
    Json,
}

fn lock(device: &Mutex<EmulatedDevice>) -> MutexGuard<'_, EmulatedDevice> {
    device.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct HeadlessEmulator {
    device: Arc<Mutex<EmulatedDevice>>,
    transport: Arc<dyn PacketTransport>,
    running: Arc<AtomicBool>,
}

impl HeadlessEmulator {
    /// Listen on `listen_port` and talk to the controller at `controller`
    pub fn open(listen_port: u16, controller: SocketAddr, format: ReportFormat) -> Result<Self, TransportError> {
        let link = FramedLink::open_udp(listen_port, controller)?;
        Ok(Self::new(Arc::new(link), format))
    }

    pub fn new(transport: Arc<dyn PacketTransport>, format: ReportFormat) -> Self {
        let device = Arc::new(Mutex::new(EmulatedDevice::default()));

        for hdr in [
            header::PING,
            header::ELEVATION,
            header::ELEVATION_SPEED,
            header::VIBRATION,
            header::STATUS,
        ] {
            let device = Arc::clone(&device);
            transport.set_header_handler(
                hdr,
                Arc::new(move |packet: &Packet| match Command::from_packet(packet) {
                    Ok(command) => {
                        let event = lock(&device).apply(command);
                        report(format, &event);
                    }
                    Err(e) => log::warn!("Discarding packet: {}", e),
                }),
            );
        }

        Self {
            device,
            transport,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Snapshot of the emulated device
    pub fn device(&self) -> EmulatedDevice {
        lock(&self.device).clone()
    }

    /// Flag that stops `run` when cleared
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn ping(&self) {
        if let Err(e) = self.transport.send_packet(&Command::Ping.to_packet(), false) {
            log::debug!("Ping to controller failed: {}", e);
        }
    }

    /// Ping the controller and animate elevation until stopped
    pub fn run(&self) {
        log::info!("Emulator running on {}", self.transport.describe());
        let mut last_ping: Option<Instant> = None;
        let mut last_frame = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            let interval = if lock(&self.device).controller_connected() {
                PING_INTERVAL_CONNECTED
            } else {
                PING_INTERVAL_DISCONNECTED
            };
            if last_ping.map_or(true, |t| now.duration_since(t) >= interval) {
                self.ping();
                last_ping = Some(now);
            }

            lock(&self.device).advance(now.duration_since(last_frame));
            last_frame = now;
            thread::sleep(FRAME_INTERVAL);
        }

        self.transport.close();
        log::info!("Emulator stopped");
    }
}

fn report(format: ReportFormat, event: &EmulatorEvent) {
    match format {
        ReportFormat::Log => log::info!("{}", event.describe()),
        ReportFormat::Json => match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => log::error!("Failed to encode emulator event: {}", e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    #[test]
    fn test_inbound_commands_update_device() {
        let transport = MockTransport::new("controller");
        let emulator = HeadlessEmulator::new(transport.clone(), ReportFormat::Log);

        transport.deliver(&Command::Ping.to_packet());
        transport.deliver(&Command::ElevationSpeed { units_per_sec: 2.0 }.to_packet());
        transport.deliver(&Command::Elevation { value: 0.4 }.to_packet());
        transport.deliver(&Command::Status { hardware_connected: true }.to_packet());

        let device = emulator.device();
        assert!(device.controller_connected());
        assert!(device.hardware_connected());
        assert_eq!(device.max_elevation_speed(), 2.0);
        assert_eq!(device.target_elevation(), 0.4);
        assert_eq!(device.current_elevation(), 0.0);
    }

    #[test]
    fn test_malformed_packet_is_ignored() {
        let transport = MockTransport::new("controller");
        let emulator = HeadlessEmulator::new(transport.clone(), ReportFormat::Log);
        transport.deliver(&Packet::from_parts(header::ELEVATION, vec![1, 2]));
        assert_eq!(emulator.device().target_elevation(), 0.0);
    }

    #[test]
    fn test_ping_goes_to_controller() {
        let transport = MockTransport::new("controller");
        let emulator = HeadlessEmulator::new(transport.clone(), ReportFormat::Json);
        emulator.ping();
        assert_eq!(transport.sent_commands(), vec![Command::Ping]);
    }

    #[test]
    fn test_run_stops_on_flag() {
        let transport = MockTransport::new("controller");
        let emulator = Arc::new(HeadlessEmulator::new(transport.clone(), ReportFormat::Log));
        let flag = emulator.running_flag();
        let runner = Arc::clone(&emulator);
        let handle = thread::spawn(move || runner.run());
        thread::sleep(Duration::from_millis(40));
        flag.store(false, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(transport.is_closed());
        assert_eq!(transport.sent_commands().first(), Some(&Command::Ping));
    }
}
