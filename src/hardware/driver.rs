//! Command fan-out to the device and the emulator
//!
//! The driver owns two independent channels. Every outbound command goes to
//! each channel that is currently connected; with neither connected the
//! command is dropped. Send failures are logged and never change state.
//! Outbound commands are queued on each transport, so callers never wait on
//! the wire; a full queue drops the command.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::Instant;

use serde::Serialize;

use super::channel::{ConnectionState, EmulatorChannel, EmulatorState, UartChannel, UartState};
use crate::config::{SerialSettings, Settings};
use crate::error::{HandshakeError, TransportError};
use crate::protocol::{header, Command, FramedLink, Packet, PacketTransport};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// f32 stored as raw bits for lock-free reads
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::SeqCst))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::SeqCst);
    }
}

struct DriverShared {
    uart: Mutex<UartChannel>,
    emulator: Mutex<EmulatorChannel>,
    elevation: AtomicF32,
    max_speed: AtomicF32,
}

/// Result of bringing the channels up
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub uart: UartState,
    pub emulator: EmulatorState,
    /// Why the device did not come up, if it did not
    pub uart_error: Option<String>,
    pub emulator_error: Option<String>,
}

/// Handle to the shared driver; clones talk to the same channels
#[derive(Clone)]
pub struct HardwareDriver {
    shared: Arc<DriverShared>,
}

impl HardwareDriver {
    pub fn new(max_elevation_speed: f32) -> Self {
        Self {
            shared: Arc::new(DriverShared {
                uart: Mutex::new(UartChannel::new()),
                emulator: Mutex::new(EmulatorChannel::new()),
                elevation: AtomicF32::new(0.0),
                max_speed: AtomicF32::new(max_elevation_speed),
            }),
        }
    }

    /// Open both channels as configured. Blocks for the UART handshake.
    pub fn initialize(&self, settings: &Settings) -> StartupReport {
        let mut emulator_error = None;
        if settings.emulator.enabled {
            let opened = settings
                .emulator
                .remote_addr()
                .map_err(|e| e.to_string())
                .and_then(|remote| {
                    FramedLink::open_udp(settings.emulator.listen_port, remote).map_err(|e| e.to_string())
                });
            match opened {
                Ok(link) => {
                    if let Err(e) = self.start_emulator(Arc::new(link)) {
                        emulator_error = Some(e.to_string());
                    }
                }
                Err(e) => {
                    log::error!("Emulator channel unavailable: {}", e);
                    emulator_error = Some(e);
                }
            }
        }

        let mut uart_error = None;
        if settings.serial.enabled {
            let serial = settings.serial.clone();
            let result = self.connect_uart(&settings.serial, move || {
                let link = FramedLink::open_serial(&serial.port, serial.baud_rate)?;
                Ok(Arc::new(link) as Arc<dyn PacketTransport>)
            });
            if let Err(e) = result {
                log::warn!("Touchpoint device not connected: {}", e);
                uart_error = Some(e.to_string());
            }
        } else {
            log::info!("Serial device disabled in settings");
        }

        StartupReport {
            uart: self.uart_state(),
            emulator: self.emulator_state(),
            uart_error,
            emulator_error,
        }
    }

    /// Open the device with `open` and wait for its ping.
    ///
    /// The device resets when the port opens, so nothing is read until the
    /// settle delay has passed. One attempt only: a failed channel stays failed.
    pub fn connect_uart<F>(&self, serial: &SerialSettings, open: F) -> Result<(), HandshakeError>
    where
        F: FnOnce() -> Result<Arc<dyn PacketTransport>, TransportError>,
    {
        {
            let mut uart = lock(&self.shared.uart);
            if uart.state != UartState::Idle {
                return Err(HandshakeError::AlreadyStarted);
            }
            uart.state = UartState::Opening;
        }

        let transport = match open() {
            Ok(transport) => transport,
            Err(e) => {
                log::error!("Failed to open {}: {}", serial.port, e);
                lock(&self.shared.uart).state = UartState::Failed;
                return Err(HandshakeError::Open(e));
            }
        };

        lock(&self.shared.uart).state = UartState::AwaitingPing;
        if let Err(e) = self.await_device_ping(transport.as_ref(), serial) {
            transport.close();
            lock(&self.shared.uart).state = UartState::Failed;
            return Err(e);
        }

        if let Err(e) = transport.send_packet(&Command::Ping.to_packet(), false) {
            log::warn!("Failed to acknowledge device ping: {}", e);
        }
        {
            let mut uart = lock(&self.shared.uart);
            uart.transport = Some(Arc::clone(&transport));
            uart.state = UartState::Connected;
        }
        log::info!("Touchpoint device connected on {}", transport.describe());

        let speed = Command::ElevationSpeed {
            units_per_sec: self.max_elevation_speed(),
        };
        if let Err(e) = transport.send_packet(&speed.to_packet(), true) {
            log::warn!("Device did not confirm elevation speed: {}", e);
        }

        // Keep the emulator's hardware indicator current
        let emulator = lock(&self.shared.emulator).live();
        if let Some(emulator) = emulator {
            let status = Command::Status {
                hardware_connected: true,
            };
            if let Err(e) = emulator.enqueue_packet(&status.to_packet(), false) {
                log::warn!("Failed to push status to emulator: {}", e);
            }
        }
        Ok(())
    }

    fn await_device_ping(&self, transport: &dyn PacketTransport, serial: &SerialSettings) -> Result<(), HandshakeError> {
        thread::sleep(serial.settle_delay());
        if let Err(e) = transport.flush() {
            log::debug!("Flush before handshake failed: {}", e);
        }
        log::info!("Waiting for ping from device on {}...", transport.describe());

        for attempt in 1..=serial.handshake_attempts {
            let response = transport.wait_for_header(header::PING, serial.handshake_timeout());
            if let Err(e) = transport.flush() {
                log::debug!("Flush after ping wait failed: {}", e);
            }
            match response {
                Ok(Some(packet)) => match Command::from_packet(&packet) {
                    Ok(_) => {
                        log::info!("Ping received from device (attempt {})", attempt);
                        return Ok(());
                    }
                    Err(e) => log::warn!("Discarded ping from device: {}", e),
                },
                Ok(None) => log::debug!("No ping yet ({}/{})", attempt, serial.handshake_attempts),
                Err(e) => {
                    log::error!("Device link failed during handshake: {}", e);
                    break;
                }
            }
        }
        Err(HandshakeError::Timeout {
            attempts: serial.handshake_attempts,
        })
    }

    /// Attach the emulator transport and answer its pings.
    ///
    /// The remote target is preset, so the channel listens immediately and
    /// connects on the first ping.
    pub fn start_emulator(&self, transport: Arc<dyn PacketTransport>) -> Result<(), HandshakeError> {
        {
            let mut emulator = lock(&self.shared.emulator);
            if emulator.state != EmulatorState::Disabled {
                return Err(HandshakeError::AlreadyStarted);
            }
            emulator.state = EmulatorState::Listening;
            emulator.transport = Some(Arc::clone(&transport));
        }

        let weak: Weak<DriverShared> = Arc::downgrade(&self.shared);
        transport.set_header_handler(
            header::PING,
            Arc::new(move |packet: &Packet| {
                if let Err(e) = Command::from_packet(packet) {
                    log::warn!("Discarded ping from emulator: {}", e);
                    return;
                }
                if let Some(shared) = weak.upgrade() {
                    HardwareDriver { shared }.on_emulator_ping();
                }
            }),
        );
        log::info!("Emulator channel listening on {}", transport.describe());
        Ok(())
    }

    fn on_emulator_ping(&self) {
        let (transport, first) = {
            let mut emulator = lock(&self.shared.emulator);
            let Some(transport) = emulator.transport.clone() else {
                return;
            };
            let first = emulator.state == EmulatorState::Listening;
            emulator.state = EmulatorState::Connected;
            emulator.last_seen = Some(Instant::now());
            (transport, first)
        };

        if let Err(e) = transport.enqueue_packet(&Command::Ping.to_packet(), false) {
            log::warn!("Failed to answer emulator ping: {}", e);
            return;
        }
        if !first {
            return;
        }

        log::info!("Emulator connected");
        let status = Command::Status {
            hardware_connected: self.uart_state() == UartState::Connected,
        };
        let speed = Command::ElevationSpeed {
            units_per_sec: self.max_elevation_speed(),
        };
        // Runs on the link's receive thread, which is also the one that would
        // see an ack; only unacknowledged sends are possible here
        for command in [status, speed] {
            if let Err(e) = transport.enqueue_packet(&command.to_packet(), false) {
                log::warn!("Failed to push {:?} to emulator: {}", command, e);
            }
        }
    }

    fn broadcast(&self, command: &Command, guaranteed_on_uart: bool) {
        let packet = command.to_packet();
        let uart = lock(&self.shared.uart).live();
        let emulator = lock(&self.shared.emulator).live();

        if uart.is_none() && emulator.is_none() {
            log::trace!("No channel connected, dropped {}", header::name(packet.header()));
            return;
        }
        if let Some(uart) = uart {
            if let Err(e) = uart.enqueue_packet(&packet, guaranteed_on_uart) {
                log::warn!("Device send of {} failed: {}", header::name(packet.header()), e);
            }
        }
        if let Some(emulator) = emulator {
            if let Err(e) = emulator.enqueue_packet(&packet, false) {
                log::warn!("Emulator send of {} failed: {}", header::name(packet.header()), e);
            }
        }
    }

    /// Track and transmit an absolute elevation
    pub fn send_elevation(&self, value: f32) {
        self.shared.elevation.store(value);
        self.broadcast(&Command::Elevation { value }, false);
    }

    /// Shift the tracked elevation by `delta`.
    ///
    /// The sum is not clamped: repeated offsets can drive the value past the
    /// device's mechanical range, and the firmware is left to saturate it.
    pub fn add_elevation_offset(&self, delta: f32) {
        let value = self.shared.elevation.load() + delta;
        self.send_elevation(value);
    }

    pub fn send_vibration(&self, amplitude: f32, frequency_hz: f32, duration_pulses: i16) {
        self.broadcast(
            &Command::Vibration {
                amplitude,
                frequency_hz,
                duration_pulses,
            },
            false,
        );
    }

    /// Remember the device rate limit and push it; guaranteed on the device
    pub fn set_max_elevation_speed(&self, units_per_sec: f32) {
        self.shared.max_speed.store(units_per_sec);
        self.broadcast(&Command::ElevationSpeed { units_per_sec }, true);
    }

    pub fn current_elevation(&self) -> f32 {
        self.shared.elevation.load()
    }

    pub fn max_elevation_speed(&self) -> f32 {
        self.shared.max_speed.load()
    }

    pub fn uart_state(&self) -> UartState {
        lock(&self.shared.uart).state
    }

    pub fn emulator_state(&self) -> EmulatorState {
        lock(&self.shared.emulator).state
    }

    /// Generic (device, emulator) connection view
    pub fn connection_states(&self) -> (ConnectionState, ConnectionState) {
        (self.uart_state().connection(), self.emulator_state().connection())
    }

    /// When the emulator last pinged; diagnostics only
    pub fn emulator_last_seen(&self) -> Option<Instant> {
        lock(&self.shared.emulator).last_seen
    }

    /// Close both transports; later sends are dropped
    pub fn close(&self) {
        let uart = lock(&self.shared.uart).transport.take();
        let emulator = lock(&self.shared.emulator).transport.take();
        for transport in [uart, emulator].into_iter().flatten() {
            transport.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::Frame;
    use crate::protocol::link::ByteLink;
    use crate::testing::MockTransport;
    use std::time::Duration;

    fn fast_serial() -> SerialSettings {
        SerialSettings {
            settle_delay_ms: 0,
            handshake_attempts: 3,
            handshake_timeout_ms: 1,
            ..Default::default()
        }
    }

    fn connected_emulator(driver: &HardwareDriver) -> Arc<MockTransport> {
        let emulator = MockTransport::new("emulator");
        driver.start_emulator(emulator.clone()).unwrap();
        emulator.deliver(&Command::Ping.to_packet());
        emulator
    }

    #[test]
    fn test_silent_device_ends_failed_and_is_never_used() {
        let driver = HardwareDriver::new(1.0);
        let device = MockTransport::new("uart");
        let opened = device.clone();

        let result = driver.connect_uart(&fast_serial(), move || Ok(opened as Arc<dyn PacketTransport>));
        assert!(matches!(result, Err(HandshakeError::Timeout { attempts: 3 })));
        assert_eq!(driver.uart_state(), UartState::Failed);
        assert!(device.is_closed());
        assert_eq!(device.wait_count(), 3);

        driver.send_elevation(0.2);
        driver.send_vibration(0.5, 100.0, 1);
        assert!(device.sent().is_empty());
    }

    #[test]
    fn test_open_failure_is_terminal() {
        let driver = HardwareDriver::new(1.0);
        let result = driver.connect_uart(&fast_serial(), || {
            Err(TransportError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)))
        });
        assert!(matches!(result, Err(HandshakeError::Open(_))));
        assert_eq!(driver.uart_state(), UartState::Failed);

        let again = driver.connect_uart(&fast_serial(), || unreachable!());
        assert!(matches!(again, Err(HandshakeError::AlreadyStarted)));
    }

    #[test]
    fn test_handshake_acks_and_pushes_speed() {
        let driver = HardwareDriver::new(2.5);
        let device = MockTransport::pinging_after(2, "uart");
        let opened = device.clone();

        driver
            .connect_uart(&fast_serial(), move || Ok(opened as Arc<dyn PacketTransport>))
            .unwrap();
        assert_eq!(driver.uart_state(), UartState::Connected);

        let sent = device.sent();
        assert_eq!(sent[0], (Command::Ping.to_packet(), false));
        assert_eq!(
            sent[1],
            (Command::ElevationSpeed { units_per_sec: 2.5 }.to_packet(), true)
        );
        assert!(device.flush_count() >= 3);
    }

    #[test]
    fn test_device_ping_with_payload_is_not_a_handshake() {
        let driver = HardwareDriver::new(1.0);
        let device = MockTransport::replying_with(Packet::from_parts(header::PING, vec![1, 2, 3]), "uart");
        let opened = device.clone();

        let result = driver.connect_uart(&fast_serial(), move || Ok(opened as Arc<dyn PacketTransport>));
        assert!(matches!(result, Err(HandshakeError::Timeout { attempts: 3 })));
        assert_eq!(driver.uart_state(), UartState::Failed);
        assert!(device.sent().is_empty());
    }

    #[test]
    fn test_emulator_ping_with_payload_is_discarded() {
        let driver = HardwareDriver::new(1.0);
        let emulator = MockTransport::new("emulator");
        driver.start_emulator(emulator.clone()).unwrap();

        emulator.deliver(&Packet::from_parts(header::PING, vec![1, 2, 3]));
        assert_eq!(driver.emulator_state(), EmulatorState::Listening);
        assert!(emulator.sent().is_empty());
        assert!(driver.emulator_last_seen().is_none());

        emulator.deliver(&Command::Ping.to_packet());
        assert_eq!(driver.emulator_state(), EmulatorState::Connected);
    }

    /// Delivers one PING, then accepts writes only after a long stall
    struct StalledLink {
        ping: Mutex<Option<Vec<u8>>>,
    }

    impl ByteLink for StalledLink {
        fn write_all(&self, _bytes: &[u8]) -> std::io::Result<()> {
            thread::sleep(Duration::from_millis(400));
            Ok(())
        }

        fn read_chunk(&self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(bytes) = lock(&self.ping).take() {
                buf[..bytes.len()].copy_from_slice(&bytes);
                return Ok(bytes.len());
            }
            thread::sleep(Duration::from_millis(10));
            Ok(0)
        }

        fn describe(&self) -> String {
            "stalled".to_string()
        }
    }

    #[test]
    fn test_sends_do_not_wait_for_a_stalled_link() {
        let ping = Frame::data(Command::Ping.to_packet(), 0, false).encode().unwrap();
        let link = StalledLink {
            ping: Mutex::new(Some(ping)),
        };
        let driver = HardwareDriver::new(1.0);
        driver
            .start_emulator(Arc::new(FramedLink::new(Box::new(link))))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while driver.emulator_state() != EmulatorState::Connected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(driver.emulator_state(), EmulatorState::Connected);

        let started = Instant::now();
        for _ in 0..50 {
            driver.send_vibration(0.1, 180.0, 1);
            driver.send_elevation(0.2);
        }
        assert!(started.elapsed() < Duration::from_millis(100));
        driver.close();
    }

    #[test]
    fn test_late_device_connect_pushes_status_to_emulator() {
        let driver = HardwareDriver::new(1.0);
        let emulator = connected_emulator(&driver);
        emulator.clear_sent();

        let device = MockTransport::pinging_after(1, "uart");
        driver
            .connect_uart(&fast_serial(), move || Ok(device as Arc<dyn PacketTransport>))
            .unwrap();
        assert_eq!(
            emulator.sent_commands(),
            vec![Command::Status {
                hardware_connected: true
            }]
        );
    }

    #[test]
    fn test_first_emulator_ping_connects_and_pushes_state() {
        let driver = HardwareDriver::new(1.5);
        let emulator = MockTransport::new("emulator");
        driver.start_emulator(emulator.clone()).unwrap();
        assert_eq!(driver.emulator_state(), EmulatorState::Listening);

        driver.send_elevation(0.1);
        assert!(emulator.sent().is_empty());

        emulator.deliver(&Command::Ping.to_packet());
        assert_eq!(driver.emulator_state(), EmulatorState::Connected);
        assert_eq!(
            driver.connection_states(),
            (ConnectionState::Disconnected, ConnectionState::Connected)
        );
        assert_eq!(
            emulator.sent_commands(),
            vec![
                Command::Ping,
                Command::Status {
                    hardware_connected: false
                },
                Command::ElevationSpeed { units_per_sec: 1.5 },
            ]
        );
        let first_seen = driver.emulator_last_seen().unwrap();

        emulator.clear_sent();
        thread::sleep(Duration::from_millis(2));
        emulator.deliver(&Command::Ping.to_packet());
        assert_eq!(emulator.sent_commands(), vec![Command::Ping]);
        assert!(driver.emulator_last_seen().unwrap() > first_seen);
    }

    #[test]
    fn test_elevation_offset_accumulates() {
        let driver = HardwareDriver::new(1.0);
        let emulator = connected_emulator(&driver);
        emulator.clear_sent();

        driver.send_elevation(0.37);
        driver.add_elevation_offset(0.10);

        assert!((driver.current_elevation() - 0.47).abs() < 1e-6);
        let elevations: Vec<f32> = emulator
            .sent_commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::Elevation { value } => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(elevations.len(), 2);
        assert!((elevations[1] - 0.47).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vibration_is_transmitted() {
        let driver = HardwareDriver::new(1.0);
        let emulator = connected_emulator(&driver);
        emulator.clear_sent();
        driver.send_vibration(0.0, 0.0, 0);
        assert_eq!(
            emulator.sent_with_header(header::VIBRATION),
            vec![Command::Vibration {
                amplitude: 0.0,
                frequency_hz: 0.0,
                duration_pulses: 0
            }
            .to_packet()]
        );
    }

    #[test]
    fn test_send_failure_keeps_channel_connected() {
        let driver = HardwareDriver::new(1.0);
        let emulator = connected_emulator(&driver);
        emulator.fail_sends(true);
        driver.send_elevation(0.5);
        assert_eq!(driver.emulator_state(), EmulatorState::Connected);
        assert!((driver.current_elevation() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_speed_guaranteed_only_on_device() {
        let driver = HardwareDriver::new(1.0);
        let emulator = connected_emulator(&driver);
        let device = MockTransport::pinging_after(1, "uart");
        let opened = device.clone();
        driver
            .connect_uart(&fast_serial(), move || Ok(opened as Arc<dyn PacketTransport>))
            .unwrap();
        emulator.clear_sent();
        device.clear_sent();

        driver.set_max_elevation_speed(3.0);
        assert_eq!(driver.max_elevation_speed(), 3.0);
        let packet = Command::ElevationSpeed { units_per_sec: 3.0 }.to_packet();
        assert_eq!(device.sent(), vec![(packet.clone(), true)]);
        assert_eq!(emulator.sent(), vec![(packet, false)]);
    }

    #[test]
    fn test_close_drops_later_sends() {
        let driver = HardwareDriver::new(1.0);
        let emulator = connected_emulator(&driver);
        driver.close();
        emulator.clear_sent();
        driver.send_elevation(0.3);
        assert!(emulator.is_closed());
        assert!(emulator.sent().is_empty());
    }
}
