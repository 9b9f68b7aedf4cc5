//! In-memory stand-ins for the transport, the screen reader and the capture
//! backend, shared by unit tests across the crate

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};

use crate::capture::CaptureRegistry;
use crate::config::Settings;
use crate::dispatch::{ControllerServices, HandlerContext, HandlerId};
use crate::error::TransportError;
use crate::hardware::HardwareDriver;
use crate::host::{PixelBuffer, Point, Rect, ScreenCapture, ScreenReaderHost, UiObject};
use crate::protocol::{header, Command, HeaderHandler, Packet, PacketTransport};

/// Records every send and lets tests inject inbound packets
pub struct MockTransport {
    name: String,
    sent: Mutex<Vec<(Packet, bool)>>,
    handlers: Mutex<HashMap<u8, HeaderHandler>>,
    /// Answer the n-th PING wait with `ping_reply`
    ping_on_wait: Option<u32>,
    ping_reply: Packet,
    waits: AtomicU32,
    flushes: AtomicUsize,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockTransport {
    /// A peer that never pings
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, None))
    }

    /// A peer whose ping shows up on the `n`-th wait
    pub fn pinging_after(n: u32, name: &str) -> Arc<Self> {
        Arc::new(Self::build(name, Some(n)))
    }

    /// A peer that answers every PING wait with `reply`
    pub fn replying_with(reply: Packet, name: &str) -> Arc<Self> {
        Arc::new(Self {
            ping_reply: reply,
            ..Self::build(name, Some(1))
        })
    }

    fn build(name: &str, ping_on_wait: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
            handlers: Mutex::new(HashMap::new()),
            ping_on_wait,
            ping_reply: Command::Ping.to_packet(),
            waits: AtomicU32::new(0),
            flushes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Hand a packet to the registered header handler, as the reader thread would
    pub fn deliver(&self, packet: &Packet) {
        let handler = self.handlers.lock().unwrap().get(&packet.header()).cloned();
        if let Some(handler) = handler {
            handler(packet);
        }
    }

    pub fn sent(&self) -> Vec<(Packet, bool)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_commands(&self) -> Vec<Command> {
        self.sent()
            .iter()
            .map(|(p, _)| Command::from_packet(p).unwrap())
            .collect()
    }

    pub fn sent_with_header(&self, hdr: u8) -> Vec<Packet> {
        self.sent()
            .into_iter()
            .map(|(p, _)| p)
            .filter(|p| p.header() == hdr)
            .collect()
    }

    /// Values of every ELEVATION sent so far
    pub fn sent_elevations(&self) -> Vec<f32> {
        self.sent_commands()
            .into_iter()
            .filter_map(|c| match c {
                Command::Elevation { value } => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn wait_count(&self) -> u32 {
        self.waits.load(Ordering::SeqCst)
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

impl PacketTransport for MockTransport {
    fn send_packet(&self, packet: &Packet, guaranteed: bool) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((packet.clone(), guaranteed));
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io(std::io::Error::from(std::io::ErrorKind::BrokenPipe)));
        }
        Ok(())
    }

    fn wait_for_header(&self, hdr: u8, _timeout: Duration) -> Result<Option<Packet>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let n = self.waits.fetch_add(1, Ordering::SeqCst) + 1;
        match self.ping_on_wait {
            Some(at) if hdr == header::PING && n >= at => Ok(Some(self.ping_reply.clone())),
            _ => Ok(None),
        }
    }

    fn set_header_handler(&self, hdr: u8, handler: HeaderHandler) {
        self.handlers.lock().unwrap().insert(hdr, handler);
    }

    fn flush(&self) -> Result<(), TransportError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.handlers.lock().unwrap().clear();
    }

    fn describe(&self) -> String {
        format!("mock:{}", self.name)
    }
}

/// Screen reader whose pointer and hovered object are set by the test
pub struct FakeHost {
    pointer: Mutex<Point>,
    object: Mutex<Option<UiObject>>,
    screen: (u32, u32),
}

impl FakeHost {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            pointer: Mutex::new(Point::new(width as i32 / 2, height as i32 / 2)),
            object: Mutex::new(None),
            screen: (width, height),
        })
    }

    pub fn set_pointer(&self, point: Point) {
        *self.pointer.lock().unwrap() = point;
    }

    pub fn set_object(&self, object: Option<UiObject>) {
        *self.object.lock().unwrap() = object;
    }

    /// Move the pointer onto `object` and make it the hovered object
    pub fn hover(&self, point: Point, object: Option<UiObject>) {
        self.set_pointer(point);
        self.set_object(object);
    }
}

impl ScreenReaderHost for FakeHost {
    fn current_pointer_position(&self) -> Point {
        *self.pointer.lock().unwrap()
    }

    fn object_under_point(&self, _point: Point) -> Option<UiObject> {
        self.object.lock().unwrap().clone()
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen
    }
}

/// Capture backend returning a flat gray image the size of the region
pub struct FakeCapture {
    level: u8,
    failing: Vec<Rect>,
    panicking: Vec<Rect>,
    calls: AtomicUsize,
}

impl FakeCapture {
    pub fn uniform(level: u8) -> Self {
        Self {
            level,
            failing: Vec::new(),
            panicking: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Return nothing for this exact region
    pub fn failing_at(mut self, region: Rect) -> Self {
        self.failing.push(region);
        self
    }

    pub fn panicking_at(mut self, region: Rect) -> Self {
        self.panicking.push(region);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScreenCapture for FakeCapture {
    fn capture_region(&self, bounds: Rect) -> Option<PixelBuffer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains(&bounds) {
            panic!("capture backend crashed");
        }
        if self.failing.contains(&bounds) {
            return None;
        }
        let level = self.level;
        Some(RgbImage::from_pixel(
            bounds.width.max(1) as u32,
            bounds.height.max(1) as u32,
            Rgb([level, level, level]),
        ))
    }
}

/// Services wired to fakes, with the emulator channel already connected
pub struct Harness {
    pub host: Arc<FakeHost>,
    pub driver: HardwareDriver,
    pub emulator: Arc<MockTransport>,
    pub services: ControllerServices,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let host = FakeHost::new(1920, 1080);
        let driver = HardwareDriver::new(settings.max_elevation_speed);
        let emulator = MockTransport::new("emulator");
        driver
            .start_emulator(emulator.clone())
            .unwrap();
        emulator.deliver(&Command::Ping.to_packet());
        emulator.clear_sent();

        let services = ControllerServices {
            host: host.clone(),
            driver: driver.clone(),
            regions: CaptureRegistry::new(),
            settings: Arc::new(settings),
        };
        Self {
            host,
            driver,
            emulator,
            services,
        }
    }

    /// Context with no capture owner, as a global handler sees it
    pub fn context(&self) -> HandlerContext<'_> {
        HandlerContext::for_global(HandlerId(0), &self.services)
    }
}
