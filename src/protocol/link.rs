//! Framed packet transport over any byte link
//!
//! A reader thread decodes inbound frames and routes them: acknowledgements
//! wake guaranteed senders, registered headers go to their handler, and
//! everything else lands in a small inbox for `wait_for_header`. A writer
//! thread drains the bounded outbound queue behind `enqueue_packet`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::frame::{Frame, FrameDecoder};
use super::{header, HeaderHandler, Packet, PacketTransport};
use crate::error::TransportError;

/// Unacknowledged packets kept for `wait_for_header`; oldest are dropped first
const INBOX_CAPACITY: usize = 64;
const ACK_TIMEOUT: Duration = Duration::from_millis(100);
const GUARANTEED_ATTEMPTS: u32 = 5;
/// Packets waiting for the writer thread before `enqueue_packet` refuses
pub const OUTBOUND_CAPACITY: usize = 32;
/// How long `close` lets the writer drain what is already queued
const CLOSE_DRAIN: Duration = Duration::from_millis(250);
/// A repeat of the last acked frame within this window is a retransmission
const DUPLICATE_WINDOW: Duration = Duration::from_secs(1);

/// Raw bidirectional byte channel underneath the framing
pub trait ByteLink: Send + Sync + 'static {
    fn write_all(&self, bytes: &[u8]) -> io::Result<()>;

    /// Read whatever is available, blocking at most a short poll interval.
    /// Returns `Ok(0)` when nothing arrived in time.
    fn read_chunk(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Drop bytes already buffered by the OS
    fn discard_input(&self) -> io::Result<()> {
        Ok(())
    }

    fn describe(&self) -> String;
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

struct LinkShared {
    link: Box<dyn ByteLink>,
    write_lock: Mutex<()>,
    inbox: Mutex<VecDeque<Packet>>,
    inbox_cv: Condvar,
    acks: Mutex<HashSet<u8>>,
    acks_cv: Condvar,
    handlers: Mutex<HashMap<u8, HeaderHandler>>,
    last_reliable: Mutex<Option<(u8, Packet, Instant)>>,
    next_seq: AtomicU8,
    running: AtomicBool,
}

struct Outbound {
    packet: Packet,
    guaranteed: bool,
}

impl LinkShared {
    fn write_frame(&self, frame: &Frame) -> Result<(), TransportError> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let bytes = frame.encode()?;
        let _guard = lock(&self.write_lock);
        self.link.write_all(&bytes)?;
        Ok(())
    }

    fn route(&self, frame: Frame) {
        if frame.is_ack() {
            lock(&self.acks).insert(frame.seq);
            self.acks_cv.notify_all();
            return;
        }

        if frame.wants_ack() {
            if let Err(e) = self.write_frame(&frame.ack_for()) {
                log::warn!("{}: failed to acknowledge seq {}: {}", self.link.describe(), frame.seq, e);
            }
            if self.is_retransmission(&frame) {
                log::debug!("{}: dropped repeat of seq {}", self.link.describe(), frame.seq);
                return;
            }
        }

        let handler = lock(&self.handlers).get(&frame.packet.header()).cloned();
        match handler {
            Some(handler) => handler(&frame.packet),
            None => {
                let mut inbox = lock(&self.inbox);
                if inbox.len() >= INBOX_CAPACITY {
                    inbox.pop_front();
                }
                inbox.push_back(frame.packet);
                self.inbox_cv.notify_all();
            }
        }
    }

    /// Our ack got lost and the sender tried again
    fn is_retransmission(&self, frame: &Frame) -> bool {
        let now = Instant::now();
        let mut last = lock(&self.last_reliable);
        let repeat = matches!(
            &*last,
            Some((seq, packet, at))
                if *seq == frame.seq && *packet == frame.packet && now.duration_since(*at) < DUPLICATE_WINDOW
        );
        *last = Some((frame.seq, frame.packet.clone(), now));
        repeat
    }

    fn send(&self, packet: &Packet, guaranteed: bool) -> Result<(), TransportError> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        if !guaranteed {
            return self.write_frame(&Frame::data(packet.clone(), seq, false));
        }

        let frame = Frame::data(packet.clone(), seq, true);
        lock(&self.acks).remove(&seq);

        for attempt in 1..=GUARANTEED_ATTEMPTS {
            self.write_frame(&frame)?;

            let deadline = Instant::now() + ACK_TIMEOUT;
            let mut acks = lock(&self.acks);
            loop {
                if acks.remove(&seq) {
                    return Ok(());
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                acks = self
                    .acks_cv
                    .wait_timeout(acks, deadline - now)
                    .unwrap_or_else(|e| e.into_inner())
                    .0;
            }
            log::debug!(
                "{}: no ack for {} seq {} (attempt {}/{})",
                self.link.describe(),
                header::name(packet.header()),
                seq,
                attempt,
                GUARANTEED_ATTEMPTS
            );
        }

        Err(TransportError::Unacknowledged {
            header: packet.header(),
            attempts: GUARANTEED_ATTEMPTS,
        })
    }

    fn write_loop(self: Arc<Self>, mut queue: mpsc::Receiver<Outbound>) {
        while let Some(item) = queue.blocking_recv() {
            if let Err(e) = self.send(&item.packet, item.guaranteed) {
                log::warn!(
                    "{}: queued {} not delivered: {}",
                    self.link.describe(),
                    header::name(item.packet.header()),
                    e
                );
            }
        }
        log::debug!("{}: writer stopped", self.link.describe());
    }

    fn read_loop(self: Arc<Self>) {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 512];
        let mut reported_discards = 0;

        while self.running.load(Ordering::SeqCst) {
            match self.link.read_chunk(&mut buf) {
                Ok(0) => continue,
                Ok(n) => decoder.push(&buf[..n]),
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Datagram sockets report ICMP refusals as read errors; keep going
                    log::debug!("{}: read error: {}", self.link.describe(), e);
                    thread::sleep(Duration::from_millis(50));
                    continue;
                }
            }

            while let Some(frame) = decoder.next_frame() {
                self.route(frame);
            }
            if decoder.discarded() != reported_discards {
                log::debug!(
                    "{}: discarded {} unframed bytes so far",
                    self.link.describe(),
                    decoder.discarded()
                );
                reported_discards = decoder.discarded();
            }
        }
        log::debug!("{}: reader stopped", self.link.describe());
    }
}

/// [`PacketTransport`] over a [`ByteLink`]
pub struct FramedLink {
    shared: Arc<LinkShared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    outbound: Mutex<Option<mpsc::Sender<Outbound>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl FramedLink {
    /// Wrap a link and start its reader and writer threads
    pub fn new(link: Box<dyn ByteLink>) -> Self {
        let shared = Arc::new(LinkShared {
            link,
            write_lock: Mutex::new(()),
            inbox: Mutex::new(VecDeque::new()),
            inbox_cv: Condvar::new(),
            acks: Mutex::new(HashSet::new()),
            acks_cv: Condvar::new(),
            handlers: Mutex::new(HashMap::new()),
            last_reliable: Mutex::new(None),
            next_seq: AtomicU8::new(0),
            running: AtomicBool::new(true),
        });

        let reader_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name(format!("touchpoint-link-{}", shared.link.describe()))
            .spawn(move || reader_shared.read_loop())
            .map_err(|e| log::error!("Failed to spawn link reader: {}", e))
            .ok();

        let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let writer_shared = Arc::clone(&shared);
        let writer = thread::Builder::new()
            .name(format!("touchpoint-send-{}", shared.link.describe()))
            .spawn(move || writer_shared.write_loop(rx))
            .map_err(|e| log::error!("Failed to spawn link writer: {}", e))
            .ok();
        // Without a writer nothing would drain the queue
        let outbound = writer.as_ref().map(|_| tx);

        Self {
            shared,
            reader: Mutex::new(reader),
            outbound: Mutex::new(outbound),
            writer: Mutex::new(writer),
        }
    }

    /// Open a serial device and frame packets over it
    pub fn open_serial(port: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let link = super::serial::SerialLink::open(port, baud_rate)?;
        Ok(Self::new(Box::new(link)))
    }

    /// Bind a local UDP port and frame packets to a fixed remote
    pub fn open_udp(listen_port: u16, remote: std::net::SocketAddr) -> Result<Self, TransportError> {
        let link = super::udp::UdpLink::bind(listen_port, remote)?;
        Ok(Self::new(Box::new(link)))
    }
}

impl PacketTransport for FramedLink {
    fn send_packet(&self, packet: &Packet, guaranteed: bool) -> Result<(), TransportError> {
        self.shared.send(packet, guaranteed)
    }

    fn enqueue_packet(&self, packet: &Packet, guaranteed: bool) -> Result<(), TransportError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let outbound = lock(&self.outbound);
        let Some(queue) = outbound.as_ref() else {
            return Err(TransportError::Closed);
        };
        queue
            .try_send(Outbound {
                packet: packet.clone(),
                guaranteed,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => TransportError::QueueFull {
                    capacity: OUTBOUND_CAPACITY,
                },
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    fn wait_for_header(&self, hdr: u8, timeout: Duration) -> Result<Option<Packet>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut inbox = lock(&self.shared.inbox);
        loop {
            if !self.shared.running.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            if let Some(pos) = inbox.iter().position(|p| p.header() == hdr) {
                return Ok(inbox.remove(pos));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            inbox = self
                .shared
                .inbox_cv
                .wait_timeout(inbox, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    fn set_header_handler(&self, hdr: u8, handler: HeaderHandler) {
        lock(&self.shared.handlers).insert(hdr, handler);
    }

    fn flush(&self) -> Result<(), TransportError> {
        lock(&self.shared.inbox).clear();
        self.shared.link.discard_input()?;
        Ok(())
    }

    fn close(&self) {
        // Let queued packets out first; a stalled link is left behind
        if lock(&self.outbound).take().is_some() {
            if let Some(writer) = lock(&self.writer).take() {
                let deadline = Instant::now() + CLOSE_DRAIN;
                while !writer.is_finished() && Instant::now() < deadline {
                    thread::sleep(Duration::from_millis(5));
                }
            }
        }
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.inbox_cv.notify_all();
        self.shared.acks_cv.notify_all();
        // Handlers may hold references back to whoever owns this link
        lock(&self.shared.handlers).clear();
        if let Some(handle) = lock(&self.reader).take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
        log::info!("{}: closed", self.describe());
    }

    fn describe(&self) -> String {
        self.shared.link.describe()
    }
}

impl Drop for FramedLink {
    fn drop(&mut self) {
        self.close();
    }
}
