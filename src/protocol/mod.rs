//! Wire protocol shared by the device firmware and the emulator
//!
//! Packets are a one-byte header plus a fixed-width little-endian payload.
//! How packets are framed on the wire is the transport's business; the
//! driver only sees [`PacketTransport`].

pub mod frame;
pub mod link;
pub mod packet;
pub mod serial;
pub mod udp;

use std::sync::Arc;
use std::time::Duration;

use crate::error::TransportError;

pub use link::FramedLink;
pub use packet::{Command, Packet, PacketReader};

/// Packet header values
pub mod header {
    pub const PING: u8 = 0xFF;
    pub const ELEVATION: u8 = 0x10;
    pub const ELEVATION_SPEED: u8 = 0x11;
    pub const VIBRATION: u8 = 0x20;
    pub const STATUS: u8 = 0x30;

    pub fn name(header: u8) -> &'static str {
        match header {
            PING => "PING",
            ELEVATION => "ELEVATION",
            ELEVATION_SPEED => "ELEVATION_SPEED",
            VIBRATION => "VIBRATION",
            STATUS => "STATUS",
            _ => "UNKNOWN",
        }
    }
}

/// Callback invoked on the transport's receive context for a registered header
pub type HeaderHandler = Arc<dyn Fn(&Packet) + Send + Sync>;

/// Framing and delivery contract the hardware driver is written against.
///
/// Implementations must be safe to call from several threads at once: the
/// coordinator, the capture loop and inbound callbacks all send.
pub trait PacketTransport: Send + Sync {
    /// Send a packet. With `guaranteed`, retransmit until the peer
    /// acknowledges or the transport gives up.
    fn send_packet(&self, packet: &Packet, guaranteed: bool) -> Result<(), TransportError>;

    /// Hand a packet to the transport without waiting on the wire. Fails
    /// with [`TransportError::QueueFull`] instead of blocking; delivery
    /// errors after that point are logged by the transport.
    ///
    /// The default sends inline, which suits transports that never block.
    fn enqueue_packet(&self, packet: &Packet, guaranteed: bool) -> Result<(), TransportError> {
        self.send_packet(packet, guaranteed)
    }

    /// Block until a packet with `header` arrives or `timeout` elapses.
    /// Packets with a registered header handler are never returned here.
    fn wait_for_header(&self, header: u8, timeout: Duration) -> Result<Option<Packet>, TransportError>;

    /// Route every inbound packet with `header` to `handler`
    fn set_header_handler(&self, header: u8, handler: HeaderHandler);

    /// Drop any buffered inbound data
    fn flush(&self) -> Result<(), TransportError>;

    fn close(&self);

    /// Human-readable endpoint for logs
    fn describe(&self) -> String;
}
