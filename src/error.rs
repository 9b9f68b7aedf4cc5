//! Error types for the controller core
//!
//! None of these ever reach the screen-reader host: each is logged where it
//! is caught and the affected command, region or channel degrades silently.

use crate::host::Rect;

/// A channel could not carry a packet
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {endpoint}: {source}")]
    Open {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
    #[error("no acknowledgement for header {header:#04x} after {attempts} attempts")]
    Unacknowledged { header: u8, attempts: u32 },
    #[error("payload of {0} bytes does not fit in a frame")]
    PayloadTooLarge(usize),
    #[error("outbound queue full ({capacity} packets pending)")]
    QueueFull { capacity: usize },
}

/// Inbound packet could not be decoded
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PacketError {
    #[error("malformed packet {header:#04x}: expected {expected} payload bytes, got {actual}")]
    LengthMismatch {
        header: u8,
        expected: usize,
        actual: usize,
    },
    #[error("unknown header {0:#04x}")]
    UnknownHeader(u8),
    #[error("read past end of payload (header {0:#04x})")]
    Truncated(u8),
}

/// UART handshake outcome when the device never came up
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("could not open device: {0}")]
    Open(#[source] TransportError),
    #[error("no ping from device after {attempts} attempts")]
    Timeout { attempts: u32 },
    #[error("channel already started")]
    AlreadyStarted,
}

/// One region could not be serviced in a capture pass
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture returned no pixels for {0:?}")]
    Empty(Rect),
    #[error("capture panicked for {region:?}: {message}")]
    Panicked { region: Rect, message: String },
}

/// An effect refused to run or failed partway
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EffectError {
    #[error("invalid effect parameter: {0}")]
    InvalidParameter(String),
    #[error("{0}")]
    Failed(String),
}

/// Best-effort description of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
