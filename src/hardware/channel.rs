//! Per-channel connection state

use std::sync::Arc;
use std::time::Instant;

use crate::protocol::PacketTransport;

/// Channel-independent view of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    Connected,
}

/// Serial device lifecycle. `Connected` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum UartState {
    Idle,
    Opening,
    AwaitingPing,
    Connected,
    Failed,
}

impl UartState {
    pub fn connection(&self) -> ConnectionState {
        match self {
            UartState::Idle | UartState::Failed => ConnectionState::Disconnected,
            UartState::Opening | UartState::AwaitingPing => ConnectionState::Handshaking,
            UartState::Connected => ConnectionState::Connected,
        }
    }
}

/// Emulator lifecycle. Once connected it stays connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum EmulatorState {
    Disabled,
    Listening,
    Connected,
}

impl EmulatorState {
    pub fn connection(&self) -> ConnectionState {
        match self {
            EmulatorState::Disabled => ConnectionState::Disconnected,
            EmulatorState::Listening => ConnectionState::Handshaking,
            EmulatorState::Connected => ConnectionState::Connected,
        }
    }
}

pub(super) struct UartChannel {
    pub state: UartState,
    pub transport: Option<Arc<dyn PacketTransport>>,
}

impl UartChannel {
    pub fn new() -> Self {
        Self {
            state: UartState::Idle,
            transport: None,
        }
    }

    /// Transport to send on, only while connected
    pub fn live(&self) -> Option<Arc<dyn PacketTransport>> {
        match self.state {
            UartState::Connected => self.transport.clone(),
            _ => None,
        }
    }
}

pub(super) struct EmulatorChannel {
    pub state: EmulatorState,
    pub transport: Option<Arc<dyn PacketTransport>>,
    pub last_seen: Option<Instant>,
}

impl EmulatorChannel {
    pub fn new() -> Self {
        Self {
            state: EmulatorState::Disabled,
            transport: None,
            last_seen: None,
        }
    }

    pub fn live(&self) -> Option<Arc<dyn PacketTransport>> {
        match self.state {
            EmulatorState::Connected => self.transport.clone(),
            _ => None,
        }
    }
}
