//! Packet payload encoding and typed commands

use serde::Serialize;

use super::header;
use crate::error::PacketError;

/// One protocol packet: header plus raw payload
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    header: u8,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(header: u8) -> Self {
        Self {
            header,
            payload: Vec::new(),
        }
    }

    pub fn from_parts(header: u8, payload: Vec<u8>) -> Self {
        Self { header, payload }
    }

    pub fn header(&self) -> u8 {
        self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.payload.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_i16(&mut self, value: i16) -> &mut Self {
        self.payload.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.payload.push(value);
        self
    }

    pub fn reader(&self) -> PacketReader<'_> {
        PacketReader {
            header: self.header,
            data: &self.payload,
            pos: 0,
        }
    }
}

/// Sequential little-endian reader over a packet payload
pub struct PacketReader<'a> {
    header: u8,
    data: &'a [u8],
    pos: usize,
}

impl PacketReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], PacketError> {
        let end = self.pos + N;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(PacketError::Truncated(self.header))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_f32(&mut self) -> Result<f32, PacketError> {
        Ok(f32::from_le_bytes(self.take::<4>()?))
    }

    pub fn read_i16(&mut self) -> Result<i16, PacketError> {
        Ok(i16::from_le_bytes(self.take::<2>()?))
    }

    pub fn read_u8(&mut self) -> Result<u8, PacketError> {
        Ok(self.take::<1>()?[0])
    }
}

/// Decoded protocol command
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Ping,
    Elevation {
        value: f32,
    },
    ElevationSpeed {
        units_per_sec: f32,
    },
    Vibration {
        amplitude: f32,
        frequency_hz: f32,
        duration_pulses: i16,
    },
    Status {
        hardware_connected: bool,
    },
}

impl Command {
    /// Exact payload size for a header, if the header is known
    pub fn payload_len(hdr: u8) -> Option<usize> {
        match hdr {
            header::PING => Some(0),
            header::ELEVATION | header::ELEVATION_SPEED => Some(4),
            header::VIBRATION => Some(10),
            header::STATUS => Some(1),
            _ => None,
        }
    }

    pub fn to_packet(&self) -> Packet {
        match *self {
            Command::Ping => Packet::new(header::PING),
            Command::Elevation { value } => {
                let mut pkt = Packet::new(header::ELEVATION);
                pkt.write_f32(value);
                pkt
            }
            Command::ElevationSpeed { units_per_sec } => {
                let mut pkt = Packet::new(header::ELEVATION_SPEED);
                pkt.write_f32(units_per_sec);
                pkt
            }
            Command::Vibration {
                amplitude,
                frequency_hz,
                duration_pulses,
            } => {
                let mut pkt = Packet::new(header::VIBRATION);
                pkt.write_f32(amplitude)
                    .write_f32(frequency_hz)
                    .write_i16(duration_pulses);
                pkt
            }
            Command::Status { hardware_connected } => {
                let mut pkt = Packet::new(header::STATUS);
                pkt.write_u8(u8::from(hardware_connected));
                pkt
            }
        }
    }

    /// Decode a packet, rejecting payloads whose length does not match the header
    pub fn from_packet(packet: &Packet) -> Result<Self, PacketError> {
        let hdr = packet.header();
        let expected = Self::payload_len(hdr).ok_or(PacketError::UnknownHeader(hdr))?;
        if packet.payload().len() != expected {
            return Err(PacketError::LengthMismatch {
                header: hdr,
                expected,
                actual: packet.payload().len(),
            });
        }

        let mut r = packet.reader();
        let cmd = match hdr {
            header::PING => Command::Ping,
            header::ELEVATION => Command::Elevation {
                value: r.read_f32()?,
            },
            header::ELEVATION_SPEED => Command::ElevationSpeed {
                units_per_sec: r.read_f32()?,
            },
            header::VIBRATION => Command::Vibration {
                amplitude: r.read_f32()?,
                frequency_hz: r.read_f32()?,
                duration_pulses: r.read_i16()?,
            },
            header::STATUS => Command::Status {
                hardware_connected: r.read_u8()? == 1,
            },
            other => return Err(PacketError::UnknownHeader(other)),
        };
        Ok(cmd)
    }
}
