//! Byte framing used on both the serial and datagram links
//!
//! `0xA5 | flags | seq | header | len | payload[len] | checksum`, where the
//! checksum is the wrapping sum of every byte from `flags` through the end
//! of the payload. A corrupt frame costs one byte of resync.

use super::packet::Packet;
use crate::error::TransportError;

pub const SYNC: u8 = 0xA5;
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// Sender wants an acknowledgement frame back
pub const FLAG_ACK_REQUESTED: u8 = 0x01;
/// This frame acknowledges the frame with the same `seq`
pub const FLAG_ACK: u8 = 0x02;

const PREAMBLE_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub flags: u8,
    pub seq: u8,
    pub packet: Packet,
}

impl Frame {
    pub fn data(packet: Packet, seq: u8, ack_requested: bool) -> Self {
        let flags = if ack_requested { FLAG_ACK_REQUESTED } else { 0 };
        Self { flags, seq, packet }
    }

    pub fn ack_for(&self) -> Self {
        Self {
            flags: FLAG_ACK,
            seq: self.seq,
            packet: Packet::new(self.packet.header()),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags & FLAG_ACK != 0
    }

    pub fn wants_ack(&self) -> bool {
        self.flags & FLAG_ACK_REQUESTED != 0
    }

    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        let payload = self.packet.payload();
        if payload.len() > MAX_PAYLOAD {
            return Err(TransportError::PayloadTooLarge(payload.len()));
        }

        let mut out = Vec::with_capacity(PREAMBLE_LEN + payload.len() + 1);
        out.push(SYNC);
        out.push(self.flags);
        out.push(self.seq);
        out.push(self.packet.header());
        out.push(payload.len() as u8);
        out.extend_from_slice(payload);
        out.push(checksum(&out[1..]));
        Ok(out)
    }
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Incremental decoder for a byte stream (or a sequence of datagrams)
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    discarded: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes skipped while hunting for a valid frame
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.buf.iter().position(|&b| b == SYNC) {
                None => {
                    self.discarded += self.buf.len();
                    self.buf.clear();
                    return None;
                }
                Some(0) => {}
                Some(skip) => {
                    self.discarded += skip;
                    self.buf.drain(..skip);
                }
            }

            if self.buf.len() < PREAMBLE_LEN {
                return None;
            }
            let len = self.buf[4] as usize;
            let total = PREAMBLE_LEN + len + 1;
            if self.buf.len() < total {
                return None;
            }

            let body_end = PREAMBLE_LEN + len;
            if checksum(&self.buf[1..body_end]) != self.buf[body_end] {
                // Not a real frame start; resync from the next byte
                self.discarded += 1;
                self.buf.drain(..1);
                continue;
            }

            let frame = Frame {
                flags: self.buf[1],
                seq: self.buf[2],
                packet: Packet::from_parts(self.buf[3], self.buf[PREAMBLE_LEN..body_end].to_vec()),
            };
            self.buf.drain(..total);
            return Some(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    fn elevation_frame(value: f32) -> Frame {
        Frame::data(Command::Elevation { value }.to_packet(), 3, false)
    }

    #[test]
    fn test_decode_split_across_reads() {
        let bytes = elevation_frame(0.25).encode().unwrap();
        let mut dec = FrameDecoder::new();
        dec.push(&bytes[..4]);
        assert!(dec.next_frame().is_none());
        dec.push(&bytes[4..]);
        assert_eq!(dec.next_frame(), Some(elevation_frame(0.25)));
        assert!(dec.next_frame().is_none());
    }

    #[test]
    fn test_resync_after_garbage() {
        let mut bytes = vec![0x00, SYNC, 0x13, 0x37];
        bytes.extend(elevation_frame(1.0).encode().unwrap());
        let mut dec = FrameDecoder::new();
        dec.push(&bytes);
        assert_eq!(dec.next_frame(), Some(elevation_frame(1.0)));
        assert!(dec.discarded() > 0);
    }

    #[test]
    fn test_corrupt_checksum_is_skipped() {
        let mut bad = elevation_frame(0.5).encode().unwrap();
        let last = bad.len() - 1;
        bad[last] = bad[last].wrapping_add(1);
        let good = elevation_frame(0.75).encode().unwrap();

        let mut dec = FrameDecoder::new();
        dec.push(&bad);
        dec.push(&good);
        assert_eq!(dec.next_frame(), Some(elevation_frame(0.75)));
    }

    #[test]
    fn test_ack_mirrors_seq_and_header() {
        let frame = Frame::data(Command::ElevationSpeed { units_per_sec: 2.0 }.to_packet(), 9, true);
        assert!(frame.wants_ack());
        let ack = frame.ack_for();
        assert!(ack.is_ack());
        assert_eq!(ack.seq, 9);
        assert_eq!(ack.packet.header(), frame.packet.header());
        assert!(ack.packet.payload().is_empty());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let pkt = Packet::from_parts(0x10, vec![0; 300]);
        assert!(matches!(
            Frame::data(pkt, 0, false).encode(),
            Err(TransportError::PayloadTooLarge(300))
        ));
    }
}
