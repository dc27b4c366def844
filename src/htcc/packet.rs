//! HTCC timing-marker packets.
//!
//! Wire format (11 bytes, little-endian):
//!
//! ```text
//! 0   sync      u8  = 0x7E
//! 1   kind      u8  = 0x01 (timing marker)
//! 2   timestamp i64 ticks since the ADV domain zero
//! 10  checksum  u8  = xor of bytes 1..=9
//! ```
//!
//! Anything else the hardware sends is not a marker.

use byteorder::{ByteOrder, LittleEndian};

use crate::core::Ticks;

/// Length of a marker packet.
pub const MARKER_PACKET_LEN: usize = 11;

/// First byte of every packet.
pub const SYNC_BYTE: u8 = 0x7E;

/// Packet kind of a timing marker.
pub const MARKER_KIND: u8 = 0x01;

/// A decoded timing marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkerPacket {
    pub timestamp: Ticks,
}

fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

impl MarkerPacket {
    pub fn new(timestamp: Ticks) -> Self {
        Self { timestamp }
    }

    /// Decode a marker, or `None` when `bytes` is not a valid marker.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != MARKER_PACKET_LEN || bytes[0] != SYNC_BYTE || bytes[1] != MARKER_KIND {
            return None;
        }
        if xor_checksum(&bytes[1..10]) != bytes[10] {
            return None;
        }
        Some(Self {
            timestamp: LittleEndian::read_i64(&bytes[2..10]),
        })
    }

    /// Encode to the wire format.
    pub fn encode(&self) -> [u8; MARKER_PACKET_LEN] {
        let mut buf = [0u8; MARKER_PACKET_LEN];
        buf[0] = SYNC_BYTE;
        buf[1] = MARKER_KIND;
        LittleEndian::write_i64(&mut buf[2..10], self.timestamp);
        buf[10] = xor_checksum(&buf[1..10]);
        buf
    }
}
