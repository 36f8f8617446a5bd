//! Received packet records, as handed over by a transport.

use crate::config::defaults;
use crate::ids::PacketId;
use crate::model::PacketSpec;

/// Bytes carried by one frame.
pub const BYTES_PER_FRAME: usize = 4;

/// A received packet header with its reassembled frame data.
///
/// `frame_data` may be shorter than the declared length (short reads) or
/// longer (reused buffers). Only [`payload`](Self::payload) is ever decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub channel: u8,
    pub destination_address: u16,
    pub source_address: u16,
    pub protocol_version: u8,
    pub command: u16,
    pub frame_count: usize,
    pub frame_data: Vec<u8>,
}

impl Header {
    pub fn new(channel: u8, destination_address: u16, source_address: u16, command: u16) -> Self {
        Self {
            channel,
            destination_address,
            source_address,
            protocol_version: defaults::PROTOCOL_VERSION,
            command,
            frame_count: 0,
            frame_data: Vec::new(),
        }
    }

    /// Header for a parsed packet ID; the version defaults when absent.
    pub fn from_packet_id(id: &PacketId) -> Self {
        Self::new(id.channel, id.destination_address, id.source_address, id.command)
            .with_protocol_version(id.protocol_version.unwrap_or(defaults::PROTOCOL_VERSION))
    }

    pub fn with_protocol_version(mut self, protocol_version: u8) -> Self {
        self.protocol_version = protocol_version;
        self
    }

    pub fn with_frames(mut self, frame_count: usize, frame_data: impl Into<Vec<u8>>) -> Self {
        self.frame_count = frame_count;
        self.frame_data = frame_data.into();
        self
    }

    /// `frame_count * 4`
    pub fn declared_length(&self) -> usize {
        self.frame_count.saturating_mul(BYTES_PER_FRAME)
    }

    /// The bytes that may legally be decoded.
    pub fn payload(&self) -> &[u8] {
        let end = self.declared_length().min(self.frame_data.len());
        &self.frame_data[..end]
    }

    /// Whether this header carries `packet`, ignoring the protocol version.
    pub fn matches(&self, packet: &PacketSpec) -> bool {
        self.channel == packet.channel
            && self.destination_address == packet.destination_address
            && self.source_address == packet.source_address
            && self.command == packet.command
    }
}
