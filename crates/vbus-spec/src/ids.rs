//! Identifier codec.
//!
//! Textual identifiers are ASCII, `_`-delimited and made of fixed-width,
//! zero-padded segments:
//!
//! ```text
//! device ID        CC_SSSS_PPPP             channel, self address, peer address
//! packet ID        CC_DDDD_SSSS[_PP]_HHHH   channel, destination, source, [version], command
//! field ID         OOO_S_B                  byte offset, byte size, bit mask
//! packet-field ID  <packet ID>_<field ID>
//! ```
//!
//! Parsing never fails loudly: anything that does not match a grammar is
//! reported as `None` so that callers can fall back to opaque overlay keys.
//! Device IDs are only ever formatted.

use std::fmt;

/// Identity of a device as seen on one channel from one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub channel: u8,
    pub self_address: u16,
    pub peer_address: u16,
}

impl DeviceId {
    pub fn new(channel: u8, self_address: u16, peer_address: u16) -> Self {
        Self {
            channel,
            self_address,
            peer_address,
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}_{:04X}_{:04X}",
            self.channel, self.self_address, self.peer_address
        )
    }
}

/// Packet identifier; `protocol_version` is optional in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId {
    pub channel: u8,
    pub destination_address: u16,
    pub source_address: u16,
    pub protocol_version: Option<u8>,
    pub command: u16,
}

impl PacketId {
    pub fn new(
        channel: u8,
        destination_address: u16,
        source_address: u16,
        protocol_version: Option<u8>,
        command: u16,
    ) -> Self {
        Self {
            channel,
            destination_address,
            source_address,
            protocol_version,
            command,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let segments: Vec<&str> = s.split('_').collect();
        Self::from_segments(&segments)
    }

    fn from_segments(segments: &[&str]) -> Option<Self> {
        let (channel, destination, source, version, command) = match segments {
            [c, d, s, h] => (c, d, s, None, h),
            [c, d, s, v, h] => (c, d, s, Some(v), h),
            _ => return None,
        };

        let protocol_version = match version {
            Some(v) => Some(parse_hex(v, 2)?),
            None => None,
        };

        Some(Self {
            channel: parse_dec(channel, 2)?,
            destination_address: parse_hex(destination, 4)?,
            source_address: parse_hex(source, 4)?,
            protocol_version,
            command: parse_hex(command, 4)?,
        })
    }

    /// Whether `candidate` is the packet this (query) ID refers to.
    ///
    /// A query without a protocol version matches any version.
    pub fn matches(&self, candidate: &PacketId) -> bool {
        self.channel == candidate.channel
            && self.destination_address == candidate.destination_address
            && self.source_address == candidate.source_address
            && self.command == candidate.command
            && match self.protocol_version {
                Some(version) => candidate.protocol_version == Some(version),
                None => true,
            }
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}_{:04X}_{:04X}",
            self.channel, self.destination_address, self.source_address
        )?;
        if let Some(version) = self.protocol_version {
            write!(f, "_{:02X}", version)?;
        }
        write!(f, "_{:04X}", self.command)
    }
}

/// Field identifier within a packet payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId {
    pub offset: usize,
    pub size: usize,
    /// Single-bit mask, 0 for byte-aligned fields
    pub bit_mask: u8,
}

impl FieldId {
    pub fn new(offset: usize, size: usize, bit_mask: u8) -> Self {
        Self {
            offset,
            size,
            bit_mask,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let segments: Vec<&str> = s.split('_').collect();
        Self::from_segments(&segments)
    }

    fn from_segments(segments: &[&str]) -> Option<Self> {
        match segments {
            [offset, size, bit] => {
                let bit_mask: u8 = parse_dec_any(bit)?;
                if bit_mask != 0 && !bit_mask.is_power_of_two() {
                    return None;
                }
                Some(Self {
                    offset: parse_dec(offset, 3)?,
                    size: parse_dec_any(size)?,
                    bit_mask,
                })
            }
            _ => None,
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}_{}_{}", self.offset, self.size, self.bit_mask)
    }
}

/// Fully qualified field identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketFieldId {
    pub packet_id: PacketId,
    pub field_id: FieldId,
}

impl PacketFieldId {
    pub fn new(packet_id: PacketId, field_id: FieldId) -> Self {
        Self {
            packet_id,
            field_id,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let segments: Vec<&str> = s.split('_').collect();
        if segments.len() < 7 {
            return None;
        }
        let (packet, field) = segments.split_at(segments.len() - 3);
        Some(Self {
            packet_id: PacketId::from_segments(packet)?,
            field_id: FieldId::from_segments(field)?,
        })
    }
}

impl fmt::Display for PacketFieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.packet_id, self.field_id)
    }
}

/// Key under which the knowledge base registers a field's extractor.
///
/// Channel-independent: `_DDDD_SSSS_HHHH_OOO_S_B`.
pub fn extractor_key(destination: u16, source: u16, command: u16, field_id: &FieldId) -> String {
    format!(
        "_{:04X}_{:04X}_{:04X}_{}",
        destination, source, command, field_id
    )
}

fn parse_dec<T: std::str::FromStr>(segment: &str, width: usize) -> Option<T> {
    if segment.len() != width {
        return None;
    }
    parse_dec_any(segment)
}

fn parse_dec_any<T: std::str::FromStr>(segment: &str) -> Option<T> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

fn parse_hex<T: TryFrom<u32>>(segment: &str, width: usize) -> Option<T> {
    if segment.len() != width || !segment.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let value = u32::from_str_radix(segment, 16).ok()?;
    T::try_from(value).ok()
}
