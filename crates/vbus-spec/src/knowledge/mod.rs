//! Knowledge base interface.
//!
//! The knowledge base is the read-only catalogue of units, types, device
//! names and packet layouts. It is channel independent; the
//! [`Catalog`](crate::catalog::Catalog) turns its entries into per-channel
//! device and packet specifications.
//!
//! Besides the tables it owns a registry of raw value extractors and
//! injectors, addressed by opaque string keys, so that overlays can name
//! them without holding closures.

pub mod builtin;

use std::fmt;
use std::sync::Arc;

use crate::model::{PacketFieldSpec, Type};
use crate::units::Unit;

pub use builtin::BuiltinKnowledgeBase;

/// Pure function extracting a raw value from a declared-length payload.
pub type RawValueGetter = Arc<dyn Fn(&[u8]) -> Option<f64> + Send + Sync>;

/// Function writing a raw value into a payload buffer.
pub type RawValueSetter = Arc<dyn Fn(&mut [u8], f64) + Send + Sync>;

/// Device name entry, matched by masked addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDefinition {
    pub self_address: u16,
    pub self_mask: u16,
    /// `None` matches any peer
    pub peer_address: Option<u16>,
    pub name: String,
}

impl DeviceDefinition {
    pub fn new(self_address: u16, name: impl Into<String>) -> Self {
        Self {
            self_address,
            self_mask: 0xFFFF,
            peer_address: None,
            name: name.into(),
        }
    }

    pub fn with_mask(mut self, mask: u16) -> Self {
        self.self_mask = mask;
        self
    }

    pub fn with_peer(mut self, peer_address: u16) -> Self {
        self.peer_address = Some(peer_address);
        self
    }

    pub fn matches(&self, self_address: u16, peer_address: u16) -> bool {
        (self_address & self.self_mask) == (self.self_address & self.self_mask)
            && self.peer_address.is_none_or(|peer| peer == peer_address)
    }
}

/// Packet layout entry.
#[derive(Debug, Clone)]
pub struct PacketDefinition {
    pub destination_address: u16,
    pub source_address: u16,
    pub command: u16,
    pub protocol_version: u8,
    pub packet_fields: Arc<[PacketFieldSpec]>,
}

/// Read-only source of units, types, devices, packets and extractors.
///
/// Implementations must be safe for unsynchronized concurrent reads.
pub trait KnowledgeBase: Send + Sync {
    fn unit(&self, unit_code: &str) -> Option<Arc<Unit>>;

    /// All units, in table order.
    fn units(&self) -> Vec<Arc<Unit>>;

    fn type_by_id(&self, type_id: &str) -> Option<Arc<Type>>;

    fn device(&self, self_address: u16, peer_address: u16) -> Option<&DeviceDefinition>;

    fn packet(&self, destination: u16, source: u16, command: u16) -> Option<&PacketDefinition>;

    fn raw_value_getter(&self, key: &str) -> Option<RawValueGetter>;

    fn raw_value_setter(&self, key: &str) -> Option<RawValueSetter>;
}

impl fmt::Debug for dyn KnowledgeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("units", &self.units().len())
            .finish_non_exhaustive()
    }
}
