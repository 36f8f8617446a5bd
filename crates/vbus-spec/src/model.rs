//! Knowledge-base entities: types, localized names, devices, packets and
//! packet fields.
//!
//! All entities are immutable once built and are shared by `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::ids::{FieldId, PacketId};
use crate::units::Unit;

/// Interpretation family of a decoded raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKind {
    /// Fixed-point number scaled by `10^precision`
    Number,
    /// Minutes since midnight
    Time,
    /// `day * 1440 + minutes`, day 0 being Monday
    Weektime,
    /// Seconds since 2001-01-01T00:00:00Z
    DateTime,
}

impl RootKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "Number",
            Self::Time => "Time",
            Self::Weektime => "Weektime",
            Self::DateTime => "DateTime",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Number" => Some(Self::Number),
            "Time" => Some(Self::Time),
            "Weektime" => Some(Self::Weektime),
            "DateTime" => Some(Self::DateTime),
            _ => None,
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value type: root kind, decimal precision and unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub type_id: String,
    pub root_kind: RootKind,
    /// Decimal digits, only meaningful for `Number`
    pub precision: u32,
    pub unit: Arc<Unit>,
}

/// Text that is either language independent or given per language tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    ByLanguage(BTreeMap<String, String>),
}

impl LocalizedText {
    /// Resolve against `language`, falling back to the `ref` entry.
    pub fn resolve(&self, language: &str) -> &str {
        match self {
            Self::Plain(text) => text,
            Self::ByLanguage(map) => map
                .get(language)
                .or_else(|| map.get(defaults::REF_LANGUAGE))
                .or_else(|| map.values().next())
                .map(String::as_str)
                .unwrap_or(""),
        }
    }

    /// Build a per-language text from `(tag, text)` pairs.
    pub fn by_language<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::ByLanguage(
            entries
                .into_iter()
                .map(|(tag, text)| (tag.to_string(), text.to_string()))
                .collect(),
        )
    }
}

impl From<&str> for LocalizedText {
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

impl From<String> for LocalizedText {
    fn from(text: String) -> Self {
        Self::Plain(text)
    }
}

/// A device as seen on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub device_id: String,
    pub channel: u8,
    pub self_address: u16,
    pub peer_address: u16,
    pub name: String,
    /// `name`, prefixed by `VBus #<channel>: ` on nonzero channels
    pub full_name: String,
}

impl DeviceSpec {
    pub fn full_name_for(channel: u8, name: &str) -> String {
        if channel == 0 {
            name.to_string()
        } else {
            format!("VBus #{}: {}", channel, name)
        }
    }

    pub fn unknown_name(self_address: u16) -> String {
        format!("Unknown Device (0x{:04X})", self_address)
    }
}

/// A field inside a packet payload.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketFieldSpec {
    pub field_id: String,
    pub offset: usize,
    pub size: usize,
    /// Single-bit mask, 0 for byte-aligned fields
    pub bit_mask: u8,
    pub name: LocalizedText,
    pub field_type: Arc<Type>,
    /// Type the payload encodes, when an overlay retyped the field
    pub storage_type: Option<Arc<Type>>,
}

impl PacketFieldSpec {
    pub fn new(id: FieldId, name: LocalizedText, field_type: Arc<Type>) -> Self {
        Self {
            field_id: id.to_string(),
            offset: id.offset,
            size: id.size,
            bit_mask: id.bit_mask,
            name,
            field_type,
            storage_type: None,
        }
    }

    pub fn id(&self) -> FieldId {
        FieldId::new(self.offset, self.size, self.bit_mask)
    }

    /// Type used to decode and encode payload bytes.
    pub fn storage_type(&self) -> &Arc<Type> {
        self.storage_type.as_ref().unwrap_or(&self.field_type)
    }

    /// Copy of this field exposed under another name or type.
    ///
    /// Values keep being decoded with the original type and are converted
    /// to the new type's unit.
    pub fn retyped(&self, name: Option<&LocalizedText>, field_type: Option<&Arc<Type>>) -> Self {
        let mut field = self.clone();
        if let Some(name) = name {
            field.name = name.clone();
        }
        if let Some(field_type) = field_type {
            field.storage_type = Some(Arc::clone(self.storage_type()));
            field.field_type = Arc::clone(field_type);
        }
        field
    }
}

/// A packet as seen on one channel.
#[derive(Debug, Clone)]
pub struct PacketSpec {
    pub packet_id: String,
    pub channel: u8,
    pub destination_address: u16,
    pub source_address: u16,
    pub protocol_version: u8,
    pub command: u16,
    pub destination_device: Arc<DeviceSpec>,
    pub source_device: Arc<DeviceSpec>,
    /// Same as the source device's full name
    pub full_name: String,
    /// Insertion ordered, shared with the knowledge base
    pub packet_fields: Arc<[PacketFieldSpec]>,
}

impl PacketSpec {
    pub fn id(&self) -> PacketId {
        PacketId::new(
            self.channel,
            self.destination_address,
            self.source_address,
            Some(self.protocol_version),
            self.command,
        )
    }

    /// Fully qualified ID of one of this packet's fields.
    pub fn packet_field_id(&self, field: &PacketFieldSpec) -> String {
        format!("{}_{}", self.packet_id, field.field_id)
    }

    pub fn field(&self, field_id: &str) -> Option<&PacketFieldSpec> {
        let wanted = FieldId::parse(field_id)?;
        self.packet_fields.iter().find(|field| field.id() == wanted)
    }
}
