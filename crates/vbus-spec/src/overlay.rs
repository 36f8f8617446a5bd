//! Overlay store.
//!
//! An overlay is a caller-supplied projection over the knowledge base: it
//! restricts the exposed fields to a list, and may rename or retype each of
//! them or route extraction through a registered extractor. The serializable
//! form only holds IDs and keys; [`load`] resolves them, [`store`] turns the
//! resolved form back into the exact serializable form it came from.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::Result;
use crate::ids::{extractor_key, FieldId};
use crate::knowledge::{KnowledgeBase, RawValueGetter, RawValueSetter};
use crate::model::{LocalizedText, PacketFieldSpec, PacketSpec, Type};

/// Serializable overlay document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSpecificationData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filtered_packet_field_specs: Option<Vec<RawFilteredPacketFieldSpec>>,
}

impl RawSpecificationData {
    pub fn new(entries: Vec<RawFilteredPacketFieldSpec>) -> Self {
        Self {
            filtered_packet_field_specs: Some(entries),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.filtered_packet_field_specs
            .as_ref()
            .is_none_or(|entries| entries.is_empty())
    }
}

/// Serializable overlay entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFilteredPacketFieldSpec {
    pub filtered_packet_field_id: String,
    pub packet_id: String,
    pub field_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<LocalizedText>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_raw_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_raw_value: Option<String>,
}

impl RawFilteredPacketFieldSpec {
    pub fn new(
        filtered_packet_field_id: impl Into<String>,
        packet_id: impl Into<String>,
        field_id: impl Into<String>,
    ) -> Self {
        Self {
            filtered_packet_field_id: filtered_packet_field_id.into(),
            packet_id: packet_id.into(),
            field_id: field_id.into(),
            name: None,
            type_id: None,
            get_raw_value: None,
            set_raw_value: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<LocalizedText>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_type(mut self, type_id: impl Into<String>) -> Self {
        self.type_id = Some(type_id.into());
        self
    }

    pub fn with_get_raw_value(mut self, key: impl Into<String>) -> Self {
        self.get_raw_value = Some(key.into());
        self
    }

    pub fn with_set_raw_value(mut self, key: impl Into<String>) -> Self {
        self.set_raw_value = Some(key.into());
        self
    }
}

/// A registry key together with the function it resolved to, if any.
#[derive(Clone)]
pub struct KeyedFunction<F> {
    pub key: String,
    pub function: Option<F>,
}

impl<F> KeyedFunction<F> {
    pub fn is_resolved(&self) -> bool {
        self.function.is_some()
    }
}

impl<F> fmt::Debug for KeyedFunction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedFunction")
            .field("key", &self.key)
            .field("resolved", &self.function.is_some())
            .finish()
    }
}

pub type ExtractorHandle = KeyedFunction<RawValueGetter>;
pub type InjectorHandle = KeyedFunction<RawValueSetter>;

/// Resolved overlay entry.
///
/// The original strings are kept next to what they resolved to, so that the
/// entry can be stored again unchanged even when resolution failed.
#[derive(Debug, Clone)]
pub struct FilteredPacketFieldSpec {
    pub filtered_packet_field_id: String,
    pub packet_id: String,
    pub field_id: String,
    pub name: Option<LocalizedText>,
    pub type_id: Option<String>,
    /// Override type, `None` if absent or unknown
    pub field_type: Option<Arc<Type>>,
    pub packet_spec: Option<Arc<PacketSpec>>,
    pub packet_field_spec: Option<PacketFieldSpec>,
    pub get_raw_value: Option<ExtractorHandle>,
    pub set_raw_value: Option<InjectorHandle>,
}

impl FilteredPacketFieldSpec {
    /// Entry exposing one knowledge-base field unchanged.
    ///
    /// The field's own name, type and registered extractor are filled in, so
    /// the entry reads like an overlay entry that names them explicitly.
    pub fn from_packet_field(
        packet_spec: &Arc<PacketSpec>,
        field: &PacketFieldSpec,
        knowledge: &dyn KnowledgeBase,
    ) -> Self {
        let key = extractor_key(
            packet_spec.destination_address,
            packet_spec.source_address,
            packet_spec.command,
            &field.id(),
        );
        Self {
            filtered_packet_field_id: packet_spec.packet_field_id(field),
            packet_id: packet_spec.packet_id.clone(),
            field_id: field.field_id.clone(),
            name: Some(field.name.clone()),
            type_id: Some(field.field_type.type_id.clone()),
            field_type: Some(Arc::clone(&field.field_type)),
            packet_spec: Some(Arc::clone(packet_spec)),
            packet_field_spec: Some(field.clone()),
            get_raw_value: Some(ExtractorHandle {
                function: knowledge.raw_value_getter(&key),
                key,
            }),
            set_raw_value: None,
        }
    }

    /// Type used for decoding and display: the override, else the field's own.
    pub fn effective_type(&self) -> Option<&Arc<Type>> {
        self.field_type
            .as_ref()
            .or_else(|| self.packet_field_spec.as_ref().map(|field| &field.field_type))
    }

    pub fn to_raw(&self) -> RawFilteredPacketFieldSpec {
        RawFilteredPacketFieldSpec {
            filtered_packet_field_id: self.filtered_packet_field_id.clone(),
            packet_id: self.packet_id.clone(),
            field_id: self.field_id.clone(),
            name: self.name.clone(),
            type_id: self.type_id.clone(),
            get_raw_value: self.get_raw_value.as_ref().map(|handle| handle.key.clone()),
            set_raw_value: self.set_raw_value.as_ref().map(|handle| handle.key.clone()),
        }
    }
}

/// Resolve an overlay document against `catalog`.
///
/// Returns `None` when the document carries no overlay list. Entries that
/// fail to resolve are kept with their references left empty.
pub fn load(raw: &RawSpecificationData, catalog: &Catalog) -> Option<Vec<Arc<FilteredPacketFieldSpec>>> {
    let entries = raw.filtered_packet_field_specs.as_ref()?;
    let resolved: Vec<Arc<FilteredPacketFieldSpec>> = entries
        .iter()
        .map(|entry| Arc::new(resolve_entry(entry, catalog)))
        .collect();

    debug!(
        "Loaded overlay with {} entries ({} resolved)",
        resolved.len(),
        resolved
            .iter()
            .filter(|entry| entry.packet_field_spec.is_some())
            .count()
    );
    Some(resolved)
}

/// Inverse of [`load`].
pub fn store(entries: Option<&[Arc<FilteredPacketFieldSpec>]>) -> RawSpecificationData {
    RawSpecificationData {
        filtered_packet_field_specs: entries
            .map(|entries| entries.iter().map(|entry| entry.to_raw()).collect()),
    }
}

fn resolve_entry(entry: &RawFilteredPacketFieldSpec, catalog: &Catalog) -> FilteredPacketFieldSpec {
    let knowledge = catalog.knowledge();

    let packet_spec = catalog.packet_spec_by_id(&entry.packet_id);
    if packet_spec.is_none() {
        warn!(
            "Overlay entry '{}' has malformed packet ID '{}'",
            entry.filtered_packet_field_id, entry.packet_id
        );
    }

    if FieldId::parse(&entry.field_id).is_none() {
        warn!(
            "Overlay entry '{}' has malformed field ID '{}'",
            entry.filtered_packet_field_id, entry.field_id
        );
    }
    let packet_field_spec = packet_spec
        .as_ref()
        .and_then(|packet| packet.field(&entry.field_id))
        .cloned();
    if packet_spec.is_some() && packet_field_spec.is_none() {
        debug!(
            "Overlay entry '{}' references unknown field {}_{}",
            entry.filtered_packet_field_id, entry.packet_id, entry.field_id
        );
    }

    let field_type = entry.type_id.as_deref().and_then(|type_id| {
        let resolved = knowledge.type_by_id(type_id);
        if resolved.is_none() {
            warn!(
                "Overlay entry '{}' has unknown type '{}'",
                entry.filtered_packet_field_id, type_id
            );
        }
        resolved
    });

    let get_raw_value = entry.get_raw_value.as_ref().map(|key| ExtractorHandle {
        key: key.clone(),
        function: knowledge.raw_value_getter(key),
    });
    let set_raw_value = entry.set_raw_value.as_ref().map(|key| InjectorHandle {
        key: key.clone(),
        function: knowledge.raw_value_setter(key),
    });

    FilteredPacketFieldSpec {
        filtered_packet_field_id: entry.filtered_packet_field_id.clone(),
        packet_id: entry.packet_id.clone(),
        field_id: entry.field_id.clone(),
        name: entry.name.clone(),
        type_id: entry.type_id.clone(),
        field_type,
        packet_spec,
        packet_field_spec,
        get_raw_value,
        set_raw_value,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::knowledge::BuiltinKnowledgeBase;

    fn catalog() -> Catalog {
        Catalog::new(BuiltinKnowledgeBase::shared())
    }

    fn demo() -> serde_json::Value {
        json!({
            "filteredPacketFieldSpecs": [{
                "filteredPacketFieldId": "DemoValue1",
                "packetId": "00_0010_7722_10_0100",
                "fieldId": "000_2_0",
                "name": {"ref": "Flow temperature", "en": "Flow temperature", "de": "Temperatur Vorlauf", "fr": "Température Départ"},
                "type": "Number_0_1_DegreesCelsius",
                "getRawValue": "_0010_7722_0100_000_2_0"
            }, {
                "filteredPacketFieldId": "DemoValue2",
                "packetId": "00_0010_7722_0100",
                "fieldId": "002_2_0",
                "name": "Return",
                "setRawValue": "_0010_7722_0100_002_2_0"
            }]
        })
    }

    #[test]
    fn test_load_resolves_references() {
        let raw: RawSpecificationData = serde_json::from_value(demo()).unwrap();
        let entries = load(&raw, &catalog()).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.packet_spec.as_ref().unwrap().packet_id, "00_0010_7722_10_0100");
        assert_eq!(first.packet_field_spec.as_ref().unwrap().field_id, "000_2_0");
        assert_eq!(first.field_type.as_ref().unwrap().type_id, "Number_0_1_DegreesCelsius");
        assert!(first.get_raw_value.as_ref().unwrap().is_resolved());

        let second = &entries[1];
        assert!(second.field_type.is_none());
        assert_eq!(
            second.effective_type().unwrap().type_id,
            "Number_0_1_DegreesCelsius"
        );
        assert!(second.set_raw_value.as_ref().unwrap().is_resolved());
    }

    #[test]
    fn test_store_round_trip() {
        let raw: RawSpecificationData = serde_json::from_value(demo()).unwrap();
        let catalog = catalog();
        let entries = load(&raw, &catalog).unwrap();
        let stored = store(Some(entries.as_slice()));
        assert_eq!(stored, raw);
        assert_eq!(serde_json::to_value(&stored).unwrap(), demo());
    }

    #[test]
    fn test_malformed_entry_is_kept_unresolved() {
        let raw = RawSpecificationData::new(vec![
            RawFilteredPacketFieldSpec::new("Bad", "garbage", "000_2_0")
                .with_type("Number_0_1_Unknown")
                .with_get_raw_value("no-such-key"),
            RawFilteredPacketFieldSpec::new("Good", "00_0010_7721_0100", "000_2_0"),
            RawFilteredPacketFieldSpec::new("Missing", "00_0010_7721_0100", "099_2_0"),
        ]);
        let catalog = catalog();
        let entries = load(&raw, &catalog).unwrap();
        assert_eq!(entries.len(), 3);

        assert!(entries[0].packet_spec.is_none());
        assert!(entries[0].packet_field_spec.is_none());
        assert!(entries[0].field_type.is_none());
        assert!(!entries[0].get_raw_value.as_ref().unwrap().is_resolved());

        assert!(entries[1].packet_field_spec.is_some());
        assert!(entries[2].packet_spec.is_some());
        assert!(entries[2].packet_field_spec.is_none());

        assert_eq!(store(Some(entries.as_slice())), raw);
    }

    #[test]
    fn test_from_packet_field() {
        let catalog = catalog();
        let packet = catalog.packet_spec(1, 0x0010, 0x7722, 0x0100, None);
        let entry =
            FilteredPacketFieldSpec::from_packet_field(&packet, &packet.packet_fields[0], catalog.knowledge().as_ref());
        assert_eq!(entry.filtered_packet_field_id, "01_0010_7722_10_0100_000_2_0");
        assert_eq!(entry.packet_id, "01_0010_7722_10_0100");
        assert_eq!(entry.name.as_ref().unwrap().resolve("en"), "Flow temperature");
        assert_eq!(entry.type_id.as_deref(), Some("Number_0_1_DegreesCelsius"));
        let handle = entry.get_raw_value.as_ref().unwrap();
        assert_eq!(handle.key, "_0010_7722_0100_000_2_0");
        assert!(handle.is_resolved());
    }

    #[test]
    fn test_no_overlay() {
        let raw = RawSpecificationData::default();
        assert!(load(&raw, &catalog()).is_none());
        assert_eq!(store(None), raw);
        assert_eq!(raw.to_json().unwrap(), "{}");
        assert!(raw.is_empty());
    }

    #[test]
    fn test_from_json_str() {
        let raw = RawSpecificationData::from_json_str(&demo().to_string()).unwrap();
        assert_eq!(raw.filtered_packet_field_specs.as_ref().unwrap().len(), 2);
        assert!(RawSpecificationData::from_json_str("[").is_err());
    }
}
