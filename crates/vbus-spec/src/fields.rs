//! Field aggregator.
//!
//! Flattens received packets into a list of named, typed and valued fields,
//! either following the active overlay or, without one, exposing every field
//! of every packet the headers carry.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::trace;

use crate::error::Result;
use crate::format::TextRenderer;
use crate::header::Header;
use crate::model::{PacketFieldSpec, PacketSpec, Type};
use crate::overlay::FilteredPacketFieldSpec;
use crate::specification::Specification;

/// Value slot of an aggregated field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    /// No header carried the field's packet
    Unset,
    /// A header matched but the field lies outside its data
    Absent,
    Value(f64),
}

impl RawValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Value(value) => Some(*value),
            Self::Unset | Self::Absent => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

/// One aggregated field.
#[derive(Debug, Clone)]
pub struct PacketField {
    /// The overlay entry's filtered ID
    pub id: String,
    /// Header the value was taken from, shared by the fields it carries
    pub header: Option<Arc<Header>>,
    pub packet_spec: Option<Arc<PacketSpec>>,
    pub field_spec: Arc<FilteredPacketFieldSpec>,
    pub original_field_spec: Option<PacketFieldSpec>,
    pub name: String,
    pub raw_value: RawValue,
    renderer: TextRenderer,
}

impl PacketField {
    /// Type used for display.
    pub fn field_type(&self) -> Option<&Arc<Type>> {
        self.field_spec.effective_type()
    }

    /// Render the value in the session's locale. Empty without a value.
    pub fn format_text_value(&self) -> String {
        self.renderer.render()
    }
}

impl Specification {
    /// Overlay entries to aggregate for `headers`.
    ///
    /// The active overlay is returned as is. Without one, every field of
    /// every distinct packet carried by `headers` is listed, in header order.
    pub fn filtered_packet_field_specs_for_headers(&self, headers: &[Header]) -> Vec<Arc<FilteredPacketFieldSpec>> {
        if let Some(overlay) = self.filtered_packet_field_specs() {
            return overlay.to_vec();
        }

        let knowledge = self.knowledge().as_ref();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for header in headers {
            let packet_spec = self.packet_spec_for_header(header);
            if !seen.insert(packet_spec.packet_id.clone()) {
                continue;
            }
            entries.extend(packet_spec.packet_fields.iter().map(|field| {
                Arc::new(FilteredPacketFieldSpec::from_packet_field(&packet_spec, field, knowledge))
            }));
        }
        entries
    }

    /// Aggregate the fields carried by `headers`.
    ///
    /// Fails only when an overlay retypes a field to a unit its own unit
    /// cannot be converted to.
    pub fn packet_fields_for_headers(&self, headers: &[Header]) -> Result<Vec<PacketField>> {
        let shared: Vec<Arc<Header>> = headers.iter().cloned().map(Arc::new).collect();
        self.filtered_packet_field_specs_for_headers(headers)
            .into_iter()
            .map(|entry| self.packet_field(entry, &shared))
            .collect()
    }

    fn packet_field(&self, entry: Arc<FilteredPacketFieldSpec>, headers: &[Arc<Header>]) -> Result<PacketField> {
        let header = entry
            .packet_spec
            .as_ref()
            .and_then(|packet_spec| headers.iter().find(|header| header.matches(packet_spec)));

        let raw_value = match header {
            Some(header) => match self.get_filtered_raw_value(&entry, header.payload())? {
                Some(value) => RawValue::Value(value),
                None => RawValue::Absent,
            },
            None => RawValue::Unset,
        };
        trace!("Field {}: {:?}", entry.filtered_packet_field_id, raw_value);

        let name = match (&entry.name, &entry.packet_field_spec) {
            (Some(name), _) => name.resolve(self.language()).to_string(),
            (None, Some(field)) => field.name.resolve(self.language()).to_string(),
            (None, None) => entry.filtered_packet_field_id.clone(),
        };

        let renderer = self.text_renderer(raw_value.value(), entry.effective_type().cloned());

        Ok(PacketField {
            id: entry.filtered_packet_field_id.clone(),
            header: header.map(Arc::clone),
            packet_spec: entry.packet_spec.clone(),
            original_field_spec: entry.packet_field_spec.clone(),
            field_spec: entry,
            name,
            raw_value,
            renderer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecificationOptions;
    use crate::overlay::{RawFilteredPacketFieldSpec, RawSpecificationData};

    fn header(channel: u8, data: &str) -> Header {
        Header::new(channel, 0x0010, 0x7722, 0x0100).with_frames(1, hex::decode(data).unwrap())
    }

    #[test]
    fn test_unfiltered_aggregation() {
        let spec = Specification::default();
        let fields = spec
            .packet_fields_for_headers(&[header(1, "b8220000"), header(2, "000048dd")])
            .unwrap();

        assert_eq!(fields.len(), 8);
        assert_eq!(fields[0].id, "01_0010_7722_10_0100_000_2_0");
        assert_eq!(fields[0].name, "Flow temperature");
        assert_eq!(fields[0].format_text_value(), "888.8 °C");
        assert_eq!(fields[5].id, "02_0010_7722_10_0100_002_2_0");
        assert_eq!(fields[5].format_text_value(), "-888.8 °C");

        // one frame only: offsets 4 and 6 lie outside the data
        assert_eq!(fields[2].raw_value, RawValue::Absent);
        assert_eq!(fields[2].format_text_value(), "");
    }

    #[test]
    fn test_fields_share_their_header() {
        let spec = Specification::default();
        let fields = spec.packet_fields_for_headers(&[header(1, "b8220000")]).unwrap();
        assert_eq!(fields.len(), 4);

        let first = fields[0].header.as_ref().unwrap();
        for field in &fields[1..] {
            assert!(Arc::ptr_eq(first, field.header.as_ref().unwrap()));
        }
        assert_eq!(first.frame_data, hex::decode("b8220000").unwrap());
    }

    #[test]
    fn test_duplicate_headers_are_listed_once() {
        let spec = Specification::default();
        let entries = spec.filtered_packet_field_specs_for_headers(&[header(1, "b8220000"), header(1, "00000000")]);
        assert_eq!(entries.len(), 4);

        let fields = spec.packet_fields_for_headers(&[header(1, "b8220000"), header(1, "00000000")]).unwrap();
        assert_eq!(fields[0].raw_value.value().map(|v| (v * 10.0).round()), Some(8888.0));
    }

    #[test]
    fn test_unset_without_header() {
        let data = RawSpecificationData::new(vec![RawFilteredPacketFieldSpec::new(
            "Orphan",
            "05_0010_7722_10_0100",
            "000_2_0",
        )]);
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(data));
        let fields = spec.packet_fields_for_headers(&[header(1, "b8220000")]).unwrap();
        assert_eq!(fields.len(), 1);
        assert!(fields[0].raw_value.is_unset());
        assert!(fields[0].header.is_none());
        assert_eq!(fields[0].name, "Flow temperature");
        assert_eq!(fields[0].format_text_value(), "");
    }

    #[test]
    fn test_unresolved_entry_uses_filtered_id() {
        let data = RawSpecificationData::new(vec![RawFilteredPacketFieldSpec::new("Broken", "xx", "yy")]);
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(data));
        let fields = spec.packet_fields_for_headers(&[]).unwrap();
        assert_eq!(fields[0].name, "Broken");
        assert!(fields[0].packet_spec.is_none());
        assert!(fields[0].field_type().is_none());
    }

    #[test]
    fn test_incompatible_override_fails() {
        let data = RawSpecificationData::new(vec![RawFilteredPacketFieldSpec::new(
            "Wrong",
            "01_0010_7722_10_0100",
            "000_2_0",
        )
        .with_type("Number_1_Liters")]);
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(data));
        assert!(spec.packet_fields_for_headers(&[header(1, "b8220000")]).is_err());
        assert!(spec.packet_fields_for_headers(&[]).is_ok());
    }

    #[test]
    fn test_localized_names() {
        let spec = Specification::new(SpecificationOptions::new().with_language("de"));
        let fields = spec.packet_fields_for_headers(&[header(0, "b8220000")]).unwrap();
        assert_eq!(fields[0].name, "Temperatur Vorlauf");
        assert_eq!(fields[0].format_text_value(), "888,8 °C");
    }
}
