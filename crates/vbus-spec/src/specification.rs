//! The specification session.
//!
//! A [`Specification`] binds a knowledge base to a language and an optional
//! overlay. It is immutable after construction and can be shared between
//! threads; to change the overlay, build a new one.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::Catalog;
use crate::codec;
use crate::config::SpecificationOptions;
use crate::error::{Result, SpecError};
use crate::format::{format_raw_value, Locale, TextRenderer};
use crate::header::Header;
use crate::ids::PacketFieldId;
use crate::knowledge::{BuiltinKnowledgeBase, KnowledgeBase};
use crate::model::{DeviceSpec, PacketFieldSpec, PacketSpec, RootKind, Type};
use crate::overlay::{self, FilteredPacketFieldSpec, RawSpecificationData};
use crate::units::{self, ConvertedValue, Unit};

/// Which end of a header a device lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

/// Specification engine session.
#[derive(Debug)]
pub struct Specification {
    language: String,
    locale: &'static Locale,
    catalog: Catalog,
    overlay: Option<Vec<Arc<FilteredPacketFieldSpec>>>,
}

impl Specification {
    /// Session over the built-in knowledge base.
    pub fn new(options: SpecificationOptions) -> Self {
        Self::with_knowledge_base(options, BuiltinKnowledgeBase::shared())
    }

    pub fn with_knowledge_base(options: SpecificationOptions, knowledge: Arc<dyn KnowledgeBase>) -> Self {
        let catalog = Catalog::new(knowledge);
        let overlay = options
            .specification_data
            .as_ref()
            .and_then(|data| overlay::load(data, &catalog));

        debug!(
            "Created specification (language: {}, overlay entries: {})",
            options.language,
            overlay.as_ref().map_or(0, Vec::len)
        );

        Self {
            locale: Locale::for_language(&options.language),
            language: options.language,
            catalog,
            overlay,
        }
    }

    /// Session configured from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(SpecificationOptions::from_env()?))
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn locale(&self) -> &'static Locale {
        self.locale
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn knowledge(&self) -> &Arc<dyn KnowledgeBase> {
        self.catalog.knowledge()
    }

    // Knowledge-base lookups

    pub fn unit(&self, unit_code: &str) -> Option<Arc<Unit>> {
        self.knowledge().unit(unit_code)
    }

    pub fn units(&self) -> Vec<Arc<Unit>> {
        self.knowledge().units()
    }

    pub fn type_by_id(&self, type_id: &str) -> Option<Arc<Type>> {
        self.knowledge().type_by_id(type_id)
    }

    pub fn device_spec(&self, channel: u8, self_address: u16, peer_address: u16) -> Arc<DeviceSpec> {
        self.catalog.device_spec(channel, self_address, peer_address)
    }

    pub fn device_spec_for_header(&self, header: &Header, side: Side) -> Arc<DeviceSpec> {
        match side {
            Side::Source => self.device_spec(header.channel, header.source_address, header.destination_address),
            Side::Destination => {
                self.device_spec(header.channel, header.destination_address, header.source_address)
            }
        }
    }

    /// Packet spec of any protocol version.
    pub fn packet_spec(
        &self,
        channel: u8,
        destination_address: u16,
        source_address: u16,
        command: u16,
    ) -> Arc<PacketSpec> {
        self.catalog
            .packet_spec(channel, destination_address, source_address, command, None)
    }

    pub fn packet_spec_for_header(&self, header: &Header) -> Arc<PacketSpec> {
        self.catalog.packet_spec(
            header.channel,
            header.destination_address,
            header.source_address,
            header.command,
            Some(header.protocol_version),
        )
    }

    pub fn packet_spec_by_id(&self, packet_id: &str) -> Option<Arc<PacketSpec>> {
        self.catalog.packet_spec_by_id(packet_id)
    }

    pub fn packet_field_spec<'a>(&self, packet_spec: &'a PacketSpec, field_id: &str) -> Option<&'a PacketFieldSpec> {
        packet_spec.field(field_id)
    }

    /// Field by fully qualified ID, or by an overlay's filtered ID.
    ///
    /// A field found through the overlay carries the overlay's name and type.
    pub fn packet_field_spec_by_id(&self, id: &str) -> Option<PacketFieldSpec> {
        if let Some(filtered) = self.filtered_packet_field_spec(id) {
            return filtered
                .packet_field_spec
                .as_ref()
                .map(|field| field.retyped(filtered.name.as_ref(), filtered.field_type.as_ref()));
        }
        let id = PacketFieldId::parse(id)?;
        let packet_spec = self.catalog.packet_spec_for_id(&id.packet_id);
        packet_spec
            .packet_fields
            .iter()
            .find(|field| field.id() == id.field_id)
            .cloned()
    }

    // Overlay

    /// The active overlay, `None` when operating over the whole knowledge base.
    pub fn filtered_packet_field_specs(&self) -> Option<&[Arc<FilteredPacketFieldSpec>]> {
        self.overlay.as_deref()
    }

    pub fn filtered_packet_field_spec(&self, filtered_packet_field_id: &str) -> Option<&Arc<FilteredPacketFieldSpec>> {
        self.overlay
            .as_ref()?
            .iter()
            .find(|entry| entry.filtered_packet_field_id == filtered_packet_field_id)
    }

    /// Serializable form of the active overlay.
    pub fn store_specification_data(&self) -> RawSpecificationData {
        overlay::store(self.filtered_packet_field_specs())
    }

    // Values

    /// Decode a field from a payload. `None` for a missing field or data.
    ///
    /// A retyped field is converted to its type's unit, and yields `None`
    /// when that unit is incompatible with the encoded one.
    pub fn get_raw_value(&self, field: Option<&PacketFieldSpec>, buffer: &[u8]) -> Option<f64> {
        self.get_raw_value_in(field, buffer, 0, buffer.len())
    }

    pub fn get_raw_value_in(
        &self,
        field: Option<&PacketFieldSpec>,
        buffer: &[u8],
        start: usize,
        end: usize,
    ) -> Option<f64> {
        let field = field?;
        let raw_value = codec::read_raw_value(field, buffer, start, end)?;
        match &field.storage_type {
            Some(storage) => units::convert(raw_value, &storage.unit, &field.field_type.unit)
                .ok()
                .map(|converted| converted.raw_value),
            None => Some(raw_value),
        }
    }

    /// Decode an overlay entry, converted to its override unit.
    ///
    /// Uses the entry's registered extractor when it has one.
    pub fn get_filtered_raw_value(&self, entry: &FilteredPacketFieldSpec, payload: &[u8]) -> Result<Option<f64>> {
        let extractor = entry
            .get_raw_value
            .as_ref()
            .and_then(|handle| handle.function.as_ref());
        let raw_value = match extractor {
            Some(extract) => extract(payload),
            None => self.get_raw_value(entry.packet_field_spec.as_ref(), payload),
        };

        match (raw_value, &entry.packet_field_spec, &entry.field_type) {
            (Some(raw_value), Some(original), Some(field_type)) => {
                let converted = units::convert(raw_value, &original.field_type.unit, &field_type.unit)?;
                Ok(Some(converted.raw_value))
            }
            (raw_value, _, _) => Ok(raw_value),
        }
    }

    /// Encode a raw value, given in the field's unit, into `buffer`.
    pub fn set_raw_value(&self, field: &PacketFieldSpec, raw_value: f64, buffer: &mut [u8]) -> Result<()> {
        let raw_value = match &field.storage_type {
            Some(storage) => units::convert(raw_value, &field.field_type.unit, &storage.unit)?.raw_value,
            None => raw_value,
        };
        codec::write_raw_value(field, raw_value, buffer);
        Ok(())
    }

    /// Encode an overlay entry's value, given in its override unit.
    ///
    /// Does nothing when the entry does not resolve to a field.
    pub fn set_filtered_raw_value(
        &self,
        entry: &FilteredPacketFieldSpec,
        raw_value: f64,
        buffer: &mut [u8],
    ) -> Result<()> {
        let Some(original) = &entry.packet_field_spec else {
            return Ok(());
        };
        let raw_value = match &entry.field_type {
            Some(field_type) => units::convert(raw_value, &field_type.unit, &original.field_type.unit)?.raw_value,
            None => raw_value,
        };

        let injector = entry
            .set_raw_value
            .as_ref()
            .and_then(|handle| handle.function.as_ref());
        match injector {
            Some(inject) => inject(buffer, raw_value),
            None => codec::write_raw_value(original, raw_value, buffer),
        }
        Ok(())
    }

    /// Convert between two units given by code.
    pub fn convert_raw_value(&self, raw_value: f64, source_unit: &str, target_unit: &str) -> Result<ConvertedValue> {
        let source = self
            .unit(source_unit)
            .ok_or_else(|| SpecError::UnknownUnit(source_unit.to_string()))?;
        let target = self
            .unit(target_unit)
            .ok_or_else(|| SpecError::UnknownUnit(target_unit.to_string()))?;
        units::convert(raw_value, &source, &target)
    }

    // Formatting

    /// Render a raw value.
    ///
    /// With a field, its type decides root kind and precision; without one,
    /// the value is a number in its shortest form. `unit_code` replaces the
    /// field's unit.
    pub fn format_text_value(
        &self,
        field: Option<&PacketFieldSpec>,
        raw_value: Option<f64>,
        unit_code: Option<&str>,
    ) -> String {
        let unit_override = unit_code.and_then(|code| {
            let unit = self.unit(code);
            if unit.is_none() {
                debug!("Formatting with unknown unit '{}'", code);
            }
            unit
        });

        match field {
            Some(field) => {
                let field_type = &field.field_type;
                let unit = unit_override.unwrap_or_else(|| Arc::clone(&field_type.unit));
                format_raw_value(
                    raw_value,
                    Some(unit.as_ref()),
                    field_type.root_kind,
                    Some(field_type.precision),
                    self.locale,
                )
            }
            None => format_raw_value(raw_value, unit_override.as_deref(), RootKind::Number, None, self.locale),
        }
    }

    pub fn format_text_value_internal(
        &self,
        raw_value: Option<f64>,
        unit: Option<&Unit>,
        root_kind: RootKind,
        precision: Option<u32>,
    ) -> String {
        format_raw_value(raw_value, unit, root_kind, precision, self.locale)
    }

    /// Deferred renderer bound to this session's locale.
    pub fn text_renderer(&self, raw_value: Option<f64>, field_type: Option<Arc<Type>>) -> TextRenderer {
        TextRenderer::new(raw_value, field_type, self.locale)
    }
}

impl Default for Specification {
    fn default() -> Self {
        Self::new(SpecificationOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::RawFilteredPacketFieldSpec;

    fn demo_overlay() -> RawSpecificationData {
        RawSpecificationData::new(vec![
            RawFilteredPacketFieldSpec::new("DemoValue1", "00_0010_7722_10_0100", "000_2_0")
                .with_name("T-flow")
                .with_type("Number_0_1_DegreesFahrenheit"),
            RawFilteredPacketFieldSpec::new("DemoValue2", "00_0010_7722_10_0100", "002_2_0")
                .with_get_raw_value("_0010_7722_0100_002_2_0")
                .with_set_raw_value("_0010_7722_0100_002_2_0"),
        ])
    }

    #[test]
    fn test_lookups() {
        let spec = Specification::default();
        assert!(spec.unit("None").is_some());
        assert!(spec.type_by_id("Number_1_None").is_some());
        assert!(spec.type_by_id("Unknown").is_none());
        assert_eq!(spec.language(), "en");
    }

    #[test]
    fn test_device_spec_for_header() {
        let spec = Specification::default();
        let header = Header::new(1, 0x0010, 0x7721, 0x0100);
        assert_eq!(
            spec.device_spec_for_header(&header, Side::Source).full_name,
            "VBus #1: DeltaSol E [Regler]"
        );
        assert_eq!(spec.device_spec_for_header(&header, Side::Destination).name, "DFA");
    }

    #[test]
    fn test_packet_field_spec_by_id() {
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(demo_overlay()));
        let field = spec.packet_field_spec_by_id("01_0010_7721_10_0100_000_2_0").unwrap();
        assert_eq!(field.field_type.type_id, "Number_0_1_DegreesCelsius");
        assert!(spec.packet_field_spec_by_id("01_0010_7721_0100_000_2_0").is_some());
        assert_eq!(spec.packet_field_spec_by_id("DemoValue2").unwrap().field_id, "002_2_0");
        assert!(spec.packet_field_spec_by_id("DemoValue9").is_none());
        assert!(spec.packet_field_spec_by_id("01_0010_7721_0100_099_2_0").is_none());
    }

    #[test]
    fn test_filtered_id_lookup_applies_overlay() {
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(demo_overlay()));
        let field = spec.packet_field_spec_by_id("DemoValue1").unwrap();
        assert_eq!(field.field_type.type_id, "Number_0_1_DegreesFahrenheit");
        assert_eq!(field.storage_type().type_id, "Number_0_1_DegreesCelsius");
        assert_eq!(field.name.resolve("en"), "T-flow");

        let value = spec.get_raw_value(Some(&field), &[0x00, 0x00]).unwrap();
        assert!((value - 32.0).abs() < 0.05);
        assert_eq!(spec.format_text_value(Some(&field), Some(value), None), "32.0 °F");

        let mut buffer = [0u8; 2];
        spec.set_raw_value(&field, 212.0, &mut buffer).unwrap();
        assert_eq!(i16::from_le_bytes(buffer), 1000);

        let plain = spec.packet_field_spec_by_id("DemoValue2").unwrap();
        assert!(plain.storage_type.is_none());
        assert_eq!(plain.name.resolve("en"), "Return temperature");
    }

    #[test]
    fn test_retyped_field_with_incompatible_unit() {
        let data = RawSpecificationData::new(vec![RawFilteredPacketFieldSpec::new(
            "Wrong",
            "00_0010_7722_10_0100",
            "000_2_0",
        )
        .with_type("Number_1_Liters")]);
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(data));
        let field = spec.packet_field_spec_by_id("Wrong").unwrap();
        assert_eq!(spec.get_raw_value(Some(&field), &[0xb8, 0x22]), None);

        let mut buffer = [0u8; 2];
        assert!(matches!(
            spec.set_raw_value(&field, 1.0, &mut buffer),
            Err(SpecError::IncompatibleUnits { .. })
        ));
        assert_eq!(buffer, [0, 0]);
    }

    #[test]
    fn test_filtered_raw_value_converts() {
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(demo_overlay()));
        let entry = spec.filtered_packet_field_spec("DemoValue1").unwrap();
        let value = spec.get_filtered_raw_value(entry, &[0x00, 0x00]).unwrap();
        assert_eq!(value, Some(32.0));
        assert_eq!(spec.get_filtered_raw_value(entry, &[]).unwrap(), None);
    }

    #[test]
    fn test_set_filtered_raw_value() {
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(demo_overlay()));

        let mut buffer = [0u8; 4];
        let entry = spec.filtered_packet_field_spec("DemoValue1").unwrap();
        spec.set_filtered_raw_value(entry, 212.0, &mut buffer).unwrap();
        assert_eq!(i16::from_le_bytes([buffer[0], buffer[1]]), 1000);

        let entry = spec.filtered_packet_field_spec("DemoValue2").unwrap();
        spec.set_filtered_raw_value(entry, -888.8, &mut buffer).unwrap();
        assert_eq!(&buffer[2..], &[0x48, 0xdd]);
    }

    #[test]
    fn test_convert_raw_value() {
        let spec = Specification::default();
        let result = spec.convert_raw_value(100.0, "DegreesCelsius", "DegreesFahrenheit").unwrap();
        assert_eq!(result.raw_value, 212.0);
        assert_eq!(result.unit.unit_code, "DegreesFahrenheit");

        assert!(matches!(
            spec.convert_raw_value(1.0, "Bars", "Liters"),
            Err(SpecError::IncompatibleUnits { .. })
        ));
        assert!(matches!(
            spec.convert_raw_value(1.0, "Parsecs", "Liters"),
            Err(SpecError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_format_text_value() {
        let spec = Specification::default();
        assert_eq!(spec.format_text_value(None, Some(888.8), Some("DegreesCelsius")), "888.8 °C");
        assert_eq!(spec.format_text_value(None, Some(888.8), Some("None")), "888.8");
        assert_eq!(spec.format_text_value(None, None, Some("DegreesCelsius")), "");

        let field = spec.packet_field_spec_by_id("00_0010_7722_0100_000_2_0").unwrap();
        assert_eq!(spec.format_text_value(Some(&field), Some(20.0), None), "20.0 °C");
        assert_eq!(
            spec.format_text_value(Some(&field), Some(68.0), Some("DegreesFahrenheit")),
            "68.0 °F"
        );
    }

    #[test]
    fn test_store_specification_data() {
        let spec = Specification::new(SpecificationOptions::new().with_specification_data(demo_overlay()));
        assert_eq!(spec.store_specification_data(), demo_overlay());
        assert_eq!(Specification::default().store_specification_data(), RawSpecificationData::default());
    }

    #[test]
    fn test_specification_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Specification>();
    }
}
