//! VBus Specification Engine
//!
//! This crate turns raw VBus packets into named, typed and valued fields.
//!
//! ## Architecture
//!
//! - **KnowledgeBase**: read-only catalogue of units, types, devices and packet layouts
//! - **Catalog**: per-channel device and packet specs, synthesized for unknown entries
//! - **Overlay**: caller-supplied projection that restricts, renames or retypes fields
//! - **Specification**: the session object tying the above to a language
//!
//! Decoding goes through [`Specification::packet_fields_for_headers`], which
//! yields one [`PacketField`] per exposed field, each with a renderer for its
//! localized text.
//!
//! ```no_run
//! use vbus_spec::{Header, Specification};
//!
//! let spec = Specification::default();
//! let header = Header::new(0, 0x0010, 0x7721, 0x0100).with_frames(1, vec![0xb8, 0x22, 0x00, 0x00]);
//! for field in spec.packet_fields_for_headers(&[header]).unwrap() {
//!     println!("{}: {}", field.name, field.format_text_value());
//! }
//! ```

pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod fields;
pub mod format;
pub mod header;
pub mod ids;
pub mod knowledge;
pub mod model;
pub mod overlay;
pub mod specification;
pub mod units;

// Re-exports for convenience
pub use catalog::Catalog;
pub use config::SpecificationOptions;
pub use error::{Result, SpecError};
pub use fields::{PacketField, RawValue};
pub use format::{Locale, TextRenderer};
pub use header::Header;
pub use ids::{DeviceId, FieldId, PacketFieldId, PacketId};
pub use knowledge::{BuiltinKnowledgeBase, KnowledgeBase};
pub use model::{DeviceSpec, LocalizedText, PacketFieldSpec, PacketSpec, RootKind, Type};
pub use overlay::{FilteredPacketFieldSpec, RawFilteredPacketFieldSpec, RawSpecificationData};
pub use specification::{Side, Specification};
pub use units::{convert, ConvertedValue, Conversion, Unit, UnitFamily};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
