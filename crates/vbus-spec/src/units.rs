//! Units of measurement and the unit conversion engine.
//!
//! Units of one family convert through the family's canonical unit. Most
//! units are a pure ratio of the canonical unit; temperatures use an affine
//! transform. The unit with code [`NONE_UNIT_CODE`] carries no unit at all
//! and converts to and from anything as the identity.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, SpecError};

/// Code of the sentinel unit that carries no physical unit.
pub const NONE_UNIT_CODE: &str = "None";

/// Group of mutually convertible units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitFamily {
    Energy,
    Pressure,
    Temperature,
    Time,
    Volume,
    VolumeFlow,
}

impl fmt::Display for UnitFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Energy => "Energy",
            Self::Pressure => "Pressure",
            Self::Temperature => "Temperature",
            Self::Time => "Time",
            Self::Volume => "Volume",
            Self::VolumeFlow => "VolumeFlow",
        };
        f.write_str(name)
    }
}

/// How a unit relates to its family's canonical unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    /// `canonical = value * mul / div`
    Ratio { mul: f64, div: f64 },
    /// `value = canonical * scale + offset`
    Affine { scale: f64, offset: f64 },
}

impl Conversion {
    /// The canonical unit itself.
    pub const IDENTITY: Conversion = Conversion::Ratio { mul: 1.0, div: 1.0 };

    pub fn to_canonical(&self, value: f64) -> f64 {
        match *self {
            Self::Ratio { mul, div } => value * mul / div,
            Self::Affine { scale, offset } => (value - offset) / scale,
        }
    }

    pub fn from_canonical(&self, canonical: f64) -> f64 {
        match *self {
            Self::Ratio { mul, div } => canonical * div / mul,
            Self::Affine { scale, offset } => canonical * scale + offset,
        }
    }
}

/// A unit of measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Stable code, e.g. `DegreesCelsius`
    pub unit_code: String,
    /// Display text, e.g. `°C`
    pub unit_text: String,
    pub unit_family: Option<UnitFamily>,
    pub conversion: Conversion,
}

impl Unit {
    pub fn new(unit_code: impl Into<String>, unit_text: impl Into<String>) -> Self {
        Self {
            unit_code: unit_code.into(),
            unit_text: unit_text.into(),
            unit_family: None,
            conversion: Conversion::IDENTITY,
        }
    }

    pub fn with_family(mut self, family: UnitFamily, conversion: Conversion) -> Self {
        self.unit_family = Some(family);
        self.conversion = conversion;
        self
    }

    pub fn is_none_unit(&self) -> bool {
        self.unit_code == NONE_UNIT_CODE
    }
}

/// Result of a unit conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedValue {
    pub raw_value: f64,
    pub unit: Arc<Unit>,
}

/// Convert `raw_value` from `source` to `target`.
///
/// Converting a unit to itself returns the input unchanged. Conversions
/// involving the `None` unit are the identity as well.
pub fn convert(raw_value: f64, source: &Unit, target: &Arc<Unit>) -> Result<ConvertedValue> {
    let raw_value = if source.unit_code == target.unit_code
        || source.is_none_unit()
        || target.is_none_unit()
    {
        raw_value
    } else {
        match (source.unit_family, target.unit_family) {
            (Some(a), Some(b)) if a == b => {
                let canonical = source.conversion.to_canonical(raw_value);
                target.conversion.from_canonical(canonical)
            }
            _ => {
                warn!(
                    "Refusing conversion from '{}' to '{}'",
                    source.unit_code, target.unit_code
                );
                return Err(SpecError::IncompatibleUnits {
                    source_unit: source.unit_code.clone(),
                    target_unit: target.unit_code.clone(),
                });
            }
        }
    };

    Ok(ConvertedValue {
        raw_value,
        unit: Arc::clone(target),
    })
}
