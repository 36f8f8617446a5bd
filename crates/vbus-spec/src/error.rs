//! Error types for the specification engine.
//!
//! Unknown identifiers, units, types and packets are not errors: lookups
//! return `Option` or an empty collection instead. Only conditions that can
//! never produce a meaningful result are reported here.

/// Errors that can occur while converting, loading or storing.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// Units belong to unrelated families
    #[error("Cannot convert from unit '{source_unit}' to unit '{target_unit}'")]
    IncompatibleUnits {
        source_unit: String,
        target_unit: String,
    },

    /// Unit code passed explicitly by the caller is unknown
    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    /// Overlay (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error while reading overlay files
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for specification operations.
pub type Result<T> = std::result::Result<T, SpecError>;
