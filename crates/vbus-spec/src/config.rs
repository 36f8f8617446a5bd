//! Configuration defaults and construction options.
//!
//! Constants live in small modules so that the CLI and the library agree on
//! names; helper functions read the environment and fall back to defaults.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;
use crate::overlay::RawSpecificationData;

/// Default values
pub mod defaults {
    /// Language used for names and locale-dependent formatting
    pub const LANGUAGE: &str = "en";
    /// Language-independent key of a per-language name map
    pub const REF_LANGUAGE: &str = "ref";
    /// VBus protocol version of the built-in packet table
    pub const PROTOCOL_VERSION: u8 = 0x10;
}

/// Environment variable names
pub mod env_vars {
    pub const LANGUAGE: &str = "VBUS_LANGUAGE";
    pub const OVERLAY: &str = "VBUS_OVERLAY";
    pub const LOG_JSON: &str = "VBUS_LOG_JSON";
}

/// Language from the environment, or the default.
pub fn language() -> String {
    std::env::var(env_vars::LANGUAGE)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| defaults::LANGUAGE.to_string())
}

/// Whether JSON log output was requested.
pub fn log_json() -> bool {
    std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}

/// Options for constructing a [`Specification`](crate::Specification).
///
/// Unknown keys are ignored when deserializing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationOptions {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub specification_data: Option<RawSpecificationData>,
}

fn default_language() -> String {
    defaults::LANGUAGE.to_string()
}

impl Default for SpecificationOptions {
    fn default() -> Self {
        Self {
            language: default_language(),
            specification_data: None,
        }
    }
}

impl SpecificationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_specification_data(mut self, data: RawSpecificationData) -> Self {
        self.specification_data = Some(data);
        self
    }

    /// Read the overlay from a JSON file.
    pub fn with_overlay_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let data = RawSpecificationData::from_json_file(path)?;
        Ok(self.with_specification_data(data))
    }

    /// Options from `VBUS_LANGUAGE` and `VBUS_OVERLAY`.
    pub fn from_env() -> Result<Self> {
        let options = Self::default().with_language(language());
        match std::env::var(env_vars::OVERLAY) {
            Ok(path) if !path.trim().is_empty() => options.with_overlay_file(path),
            _ => Ok(options),
        }
    }
}
