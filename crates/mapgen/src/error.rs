//! Error types for map generation.

use thiserror::Error;

/// A configuration value failed validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Thresholds for {0} must be ascending")]
    UnorderedThresholds(String),

    #[error("Cell ({col}, {row}) is outside a {cols}x{rows} canvas")]
    CellOutOfRange { col: u32, row: u32, cols: u32, rows: u32 },

    #[error("Unknown {kind} name: {name}")]
    UnknownName { kind: &'static str, name: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal generation errors. Degraded inputs and exhausted placements are not errors.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(&'static str),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T, E = GenError> = std::result::Result<T, E>;
