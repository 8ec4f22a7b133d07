//! Error types for rkflasher-core

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// A number could not be parsed (hex or decimal)
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// A size string could not be parsed (e.g. "16 MiB", "1.5GB")
    #[error("invalid size '{0}'")]
    InvalidSize(String),

    /// I/O error reading a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parse error in a chip database file
    #[error("chip database parse error: {0}")]
    ChipDb(#[from] ron::error::SpannedError),

    /// Chip database contents are inconsistent
    #[error("chip database validation error: {0}")]
    ChipDbValidation(String),

    /// TOML serialization error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
