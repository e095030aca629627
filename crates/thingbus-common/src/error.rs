//! Error types for Thingbus
//!
//! Process-level errors raised while loading configuration and wiring a
//! service together. Library crates carry their own error enums.

use thiserror::Error;

/// Common result type for Thingbus operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Thingbus
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
