//! Error types and Result alias for the Trove bot

use thiserror::Error;

/// Main error type for the Trove bot
#[derive(Error, Debug)]
pub enum Error {
    #[error("Gateway error: {0}")]
    GatewayError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::InvalidData(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}
