//! Error handling for the Micropad CLI

use micropad_core::{ConnectError, MicropadError, RequestError, TransportError};
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Micropad(#[from] MicropadError),

    #[error("Connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device rejected {command}: {reason}")]
    Rejected { command: String, reason: String },

    #[error("Device returned no {0}")]
    NoData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
