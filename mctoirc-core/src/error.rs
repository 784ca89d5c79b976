//! Error types for the bridge core.

use thiserror::Error;

/// Errors raised inside the bridge.
///
/// None of these reach the host: the supervisor logs connect and session
/// failures and retries, and config persistence failures are only warned
/// about.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("TCP connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to persist configuration: {0}")]
    ConfigPersist(String),

    #[error("invalid TOML: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialization failed: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
