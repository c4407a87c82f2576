//! Error types for the homelink gateway

use thiserror::Error;

/// Result type alias for homelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the homelink gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Authentication/authorization error
    #[error("auth error: {0}")]
    Auth(String),

    /// Wake-on-LAN error (bad MAC, socket failure)
    #[error("wake-on-lan error: {0}")]
    Wake(String),

    /// Client-side transport error
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
