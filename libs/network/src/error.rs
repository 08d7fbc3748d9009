//! Network Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    /// The remote process id could not be fetched
    #[error("Handshake error: {message}")]
    Handshake { message: String },

    /// Connection management errors
    #[error("Connection error: {message} (url: {url:?})")]
    Connection { message: String, url: Option<String> },

    /// A frame could not be handed to the socket writer
    #[error("Send error: {gateway_id}: socket closed")]
    Send { gateway_id: String },

    /// Malformed address or configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] types::TypesError),
}

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

impl NetworkError {
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>, url: Option<&str>) -> Self {
        Self::Connection {
            message: message.into(),
            url: url.map(str::to_string),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
