//! Runtime Error Types
//!
//! None of these ever travel back to a remote sender. Message handling
//! logs them and drops the message.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No registered service answers to the address
    #[error("Address resolution failed: {target}.{method}")]
    AddressResolution { target: String, method: String },

    /// The service exists but has no such operation
    #[error("Unknown method '{method}' on {service}")]
    UnknownMethod { service: String, method: String },

    /// Neither an explicit nor a default route reaches the process
    #[error("No route to process {remote_id}")]
    NoRoute { remote_id: String },

    #[error("Connection error: {gateway_id}: {message}")]
    Connection { gateway_id: String, message: String },

    #[error("Installation step {step} failed: {reason}")]
    Installation { step: String, reason: String },

    #[error("Invalid argument for {method}: {reason}")]
    InvalidArgument { method: String, reason: String },

    #[error("Refused to {operation} {target}: {reason}")]
    Refused {
        operation: String,
        target: String,
        reason: String,
    },

    #[error("Launch error: {message}")]
    Launch { message: String },

    #[error("Identity error: {0}")]
    Types(#[from] types::TypesError),

    #[error("Network error: {0}")]
    Network(#[from] network::NetworkError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

impl RuntimeError {
    pub fn unknown_method(service: impl ToString, method: impl Into<String>) -> Self {
        Self::UnknownMethod {
            service: service.to_string(),
            method: method.into(),
        }
    }

    pub fn invalid_argument(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            method: method.into(),
            reason: reason.into(),
        }
    }

    pub fn refused(
        operation: impl Into<String>,
        target: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Self::Refused {
            operation: operation.into(),
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    pub fn connection(gateway_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            gateway_id: gateway_id.into(),
            message: message.into(),
        }
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::Launch {
            message: message.into(),
        }
    }
}
