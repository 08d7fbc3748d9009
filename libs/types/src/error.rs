//! Error types for identity parsing and envelope decoding

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    /// A string could not be used as a service identity
    #[error("Invalid identity '{value}': {reason}")]
    InvalidIdentity { value: String, reason: String },

    /// Wire text was not a valid envelope
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TypesError>;

impl TypesError {
    pub fn invalid_identity(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
