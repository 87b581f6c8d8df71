//! Error types for Hubsync Core.

use thiserror::Error;

use crate::message::MessageType;

/// Core errors that can occur while constructing or decoding primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("timestamp {0} does not fit in the sync id timestamp field")]
    TimestampOutOfRange(u64),

    #[error("invalid hash length: expected {expected}, got {got}")]
    InvalidHashLength { expected: usize, got: usize },

    #[error("invalid sync id length: expected {expected}, got {got}")]
    InvalidSyncIdLength { expected: usize, got: usize },

    #[error("unknown message type discriminator: {0}")]
    UnknownMessageType(u8),

    #[error("invalid fid: {0}")]
    InvalidFid(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for message structure and signatures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("signature verification failed")]
    SignatureFailed,

    #[error("content hash does not match message data")]
    HashMismatch,

    #[error("fid must be non-zero")]
    ZeroFid,

    #[error("timestamp {0} is out of range")]
    TimestampOutOfRange(u64),

    #[error("{ty:?} field {field} is invalid: {reason}")]
    InvalidField {
        ty: MessageType,
        field: &'static str,
        reason: String,
    },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::TimestampOutOfRange(ts) => ValidationError::TimestampOutOfRange(ts),
            other => ValidationError::StructuralError(other.to_string()),
        }
    }
}
