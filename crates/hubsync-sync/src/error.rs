//! Error types for the sync module.

use thiserror::Error;

use crate::messages::ErrorCode;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed input: bad fid, sync id or prefix.
    #[error("validation error: {0}")]
    Validation(String),

    /// No trie node or message under the requested key.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local store operation failed.
    #[error("store error: {0}")]
    Store(#[from] hubsync_store::StoreError),

    /// A peer call did not complete within the configured timeout.
    #[error("peer timeout: {0}")]
    PeerTimeout(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Peer answered with an error response.
    #[error("peer error ({code:?}): {message}")]
    Peer { code: ErrorCode, message: String },

    /// Protocol version mismatch with peer.
    #[error("protocol version mismatch: local={local}, peer={peer}")]
    VersionMismatch { local: u8, peer: u8 },

    /// A frame was well formed CBOR but not a valid protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::Validation(_) => ErrorCode::Validation,
            SyncError::NotFound(_) => ErrorCode::NotFound,
            SyncError::Store(_) => ErrorCode::Store,
            SyncError::VersionMismatch { .. } => ErrorCode::VersionMismatch,
            SyncError::InvalidMessage(_) | SyncError::Codec(_) => ErrorCode::InvalidMessage,
            SyncError::Peer { code, .. } => *code,
            SyncError::PeerTimeout(_) | SyncError::Transport(_) | SyncError::Cancelled => {
                ErrorCode::Internal
            }
        }
    }

    /// Rebuild an error from a peer's error response.
    ///
    /// Validation and not-found keep their local meaning; everything else is
    /// reported as a peer error.
    pub fn from_peer(code: ErrorCode, message: String) -> Self {
        match code {
            ErrorCode::Validation => SyncError::Validation(message),
            ErrorCode::NotFound => SyncError::NotFound(message),
            code => SyncError::Peer { code, message },
        }
    }

    /// Whether the error must end the session rather than skip one unit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Store(_) | SyncError::Cancelled | SyncError::VersionMismatch { .. }
        )
    }
}

impl From<hubsync_core::ValidationError> for SyncError {
    fn from(err: hubsync_core::ValidationError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

impl From<hubsync_core::CoreError> for SyncError {
    fn from(err: hubsync_core::CoreError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

impl From<hubsync_trie::TrieError> for SyncError {
    fn from(err: hubsync_trie::TrieError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
