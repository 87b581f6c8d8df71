//! Error types for the hub.

use hubsync_core::ValidationError;
use hubsync_store::StoreError;
use hubsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during hub operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// A locally submitted message failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// The store refused a locally submitted message.
    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
