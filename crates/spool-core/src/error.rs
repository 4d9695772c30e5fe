use thiserror::Error;

use crate::domain::UploadId;
use crate::ports::{CacheError, LockError, StoreError};

/// Errors surfaced to the protocol layer.
///
/// The engine never retries internally; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload not found: {0}")]
    SessionNotFound(UploadId),

    /// Contention or lock-service failure; nothing was mutated.
    #[error("could not acquire upload lock: {0}")]
    LockTimeout(#[from] LockError),

    #[error("object store failure: {0}")]
    Store(#[from] StoreError),

    #[error("cache failure: {0}")]
    Cache(#[from] CacheError),

    #[error("reading append payload failed: {0}")]
    Payload(#[source] std::io::Error),

    #[error("upload length must be greater than zero")]
    InvalidLength,

    #[error("append of {incoming} bytes at offset {offset} exceeds declared length {declared}")]
    LengthExceeded {
        offset: u64,
        incoming: u64,
        declared: u64,
    },

    #[error("upload {0} is already complete")]
    UploadComplete(UploadId),

    #[error("upload {0} is not complete")]
    Incomplete(UploadId),

    #[error("upload {id} has invalid metadata: {reason}")]
    InvalidMetadata { id: UploadId, reason: String },

    #[error("upload {id} has inconsistent transfer state: {reason}")]
    InconsistentState { id: UploadId, reason: String },

    #[error("session record encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type UploadResult<T> = std::result::Result<T, UploadError>;
