//! Error types for reasoningbank-state

use thiserror::Error;

/// Errors produced by the blob store and the memory store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Requested blob/graph/result key does not exist
    #[error("handle not found: {key}")]
    HandleNotFound { key: String },

    /// Memory item id does not exist
    #[error("memory item not found: {id}")]
    ItemNotFound { id: String },

    /// `get()` asked for more items than its hard cap allows
    #[error("too many items requested: {requested} ids, at most {max} allowed")]
    TooManyRequested { requested: usize, max: usize },

    /// Snapshot (de)serialization failed
    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot file I/O failed
    #[error("snapshot io failed: {0}")]
    Io(#[from] std::io::Error),
}
