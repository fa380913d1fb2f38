//! Error taxonomy shared by every collection and the object pool.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by collections, cursors and pools.
///
/// Every variant names the collection (or pool) it came from so the
/// `Display` output is actionable on its own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    #[error("collection `{collection}` is empty")]
    EmptyCollection { collection: String },

    #[error("index {index} out of range for collection `{collection}` (len {len})")]
    IndexOutOfRange {
        collection: String,
        index: usize,
        len: usize,
    },

    #[error("{what} not found in collection `{collection}`")]
    NotFound { collection: String, what: String },

    #[error("duplicate key {key} in collection `{collection}`")]
    DuplicateKey { collection: String, key: String },

    #[error("cursor on collection `{collection}` is stale (snapshot {snapshot}, current {current})")]
    StaleCursor {
        collection: String,
        snapshot: u64,
        current: u64,
    },

    #[error("cursor on collection `{collection}` does not denote an element")]
    InvalidCursor { collection: String },

    #[error("cursor does not belong to collection `{collection}`")]
    NotMyCursor { collection: String },

    #[error("adoption mismatch on collection `{collection}`: {detail}")]
    AdoptionMismatch { collection: String, detail: String },

    #[error("null element rejected by `{collection}`")]
    NullElementRejected { collection: String },

    #[error("pool `{pool}` exhausted ({used} of {max} elements checked out)")]
    PoolExhausted { pool: String, used: usize, max: usize },

    #[error("pool `{pool}` has no candidate element for size {size_hint}")]
    NoCandidateElement { pool: String, size_hint: String },

    #[error("timed out after {timeout:?} waiting for the lock on `{collection}`")]
    LockTimeout {
        collection: String,
        timeout: Duration,
    },

    #[error("bulk scope misuse on collection `{collection}`: {detail}")]
    BulkState { collection: String, detail: String },
}

pub type Result<T, E = CollectionError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let e = CollectionError::DuplicateKey {
            collection: "users".into(),
            key: "\"bob\"".into(),
        };
        assert_eq!(e.to_string(), "duplicate key \"bob\" in collection `users`");

        let e = CollectionError::PoolExhausted {
            pool: "buffers".into(),
            used: 4,
            max: 4,
        };
        assert!(e.to_string().contains("4 of 4"));
    }
}
