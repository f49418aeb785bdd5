//! Error type for the file-backed local persistence adapter.
//!
//! Mirrors `holon-filesystem`'s `FilesystemError` (one variant per failure
//! mode, `#[from]` the I/O and serialization errors that cross the
//! boundary) but derived with `thiserror`, consistent with the rest of the
//! workspace's [`conduit_api::ConduitError`].

use conduit_api::{ConduitError, RecordIdentity};

#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("record not found on disk: {0}")]
    NotFound(RecordIdentity),

    #[error("invalid record path: {0}")]
    InvalidPath(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record on disk: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<LocalStoreError> for ConduitError {
    fn from(err: LocalStoreError) -> Self {
        match err {
            LocalStoreError::NotFound(identity) => ConduitError::RecordNotFound(identity),
            other => ConduitError::other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_record_not_found() {
        let identity = RecordIdentity::new("planet", "pluto");
        let err: ConduitError = LocalStoreError::NotFound(identity.clone()).into();
        assert!(matches!(err, ConduitError::RecordNotFound(i) if i == identity));
    }
}
