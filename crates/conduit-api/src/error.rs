use serde::{Deserialize, Serialize};

use crate::RecordIdentity;

/// Structured error taxonomy shared by every crate in the workspace.
///
/// Kept `Clone` so an error can be stashed in an `Action`'s completion cell
/// and handed to every awaiter of that action's `complete` future.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ConduitError {
    #[error("operation not allowed: {reason}")]
    NotAllowed { reason: String },

    #[error("record not found: {0}")]
    RecordNotFound(RecordIdentity),

    #[error("relationship not found: {record} . {relationship}")]
    RelationshipNotFound {
        record: RecordIdentity,
        relationship: String,
    },

    #[error("server rejected the request ({status}): {body}")]
    ServerError {
        status: u16,
        body: serde_json::Value,
    },

    #[error("invalid schema: {reason}")]
    SchemaError { reason: String },

    #[error("queue error: {0}")]
    QueueError(#[from] QueueError),

    #[error("{message}")]
    Other { message: String },
}

impl ConduitError {
    pub fn not_allowed(reason: impl Into<String>) -> Self {
        ConduitError::NotAllowed {
            reason: reason.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        ConduitError::Other {
            message: message.into(),
        }
    }
}

/// Failure modes specific to `ActionQueue` processing.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum QueueError {
    /// The action was dropped via `skip()` before it completed.
    #[error("action was skipped before completing")]
    Skipped,
    /// The queue itself was dropped while an action was still pending.
    #[error("queue was shut down while action was pending")]
    Closed,
}

pub type Result<T> = std::result::Result<T, ConduitError>;
