use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::{RecordIdentity, Value};

/// A single tagged mutation descriptor. Wire-stable: this is the shape that
/// crosses a `Source` boundary (e.g. serialized into a JSON:API request body).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op")]
pub enum Operation {
    #[serde(rename = "addRecord")]
    AddRecord { record: crate::Record },

    #[serde(rename = "replaceRecord")]
    ReplaceRecord { record: crate::Record },

    #[serde(rename = "removeRecord")]
    RemoveRecord { record: RecordIdentity },

    #[serde(rename = "replaceKey")]
    ReplaceKey {
        record: RecordIdentity,
        key: String,
        value: String,
    },

    #[serde(rename = "replaceAttribute")]
    ReplaceAttribute {
        record: RecordIdentity,
        attribute: String,
        value: Value,
    },

    #[serde(rename = "addToHasMany")]
    AddToHasMany {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },

    #[serde(rename = "removeFromHasMany")]
    RemoveFromHasMany {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },

    #[serde(rename = "replaceHasMany")]
    ReplaceHasMany {
        record: RecordIdentity,
        relationship: String,
        related_records: HashSet<RecordIdentity>,
    },

    #[serde(rename = "replaceHasOne")]
    ReplaceHasOne {
        record: RecordIdentity,
        relationship: String,
        related_record: Option<RecordIdentity>,
    },
}

impl Operation {
    /// The primary record identity this operation targets, for every variant.
    pub fn record_identity(&self) -> RecordIdentity {
        match self {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                record.identity()
            }
            Operation::RemoveRecord { record }
            | Operation::ReplaceKey { record, .. }
            | Operation::ReplaceAttribute { record, .. }
            | Operation::AddToHasMany { record, .. }
            | Operation::RemoveFromHasMany { record, .. }
            | Operation::ReplaceHasMany { record, .. }
            | Operation::ReplaceHasOne { record, .. } => record.clone(),
        }
    }

    /// Related record identities this operation references, if any.
    pub fn related_identities(&self) -> Vec<RecordIdentity> {
        match self {
            Operation::AddToHasMany { related_record, .. }
            | Operation::RemoveFromHasMany { related_record, .. } => vec![related_record.clone()],
            Operation::ReplaceHasOne {
                related_record: Some(r),
                ..
            } => vec![r.clone()],
            Operation::ReplaceHasMany {
                related_records, ..
            } => related_records.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    pub fn op_name(&self) -> &'static str {
        match self {
            Operation::AddRecord { .. } => "addRecord",
            Operation::ReplaceRecord { .. } => "replaceRecord",
            Operation::RemoveRecord { .. } => "removeRecord",
            Operation::ReplaceKey { .. } => "replaceKey",
            Operation::ReplaceAttribute { .. } => "replaceAttribute",
            Operation::AddToHasMany { .. } => "addToHasMany",
            Operation::RemoveFromHasMany { .. } => "removeFromHasMany",
            Operation::ReplaceHasMany { .. } => "replaceHasMany",
            Operation::ReplaceHasOne { .. } => "replaceHasOne",
        }
    }
}

/// An ordered, id-tagged batch of operations.
///
/// `id` is the dedup key sources use to recognize a transform they have
/// already applied (invariant I4). We use a `Uuid` rather than a monotonic
/// counter since transforms may originate from any source, not just one
/// with a privileged sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub id: Uuid,
    pub operations: Vec<Operation>,
}

impl Transform {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            id: Uuid::new_v4(),
            operations,
        }
    }

    pub fn with_id(id: Uuid, operations: Vec<Operation>) -> Self {
        Self { id, operations }
    }

    pub fn single(operation: Operation) -> Self {
        Self::new(vec![operation])
    }
}
