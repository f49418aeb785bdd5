use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{RecordIdentity, Value};

/// A query against a source's cache.
///
/// The full query builder DSL is out of scope here; this is the minimal
/// concrete shape a `Queryable` source needs to resolve `query()` and for
/// request strategies to forward across a `beforeQuery`/`query` pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Query {
    #[serde(rename = "findRecord")]
    FindRecord { record: RecordIdentity },

    #[serde(rename = "findRecords")]
    FindRecords {
        #[serde(rename = "type")]
        type_: String,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        attribute_filter: HashMap<String, Value>,
    },

    #[serde(rename = "findRelatedRecord")]
    FindRelatedRecord {
        record: RecordIdentity,
        relationship: String,
    },

    #[serde(rename = "findRelatedRecords")]
    FindRelatedRecords {
        record: RecordIdentity,
        relationship: String,
    },
}

impl Query {
    pub fn find_record(record: RecordIdentity) -> Self {
        Query::FindRecord { record }
    }

    pub fn find_records(type_: impl Into<String>) -> Self {
        Query::FindRecords {
            type_: type_.into(),
            attribute_filter: HashMap::new(),
        }
    }
}
