use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::Value;

/// `(type, id)` identity, canonicalized to `"type:id"` for relationship keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct RecordIdentity {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
}

impl RecordIdentity {
    pub fn new(type_: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            id: id.into(),
        }
    }

    /// Canonical `"type:id"` form used as a relationship key and reverse-index leaf.
    pub fn to_key(&self) -> String {
        format!("{}:{}", self.type_, self.id)
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let (type_, id) = key.split_once(':')?;
        Some(Self::new(type_, id))
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

/// Relationship data for a single relationship slot on a record.
///
/// `HasMany` is a *set* — order is not meaningful and must never be relied on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    HasOne(Option<RecordIdentity>),
    HasMany(HashSet<RecordIdentity>),
}

impl RelationshipData {
    pub fn empty_has_many() -> Self {
        RelationshipData::HasMany(HashSet::new())
    }

    pub fn as_has_one(&self) -> Option<&Option<RecordIdentity>> {
        match self {
            RelationshipData::HasOne(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_has_many(&self) -> Option<&HashSet<RecordIdentity>> {
        match self {
            RelationshipData::HasMany(v) => Some(v),
            _ => None,
        }
    }
}

/// A single logical record: `{ type, id, keys?, attributes?, relationships? }`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub keys: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub relationships: HashMap<String, RelationshipData>,
}

impl Record {
    pub fn new(type_: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_: type_.into(),
            id: id.into(),
            keys: HashMap::new(),
            attributes: HashMap::new(),
            relationships: HashMap::new(),
        }
    }

    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.type_.clone(), self.id.clone())
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}
