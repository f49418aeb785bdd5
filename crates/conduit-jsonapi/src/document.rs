//! JSON:API wire shapes (spec.md §6: "Response bodies are JSON:API
//! documents; error responses produce a rejection carrying the parsed
//! body") and the conversions to/from `conduit_api::Record`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use conduit_api::{Record, RecordIdentity, RelationshipData, Value};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    #[serde(rename = "type")]
    pub type_: String,
    pub id: String,
}

impl From<&RecordIdentity> for ResourceIdentifier {
    fn from(identity: &RecordIdentity) -> Self {
        Self {
            type_: identity.type_.clone(),
            id: identity.id.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipLinkage {
    ToOne { data: Option<ResourceIdentifier> },
    ToMany { data: Vec<ResourceIdentifier> },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub relationships: HashMap<String, RelationshipLinkage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorObject {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResourceObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
}

/// Same envelope, but for endpoints whose `data` is a resource collection
/// (`GET /{type}`, `GET /{type}/{id}/{relationship}` for a to-many).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DocumentMany {
    #[serde(default)]
    pub data: Vec<ResourceObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
}

/// Builds the outgoing resource object for `addRecord`/`replaceRecord`,
/// translating the in-memory `relationships` map into JSON:API linkage.
pub fn record_to_resource(record: &Record) -> ResourceObject {
    ResourceObject {
        type_: record.type_.clone(),
        id: if record.id.is_empty() {
            None
        } else {
            Some(record.id.clone())
        },
        attributes: record
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
            .collect(),
        relationships: record
            .relationships
            .iter()
            .map(|(k, v)| (k.clone(), relationship_to_linkage(v)))
            .collect(),
    }
}

pub fn relationship_to_linkage(data: &RelationshipData) -> RelationshipLinkage {
    match data {
        RelationshipData::HasOne(related) => RelationshipLinkage::ToOne {
            data: related.as_ref().map(ResourceIdentifier::from),
        },
        RelationshipData::HasMany(related) => RelationshipLinkage::ToMany {
            data: related.iter().map(ResourceIdentifier::from).collect(),
        },
    }
}

/// Converts a response `ResourceObject` back into a `Record`, keeping the
/// caller's local type (e.g. `planet`) rather than whatever pluralized
/// wire type the server echoed back (e.g. `planets`) — the two naming
/// conventions intentionally diverge (spec.md §6's URL building pluralizes
/// the type for the path; the record identity itself never is).
pub fn resource_to_record(resource: &ResourceObject, local_type: &str) -> Record {
    let mut record = Record::new(local_type, resource.id.clone().unwrap_or_default());
    for (k, v) in &resource.attributes {
        record.attributes.insert(k.clone(), Value::from(v.clone()));
    }
    for (k, linkage) in &resource.relationships {
        let data = match linkage {
            RelationshipLinkage::ToOne { data } => {
                RelationshipData::HasOne(data.as_ref().map(|r| RecordIdentity::new(&r.type_, &r.id)))
            }
            RelationshipLinkage::ToMany { data } => RelationshipData::HasMany(
                data.iter().map(|r| RecordIdentity::new(&r.type_, &r.id)).collect(),
            ),
        };
        record.relationships.insert(k.clone(), data);
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn resource_round_trips_attributes_preserving_local_type() {
        let mut resource = ResourceObject {
            type_: "planets".into(),
            id: Some("12345".into()),
            ..Default::default()
        };
        resource
            .attributes
            .insert("name".into(), serde_json::json!("Pluto"));

        let record = resource_to_record(&resource, "planet");
        assert_eq!(record.type_, "planet");
        assert_eq!(record.id, "12345");
        assert_eq!(record.attributes.get("name"), Some(&Value::String("Pluto".into())));
    }

    #[test]
    fn has_many_linkage_round_trips() {
        let mut record = Record::new("planet", "earth");
        let mut related = HashSet::new();
        related.insert(RecordIdentity::new("human", "alice"));
        record
            .relationships
            .insert("inhabitants".into(), RelationshipData::HasMany(related.clone()));

        let resource = record_to_resource(&record);
        match resource.relationships.get("inhabitants").unwrap() {
            RelationshipLinkage::ToMany { data } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].type_, "human");
            }
            _ => panic!("expected to-many linkage"),
        }
    }
}
