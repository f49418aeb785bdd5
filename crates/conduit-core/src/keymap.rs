//! Bidirectional mapping between a record's local id and the key values
//! assigned to it by remote sources (e.g. a server-issued primary key).
//!
//! A `KeyMap` is shared by every source in a coordinator so that a transform
//! minted against a locally-generated id can be translated to the remote
//! key a JSON:API source needs, and vice versa when a fetch comes back
//! keyed by the remote value.

use std::collections::HashMap;

use tokio::sync::RwLock;

use conduit_api::RecordIdentity;

#[derive(Default)]
struct KeyMapInner {
    // (type, id, keyName) -> keyValue
    forward: HashMap<(String, String, String), String>,
    // (type, keyName, keyValue) -> id
    reverse: HashMap<(String, String, String), String>,
}

#[derive(Default)]
pub struct KeyMap {
    inner: RwLock<KeyMapInner>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `record`'s `key_name` key resolves to `key_value`.
    pub async fn set(&self, record: &RecordIdentity, key_name: &str, key_value: &str) {
        let mut guard = self.inner.write().await;
        guard.forward.insert(
            (record.type_.clone(), record.id.clone(), key_name.to_string()),
            key_value.to_string(),
        );
        guard.reverse.insert(
            (record.type_.clone(), key_name.to_string(), key_value.to_string()),
            record.id.clone(),
        );
    }

    pub async fn key_value(&self, record: &RecordIdentity, key_name: &str) -> Option<String> {
        let guard = self.inner.read().await;
        guard
            .forward
            .get(&(record.type_.clone(), record.id.clone(), key_name.to_string()))
            .cloned()
    }

    /// Resolve a `(type, keyName, keyValue)` triple back to a local id, if
    /// this map has ever seen that key assigned.
    pub async fn id_from_key(&self, type_: &str, key_name: &str, key_value: &str) -> Option<String> {
        let guard = self.inner.read().await;
        guard
            .reverse
            .get(&(type_.to_string(), key_name.to_string(), key_value.to_string()))
            .cloned()
    }

    /// Look up an existing id for this key, or generate one via `make_id`
    /// and remember the mapping. Mirrors the "find-or-create local id for
    /// a remote key" idiom sources need when ingesting fetched data.
    pub async fn id_from_key_or_generate<F>(
        &self,
        type_: &str,
        key_name: &str,
        key_value: &str,
        make_id: F,
    ) -> String
    where
        F: FnOnce() -> String,
    {
        if let Some(id) = self.id_from_key(type_, key_name, key_value).await {
            return id;
        }
        let id = make_id();
        let record = RecordIdentity::new(type_, id.clone());
        self.set(&record, key_name, key_value).await;
        id
    }

    pub async fn remove_record(&self, record: &RecordIdentity) {
        let mut guard = self.inner.write().await;
        let keys_to_drop: Vec<_> = guard
            .forward
            .keys()
            .filter(|(t, id, _)| t == &record.type_ && id == &record.id)
            .cloned()
            .collect();
        for key in keys_to_drop {
            if let Some(value) = guard.forward.remove(&key) {
                let (type_, _, key_name) = key;
                guard.reverse.remove(&(type_, key_name, value));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_both_directions() {
        let map = KeyMap::new();
        let record = RecordIdentity::new("note", "local-1");
        map.set(&record, "remoteId", "srv-42").await;

        assert_eq!(map.key_value(&record, "remoteId").await.as_deref(), Some("srv-42"));
        assert_eq!(
            map.id_from_key("note", "remoteId", "srv-42").await.as_deref(),
            Some("local-1")
        );
    }

    #[tokio::test]
    async fn id_from_key_or_generate_reuses_existing_mapping() {
        let map = KeyMap::new();
        let first = map
            .id_from_key_or_generate("note", "remoteId", "srv-1", || "generated-1".to_string())
            .await;
        let second = map
            .id_from_key_or_generate("note", "remoteId", "srv-1", || "generated-2".to_string())
            .await;
        assert_eq!(first, "generated-1");
        assert_eq!(second, "generated-1");
    }

    #[tokio::test]
    async fn remove_record_clears_both_directions() {
        let map = KeyMap::new();
        let record = RecordIdentity::new("note", "local-1");
        map.set(&record, "remoteId", "srv-42").await;
        map.remove_record(&record).await;

        assert_eq!(map.key_value(&record, "remoteId").await, None);
        assert_eq!(map.id_from_key("note", "remoteId", "srv-42").await, None);
    }
}
