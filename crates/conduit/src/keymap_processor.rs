//! A processor that keeps a shared [`conduit_core::KeyMap`] in sync with
//! the cache's record map, populating it the way spec.md §3 describes:
//! lazily, whenever a record carrying `keys` is added, replaced, or has a
//! key explicitly replaced.
//!
//! Unlike [`crate::IntegrityProcessor`] this processor never emits
//! compensating operations — it only observes.

use std::sync::Arc;

use async_trait::async_trait;

use conduit_api::{ConduitError, Operation};
use conduit_core::KeyMap;

use crate::cache::RecordStore;
use crate::processor::Processor;

pub struct KeyMapProcessor {
    key_map: Arc<KeyMap>,
}

impl KeyMapProcessor {
    pub fn new(key_map: Arc<KeyMap>) -> Self {
        Self { key_map }
    }
}

#[async_trait]
impl Processor for KeyMapProcessor {
    async fn after(&self, _store: &RecordStore, op: &Operation) -> Result<Vec<Operation>, ConduitError> {
        match op {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                for (key_name, key_value) in &record.keys {
                    self.key_map.set(&record.identity(), key_name, key_value).await;
                }
            }
            Operation::ReplaceKey { record, key, value } => {
                self.key_map.set(record, key, value).await;
            }
            Operation::RemoveRecord { record } => {
                self.key_map.remove_record(record).await;
            }
            _ => {}
        }
        Ok(Vec::new())
    }

    async fn on_reset(&self, store: &RecordStore) {
        for record in store.iter() {
            for (key_name, key_value) in &record.keys {
                self.key_map.set(&record.identity(), key_name, key_value).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use conduit_api::{Record, RecordIdentity};

    #[tokio::test]
    async fn add_record_populates_key_map() {
        let key_map = Arc::new(KeyMap::new());
        let processor = Arc::new(KeyMapProcessor::new(key_map.clone()));
        let cache = Cache::new(vec![processor]);

        let mut record = Record::new("planet", "local-1");
        record.keys.insert("remoteId".to_string(), "srv-42".to_string());

        cache.patch(vec![Operation::AddRecord { record }]).await.unwrap();

        assert_eq!(
            key_map
                .key_value(&RecordIdentity::new("planet", "local-1"), "remoteId")
                .await
                .as_deref(),
            Some("srv-42")
        );
    }

    #[tokio::test]
    async fn replace_key_updates_existing_mapping() {
        let key_map = Arc::new(KeyMap::new());
        let processor = Arc::new(KeyMapProcessor::new(key_map.clone()));
        let cache = Cache::new(vec![processor]);

        let record = Record::new("planet", "local-1");
        cache.patch(vec![Operation::AddRecord { record }]).await.unwrap();
        cache
            .patch(vec![Operation::ReplaceKey {
                record: RecordIdentity::new("planet", "local-1"),
                key: "remoteId".to_string(),
                value: "srv-99".to_string(),
            }])
            .await
            .unwrap();

        assert_eq!(
            key_map
                .key_value(&RecordIdentity::new("planet", "local-1"), "remoteId")
                .await
                .as_deref(),
            Some("srv-99")
        );
    }

    #[tokio::test]
    async fn remove_record_clears_key_map_entry() {
        let key_map = Arc::new(KeyMap::new());
        let processor = Arc::new(KeyMapProcessor::new(key_map.clone()));
        let cache = Cache::new(vec![processor]);

        let mut record = Record::new("planet", "local-1");
        record.keys.insert("remoteId".to_string(), "srv-42".to_string());
        cache.patch(vec![Operation::AddRecord { record }]).await.unwrap();
        cache
            .patch(vec![Operation::RemoveRecord {
                record: RecordIdentity::new("planet", "local-1"),
            }])
            .await
            .unwrap();

        assert_eq!(
            key_map
                .key_value(&RecordIdentity::new("planet", "local-1"), "remoteId")
                .await,
            None
        );
    }
}
