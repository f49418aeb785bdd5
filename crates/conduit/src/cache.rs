//! The in-memory relational cache (spec §4.C).
//!
//! `Cache` owns a flat `[type][id] -> Record` map and a list of
//! [`Processor`]s run around every operation it applies. All of the
//! relational bookkeeping — inverse links, orphan cleanup, the reverse
//! index — lives in processors, not here; the cache itself only knows how
//! to apply one primitive operation to the map and run the processor
//! protocol around it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;

use conduit_api::{ConduitError, Operation, Record, RecordIdentity, RelationshipData, Value};

use crate::processor::Processor;

/// The raw record map a processor inspects. Read-only from a processor's
/// point of view — mutation happens only through `Cache::patch`.
#[derive(Clone, Default)]
pub struct RecordStore {
    records: HashMap<(String, String), Record>,
}

impl RecordStore {
    pub fn get_record(&self, identity: &RecordIdentity) -> Option<&Record> {
        self.records.get(&(identity.type_.clone(), identity.id.clone()))
    }

    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.records.contains_key(&(identity.type_.clone(), identity.id.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    /// Resolve a slash-separated path against the store: `type/id`,
    /// `type/id/attributes/name`, `type/id/keys/name`, or
    /// `type/id/relationships/name/data`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = path.split('/').collect();
        let record = self.records.get(&(segments.first()?.to_string(), segments.get(1)?.to_string()))?;
        match segments.get(2).copied() {
            None => Some(record_to_value(record)),
            Some("attributes") => record.attributes.get(*segments.get(3)?).cloned(),
            Some("keys") => record.keys.get(*segments.get(3)?).map(|v| Value::String(v.clone())),
            Some("relationships") => {
                let rel = record.relationships.get(*segments.get(3)?)?;
                match (segments.get(4).copied(), rel) {
                    (Some("data"), RelationshipData::HasOne(target)) => Some(match target {
                        Some(identity) => Value::String(identity.to_key()),
                        None => Value::Null,
                    }),
                    (Some("data"), RelationshipData::HasMany(set)) => Some(Value::Array(
                        set.iter().map(|i| Value::String(i.to_key())).collect(),
                    )),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    fn apply_primitive(&mut self, op: &Operation) -> Result<(), ConduitError> {
        match op {
            Operation::AddRecord { record } | Operation::ReplaceRecord { record } => {
                self.records
                    .insert((record.type_.clone(), record.id.clone()), record.clone());
            }
            Operation::RemoveRecord { record } => {
                self.records.remove(&(record.type_.clone(), record.id.clone()));
            }
            Operation::ReplaceKey { record, key, value } => {
                let rec = self.record_mut(record)?;
                rec.keys.insert(key.clone(), value.clone());
            }
            Operation::ReplaceAttribute {
                record,
                attribute,
                value,
            } => {
                let rec = self.record_mut(record)?;
                rec.attributes.insert(attribute.clone(), value.clone());
            }
            Operation::AddToHasMany {
                record,
                relationship,
                related_record,
            } => {
                let rec = self.record_mut(record)?;
                let entry = rec
                    .relationships
                    .entry(relationship.clone())
                    .or_insert_with(RelationshipData::empty_has_many);
                if let RelationshipData::HasMany(set) = entry {
                    set.insert(related_record.clone());
                }
            }
            Operation::RemoveFromHasMany {
                record,
                relationship,
                related_record,
            } => {
                let rec = self.record_mut(record)?;
                if let Some(RelationshipData::HasMany(set)) = rec.relationships.get_mut(relationship) {
                    set.remove(related_record);
                }
            }
            Operation::ReplaceHasMany {
                record,
                relationship,
                related_records,
            } => {
                let rec = self.record_mut(record)?;
                rec.relationships.insert(
                    relationship.clone(),
                    RelationshipData::HasMany(related_records.clone()),
                );
            }
            Operation::ReplaceHasOne {
                record,
                relationship,
                related_record,
            } => {
                let rec = self.record_mut(record)?;
                rec.relationships.insert(
                    relationship.clone(),
                    RelationshipData::HasOne(related_record.clone()),
                );
            }
        }
        Ok(())
    }

    fn record_mut(&mut self, identity: &RecordIdentity) -> Result<&mut Record, ConduitError> {
        self.records
            .get_mut(&(identity.type_.clone(), identity.id.clone()))
            .ok_or_else(|| ConduitError::RecordNotFound(identity.clone()))
    }
}

fn record_to_value(record: &Record) -> Value {
    let mut map = std::collections::HashMap::new();
    map.insert("type".to_string(), Value::String(record.type_.clone()));
    map.insert("id".to_string(), Value::String(record.id.clone()));
    for (k, v) in &record.attributes {
        map.insert(k.clone(), v.clone());
    }
    Value::Object(map)
}

/// Relational in-memory store with a pluggable processor chain.
///
/// Owned by exactly one source (spec §5): nothing outside the owning
/// source should hold a `Cache` directly, only reach it through the
/// source's `update`/`query`/`transform` surface.
pub struct Cache {
    store: Mutex<RecordStore>,
    processors: Vec<Arc<dyn Processor>>,
}

impl Cache {
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Self {
        Self {
            store: Mutex::new(RecordStore::default()),
            processors,
        }
    }

    pub async fn get(&self, path: &str) -> Option<Value> {
        self.store.lock().await.get(path)
    }

    pub async fn has(&self, path: &str) -> bool {
        self.store.lock().await.has(path)
    }

    pub async fn get_record(&self, identity: &RecordIdentity) -> Option<Record> {
        self.store.lock().await.get_record(identity).cloned()
    }

    /// Replace the entire record map and re-run processor initialization.
    pub async fn reset(&self, records: Vec<Record>) {
        let mut guard = self.store.lock().await;
        guard.records = records
            .into_iter()
            .map(|r| ((r.type_.clone(), r.id.clone()), r))
            .collect();
        let snapshot = guard.clone();
        drop(guard);
        for processor in &self.processors {
            processor.on_reset(&snapshot).await;
        }
    }

    pub async fn dump(&self) -> Vec<Record> {
        self.store.lock().await.iter().cloned().collect()
    }

    /// Apply operations one at a time, in submission order, running the
    /// processor protocol around each.
    ///
    /// Not transactional across the whole batch: a failure partway through
    /// leaves prior operations in this call applied. The cache is owned by
    /// a single source whose callers serialize transforms through an
    /// `ActionQueue`, so a failed patch is expected to be handled by the
    /// caller (typically surfacing the error and leaving recovery to a
    /// retried transform), not silently rolled back here.
    #[instrument(skip(self, ops))]
    pub async fn patch(&self, ops: Vec<Operation>) -> Result<(), ConduitError> {
        let mut guard = self.store.lock().await;
        for op in ops {
            self.apply_one(&mut guard, op).await?;
        }
        Ok(())
    }

    fn apply_one<'a>(
        &'a self,
        store: &'a mut RecordStore,
        op: Operation,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ConduitError>> + Send + 'a>>
    {
        Box::pin(async move {
            let mut before_ops = Vec::new();
            for processor in &self.processors {
                before_ops.extend(processor.before(store, &op).await?);
            }
            for extra in before_ops {
                self.apply_one(store, extra).await?;
            }

            store.apply_primitive(&op)?;

            let mut after_ops = Vec::new();
            for processor in &self.processors {
                after_ops.extend(processor.after(store, &op).await?);
            }
            for extra in after_ops {
                self.apply_one(store, extra).await?;
            }

            let mut finally_ops = Vec::new();
            for processor in &self.processors {
                finally_ops.extend(processor.finally(store, &op).await?);
            }
            for extra in finally_ops {
                self.apply_one(store, extra).await?;
            }

            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planet(id: &str, name: &str) -> Record {
        Record::new("planet", id).with_attribute("name", name)
    }

    #[tokio::test]
    async fn patch_add_and_read_back_attribute() {
        let cache = Cache::new(Vec::new());
        cache
            .patch(vec![Operation::AddRecord {
                record: planet("earth", "Earth"),
            }])
            .await
            .unwrap();

        assert_eq!(
            cache.get("planet/earth/attributes/name").await,
            Some(Value::String("Earth".to_string()))
        );
    }

    #[tokio::test]
    async fn replace_attribute_requires_existing_record() {
        let cache = Cache::new(Vec::new());
        let result = cache
            .patch(vec![Operation::ReplaceAttribute {
                record: RecordIdentity::new("planet", "earth"),
                attribute: "name".to_string(),
                value: Value::String("Earth".to_string()),
            }])
            .await;
        assert!(matches!(result, Err(ConduitError::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn reset_replaces_contents() {
        let cache = Cache::new(Vec::new());
        cache.reset(vec![planet("earth", "Earth")]).await;
        assert!(cache.has("planet/earth").await);
        cache.reset(vec![planet("mars", "Mars")]).await;
        assert!(!cache.has("planet/earth").await);
        assert!(cache.has("planet/mars").await);
    }

    #[tokio::test]
    async fn dump_after_reset_round_trips() {
        let cache = Cache::new(Vec::new());
        let data = vec![planet("earth", "Earth"), planet("mars", "Mars")];
        cache.reset(data.clone()).await;
        let mut dumped = cache.dump().await;
        dumped.sort_by(|a, b| a.id.cmp(&b.id));
        let mut expected = data;
        expected.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(dumped, expected);
    }
}
