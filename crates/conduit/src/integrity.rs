//! The cache integrity processor (spec §4.C): maintains the reverse index
//! `_rev`, keeps a declared `inverse` relationship in sync on both sides
//! (spec §3 invariant 2, §8 I2), and emits the compensating operations
//! relational consistency requires — detaching inverses when a record is
//! removed, cascading `dependent: remove` relationships. `_rev` itself is
//! private to this processor; nothing outside ever reads it directly
//! except through the processor's own test-only accessors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;

use conduit_api::{ConduitError, Operation, Record, RecordIdentity, RelationshipData};
use conduit_core::{RelationshipKind as SchemaRelKind, Schema};

use crate::cache::RecordStore;
use crate::processor::Processor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RevKind {
    HasOne,
    HasMany,
}

#[derive(Clone, Debug)]
struct RevEntry {
    source: RecordIdentity,
    relationship: String,
    kind: RevKind,
}

/// `_rev[related] -> { path -> entry }`, keyed by the related record's
/// identity and the exact `sourcePath` string spec §4.C describes.
type RevIndex = HashMap<(String, String), HashMap<String, RevEntry>>;

fn rev_path(source: &RecordIdentity, relationship: &str, related: Option<&RecordIdentity>) -> String {
    match related {
        Some(r) => format!(
            "{}/{}/relationships/{}/data/{}",
            source.type_, source.id, relationship, r.to_key()
        ),
        None => format!("{}/{}/relationships/{}/data", source.type_, source.id, relationship),
    }
}

pub struct IntegrityProcessor {
    schema: Arc<Schema>,
    rev: Mutex<RevIndex>,
    removing: Mutex<HashSet<(String, String)>>,
    /// Pre-mutation snapshots of a record, captured in `before` so `after`
    /// can diff or cascade against the value that is about to disappear.
    record_snapshots: Mutex<HashMap<(String, String), Record>>,
    /// Pre-mutation snapshot of a single relationship slot, for
    /// `replaceHasOne`/`replaceHasMany` diffing.
    relationship_snapshots: Mutex<HashMap<(String, String, String), RelationshipData>>,
}

impl IntegrityProcessor {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            rev: Mutex::new(HashMap::new()),
            removing: Mutex::new(HashSet::new()),
            record_snapshots: Mutex::new(HashMap::new()),
            relationship_snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Test/diagnostic accessor: does `_rev[related]` contain `path`?
    pub async fn contains_rev(&self, related: &RecordIdentity, path: &str) -> bool {
        self.rev
            .lock()
            .await
            .get(&(related.type_.clone(), related.id.clone()))
            .map(|paths| paths.contains_key(path))
            .unwrap_or(false)
    }

    pub async fn rev_is_empty(&self, related: &RecordIdentity) -> bool {
        self.rev
            .lock()
            .await
            .get(&(related.type_.clone(), related.id.clone()))
            .map(|paths| paths.is_empty())
            .unwrap_or(true)
    }

    async fn rev_add(&self, related: &RecordIdentity, entry: RevEntry, path: String) {
        self.rev
            .lock()
            .await
            .entry((related.type_.clone(), related.id.clone()))
            .or_default()
            .insert(path, entry);
    }

    async fn rev_remove(&self, related: &RecordIdentity, path: &str) {
        if let Some(paths) = self
            .rev
            .lock()
            .await
            .get_mut(&(related.type_.clone(), related.id.clone()))
        {
            paths.remove(path);
        }
    }

    fn relationship_kind(&self, type_: &str, relationship: &str) -> RevKind {
        match self
            .schema
            .relationship(type_, relationship)
            .map(|d| d.kind)
        {
            Some(SchemaRelKind::HasMany) => RevKind::HasMany,
            _ => RevKind::HasOne,
        }
    }

    async fn index_record_relationships(&self, record: &Record) {
        let source = record.identity();
        for (rel_name, data) in &record.relationships {
            match data {
                RelationshipData::HasOne(Some(target)) => {
                    let path = rev_path(&source, rel_name, None);
                    self.rev_add(
                        target,
                        RevEntry {
                            source: source.clone(),
                            relationship: rel_name.clone(),
                            kind: RevKind::HasOne,
                        },
                        path,
                    )
                    .await;
                }
                RelationshipData::HasMany(set) => {
                    for target in set {
                        let path = rev_path(&source, rel_name, Some(target));
                        self.rev_add(
                            target,
                            RevEntry {
                                source: source.clone(),
                                relationship: rel_name.clone(),
                                kind: RevKind::HasMany,
                            },
                            path,
                        )
                        .await;
                    }
                }
                RelationshipData::HasOne(None) => {}
            }
        }
    }

    async fn unindex_record_relationships(&self, record: &Record) {
        let source = record.identity();
        for (rel_name, data) in &record.relationships {
            match data {
                RelationshipData::HasOne(Some(target)) => {
                    self.rev_remove(target, &rev_path(&source, rel_name, None)).await;
                }
                RelationshipData::HasMany(set) => {
                    for target in set {
                        self.rev_remove(target, &rev_path(&source, rel_name, Some(target))).await;
                    }
                }
                RelationshipData::HasOne(None) => {}
            }
        }
    }

    async fn snapshot_record(&self, identity: &RecordIdentity, store: &RecordStore) {
        if let Some(record) = store.get_record(identity) {
            self.record_snapshots
                .lock()
                .await
                .insert((identity.type_.clone(), identity.id.clone()), record.clone());
        }
    }

    async fn take_record_snapshot(&self, identity: &RecordIdentity) -> Option<Record> {
        self.record_snapshots
            .lock()
            .await
            .remove(&(identity.type_.clone(), identity.id.clone()))
    }

    async fn snapshot_relationship(&self, identity: &RecordIdentity, relationship: &str, store: &RecordStore) {
        if let Some(data) = store
            .get_record(identity)
            .and_then(|r| r.relationships.get(relationship))
        {
            self.relationship_snapshots.lock().await.insert(
                (identity.type_.clone(), identity.id.clone(), relationship.to_string()),
                data.clone(),
            );
        }
    }

    async fn take_relationship_snapshot(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Option<RelationshipData> {
        self.relationship_snapshots.lock().await.remove(&(
            identity.type_.clone(),
            identity.id.clone(),
            relationship.to_string(),
        ))
    }

    /// Emit the back-pointer cleanup for every entry in `_rev[target]`,
    /// e.g. when `target` is about to be removed.
    async fn cleanup_ops_for(&self, target: &RecordIdentity) -> Vec<Operation> {
        let guard = self.rev.lock().await;
        let Some(paths) = guard.get(&(target.type_.clone(), target.id.clone())) else {
            return Vec::new();
        };
        paths
            .values()
            .map(|entry| match entry.kind {
                RevKind::HasMany => Operation::RemoveFromHasMany {
                    record: entry.source.clone(),
                    relationship: entry.relationship.clone(),
                    related_record: target.clone(),
                },
                RevKind::HasOne => Operation::ReplaceHasOne {
                    record: entry.source.clone(),
                    relationship: entry.relationship.clone(),
                    related_record: None,
                },
            })
            .collect()
    }

    fn dependent_remove_ops(&self, record: &Record, removing: &HashSet<(String, String)>) -> Vec<Operation> {
        let Some(model) = self.schema.model(&record.type_) else {
            return Vec::new();
        };
        let mut ops = Vec::new();
        for (rel_name, descriptor) in &model.relationships {
            if descriptor.dependent.is_none() {
                continue;
            }
            let Some(data) = record.relationships.get(rel_name) else {
                continue;
            };
            let targets: Vec<RecordIdentity> = match data {
                RelationshipData::HasOne(Some(t)) => vec![t.clone()],
                RelationshipData::HasOne(None) => Vec::new(),
                RelationshipData::HasMany(set) => set.iter().cloned().collect(),
            };
            for target in targets {
                if removing.contains(&(target.type_.clone(), target.id.clone())) {
                    continue;
                }
                ops.push(Operation::RemoveRecord { record: target });
            }
        }
        ops
    }

    /// Does `data` currently point at `target` (a hasOne equal to it, or a
    /// hasMany containing it)?
    fn relationship_points_at(data: &RelationshipData, target: &RecordIdentity) -> bool {
        match data {
            RelationshipData::HasOne(Some(t)) => t == target,
            RelationshipData::HasOne(None) => false,
            RelationshipData::HasMany(set) => set.contains(target),
        }
    }

    /// `source.relationship` now points at `target` (an add-style change).
    /// If `relationship` declares an `inverse`, return the op that makes
    /// `target`'s inverse slot point back at `source` — unless it already
    /// does, which is what stops inverse-of-inverse emission from
    /// recursing: applying the returned op re-enters `after` on `target`,
    /// finds `source.relationship` already satisfied, and emits nothing.
    ///
    /// `target` must already be in the store: a relationship may point at a
    /// record that hasn't arrived yet (a batch can add both sides in either
    /// order, or just one), and there's nothing to set an inverse slot on
    /// until it does.
    fn inverse_add_op(
        &self,
        store: &RecordStore,
        source: &RecordIdentity,
        relationship: &str,
        target: &RecordIdentity,
    ) -> Option<Operation> {
        let descriptor = self.schema.relationship(&source.type_, relationship)?;
        let inverse_name = descriptor.inverse.as_ref()?;
        let inverse_descriptor = self.schema.relationship(&target.type_, inverse_name)?;
        let target_record = store.get_record(target)?;

        let already_set = target_record
            .relationships
            .get(inverse_name)
            .map(|data| Self::relationship_points_at(data, source))
            .unwrap_or(false);
        if already_set {
            return None;
        }

        Some(match inverse_descriptor.kind {
            SchemaRelKind::HasOne => Operation::ReplaceHasOne {
                record: target.clone(),
                relationship: inverse_name.clone(),
                related_record: Some(source.clone()),
            },
            SchemaRelKind::HasMany => Operation::AddToHasMany {
                record: target.clone(),
                relationship: inverse_name.clone(),
                related_record: source.clone(),
            },
        })
    }

    fn targets_of(data: &RelationshipData) -> HashSet<RecordIdentity> {
        match data {
            RelationshipData::HasOne(Some(t)) => HashSet::from([t.clone()]),
            RelationshipData::HasOne(None) => HashSet::new(),
            RelationshipData::HasMany(set) => set.clone(),
        }
    }

    /// Relationship pointers present on `new` but not on `prior`, for
    /// `replaceRecord`'s inverse maintenance. Only the add direction: a
    /// pointer `prior` had that `new` dropped is left alone, matching
    /// `removeFromHasMany`/`replaceHasOne(None)` not cascading either (spec
    /// §4.C scopes this processor to establishing, not revoking, inverses).
    fn added_relationship_targets(prior: &Record, new: &Record) -> Vec<(String, RecordIdentity)> {
        let mut added = Vec::new();
        for (rel_name, data) in &new.relationships {
            let prior_targets = prior.relationships.get(rel_name).map(Self::targets_of).unwrap_or_default();
            for target in Self::targets_of(data).difference(&prior_targets) {
                added.push((rel_name.clone(), target.clone()));
            }
        }
        added
    }

    /// Inverse-add ops for every relationship pointer a freshly added (or
    /// replaced-in) record carries.
    fn inverse_add_ops_for_record(&self, store: &RecordStore, record: &Record) -> Vec<Operation> {
        let source = record.identity();
        let mut ops = Vec::new();
        for (rel_name, data) in &record.relationships {
            match data {
                RelationshipData::HasOne(Some(target)) => {
                    ops.extend(self.inverse_add_op(store, &source, rel_name, target));
                }
                RelationshipData::HasMany(set) => {
                    for target in set {
                        ops.extend(self.inverse_add_op(store, &source, rel_name, target));
                    }
                }
                RelationshipData::HasOne(None) => {}
            }
        }
        ops
    }
}

#[async_trait]
impl Processor for IntegrityProcessor {
    #[instrument(skip(self, store, op))]
    async fn before(&self, store: &RecordStore, op: &Operation) -> Result<Vec<Operation>, ConduitError> {
        match op {
            Operation::ReplaceRecord { record } => {
                self.snapshot_record(&record.identity(), store).await;
            }
            Operation::RemoveRecord { record } => {
                self.snapshot_record(record, store).await;
                self.removing
                    .lock()
                    .await
                    .insert((record.type_.clone(), record.id.clone()));
            }
            Operation::ReplaceHasOne {
                record, relationship, ..
            } => {
                self.snapshot_relationship(record, relationship, store).await;
            }
            Operation::ReplaceHasMany {
                record, relationship, ..
            } => {
                self.snapshot_relationship(record, relationship, store).await;
            }
            _ => {}
        }
        Ok(Vec::new())
    }

    #[instrument(skip(self, store, op))]
    async fn after(&self, store: &RecordStore, op: &Operation) -> Result<Vec<Operation>, ConduitError> {
        match op {
            Operation::AddRecord { record } => {
                self.index_record_relationships(record).await;
                Ok(self.inverse_add_ops_for_record(store, record))
            }
            Operation::ReplaceRecord { record } => {
                let mut ops = Vec::new();
                if let Some(prior) = self.take_record_snapshot(&record.identity()).await {
                    self.unindex_record_relationships(&prior).await;
                    let source = record.identity();
                    for (rel_name, target) in Self::added_relationship_targets(&prior, record) {
                        ops.extend(self.inverse_add_op(store, &source, &rel_name, &target));
                    }
                }
                self.index_record_relationships(record).await;
                Ok(ops)
            }
            Operation::RemoveRecord { record } => {
                let mut ops = self.cleanup_ops_for(record).await;
                if let Some(prior) = self.take_record_snapshot(record).await {
                    self.unindex_record_relationships(&prior).await;
                    let removing = self.removing.lock().await.clone();
                    ops.extend(self.dependent_remove_ops(&prior, &removing));
                }
                Ok(ops)
            }
            Operation::AddToHasMany {
                record,
                relationship,
                related_record,
            } => {
                let path = rev_path(record, relationship, Some(related_record));
                let kind = self.relationship_kind(&record.type_, relationship);
                self.rev_add(
                    related_record,
                    RevEntry {
                        source: record.clone(),
                        relationship: relationship.clone(),
                        kind,
                    },
                    path,
                )
                .await;
                Ok(self
                    .inverse_add_op(store, record, relationship, related_record)
                    .into_iter()
                    .collect())
            }
            Operation::RemoveFromHasMany {
                record,
                relationship,
                related_record,
            } => {
                self.rev_remove(related_record, &rev_path(record, relationship, Some(related_record)))
                    .await;
                Ok(Vec::new())
            }
            Operation::ReplaceHasOne {
                record,
                relationship,
                related_record,
            } => {
                let mut ops = Vec::new();
                if let Some(RelationshipData::HasOne(Some(prior_target))) =
                    self.take_relationship_snapshot(record, relationship).await
                {
                    self.rev_remove(&prior_target, &rev_path(record, relationship, None)).await;
                }
                if let Some(target) = related_record {
                    self.rev_add(
                        target,
                        RevEntry {
                            source: record.clone(),
                            relationship: relationship.clone(),
                            kind: RevKind::HasOne,
                        },
                        rev_path(record, relationship, None),
                    )
                    .await;
                    ops.extend(self.inverse_add_op(store, record, relationship, target));
                }
                Ok(ops)
            }
            Operation::ReplaceHasMany {
                record,
                relationship,
                related_records,
            } => {
                let prior = self
                    .take_relationship_snapshot(record, relationship)
                    .await
                    .and_then(|d| d.as_has_many().cloned())
                    .unwrap_or_default();
                let mut ops = Vec::new();
                for removed in prior.difference(related_records) {
                    self.rev_remove(removed, &rev_path(record, relationship, Some(removed))).await;
                }
                for added in related_records.difference(&prior) {
                    self.rev_add(
                        added,
                        RevEntry {
                            source: record.clone(),
                            relationship: relationship.clone(),
                            kind: RevKind::HasMany,
                        },
                        rev_path(record, relationship, Some(added)),
                    )
                    .await;
                    ops.extend(self.inverse_add_op(store, record, relationship, added));
                }
                Ok(ops)
            }
            _ => Ok(Vec::new()),
        }
    }

    async fn finally(&self, _store: &RecordStore, op: &Operation) -> Result<Vec<Operation>, ConduitError> {
        if let Operation::RemoveRecord { record } = op {
            self.rev
                .lock()
                .await
                .remove(&(record.type_.clone(), record.id.clone()));
            self.removing
                .lock()
                .await
                .remove(&(record.type_.clone(), record.id.clone()));
        }
        Ok(Vec::new())
    }

    async fn on_reset(&self, store: &RecordStore) {
        *self.rev.lock().await = HashMap::new();
        self.removing.lock().await.clear();
        self.record_snapshots.lock().await.clear();
        self.relationship_snapshots.lock().await.clear();
        for record in store.iter() {
            self.index_record_relationships(record).await;
        }
    }
}
