//! `Store`: the concrete application-facing source spec.md §6 describes —
//! a [`Cache`] wired into the full capability set (`Transformable`,
//! `Updatable`, `Fetchable`/`Queryable`).
//!
//! `Store`'s egress handler (`apply_update`, i.e. its internal `_update`)
//! delegates back into its own `transform()` rather than independently
//! patching the cache. This is what makes spec.md §4's data-flow example
//! work out exactly as described: `beforeUpdate` fires first (series
//! discipline), a blocking `RequestStrategy` listener forwards the
//! original transform upstream and, on `syncResults`, replays the
//! upstream-resolved transform back through `store.transform()` —
//! applying it to the cache through the processor chain *before*
//! `apply_update` ever runs. `apply_update` then calls `transform()` again
//! with the *original* transform id; since JSON:API resolution preserves
//! the transform id (see `conduit_jsonapi::JsonApiSource::dispatch`), the
//! ingress dedup check (invariant I4) makes this second call a no-op
//! rather than a conflicting second write of an unresolved record.
use std::sync::Arc;

use async_trait::async_trait;

use conduit_api::{ConduitError, Query, Record, RelationshipData, Transform};

use crate::cache::Cache;
use crate::processor::Processor;
use crate::source::{FetchHandler, Source, SourceContext, Transformable, TransformHandler, UpdateHandler};

pub struct Store {
    ctx: SourceContext,
    cache: Cache,
}

impl Store {
    pub fn new(processors: Vec<Arc<dyn Processor>>) -> Self {
        Self {
            ctx: SourceContext::default(),
            cache: Cache::new(processors),
        }
    }

    pub fn with_context(mut self, ctx: SourceContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }
}

#[async_trait]
impl TransformHandler for Store {
    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    async fn apply_transform(&self, t: Transform) -> Result<Vec<Transform>, ConduitError> {
        self.cache.patch(t.operations.clone()).await?;
        Ok(vec![t])
    }
}

#[async_trait]
impl UpdateHandler for Store {
    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    async fn apply_update(&self, t: Transform) -> Result<Vec<Transform>, ConduitError> {
        self.transform(t).await
    }
}

#[async_trait]
impl FetchHandler for Store {
    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    async fn apply_fetch(&self, q: Query) -> Result<Vec<Record>, ConduitError> {
        match q {
            Query::FindRecord { record } => self
                .cache
                .get_record(&record)
                .await
                .map(|r| vec![r])
                .ok_or(ConduitError::RecordNotFound(record)),
            Query::FindRecords { type_, .. } => Ok(self
                .cache
                .dump()
                .await
                .into_iter()
                .filter(|r| r.type_ == type_)
                .collect()),
            Query::FindRelatedRecord { record, relationship } => {
                let rec = self
                    .cache
                    .get_record(&record)
                    .await
                    .ok_or_else(|| ConduitError::RecordNotFound(record.clone()))?;
                match rec.relationships.get(&relationship) {
                    Some(RelationshipData::HasOne(Some(target))) => {
                        Ok(self.cache.get_record(target).await.into_iter().collect())
                    }
                    Some(RelationshipData::HasOne(None)) => Ok(Vec::new()),
                    _ => Err(ConduitError::RelationshipNotFound { record, relationship }),
                }
            }
            Query::FindRelatedRecords { record, relationship } => {
                let rec = self
                    .cache
                    .get_record(&record)
                    .await
                    .ok_or_else(|| ConduitError::RecordNotFound(record.clone()))?;
                match rec.relationships.get(&relationship) {
                    Some(RelationshipData::HasMany(set)) => {
                        let mut out = Vec::with_capacity(set.len());
                        for id in set {
                            if let Some(r) = self.cache.get_record(id).await {
                                out.push(r);
                            }
                        }
                        Ok(out)
                    }
                    _ => Err(ConduitError::RelationshipNotFound { record, relationship }),
                }
            }
        }
    }
}

impl Source for Store {
    fn context(&self) -> &SourceContext {
        &self.ctx
    }
}
