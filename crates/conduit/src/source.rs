//! Source base (spec §4.D): the "evented mixin" a concrete source is built
//! from, plus the ingress (`Transformable`) and egress (`Updatable`,
//! `Fetchable`) capability wrappers layered on top of it.
//!
//! Concrete sources (the JSON:API adapter, the local-storage adapter, an
//! in-memory store) implement [`TransformHandler`]/[`UpdateHandler`]/
//! [`FetchHandler`] for their own `_transform`/`_update`/`_fetch`, and get
//! `transform()`/`update()`/`fetch()` — the public surface with the event
//! lifecycle and dedup/queueing wired in — for free via blanket impls.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use conduit_api::{ConduitError, Query, Record, Transform};
use conduit_core::{ActionQueue, EventArg, EventBus};

/// Shared machinery every `Source` is built from: its event bus, its
/// transform queue, and the bounded set of transform ids it has already
/// applied (invariant I4).
pub struct SourceContext {
    pub events: EventBus,
    transform_queue: ActionQueue<Transform>,
    applied: Mutex<AppliedTransforms>,
}

struct AppliedTransforms {
    seen: std::collections::HashSet<Uuid>,
    order: VecDeque<Uuid>,
    capacity: usize,
}

impl AppliedTransforms {
    fn new(capacity: usize) -> Self {
        Self {
            seen: std::collections::HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    fn record(&mut self, id: Uuid) {
        if self.seen.insert(id) {
            self.order.push_back(id);
            while self.order.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.seen.remove(&oldest);
                }
            }
        }
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl SourceContext {
    /// `dedup_capacity` bounds the applied-transform-id set (design note:
    /// "must be bounded (LRU by time) in a long-running process"). We use
    /// insertion-order eviction, which is LRU-by-arrival for an
    /// append-only id stream such as this one.
    pub fn new(dedup_capacity: usize) -> Self {
        Self {
            events: EventBus::new(),
            transform_queue: ActionQueue::new(),
            applied: Mutex::new(AppliedTransforms::new(dedup_capacity)),
        }
    }
}

/// Implemented by a concrete source's internal transform logic.
#[async_trait]
pub trait TransformHandler: Send + Sync {
    fn context(&self) -> &SourceContext;

    /// Apply `t` against this source's own storage, returning the
    /// transform(s) that resulted (often just `t` itself, but a source may
    /// annotate or split it, e.g. after a server assigns a new id).
    async fn apply_transform(&self, t: Transform) -> Result<Vec<Transform>, ConduitError>;
}

/// Ingress capability: `transform(t)` with idempotent dedup, queueing, and
/// the `beforeTransform`/`transform` event lifecycle (spec §4.D).
#[async_trait]
pub trait Transformable: Send + Sync {
    async fn transform(&self, t: Transform) -> Result<Vec<Transform>, ConduitError>;
}

#[async_trait]
impl<S: TransformHandler + ?Sized> Transformable for S {
    #[instrument(skip(self, t), fields(transform_id = %t.id))]
    async fn transform(&self, t: Transform) -> Result<Vec<Transform>, ConduitError> {
        {
            let applied = self.context().applied.lock().await;
            if applied.contains(&t.id) {
                return Ok(Vec::new());
            }
        }

        let queue = &self.context().transform_queue;
        let events = self.context().events.clone();
        let transform_id = t.id;
        let action = conduit_core::Action::new(format!("transform:{transform_id}"), {
            let t = t.clone();
            move || {
                let events = events.clone();
                let t = t.clone();
                async move {
                    events.series("beforeTransform", EventArg::Transform(t.clone())).await?;
                    Ok(t)
                }
            }
        });
        let handle = queue.push(action).await;
        let staged = handle.complete().await?;

        let results = self.apply_transform(staged).await?;

        {
            let mut applied = self.context().applied.lock().await;
            for result in &results {
                applied.record(result.id);
            }
        }

        // `settle_propagating`, not plain `settle`: every listener still
        // runs regardless of an earlier one's failure, but a blocking
        // `SyncStrategy`'s target-sync failure is handed back to this
        // call's caller rather than only logged (spec §4.F).
        for result in &results {
            self.context()
                .events
                .settle_propagating("transform", EventArg::Transform(result.clone()))
                .await?;
        }

        Ok(results)
    }
}

/// Implemented by a concrete source's internal update logic.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    fn context(&self) -> &SourceContext;
    async fn apply_update(&self, t: Transform) -> Result<Vec<Transform>, ConduitError>;
}

/// Egress capability: `update(t)` with the `beforeUpdate`/`update` event
/// lifecycle. `beforeUpdate` runs with **series** discipline, so a
/// `RequestStrategy` listener there can veto (or substitute the result of)
/// the update before this source applies it.
#[async_trait]
pub trait Updatable: Send + Sync {
    async fn update(&self, t: Transform) -> Result<Vec<Transform>, ConduitError>;
}

#[async_trait]
impl<S: UpdateHandler + ?Sized> Updatable for S {
    #[instrument(skip(self, t), fields(transform_id = %t.id))]
    async fn update(&self, t: Transform) -> Result<Vec<Transform>, ConduitError> {
        self.context()
            .events
            .series("beforeUpdate", EventArg::Transform(t.clone()))
            .await?;

        let result = self.apply_update(t.clone()).await?;

        self.context()
            .events
            .settle("update", EventArg::TransformResult(t, result.clone()))
            .await;

        Ok(result)
    }
}

/// Implemented by a concrete source's internal fetch logic.
#[async_trait]
pub trait FetchHandler: Send + Sync {
    fn context(&self) -> &SourceContext;
    async fn apply_fetch(&self, q: Query) -> Result<Vec<Record>, ConduitError>;
}

/// Egress capability: `fetch(q)` with the `beforeQuery`/`query` event
/// lifecycle, mirroring `Updatable`.
#[async_trait]
pub trait Fetchable: Send + Sync {
    async fn fetch(&self, q: Query) -> Result<Vec<Record>, ConduitError>;
}

#[async_trait]
impl<S: FetchHandler + ?Sized> Fetchable for S {
    #[instrument(skip(self, q))]
    async fn fetch(&self, q: Query) -> Result<Vec<Record>, ConduitError> {
        self.context()
            .events
            .series("beforeQuery", EventArg::Query(q.clone()))
            .await?;

        let result = self.apply_fetch(q.clone()).await?;

        self.context()
            .events
            .settle("query", EventArg::QueryResult(q, result.clone()))
            .await;

        Ok(result)
    }
}

/// `Queryable` mirrors `Fetchable` at the store-facing name the spec uses
/// for the application-facing surface (`query`) versus the source-internal
/// egress hook (`fetch`); both route through the same event lifecycle.
#[async_trait]
pub trait Queryable: Send + Sync {
    async fn query(&self, q: Query) -> Result<Vec<Record>, ConduitError>;
}

#[async_trait]
impl<S: Fetchable + ?Sized> Queryable for S {
    async fn query(&self, q: Query) -> Result<Vec<Record>, ConduitError> {
        self.fetch(q).await
    }
}

/// Object-safe handle used by coordinators/strategies to address a source
/// generically, regardless of which capabilities it implements.
pub trait Source: Send + Sync {
    fn context(&self) -> &SourceContext;
}

/// The combination a `Coordinator` node actually stores: a source wired
/// into the full capability set strategies address. A concrete source
/// that doesn't meaningfully support one of these (e.g. a read-only
/// upstream has no reason to accept `transform`) still implements the
/// corresponding handler trait, typically by rejecting with `NotAllowed`.
pub trait FullSource: Source + Transformable + Updatable + Fetchable + Queryable {}

impl<T: Source + Transformable + Updatable + Fetchable + Queryable + ?Sized> FullSource for T {}
