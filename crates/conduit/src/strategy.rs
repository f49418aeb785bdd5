//! `SyncStrategy` and `RequestStrategy` (spec §4.F, §4.G): declarative
//! wiring between coordinator nodes, expressed as listeners installed on
//! one node's sources that forward to another node's sources.

use std::sync::Arc;

use tracing::warn;

use conduit_api::ConduitError;
use conduit_core::{EventArg, ListenerId};

use crate::coordinator::Coordinator;
use crate::source::{Fetchable, FullSource, Transformable, Updatable};

/// Non-blocking fan-out of applied transforms from `source_node` to
/// `target_node` (spec §4.F).
pub struct SyncStrategy {
    source_node: String,
    target_node: String,
    blocking: bool,
    listeners: std::sync::Mutex<Vec<(Arc<dyn FullSource>, ListenerId)>>,
}

impl SyncStrategy {
    pub fn new(source_node: impl Into<String>, target_node: impl Into<String>, blocking: bool) -> Self {
        Self {
            source_node: source_node.into(),
            target_node: target_node.into(),
            blocking,
            listeners: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn activate(&self, coordinator: &Coordinator) {
        let targets: Vec<Arc<dyn FullSource>> = coordinator.sources(&self.target_node).to_vec();
        let blocking = self.blocking;
        for source in coordinator.sources(&self.source_node) {
            let targets = targets.clone();
            let id = source
                .context()
                .events
                .on("transform", move |arg| {
                    let targets = targets.clone();
                    async move {
                        let Some(t) = arg.as_transform().cloned() else {
                            return Ok(EventArg::Unit);
                        };
                        if blocking {
                            for target in &targets {
                                target.transform(t.clone()).await?;
                            }
                        } else {
                            for target in &targets {
                                let target = target.clone();
                                let t = t.clone();
                                tokio::spawn(async move {
                                    if let Err(err) = target.transform(t).await {
                                        warn!(error = %err, "non-blocking sync to target failed");
                                    }
                                });
                            }
                        }
                        Ok(EventArg::Unit)
                    }
                })
                .await;
            self.listeners.lock().unwrap().push((source.clone(), id));
        }
    }

    pub async fn deactivate(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock().unwrap());
        for (source, id) in listeners {
            source.context().events.off(id).await;
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceEvent {
    BeforeQuery,
    BeforeUpdate,
}

impl SourceEvent {
    fn name(self) -> &'static str {
        match self {
            SourceEvent::BeforeQuery => "beforeQuery",
            SourceEvent::BeforeUpdate => "beforeUpdate",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetRequest {
    Fetch,
    Update,
}

/// Blocking or fire-and-forget forwarding of a query/transform from one
/// node to another, optionally syncing resulting transforms back (spec
/// §4.G).
pub struct RequestStrategy {
    source_node: String,
    target_node: String,
    source_event: SourceEvent,
    target_request: TargetRequest,
    blocking: bool,
    sync_results: bool,
    listeners: std::sync::Mutex<Vec<(Arc<dyn FullSource>, ListenerId)>>,
}

impl RequestStrategy {
    pub fn new(
        source_node: impl Into<String>,
        target_node: impl Into<String>,
        source_event: SourceEvent,
        target_request: TargetRequest,
        blocking: bool,
        sync_results: bool,
    ) -> Self {
        Self {
            source_node: source_node.into(),
            target_node: target_node.into(),
            source_event,
            target_request,
            blocking,
            sync_results,
            listeners: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub async fn activate(&self, coordinator: &Coordinator) {
        let targets: Vec<Arc<dyn FullSource>> = coordinator.sources(&self.target_node).to_vec();
        let target_request = self.target_request;
        let blocking = self.blocking;
        let sync_results = self.sync_results;

        for source in coordinator.sources(&self.source_node) {
            let targets = targets.clone();
            let source_for_sync = source.clone();
            let id = source
                .context()
                .events
                .on(self.source_event.name(), move |arg| {
                    let targets = targets.clone();
                    let source_for_sync = source_for_sync.clone();
                    async move {
                        let Some(target) = targets.first().cloned() else {
                            return Ok(EventArg::Unit);
                        };

                        let work = dispatch(target, target_request, arg.clone());

                        if blocking {
                            let resulting_transforms = work.await?;
                            if sync_results {
                                for t in resulting_transforms {
                                    source_for_sync.transform(t).await?;
                                }
                            }
                        } else {
                            tokio::spawn(async move {
                                match work.await {
                                    Ok(resulting_transforms) => {
                                        if sync_results {
                                            for t in resulting_transforms {
                                                if let Err(err) = source_for_sync.transform(t).await {
                                                    warn!(error = %err, "syncing request result back failed");
                                                }
                                            }
                                        }
                                    }
                                    Err(err) => {
                                        warn!(error = %err, "non-blocking request strategy dispatch failed");
                                    }
                                }
                            });
                        }

                        Ok(EventArg::Unit)
                    }
                })
                .await;
            self.listeners.lock().unwrap().push((source.clone(), id));
        }
    }

    pub async fn deactivate(&self) {
        let listeners = std::mem::take(&mut *self.listeners.lock().unwrap());
        for (source, id) in listeners {
            source.context().events.off(id).await;
        }
    }
}

/// Forward `arg` to `target` per `target_request`, normalizing the result
/// to the `Transform`s (if any) available for `syncResults` to replay.
async fn dispatch(
    target: Arc<dyn FullSource>,
    target_request: TargetRequest,
    arg: EventArg,
) -> Result<Vec<conduit_api::Transform>, ConduitError> {
    match target_request {
        TargetRequest::Update => {
            let Some(t) = arg.as_transform().cloned() else {
                return Ok(Vec::new());
            };
            target.update(t).await
        }
        TargetRequest::Fetch => {
            let Some(q) = arg.as_query().cloned() else {
                return Ok(Vec::new());
            };
            target.fetch(q).await?;
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::Node;
    use crate::test_support::NullSource;
    use conduit_api::{Operation, Record};

    fn sample_transform() -> conduit_api::Transform {
        conduit_api::Transform::single(Operation::AddRecord {
            record: Record::new("planet", "pluto"),
        })
    }

    #[tokio::test]
    async fn sync_strategy_forwards_applied_transforms() {
        let store = Arc::new(NullSource::default());
        let backup = Arc::new(NullSource::default());
        let coordinator = Coordinator::new()
            .with_node("store", Node::new(vec![store.clone()]))
            .with_node("backup", Node::new(vec![backup.clone()]));

        let strategy = SyncStrategy::new("store", "backup", true);
        strategy.activate(&coordinator).await;

        store.transform(sample_transform()).await.unwrap();

        assert_eq!(backup.transforms.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_strategy_blocking_forwards_before_update() {
        let store = Arc::new(NullSource::default());
        let upstream = Arc::new(NullSource::default());
        let coordinator = Coordinator::new()
            .with_node("store", Node::new(vec![store.clone()]))
            .with_node("upstream", Node::new(vec![upstream.clone()]));

        let strategy = RequestStrategy::new(
            "store",
            "upstream",
            SourceEvent::BeforeUpdate,
            TargetRequest::Update,
            true,
            false,
        );
        strategy.activate(&coordinator).await;

        store.update(sample_transform()).await.unwrap();
        assert_eq!(upstream.updates.lock().unwrap().len(), 1);
    }

    struct FailingTransformSource {
        ctx: crate::source::SourceContext,
    }

    impl Default for FailingTransformSource {
        fn default() -> Self {
            Self {
                ctx: crate::source::SourceContext::default(),
            }
        }
    }

    impl crate::source::Source for FailingTransformSource {
        fn context(&self) -> &crate::source::SourceContext {
            &self.ctx
        }
    }

    #[async_trait::async_trait]
    impl crate::source::TransformHandler for FailingTransformSource {
        fn context(&self) -> &crate::source::SourceContext {
            &self.ctx
        }

        async fn apply_transform(
            &self,
            _t: conduit_api::Transform,
        ) -> Result<Vec<conduit_api::Transform>, ConduitError> {
            Err(ConduitError::other("backup unreachable"))
        }
    }

    #[async_trait::async_trait]
    impl crate::source::UpdateHandler for FailingTransformSource {
        fn context(&self) -> &crate::source::SourceContext {
            &self.ctx
        }

        async fn apply_update(
            &self,
            t: conduit_api::Transform,
        ) -> Result<Vec<conduit_api::Transform>, ConduitError> {
            Ok(vec![t])
        }
    }

    #[async_trait::async_trait]
    impl crate::source::FetchHandler for FailingTransformSource {
        fn context(&self) -> &crate::source::SourceContext {
            &self.ctx
        }

        async fn apply_fetch(
            &self,
            _q: conduit_api::Query,
        ) -> Result<Vec<conduit_api::Record>, ConduitError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn blocking_sync_strategy_propagates_target_failure() {
        let store = Arc::new(NullSource::default());
        let backup = Arc::new(FailingTransformSource::default());
        let coordinator = Coordinator::new()
            .with_node("store", Node::new(vec![store.clone()]))
            .with_node("backup", Node::new(vec![backup.clone()]));

        let strategy = SyncStrategy::new("store", "backup", true);
        strategy.activate(&coordinator).await;

        let err = store.transform(sample_transform()).await.unwrap_err();
        assert!(matches!(err, ConduitError::Other { .. }));
    }

    #[tokio::test]
    async fn non_blocking_sync_strategy_swallows_target_failure() {
        let store = Arc::new(NullSource::default());
        let backup = Arc::new(FailingTransformSource::default());
        let coordinator = Coordinator::new()
            .with_node("store", Node::new(vec![store.clone()]))
            .with_node("backup", Node::new(vec![backup.clone()]));

        let strategy = SyncStrategy::new("store", "backup", false);
        strategy.activate(&coordinator).await;

        store.transform(sample_transform()).await.unwrap();
    }
}
