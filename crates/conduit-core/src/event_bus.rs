//! The `Notifier`/`Evented` pub-sub bus (spec §4.A).
//!
//! A single `EventBus` is the intern table for one source: every event name
//! it knows about — `beforeUpdate`, `update`, `beforeQuery`, `query`,
//! `beforeTransform`, `transform` — shares this one registry, and the four
//! dispatch disciplines (`emit`, `settle`, `series`, `resolve`) are plain
//! methods over the same listener list rather than four separate bus types.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use conduit_api::{ConduitError, Query, Record, Transform};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The payload carried by an event emission.
///
/// Concrete rather than type-erased: the engine only ever needs to move a
/// `Transform` or a `Query` (optionally paired with its result) across the
/// bus, so a small tagged enum is simpler and safer here than `dyn Any`.
#[derive(Clone, Debug)]
pub enum EventArg {
    Transform(Transform),
    TransformResult(Transform, Vec<Transform>),
    Query(Query),
    QueryResult(Query, Vec<Record>),
    Unit,
}

impl EventArg {
    pub fn as_transform(&self) -> Option<&Transform> {
        match self {
            EventArg::Transform(t) | EventArg::TransformResult(t, _) => Some(t),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&Query> {
        match self {
            EventArg::Query(q) | EventArg::QueryResult(q, _) => Some(q),
            _ => None,
        }
    }

    /// "Truthy" in the sense `resolve()` needs: something a listener
    /// actively produced, not just the no-op `Unit` default.
    fn is_truthy(&self) -> bool {
        !matches!(self, EventArg::Unit)
    }
}

type ListenerFn =
    Arc<dyn Fn(EventArg) -> BoxFuture<'static, Result<EventArg, ConduitError>> + Send + Sync>;

#[derive(Clone)]
struct ListenerEntry {
    id: u64,
    once: bool,
    callback: ListenerFn,
}

/// Listener handle returned by `on`/`one`, needed to `off()` it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerId(u64);

/// Split `"update query"`-style space-separated event aliases into individual names.
fn normalize_event_names(names: &str) -> Vec<String> {
    names.split_whitespace().map(str::to_string).collect()
}

/// Cheaply cloneable: every clone shares the same listener registry, so a
/// `Source` can hand its bus to background tasks without wrapping it in an
/// `Arc` itself.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<Mutex<HashMap<String, Vec<ListenerEntry>>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, names: &str, once: bool, callback: ListenerFn) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = ListenerEntry { id, once, callback };
        let mut guard = self.listeners.lock().await;
        for name in normalize_event_names(names) {
            guard.entry(name).or_default().push(entry.clone());
        }
        ListenerId(id)
    }

    /// Register a listener for one or more whitespace-separated event names.
    pub async fn on<F, Fut>(&self, names: &str, callback: F) -> ListenerId
    where
        F: Fn(EventArg) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<EventArg, ConduitError>> + Send + 'static,
    {
        self.register(names, false, Arc::new(move |arg| Box::pin(callback(arg))))
            .await
    }

    /// Register a listener that auto-deregisters after its first invocation.
    pub async fn one<F, Fut>(&self, names: &str, callback: F) -> ListenerId
    where
        F: Fn(EventArg) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<EventArg, ConduitError>> + Send + 'static,
    {
        self.register(names, true, Arc::new(move |arg| Box::pin(callback(arg))))
            .await
    }

    pub async fn off(&self, id: ListenerId) {
        let mut guard = self.listeners.lock().await;
        for entries in guard.values_mut() {
            entries.retain(|e| e.id != id.0);
        }
    }

    async fn snapshot(&self, name: &str) -> Vec<ListenerEntry> {
        let guard = self.listeners.lock().await;
        guard.get(name).cloned().unwrap_or_default()
    }

    async fn drop_once(&self, name: &str, id: u64) {
        let mut guard = self.listeners.lock().await;
        if let Some(entries) = guard.get_mut(name) {
            entries.retain(|e| e.id != id);
        }
    }

    /// Fire-and-forget: listeners run in registration order on a detached
    /// task. The caller does not await completion and listener return
    /// values are ignored, beyond logging a rejection.
    pub fn emit(&self, name: &str, arg: EventArg) {
        let name = name.to_string();
        let bus = self.clone();
        debug!(event = %name, "emit");
        tokio::spawn(async move {
            let entries = bus.snapshot(&name).await;
            for entry in entries {
                if let Err(err) = (entry.callback)(arg.clone()).await {
                    warn!(event = %name, error = %err, "emit listener failed");
                }
                if entry.once {
                    bus.drop_once(&name, entry.id).await;
                }
            }
        });
    }

    /// Await every listener sequentially; a failing listener is logged and
    /// skipped rather than aborting the rest.
    pub async fn settle(&self, name: &str, arg: EventArg) {
        debug!(event = %name, "settle");
        let entries = self.snapshot(name).await;
        for entry in entries {
            if let Err(err) = (entry.callback)(arg.clone()).await {
                warn!(event = %name, error = %err, "settle listener failed, continuing");
            }
            if entry.once {
                self.drop_once(name, entry.id).await;
            }
        }
    }

    /// Same traversal as `settle` — every listener runs, a failing one
    /// never aborts the rest — but the first failure is handed back to the
    /// caller afterwards instead of only being logged.
    ///
    /// `Transformable::transform` emits `"transform"` through this instead
    /// of plain `settle` so that a blocking `SyncStrategy`'s target-sync
    /// listener can fail the originating `transform()` call (spec §4.F:
    /// "failure … surfaces up and fails the source's operation"), while a
    /// non-blocking sync listener — which always resolves `Ok` itself and
    /// reports its target's failure only via a detached task — is
    /// unaffected either way.
    pub async fn settle_propagating(&self, name: &str, arg: EventArg) -> Result<(), ConduitError> {
        debug!(event = %name, "settle_propagating");
        let entries = self.snapshot(name).await;
        let mut first_err = None;
        for entry in entries {
            if let Err(err) = (entry.callback)(arg.clone()).await {
                warn!(event = %name, error = %err, "settle listener failed, continuing");
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
            if entry.once {
                self.drop_once(name, entry.id).await;
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Await listeners sequentially; the first failure aborts the rest and
    /// is returned to the caller.
    pub async fn series(&self, name: &str, arg: EventArg) -> Result<(), ConduitError> {
        debug!(event = %name, "series");
        let entries = self.snapshot(name).await;
        for entry in entries {
            let result = (entry.callback)(arg.clone()).await;
            if entry.once {
                self.drop_once(name, entry.id).await;
            }
            result?;
        }
        Ok(())
    }

    /// Invoke listeners sequentially; the first to return a truthy value
    /// wins. If none do, the call rejects.
    pub async fn resolve(&self, name: &str, arg: EventArg) -> Result<EventArg, ConduitError> {
        debug!(event = %name, "resolve");
        let entries = self.snapshot(name).await;
        for entry in entries {
            let result = (entry.callback)(arg.clone()).await?;
            if entry.once {
                self.drop_once(name, entry.id).await;
            }
            if result.is_truthy() {
                return Ok(result);
            }
        }
        Err(ConduitError::other(format!(
            "no listener for \"{name}\" resolved a value"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn settle_runs_every_listener_despite_failures() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = calls.clone();
        bus.on("update", move |_arg| {
            let c1 = c1.clone();
            async move {
                c1.fetch_add(1, Ordering::SeqCst);
                Err(ConduitError::other("boom"))
            }
        })
        .await;

        let c2 = calls.clone();
        bus.on("update", move |_arg| {
            let c2 = c2.clone();
            async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(EventArg::Unit)
            }
        })
        .await;

        bus.settle("update", EventArg::Unit).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn settle_propagating_runs_every_listener_then_returns_first_error() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.on("transform", |_arg| async { Err(ConduitError::other("target unreachable")) })
            .await;

        let c2 = calls.clone();
        bus.on("transform", move |_arg| {
            let c2 = c2.clone();
            async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(EventArg::Unit)
            }
        })
        .await;

        let result = bus.settle_propagating("transform", EventArg::Unit).await;
        assert!(result.is_err());
        // unlike `series`, the second listener still ran despite the first's failure
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn series_aborts_on_first_failure() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.on("beforeUpdate", |_arg| async { Err(ConduitError::not_allowed("no")) })
            .await;

        let c2 = calls.clone();
        bus.on("beforeUpdate", move |_arg| {
            let c2 = c2.clone();
            async move {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(EventArg::Unit)
            }
        })
        .await;

        let result = bus.series("beforeUpdate", EventArg::Unit).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolve_returns_first_truthy_value() {
        let bus = EventBus::new();
        bus.on("beforeQuery", |_arg| async { Ok(EventArg::Unit) })
            .await;
        bus.on("beforeQuery", |_arg| async {
            Ok(EventArg::QueryResult(Query::find_records("note"), vec![]))
        })
        .await;

        let result = bus.resolve("beforeQuery", EventArg::Unit).await.unwrap();
        assert!(matches!(result, EventArg::QueryResult(_, _)));
    }

    #[tokio::test]
    async fn resolve_rejects_when_nothing_resolves() {
        let bus = EventBus::new();
        bus.on("beforeQuery", |_arg| async { Ok(EventArg::Unit) })
            .await;

        let result = bus.resolve("beforeQuery", EventArg::Unit).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn one_listener_fires_only_once() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        bus.one("update", move |_arg| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(EventArg::Unit)
            }
        })
        .await;

        bus.settle("update", EventArg::Unit).await;
        bus.settle("update", EventArg::Unit).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn off_deregisters_a_listener() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let id = bus
            .on("update", move |_arg| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok(EventArg::Unit)
                }
            })
            .await;

        bus.off(id).await;
        bus.settle("update", EventArg::Unit).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
