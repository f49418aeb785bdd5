//! `Action` / `ActionQueue` (spec §4.B): serialized, single-in-flight
//! side-effectful work with retry/skip semantics.
//!
//! A `Source` that talks to something with ordering requirements (an HTTP
//! API, a file on disk) wraps each unit of work in an `Action` and pushes it
//! onto an `ActionQueue`. The queue drives actions one at a time, in FIFO
//! order; a failed action can be retried in place (re-running its thunk) or
//! skipped (rejecting every awaiter and moving on), but it never blocks
//! actions queued after it by default.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use conduit_api::{ConduitError, QueueError};

type ActionThunk<T> =
    Box<dyn Fn() -> Pin<Box<dyn Future<Output = Result<T, ConduitError>> + Send>> + Send + Sync>;

#[derive(Clone)]
enum ActionState<T> {
    Pending,
    Processing,
    Succeeded(T),
    Failed(ConduitError),
}

/// A single unit of queued work.
///
/// Cloning an `Action` hands out another handle onto the same underlying
/// state; every clone's `complete()` resolves together.
pub struct Action<T: Clone + Send + 'static> {
    id: u64,
    label: String,
    thunk: Arc<ActionThunk<T>>,
    state: Arc<Mutex<ActionState<T>>>,
    notify: Arc<Notify>,
    max_retries: Option<u32>,
    attempts: Arc<AtomicU64>,
}

impl<T: Clone + Send + 'static> Clone for Action<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            label: self.label.clone(),
            thunk: self.thunk.clone(),
            state: self.state.clone(),
            notify: self.notify.clone(),
            max_retries: self.max_retries,
            attempts: self.attempts.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Action<T> {
    /// Build an action from an async thunk, re-invoked on every attempt
    /// (including retries). `label` is only used for logging.
    pub fn new<F, Fut>(label: impl Into<String>, thunk: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ConduitError>> + Send + 'static,
    {
        Self {
            id: next_action_id(),
            label: label.into(),
            thunk: Arc::new(Box::new(move || Box::pin(thunk()))),
            state: Arc::new(Mutex::new(ActionState::Pending)),
            notify: Arc::new(Notify::new()),
            // `None` preserves the queue's own unbounded-retry default; the
            // field exists so a caller can opt into a cap without the queue
            // needing to know about per-action policy.
            max_retries: None,
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves once the action has succeeded, failed terminally, or been
    /// skipped. Multiple callers (and multiple clones of the same `Action`)
    /// may all await this concurrently.
    pub async fn complete(&self) -> Result<T, ConduitError> {
        loop {
            {
                let guard = self.state.lock().await;
                match &*guard {
                    ActionState::Succeeded(value) => return Ok(value.clone()),
                    ActionState::Failed(err) => return Err(err.clone()),
                    ActionState::Pending | ActionState::Processing => {}
                }
            }
            self.notify.notified().await;
        }
    }

    async fn run_once(&self) -> Result<T, ConduitError> {
        *self.state.lock().await = ActionState::Processing;
        self.attempts.fetch_add(1, Ordering::SeqCst);
        (self.thunk)().await
    }

    async fn resolve_success(&self, value: T) {
        *self.state.lock().await = ActionState::Succeeded(value);
        self.notify.notify_waiters();
    }

    async fn resolve_failure(&self, err: ConduitError) {
        *self.state.lock().await = ActionState::Failed(err);
        self.notify.notify_waiters();
    }

    /// Rebuild `complete()` for a fresh attempt: a caller awaiting it after
    /// this point blocks again until the retried thunk resolves.
    async fn reset_for_retry(&self) {
        *self.state.lock().await = ActionState::Pending;
    }

    async fn is_pending(&self) -> bool {
        matches!(&*self.state.lock().await, ActionState::Pending)
    }

    fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn exhausted_retries(&self) -> bool {
        match self.max_retries {
            Some(cap) => self.attempts() > cap as u64,
            None => false,
        }
    }
}

static NEXT_ACTION_ID: AtomicU64 = AtomicU64::new(1);

fn next_action_id() -> u64 {
    NEXT_ACTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// A serial FIFO queue of `Action`s, each run to completion (or explicitly
/// retried/skipped) before the next one starts.
pub struct ActionQueue<T: Clone + Send + 'static> {
    inner: Arc<Mutex<QueueInner<T>>>,
    notify: Arc<Notify>,
}

struct QueueInner<T: Clone + Send + 'static> {
    pending: VecDeque<Action<T>>,
    running: bool,
    /// The head action parked after a failed attempt, waiting for the
    /// caller to `retry()` or `skip()` it. Any caller already awaiting
    /// that action's `complete()` saw the failure the moment the attempt
    /// failed — this only governs whether the queue itself advances.
    suspended: Option<Action<T>>,
}

impl<T: Clone + Send + 'static> Default for ActionQueue<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                pending: VecDeque::new(),
                running: false,
                suspended: None,
            })),
            notify: Arc::new(Notify::new()),
        }
    }
}

impl<T: Clone + Send + 'static> ActionQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue an action and make sure the drive loop is running. Returns a
    /// handle whose `complete()` future resolves when this specific action
    /// finishes (however it finishes).
    pub async fn push(&self, action: Action<T>) -> Action<T> {
        let handle = action.clone();
        let mut guard = self.inner.lock().await;
        guard.pending.push_back(action);
        if !guard.running {
            guard.running = true;
            drop(guard);
            self.spawn_driver();
        }
        handle
    }

    /// Re-run the action with the given id instead of advancing past it.
    /// Has no effect if that action isn't the currently-suspended head
    /// (e.g. it already resolved, or a different id was given).
    pub async fn retry(&self, action_id: u64) {
        let suspended = {
            let mut guard = self.inner.lock().await;
            if guard.suspended.as_ref().map(Action::id) == Some(action_id) {
                guard.suspended.take()
            } else {
                None
            }
        };
        if let Some(action) = suspended {
            action.reset_for_retry().await;
            self.notify.notify_waiters();
        }
    }

    /// Abandon the action with the given id: every waiter on its
    /// `complete()` is (or becomes) rejected with `QueueError::Skipped` and
    /// the queue advances to the next action.
    pub async fn skip(&self, action_id: u64) {
        let suspended = {
            let mut guard = self.inner.lock().await;
            if guard.suspended.as_ref().map(Action::id) == Some(action_id) {
                guard.suspended.take()
            } else {
                None
            }
        };
        if let Some(action) = suspended {
            action.resolve_failure(QueueError::Skipped.into()).await;
            self.notify.notify_waiters();
        }
    }

    fn spawn_driver(&self) {
        let inner = self.inner.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut guard = inner.lock().await;
                    match guard.pending.pop_front() {
                        Some(action) => Some(action),
                        None => {
                            guard.running = false;
                            None
                        }
                    }
                };
                let Some(action) = next else { break };
                drive_one(&inner, &notify, action).await;
            }
        });
    }
}

async fn drive_one<T: Clone + Send + 'static>(
    inner: &Arc<Mutex<QueueInner<T>>>,
    notify: &Arc<Notify>,
    action: Action<T>,
) {
    loop {
        debug!(action = %action.label, attempt = action.attempts() + 1, "running action");
        match action.run_once().await {
            Ok(value) => {
                action.resolve_success(value).await;
                return;
            }
            Err(err) => {
                warn!(action = %action.label, error = %err, "action attempt failed");
                // Reject every caller currently awaiting `complete()`
                // immediately (spec §7: a series-emit failure rejects the
                // caller right away). The queue itself still suspends at
                // this head action below, independent of that rejection,
                // until the caller explicitly retries or skips it.
                action.resolve_failure(err).await;

                if action.exhausted_retries() {
                    warn!(action = %action.label, "action failed, retries exhausted");
                    return;
                }

                {
                    let mut guard = inner.lock().await;
                    guard.suspended = Some(action.clone());
                }

                loop {
                    notify.notified().await;
                    let still_suspended = {
                        inner.lock().await.suspended.as_ref().map(Action::id) == Some(action.id())
                    };
                    if !still_suspended {
                        break;
                    }
                }

                if action.is_pending().await {
                    debug!(action = %action.label, "retrying after failure");
                    continue;
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn actions_run_in_order_and_complete_resolves() {
        let queue: ActionQueue<u32> = ActionQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let a1 = Action::new("first", move || {
            let o1 = o1.clone();
            async move {
                o1.lock().await.push(1);
                Ok(1u32)
            }
        });
        let o2 = order.clone();
        let a2 = Action::new("second", move || {
            let o2 = o2.clone();
            async move {
                o2.lock().await.push(2);
                Ok(2u32)
            }
        });

        let h1 = queue.push(a1).await;
        let h2 = queue.push(a2).await;

        assert_eq!(h1.complete().await.unwrap(), 1);
        assert_eq!(h2.complete().await.unwrap(), 2);
        assert_eq!(*order.lock().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn retry_reruns_the_thunk() {
        let queue: ActionQueue<u32> = ActionQueue::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let a = attempts.clone();
        let action = Action::new("flaky", move || {
            let a = a.clone();
            async move {
                let n = a.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ConduitError::other("first attempt fails"))
                } else {
                    Ok(42u32)
                }
            }
        });

        let handle = queue.push(action.clone()).await;
        // give the driver a moment to hit the first failure and start waiting
        tokio::task::yield_now().await;
        queue.retry(action.id()).await;

        assert_eq!(handle.complete().await.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn skip_rejects_with_queue_error() {
        let queue: ActionQueue<u32> = ActionQueue::new();
        let action = Action::new("doomed", || async { Err(ConduitError::other("nope")) });
        let handle = queue.push(action.clone()).await;
        tokio::task::yield_now().await;
        queue.skip(action.id()).await;

        let err = handle.complete().await.unwrap_err();
        assert!(matches!(err, ConduitError::QueueError(QueueError::Skipped)));
    }

    #[tokio::test]
    async fn max_retries_fails_terminally_without_explicit_skip() {
        let queue: ActionQueue<u32> = ActionQueue::new();
        let action = Action::new("capped", || async { Err(ConduitError::other("always fails")) })
            .with_max_retries(0);
        let handle = queue.push(action).await;
        let err = handle.complete().await.unwrap_err();
        assert!(matches!(err, ConduitError::Other { .. }));
    }
}
