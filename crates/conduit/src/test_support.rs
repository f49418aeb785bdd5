//! Minimal `FullSource` stubs shared by this crate's unit tests.

use async_trait::async_trait;
use std::sync::Mutex as StdMutex;

use conduit_api::{ConduitError, Query, Record, Transform};

use crate::source::{FetchHandler, SourceContext, TransformHandler, UpdateHandler};

/// A source that accepts every transform/update and answers every fetch
/// with an empty result; records everything it was asked to apply so
/// tests can assert on it.
pub struct NullSource {
    ctx: SourceContext,
    pub transforms: StdMutex<Vec<Transform>>,
    pub updates: StdMutex<Vec<Transform>>,
}

impl Default for NullSource {
    fn default() -> Self {
        Self {
            ctx: SourceContext::default(),
            transforms: StdMutex::new(Vec::new()),
            updates: StdMutex::new(Vec::new()),
        }
    }
}

impl crate::source::Source for NullSource {
    fn context(&self) -> &SourceContext {
        &self.ctx
    }
}

#[async_trait]
impl TransformHandler for NullSource {
    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    async fn apply_transform(&self, t: Transform) -> Result<Vec<Transform>, ConduitError> {
        self.transforms.lock().unwrap().push(t.clone());
        Ok(vec![t])
    }
}

#[async_trait]
impl UpdateHandler for NullSource {
    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    async fn apply_update(&self, t: Transform) -> Result<Vec<Transform>, ConduitError> {
        self.updates.lock().unwrap().push(t.clone());
        Ok(vec![t])
    }
}

#[async_trait]
impl FetchHandler for NullSource {
    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    async fn apply_fetch(&self, _q: Query) -> Result<Vec<Record>, ConduitError> {
        Ok(Vec::new())
    }
}
