//! The operation processor protocol (spec §4.C).
//!
//! A processor observes every operation a `Cache` applies and may emit
//! extra operations to run `before`, `after`, or `finally` around the
//! primary one. Emitted operations pass back through the same protocol, so
//! a processor must only ever emit operations that are structurally
//! smaller than the one it was given — see [`IntegrityProcessor`] for the
//! cycle guard this requires for dependent-remove cascades.

use async_trait::async_trait;

use conduit_api::{ConduitError, Operation};

use crate::cache::RecordStore;

/// Pluggable observer on `Cache::patch`. Default hooks are no-ops so a
/// processor only needs to implement the stages it cares about.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Extra operations to apply before the primary op, given the store as
    /// it stood just before the primary op is applied.
    async fn before(
        &self,
        _store: &RecordStore,
        _op: &Operation,
    ) -> Result<Vec<Operation>, ConduitError> {
        Ok(Vec::new())
    }

    /// Extra operations to apply after the primary op, given the store as
    /// it stands just after the primary op was applied.
    async fn after(
        &self,
        _store: &RecordStore,
        _op: &Operation,
    ) -> Result<Vec<Operation>, ConduitError> {
        Ok(Vec::new())
    }

    /// Post-commit housekeeping, run after the primary op and every `after`
    /// operation (recursively) have been applied.
    async fn finally(
        &self,
        _store: &RecordStore,
        _op: &Operation,
    ) -> Result<Vec<Operation>, ConduitError> {
        Ok(Vec::new())
    }

    /// Called after `Cache::reset` replaces the record map wholesale, so a
    /// processor can rebuild any index it privately maintains (e.g. the
    /// integrity processor's reverse index) from the new contents.
    async fn on_reset(&self, _store: &RecordStore) {}
}
