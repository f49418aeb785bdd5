//! Wire-stable data model shared by every crate in the workspace.
//!
//! Nothing in here performs I/O or holds a runtime handle: `conduit-api` is
//! the vocabulary the cache, the sources, and the strategies all speak, so
//! any source (in-process cache, JSON:API, local file store) can serialize
//! and exchange it without depending on the engine itself.

pub mod error;
pub mod operation;
pub mod query;
pub mod record;
pub mod value;

pub use error::{ConduitError, QueueError, Result};
pub use operation::{Operation, Transform};
pub use query::Query;
pub use record::{Record, RecordIdentity, RelationshipData};
pub use value::Value;
