//! The coordinated source/transform core: the relational cache and its
//! integrity processor, the `Source` capability mixins built on
//! `conduit-core`'s event bus and action queue, the coordinator registry,
//! and the sync/request strategies that wire nodes together.
//!
//! Adapter crates (`conduit-jsonapi`, `conduit-localstore`) implement
//! [`source::TransformHandler`]/[`source::UpdateHandler`]/
//! [`source::FetchHandler`] against their own backing store; everything
//! else here is backend-agnostic.

pub mod cache;
pub mod coordinator;
pub mod integrity;
pub mod keymap_processor;
pub mod processor;
pub mod source;
pub mod store;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{Cache, RecordStore};
pub use coordinator::{Coordinator, Node};
pub use integrity::IntegrityProcessor;
pub use keymap_processor::KeyMapProcessor;
pub use processor::Processor;
pub use source::{
    FetchHandler, Fetchable, FullSource, Queryable, Source, SourceContext, TransformHandler,
    Transformable, UpdateHandler, Updatable,
};
pub use store::Store;
pub use strategy::{RequestStrategy, SourceEvent, SyncStrategy, TargetRequest};
