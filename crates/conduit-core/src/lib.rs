//! Shared engine primitives: the event bus every `Source` is built from,
//! the serial action queue sources use for side-effectful work, and the
//! schema/key-map metadata the cache and adapters consult.
//!
//! Nothing here knows about caching or HTTP; those live in `conduit` and
//! the adapter crates. This crate is the "evented mixin plus metadata"
//! layer described in the design notes: capability traits are built on
//! top of the bus here, not baked into it.

pub mod action;
pub mod event_bus;
pub mod keymap;
pub mod schema;

pub use action::{Action, ActionQueue};
pub use event_bus::{EventArg, EventBus, ListenerId};
pub use keymap::KeyMap;
pub use schema::{DependentRule, ModelSchema, RelationshipDescriptor, RelationshipKind, Schema};
