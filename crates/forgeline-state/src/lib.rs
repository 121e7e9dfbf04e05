//! forgeline-state — embedded state store for Forgeline.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! state management for blueprint versions, factory bindings, and the
//! append-only audit log.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{blueprint_id}:{version}`, zero-padded) enable efficient
//! prefix scans over a blueprint's version history.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared across async tasks.

pub mod actor;
pub mod clock;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use actor::{ActorContext, SharedActorContext, StaticActor};
pub use clock::epoch_secs;
pub use error::{StateError, StateResult};
pub use store::{DraftUpdate, StateStore};
pub use types::*;
