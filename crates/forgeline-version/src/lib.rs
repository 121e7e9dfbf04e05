//! forgeline-version — blueprint version history management.
//!
//! Owns the append-only version history of each blueprint: draft
//! creation, the one-way publish transition, history/latest queries,
//! and structural diffing between versions.
//!
//! # Components
//!
//! - **`store`** — `VersionStore`: drafts, publish workflow, history queries
//! - **`compare`** — `VersionComparator`: field/rule-level diff of two versions
//! - **`events`** — `PublishEvent` emitted on publish for downstream consumers

pub mod compare;
pub mod error;
pub mod events;
pub mod store;

pub use compare::VersionComparator;
pub use error::{VersionError, VersionResult};
pub use events::{PublishEvent, PublishSender, publish_channel};
pub use store::VersionStore;
