//! forgeline-rollout — batch rollout and rollback of factory bindings.
//!
//! Executes upgrades across sets of factories with per-factory failure
//! isolation, reverts single bindings to earlier published versions,
//! and converges bindings after publish events via the auto-upgrade
//! worker.
//!
//! # Components
//!
//! - **`orchestrator`** — `RolloutOrchestrator`: concurrent batch upgrades
//! - **`rollback`** — `RollbackManager`: single-binding reverts
//! - **`worker`** — `AutoUpgradeWorker`: publish event → policy → rollout
//! - **`locks`** — per-factory serialization of binding mutations

pub mod error;
pub mod locks;
pub mod orchestrator;
pub mod rollback;
pub mod worker;

pub use error::{RolloutError, RolloutResult};
pub use locks::BindingLocks;
pub use orchestrator::{BatchOptions, RolloutOrchestrator, UpgradeResult};
pub use rollback::{RollbackManager, RollbackOutcome};
pub use worker::AutoUpgradeWorker;
