//! forgeline-binding — per-factory binding state and update policy.
//!
//! A binding associates one factory with one blueprint and tracks which
//! version that factory currently applies. "Outdated" is always derived
//! from the blueprint's latest published version, never stored.
//!
//! # Components
//!
//! - **`registry`** — `BindingRegistry`: binding CRUD and settings
//! - **`policy`** — `PolicyEngine`: which bindings auto-upgrade on publish

pub mod error;
pub mod policy;
pub mod registry;

pub use error::{BindingError, BindingResult};
pub use policy::PolicyEngine;
pub use registry::BindingRegistry;
