//! PolicyEngine — decides which bindings auto-upgrade on publish.
//!
//! Evaluated once per publish event, against every binding of the
//! affected blueprint. The minor/major boundary for `AutoMinor` is
//! defined here explicitly: a publish is *minor* iff its change type is
//! `Update` and its change summary is additive-only (no removed and no
//! modified fields or rules). Anything that removes or reshapes
//! existing content is treated as major.

use tracing::debug;

use forgeline_state::{
    ChangeType, FactoryBinding, FactoryId, UpdatePolicy, VersionChangeSummary,
};

/// Stateless policy evaluation for auto-upgrades.
pub struct PolicyEngine;

impl PolicyEngine {
    /// Factories eligible for auto-upgrade to a newly published version.
    ///
    /// Bindings with `auto_update = false` never qualify, regardless of
    /// policy. Bindings already at (or past) the published version are
    /// skipped — re-evaluation after a retry converges to the same
    /// result, keeping policy application idempotent.
    pub fn eligible(
        bindings: &[FactoryBinding],
        published_version: u32,
        change_type: ChangeType,
        summary: &VersionChangeSummary,
    ) -> Vec<FactoryId> {
        let minor = change_type == ChangeType::Update && summary.is_additive_only();

        let eligible: Vec<FactoryId> = bindings
            .iter()
            .filter(|b| b.auto_update)
            .filter(|b| b.applied_version < published_version)
            .filter(|b| match b.update_policy {
                UpdatePolicy::Manual => false,
                UpdatePolicy::AutoAll => true,
                UpdatePolicy::AutoMinor => minor,
            })
            .map(|b| b.factory_id.clone())
            .collect();

        debug!(
            published_version,
            ?change_type,
            minor,
            candidates = bindings.len(),
            eligible = eligible.len(),
            "policy evaluated"
        );
        eligible
    }
}
