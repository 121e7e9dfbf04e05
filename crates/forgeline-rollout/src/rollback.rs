//! RollbackManager — reverts one binding to an earlier published version.
//!
//! Rollback only moves the binding pointer backward; version history is
//! never deleted. The operation fails fast and surfaces errors to the
//! caller (no batch semantics here).

use tracing::info;

use forgeline_binding::BindingRegistry;
use forgeline_state::{
    AuditEvent, SharedActorContext, StateStore, StaticActor, epoch_secs,
};

use crate::error::{RolloutError, RolloutResult};
use crate::locks::BindingLocks;

/// Outcome of a successful rollback.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RollbackOutcome {
    pub success: bool,
    pub summary: String,
}

/// Reverts factory bindings to earlier versions.
#[derive(Clone)]
pub struct RollbackManager {
    state: StateStore,
    registry: BindingRegistry,
    locks: BindingLocks,
    actor: SharedActorContext,
}

impl RollbackManager {
    pub fn new(state: StateStore, registry: BindingRegistry, locks: BindingLocks) -> Self {
        Self {
            state,
            registry,
            locks,
            actor: StaticActor::system(),
        }
    }

    /// Use the given identity context for audit entries.
    pub fn with_actor(mut self, actor: SharedActorContext) -> Self {
        self.actor = actor;
        self
    }

    /// Move a factory's binding back to `target_version`.
    ///
    /// The target must exist, be published, and be strictly earlier
    /// than the currently applied version. The reason is recorded in
    /// the append-only audit trail.
    pub async fn rollback(
        &self,
        factory_id: &str,
        target_version: u32,
        reason: &str,
    ) -> RolloutResult<RollbackOutcome> {
        if reason.trim().is_empty() {
            return Err(RolloutError::Validation(
                "rollback reason must not be empty".to_string(),
            ));
        }

        let _guard = self.locks.acquire(factory_id).await;

        let binding = self.registry.binding(factory_id)?;
        if target_version >= binding.applied_version {
            return Err(RolloutError::Conflict(format!(
                "target version {target_version} is not earlier than applied version {}",
                binding.applied_version
            )));
        }

        let target = self
            .state
            .get_version(&binding.blueprint_id, target_version)?
            .ok_or_else(|| {
                RolloutError::NotFound(format!(
                    "version {target_version} of blueprint {}",
                    binding.blueprint_id
                ))
            })?;
        if !target.is_published {
            return Err(RolloutError::Conflict(format!(
                "version {target_version} of blueprint {} is not published",
                binding.blueprint_id
            )));
        }

        let from = binding.applied_version;
        self.registry.set_applied_version(factory_id, target_version)?;
        self.state.append_audit(
            epoch_secs(),
            &self.actor.actor(),
            AuditEvent::RolledBack {
                factory_id: factory_id.to_string(),
                blueprint_id: binding.blueprint_id.clone(),
                from_version: from,
                to_version: target_version,
                reason: reason.to_string(),
            },
        )?;

        info!(factory = factory_id, from, to = target_version, reason, "factory rolled back");
        Ok(RollbackOutcome {
            success: true,
            summary: format!("rolled back from version {from} to {target_version}"),
        })
    }
}
