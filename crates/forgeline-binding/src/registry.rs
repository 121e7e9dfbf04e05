//! BindingRegistry — owns per-factory binding records.
//!
//! All mutations run as single store transactions that reread the
//! committed record, so writers touching different fields of the same
//! binding cannot overwrite each other. Invariant on every binding:
//! `1 <= applied_version <= latest published version`.

use tracing::{debug, info};

use forgeline_state::{
    AuditEvent, FactoryBinding, SharedActorContext, StateStore, StaticActor, UpdatePolicy,
    epoch_secs,
};

use crate::error::{BindingError, BindingResult};

/// Registry of factory → blueprint bindings.
#[derive(Clone)]
pub struct BindingRegistry {
    state: StateStore,
    actor: SharedActorContext,
}

impl BindingRegistry {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            actor: StaticActor::system(),
        }
    }

    /// Use the given identity context for audit entries.
    pub fn with_actor(mut self, actor: SharedActorContext) -> Self {
        self.actor = actor;
        self
    }

    /// Bind a factory to a blueprint at a published version.
    ///
    /// `version = None` adopts the latest published version. A factory
    /// holds at most one binding; rebinding is a conflict (unbinding is
    /// a separate, explicit operation).
    pub fn bind(
        &self,
        factory_id: &str,
        blueprint_id: &str,
        version: Option<u32>,
    ) -> BindingResult<FactoryBinding> {
        let latest = self
            .state
            .latest_published_version(blueprint_id)?
            .ok_or_else(|| {
                BindingError::NotFound(format!(
                    "blueprint {blueprint_id} has no published version"
                ))
            })?;

        let target = version.unwrap_or(latest.version);
        let record = self
            .state
            .get_version(blueprint_id, target)?
            .ok_or_else(|| {
                BindingError::NotFound(format!(
                    "version {target} of blueprint {blueprint_id}"
                ))
            })?;
        if !record.is_published {
            return Err(BindingError::Conflict(format!(
                "version {target} of blueprint {blueprint_id} is not published"
            )));
        }

        let now = epoch_secs();
        let binding = FactoryBinding {
            factory_id: factory_id.to_string(),
            blueprint_id: blueprint_id.to_string(),
            applied_version: target,
            auto_update: false,
            update_policy: UpdatePolicy::Manual,
            bound_at: now,
            last_applied_at: now,
        };
        // Check-and-insert in one store transaction; two racing binds
        // of the same factory cannot both land.
        if !self.state.insert_binding_if_absent(&binding)? {
            return Err(BindingError::Conflict(format!(
                "factory {factory_id} is already bound"
            )));
        }
        self.state.append_audit(
            now,
            &self.actor.actor(),
            AuditEvent::Bound {
                factory_id: factory_id.to_string(),
                blueprint_id: blueprint_id.to_string(),
                version: target,
            },
        )?;

        info!(factory = factory_id, blueprint = blueprint_id, version = target, "factory bound");
        Ok(binding)
    }

    /// Look up one binding.
    pub fn binding(&self, factory_id: &str) -> BindingResult<FactoryBinding> {
        self.state
            .get_binding(factory_id)?
            .ok_or_else(|| BindingError::NotFound(format!("factory {factory_id}")))
    }

    /// All bindings for a blueprint.
    pub fn bindings_for(&self, blueprint_id: &str) -> BindingResult<Vec<FactoryBinding>> {
        Ok(self.state.list_bindings_for_blueprint(blueprint_id)?)
    }

    /// Bindings trailing the latest published version.
    ///
    /// Purely derived: filters on `applied_version < latest` at read
    /// time, no stored outdated flag.
    pub fn outdated_for(&self, blueprint_id: &str) -> BindingResult<Vec<FactoryBinding>> {
        let Some(latest) = self.state.latest_published_version(blueprint_id)? else {
            return Ok(Vec::new());
        };
        let bindings = self.state.list_bindings_for_blueprint(blueprint_id)?;
        Ok(bindings
            .into_iter()
            .filter(|b| b.is_outdated(latest.version))
            .collect())
    }

    /// Atomic read-modify-write of one binding's update settings.
    ///
    /// Runs as a single store transaction that rereads the committed
    /// record, so it can interleave with `set_applied_version` without
    /// either writer persisting the other's fields from a stale
    /// snapshot. The policy arrives as the `UpdatePolicy` enum; the
    /// wire layer is responsible for rejecting unrecognized strings.
    pub fn update_settings(
        &self,
        factory_id: &str,
        auto_update: bool,
        update_policy: UpdatePolicy,
    ) -> BindingResult<FactoryBinding> {
        let binding = self
            .state
            .update_binding(factory_id, |binding| {
                binding.auto_update = auto_update;
                binding.update_policy = update_policy;
            })?
            .ok_or_else(|| BindingError::NotFound(format!("factory {factory_id}")))?;
        self.state.append_audit(
            epoch_secs(),
            &self.actor.actor(),
            AuditEvent::SettingsChanged {
                factory_id: factory_id.to_string(),
                auto_update,
                update_policy,
            },
        )?;
        debug!(factory = factory_id, auto_update, ?update_policy, "binding settings updated");
        Ok(binding)
    }

    /// Move a binding's applied-version pointer.
    ///
    /// Internal mutator used by the rollout orchestrator and rollback
    /// manager, which hold the per-factory lock and validate the target.
    /// The write itself is a single store transaction touching only the
    /// applied fields, so a concurrent settings change is never clobbered.
    /// Always refreshes `last_applied_at`.
    pub fn set_applied_version(
        &self,
        factory_id: &str,
        version: u32,
    ) -> BindingResult<FactoryBinding> {
        self.state
            .update_binding(factory_id, |binding| {
                binding.applied_version = version;
                binding.last_applied_at = epoch_secs();
            })?
            .ok_or_else(|| BindingError::NotFound(format!("factory {factory_id}")))
    }
}
