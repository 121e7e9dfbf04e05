//! RolloutOrchestrator — batch upgrades with per-factory failure isolation.
//!
//! Factories in a batch are mutually independent and processed
//! concurrently, each under its own binding lock. One factory's failure
//! never prevents processing of the rest and never rolls back work
//! already committed for others; there is no cross-factory transaction.

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use forgeline_binding::BindingRegistry;
use forgeline_state::{
    AuditEvent, FactoryId, SharedActorContext, StateStore, StaticActor, epoch_secs,
};

use crate::locks::BindingLocks;

/// Options for a batch upgrade.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct BatchOptions {
    /// Re-apply the latest version even for factories already current.
    /// Without it, upgrading an up-to-date factory is a no-op success.
    #[serde(default)]
    pub force: bool,
}

/// Per-factory outcome of a batch upgrade.
///
/// Output-only: appended to the audit log but never stored as an entity.
/// `error` is present iff `success` is false, so a failed factory can be
/// retried individually without re-running the whole batch.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpgradeResult {
    pub factory_id: FactoryId,
    pub success: bool,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpgradeResult {
    fn ok(factory_id: &str, summary: impl Into<String>) -> Self {
        Self {
            factory_id: factory_id.to_string(),
            success: true,
            summary: summary.into(),
            error: None,
        }
    }

    fn failed(factory_id: &str, error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            factory_id: factory_id.to_string(),
            success: false,
            summary: format!("upgrade failed: {error}"),
            error: Some(error),
        }
    }
}

/// Executes batch upgrades across sets of factories.
#[derive(Clone)]
pub struct RolloutOrchestrator {
    state: StateStore,
    registry: BindingRegistry,
    locks: BindingLocks,
    actor: SharedActorContext,
}

impl RolloutOrchestrator {
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

    /// Upgrade each factory to its blueprint's latest published version.
    ///
    /// Result order matches input order, one entry per factory.
    pub async fn batch_upgrade(
        &self,
        factory_ids: &[FactoryId],
        options: BatchOptions,
    ) -> Vec<UpgradeResult> {
        let (_tx, rx) = watch::channel(false);
        self.batch_upgrade_cancellable(factory_ids, options, rx)
            .await
    }

    /// Like [`batch_upgrade`](Self::batch_upgrade), with best-effort
    /// cancellation between per-factory steps.
    ///
    /// Factories whose step has not started when cancellation is
    /// observed get an explicit failed entry; a factory's committed
    /// mutation is never undone mid-step.
    pub async fn batch_upgrade_cancellable(
        &self,
        factory_ids: &[FactoryId],
        options: BatchOptions,
        cancel: watch::Receiver<bool>,
    ) -> Vec<UpgradeResult> {
        let mut slots: Vec<Option<UpgradeResult>> = vec![None; factory_ids.len()];
        let mut tasks = JoinSet::new();

        for (index, factory_id) in factory_ids.iter().enumerate() {
            if *cancel.borrow() {
                slots[index] = Some(UpgradeResult::failed(factory_id, "batch cancelled"));
                continue;
            }
            let this = self.clone();
            let factory_id = factory_id.clone();
            tasks.spawn(async move {
                let result = this.upgrade_one(&factory_id, options.force).await;
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "upgrade task panicked"),
            }
        }

        let results: Vec<UpgradeResult> = slots
            .into_iter()
            .zip(factory_ids)
            .map(|(slot, factory_id)| {
                slot.unwrap_or_else(|| UpgradeResult::failed(factory_id, "upgrade task aborted"))
            })
            .collect();

        let failed = results.iter().filter(|r| !r.success).count();
        info!(total = results.len(), failed, "batch upgrade finished");
        results
    }

    /// Upgrade a single factory under its binding lock.
    ///
    /// Idempotent: re-invoking with the binding already at the latest
    /// version returns success without a state change (unless forced).
    async fn upgrade_one(&self, factory_id: &str, force: bool) -> UpgradeResult {
        let _guard = self.locks.acquire(factory_id).await;

        let binding = match self.registry.binding(factory_id) {
            Ok(binding) => binding,
            Err(e) => return UpgradeResult::failed(factory_id, e.to_string()),
        };

        let latest = match self.state.latest_published_version(&binding.blueprint_id) {
            Ok(Some(latest)) => latest,
            Ok(None) => {
                return UpgradeResult::failed(
                    factory_id,
                    format!("blueprint {} has no published version", binding.blueprint_id),
                );
            }
            Err(e) => return UpgradeResult::failed(factory_id, e.to_string()),
        };

        if binding.applied_version >= latest.version && !force {
            return UpgradeResult::ok(
                factory_id,
                format!("already at latest version {}", latest.version),
            );
        }

        let from = binding.applied_version;
        if let Err(e) = self.registry.set_applied_version(factory_id, latest.version) {
            return UpgradeResult::failed(factory_id, e.to_string());
        }
        if let Err(e) = self.state.append_audit(
            epoch_secs(),
            &self.actor.actor(),
            AuditEvent::Upgraded {
                factory_id: factory_id.to_string(),
                blueprint_id: binding.blueprint_id.clone(),
                from_version: from,
                to_version: latest.version,
            },
        ) {
            warn!(factory = factory_id, error = %e, "upgrade applied but audit append failed");
        }

        info!(factory = factory_id, from, to = latest.version, "factory upgraded");
        UpgradeResult::ok(
            factory_id,
            format!("upgraded from version {from} to {}", latest.version),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgeline_version::VersionStore;

    struct Fixture {
        state: StateStore,
        versions: VersionStore,
        registry: BindingRegistry,
        orchestrator: RolloutOrchestrator,
    }

    fn fixture() -> Fixture {
        let state = StateStore::open_in_memory().unwrap();
        let versions = VersionStore::new(state.clone());
        let registry = BindingRegistry::new(state.clone());
        let orchestrator =
            RolloutOrchestrator::new(state.clone(), registry.clone(), BindingLocks::new());
        Fixture {
            state,
            versions,
            registry,
            orchestrator,
        }
    }

    fn publish(fx: &Fixture, blueprint_id: &str, version: u32) {
        fx.versions.create_draft(blueprint_id, "rev").unwrap();
        fx.versions
            .publish(blueprint_id, version, "notes", false)
            .unwrap();
    }

    fn ids(names: &[&str]) -> Vec<FactoryId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn upgrades_outdated_factory() {
        let fx = fixture();
        publish(&fx, "bp1", 1);
        fx.registry.bind("f1", "bp1", Some(1)).unwrap();
        publish(&fx, "bp1", 2);

        let results = fx
            .orchestrator
            .batch_upgrade(&ids(&["f1"]), BatchOptions::default())
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(fx.registry.binding("f1").unwrap().applied_version, 2);
    }

    #[tokio::test]
    async fn partial_failure_isolation_preserves_order() {
        let fx = fixture();
        publish(&fx, "bp1", 1);
        fx.registry.bind("fa", "bp1", Some(1)).unwrap();
        fx.registry.bind("fc", "bp1", Some(1)).unwrap();
        publish(&fx, "bp1", 2);

        // "fb" is unknown; its failure must not affect fa or fc.
        let results = fx
            .orchestrator
            .batch_upgrade(&ids(&["fa", "fb", "fc"]), BatchOptions::default())
            .await;

        let outcomes: Vec<(&str, bool)> = results
            .iter()
            .map(|r| (r.factory_id.as_str(), r.success))
            .collect();
        assert_eq!(outcomes, vec![("fa", true), ("fb", false), ("fc", true)]);
        assert!(results[1].error.is_some());
        assert_eq!(fx.registry.binding("fa").unwrap().applied_version, 2);
        assert_eq!(fx.registry.binding("fc").unwrap().applied_version, 2);
    }

    #[tokio::test]
    async fn upgrade_is_idempotent() {
        let fx = fixture();
        publish(&fx, "bp1", 1);
        fx.registry.bind("f1", "bp1", None).unwrap();

        let first = fx
            .orchestrator
            .batch_upgrade(&ids(&["f1"]), BatchOptions::default())
            .await;
        let applied_at = fx.registry.binding("f1").unwrap().last_applied_at;

        let second = fx
            .orchestrator
            .batch_upgrade(&ids(&["f1"]), BatchOptions::default())
            .await;

        assert!(first[0].success && second[0].success);
        // No state change on the repeat call.
        assert_eq!(fx.registry.binding("f1").unwrap().last_applied_at, applied_at);
    }

    #[tokio::test]
    async fn force_reapplies_current_version() {
        let fx = fixture();
        publish(&fx, "bp1", 1);
        fx.registry.bind("f1", "bp1", None).unwrap();

        let results = fx
            .orchestrator
            .batch_upgrade(&ids(&["f1"]), BatchOptions { force: true })
            .await;

        assert!(results[0].success);
        assert!(results[0].summary.contains("upgraded"));
        assert_eq!(fx.registry.binding("f1").unwrap().applied_version, 1);
    }

    #[tokio::test]
    async fn unpublished_blueprint_fails_entry() {
        let fx = fixture();
        publish(&fx, "bp1", 1);
        fx.registry.bind("f1", "bp1", None).unwrap();
        // Simulate a binding whose blueprint lost its published versions
        // by binding against a different blueprint id record.
        let mut orphan = fx.registry.binding("f1").unwrap();
        orphan.factory_id = "f2".to_string();
        orphan.blueprint_id = "bp-ghost".to_string();
        fx.state.put_binding(&orphan).unwrap();

        let results = fx
            .orchestrator
            .batch_upgrade(&ids(&["f2"]), BatchOptions::default())
            .await;
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("no published version"));
    }

    #[tokio::test]
    async fn cancellation_yields_explicit_entries() {
        let fx = fixture();
        publish(&fx, "bp1", 1);
        fx.registry.bind("f1", "bp1", None).unwrap();

        let (tx, rx) = watch::channel(true);
        let results = fx
            .orchestrator
            .batch_upgrade_cancellable(&ids(&["f1"]), BatchOptions::default(), rx)
            .await;
        drop(tx);

        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("batch cancelled"));
        // Nothing was mutated.
        assert_eq!(fx.registry.binding("f1").unwrap().applied_version, 1);
    }

    #[tokio::test]
    async fn concurrent_batches_on_same_factory_serialize() {
        let fx = fixture();
        publish(&fx, "bp1", 1);
        fx.registry.bind("f1", "bp1", Some(1)).unwrap();
        publish(&fx, "bp1", 2);

        let ids_a = ids(&["f1"]);
        let ids_b = ids(&["f1"]);
        let (a, b) = tokio::join!(
            fx.orchestrator
                .batch_upgrade(&ids_a, BatchOptions::default()),
            fx.orchestrator
                .batch_upgrade(&ids_b, BatchOptions::default()),
        );

        assert!(a[0].success && b[0].success);
        assert_eq!(fx.registry.binding("f1").unwrap().applied_version, 2);
    }

    #[tokio::test]
    async fn upgrade_appends_audit_entry() {
        let fx = fixture();
        publish(&fx, "bp1", 1);
        fx.registry.bind("f1", "bp1", Some(1)).unwrap();
        publish(&fx, "bp1", 2);

        fx.orchestrator
            .batch_upgrade(&ids(&["f1"]), BatchOptions::default())
            .await;

        let audit = fx.state.list_audit(1).unwrap();
        assert!(matches!(
            &audit[0].event,
            forgeline_state::AuditEvent::Upgraded {
                from_version: 1,
                to_version: 2,
                ..
            }
        ));
    }
}
