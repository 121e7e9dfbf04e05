//! AutoUpgradeWorker — converges bindings after publish events.
//!
//! Consumes `PublishEvent`s, evaluates the policy engine over the
//! affected blueprint's bindings, and hands eligible factories to the
//! orchestrator. Delivery is at-least-once: re-processing an event is
//! safe because re-applying an already-applied upgrade is a no-op.

use tokio::sync::watch;
use tracing::{info, warn};

use forgeline_binding::{BindingRegistry, PolicyEngine};
use forgeline_version::events::{PublishEvent, PublishReceiver};

use crate::orchestrator::{BatchOptions, RolloutOrchestrator, UpgradeResult};

/// Background consumer of publish events.
pub struct AutoUpgradeWorker {
    registry: BindingRegistry,
    orchestrator: RolloutOrchestrator,
}

impl AutoUpgradeWorker {
    pub fn new(registry: BindingRegistry, orchestrator: RolloutOrchestrator) -> Self {
        Self {
            registry,
            orchestrator,
        }
    }

    /// Run until the event channel closes or shutdown is signalled.
    pub async fn run(self, mut events: PublishReceiver, mut shutdown: watch::Receiver<bool>) {
        info!("auto-upgrade worker started");
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            self.handle_event(&event).await;
                        }
                        None => {
                            info!("publish channel closed, auto-upgrade worker stopping");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("auto-upgrade worker shutting down");
                    break;
                }
            }
        }
    }

    /// Evaluate one publish event and roll out to eligible factories.
    pub async fn handle_event(&self, event: &PublishEvent) -> Vec<UpgradeResult> {
        let bindings = match self.registry.bindings_for(&event.blueprint_id) {
            Ok(bindings) => bindings,
            Err(e) => {
                warn!(blueprint = %event.blueprint_id, error = %e, "failed to load bindings");
                return Vec::new();
            }
        };

        let eligible = PolicyEngine::eligible(
            &bindings,
            event.version,
            event.change_type,
            &event.summary,
        );
        if eligible.is_empty() {
            return Vec::new();
        }

        info!(
            blueprint = %event.blueprint_id,
            version = event.version,
            factories = eligible.len(),
            "auto-upgrading eligible factories"
        );
        let results = self
            .orchestrator
            .batch_upgrade(&eligible, BatchOptions::default())
            .await;

        for result in results.iter().filter(|r| !r.success) {
            warn!(
                factory = %result.factory_id,
                error = result.error.as_deref().unwrap_or("unknown"),
                "auto-upgrade failed for factory"
            );
        }
        results
    }
}
