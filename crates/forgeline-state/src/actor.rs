//! Identity collaborator — supplies the acting principal for audit entries.
//!
//! Authentication itself happens outside the engine; the engine only
//! needs a name to stamp on audit log entries.

use std::sync::Arc;

/// Source of the acting principal for audit entries.
pub trait ActorContext: Send + Sync {
    /// Name of the principal performing the current operation.
    fn actor(&self) -> String;
}

/// Shared handle to an actor context.
pub type SharedActorContext = Arc<dyn ActorContext>;

/// Fixed-principal context used by the daemon and by tests.
pub struct StaticActor(pub String);

impl StaticActor {
    /// The fallback principal when no identity layer is wired in.
    pub fn system() -> SharedActorContext {
        Arc::new(Self("system".to_string()))
    }
}

impl ActorContext for StaticActor {
    fn actor(&self) -> String {
        self.0.clone()
    }
}
