//! Per-factory binding locks.
//!
//! Binding mutations must be serialized per factory: a concurrent
//! upgrade and rollback on the same binding must not interleave. No
//! global lock is held across a batch; each factory locks only its own
//! entry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Keyed async mutex map, one lock per factory.
#[derive(Clone, Default)]
pub struct BindingLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl BindingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one factory, creating it on first use.
    pub async fn acquire(&self, factory_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("binding lock map poisoned");
            map.entry(factory_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = BindingLocks::new();
        let guard = locks.acquire("f1").await;

        // Second acquire on the same key must not be ready while held.
        let locks2 = locks.clone();
        let pending = tokio::spawn(async move { locks2.acquire("f1").await });
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        drop(guard);
        pending.await.unwrap();
    }

    #[tokio::test]
    async fn different_keys_independent() {
        let locks = BindingLocks::new();
        let _f1 = locks.acquire("f1").await;
        // Must not block.
        let _f2 = locks.acquire("f2").await;
    }
}
