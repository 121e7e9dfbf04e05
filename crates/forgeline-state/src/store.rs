//! StateStore — redb-backed state persistence for Forgeline.
//!
//! Provides typed CRUD operations over blueprint versions, factory
//! bindings, and the audit log. All values are JSON-serialized into
//! redb's `&[u8]` value columns. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Outcome of a conditional draft mutation.
#[derive(Debug)]
pub enum DraftUpdate {
    /// No record exists for the (blueprint, version) pair.
    Missing,
    /// The record is published and therefore immutable.
    AlreadyPublished,
    /// The mutation was applied and committed.
    Updated(BlueprintVersion),
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        txn.open_table(AUDIT).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Versions ───────────────────────────────────────────────────

    /// Insert or update a blueprint version record.
    ///
    /// A publish is a single `put_version` write, so readers never
    /// observe a half-updated published record.
    pub fn put_version(&self, record: &BlueprintVersion) -> StateResult<()> {
        let key = record.table_key();
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, published = record.is_published, "version stored");
        Ok(())
    }

    /// Get one version of a blueprint.
    pub fn get_version(
        &self,
        blueprint_id: &str,
        version: u32,
    ) -> StateResult<Option<BlueprintVersion>> {
        let key = version_key(blueprint_id, version);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: BlueprintVersion =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all versions of a blueprint, ascending by version number.
    pub fn list_versions(&self, blueprint_id: &str) -> StateResult<Vec<BlueprintVersion>> {
        let prefix = format!("{blueprint_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: BlueprintVersion =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(record);
            }
        }
        Ok(results)
    }

    /// Highest-numbered published version of a blueprint, if any.
    pub fn latest_published_version(
        &self,
        blueprint_id: &str,
    ) -> StateResult<Option<BlueprintVersion>> {
        let versions = self.list_versions(blueprint_id)?;
        Ok(versions.into_iter().filter(|v| v.is_published).next_back())
    }

    /// The single open (unpublished) draft of a blueprint, if any.
    pub fn open_draft(&self, blueprint_id: &str) -> StateResult<Option<BlueprintVersion>> {
        let versions = self.list_versions(blueprint_id)?;
        Ok(versions.into_iter().find(|v| !v.is_published))
    }

    /// Allocate the next version number and insert a draft record, all
    /// inside one write transaction.
    ///
    /// The closure receives the allocated version number and returns
    /// the record to store. Returns `Ok(None)` without writing when the
    /// blueprint already has an open draft; the check and the insert
    /// share a transaction, so concurrent callers cannot both succeed
    /// or allocate the same version number.
    pub fn insert_draft<F>(
        &self,
        blueprint_id: &str,
        make: F,
    ) -> StateResult<Option<BlueprintVersion>>
    where
        F: FnOnce(u32) -> BlueprintVersion,
    {
        let prefix = format!("{blueprint_id}:");
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
            let mut max_version = 0;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                if key.value().starts_with(&prefix) {
                    let record: BlueprintVersion =
                        serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                    if !record.is_published {
                        return Ok(None);
                    }
                    max_version = max_version.max(record.version);
                }
            }
            let record = make(max_version + 1);
            let key = record.table_key();
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            stored = record;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(blueprint = blueprint_id, version = stored.version, "draft inserted");
        Ok(Some(stored))
    }

    /// Mutate a version record if it is still an open draft, inside one
    /// write transaction.
    ///
    /// The published check runs against the state visible to the write
    /// transaction, so a draft cannot be mutated after a concurrent
    /// publish commits, and a publish cannot land twice.
    pub fn update_draft_version<F>(
        &self,
        blueprint_id: &str,
        version: u32,
        mutate: F,
    ) -> StateResult<DraftUpdate>
    where
        F: FnOnce(&mut BlueprintVersion),
    {
        let key = version_key(blueprint_id, version);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(VERSIONS).map_err(map_err!(Table))?;
            let current = match table.get(key.as_str()).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice::<BlueprintVersion>(guard.value())
                        .map_err(map_err!(Deserialize))?
                }
                None => return Ok(DraftUpdate::Missing),
            };
            if current.is_published {
                return Ok(DraftUpdate::AlreadyPublished);
            }
            let mut record = current;
            mutate(&mut record);
            let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            updated = record;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, published = updated.is_published, "draft updated");
        Ok(DraftUpdate::Updated(updated))
    }

    // ── Bindings ───────────────────────────────────────────────────

    /// Insert or update a factory binding.
    pub fn put_binding(&self, binding: &FactoryBinding) -> StateResult<()> {
        let value = serde_json::to_vec(binding).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            table
                .insert(binding.factory_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(factory = %binding.factory_id, applied = binding.applied_version, "binding stored");
        Ok(())
    }

    /// Insert a binding only if the factory is not already bound.
    ///
    /// The existence check and the insert share one write transaction,
    /// so two concurrent binds of the same factory cannot both succeed.
    /// Returns `false` without writing when a binding already exists.
    pub fn insert_binding_if_absent(&self, binding: &FactoryBinding) -> StateResult<bool> {
        let value = serde_json::to_vec(binding).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            if table
                .get(binding.factory_id.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Ok(false);
            }
            table
                .insert(binding.factory_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(factory = %binding.factory_id, "binding created");
        Ok(true)
    }

    /// Atomically read, mutate, and rewrite a binding in one write
    /// transaction.
    ///
    /// The closure always runs against the latest committed record, so
    /// writers that touch different fields (settings vs. applied
    /// version) cannot overwrite each other's changes with a stale
    /// snapshot. Returns `None` when the factory has no binding.
    pub fn update_binding<F>(
        &self,
        factory_id: &str,
        mutate: F,
    ) -> StateResult<Option<FactoryBinding>>
    where
        F: FnOnce(&mut FactoryBinding),
    {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated;
        {
            let mut table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
            let current = match table.get(factory_id).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice::<FactoryBinding>(guard.value())
                        .map_err(map_err!(Deserialize))?
                }
                None => return Ok(None),
            };
            let mut binding = current;
            mutate(&mut binding);
            let value = serde_json::to_vec(&binding).map_err(map_err!(Serialize))?;
            table
                .insert(factory_id, value.as_slice())
                .map_err(map_err!(Write))?;
            updated = binding;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(factory = factory_id, applied = updated.applied_version, "binding updated");
        Ok(Some(updated))
    }

    /// Get a binding by factory ID.
    pub fn get_binding(&self, factory_id: &str) -> StateResult<Option<FactoryBinding>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        match table.get(factory_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let binding: FactoryBinding =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(binding))
            }
            None => Ok(None),
        }
    }

    /// List all bindings.
    pub fn list_bindings(&self) -> StateResult<Vec<FactoryBinding>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BINDINGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let binding: FactoryBinding =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(binding);
        }
        Ok(results)
    }

    /// List all bindings for a given blueprint ID.
    pub fn list_bindings_for_blueprint(
        &self,
        blueprint_id: &str,
    ) -> StateResult<Vec<FactoryBinding>> {
        let all = self.list_bindings()?;
        Ok(all
            .into_iter()
            .filter(|b| b.blueprint_id == blueprint_id)
            .collect())
    }

    // ── Audit log ──────────────────────────────────────────────────

    /// Append an audit entry, assigning the next sequence number.
    ///
    /// Sequence allocation happens inside the write transaction, so
    /// concurrent appends never collide.
    pub fn append_audit(&self, at: u64, actor: &str, event: AuditEvent) -> StateResult<AuditEntry> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let entry;
        {
            let mut table = txn.open_table(AUDIT).map_err(map_err!(Table))?;
            let next_seq = match table.last().map_err(map_err!(Read))? {
                Some((key, _)) => {
                    let last: u64 = key.value().parse::<u64>().map_err(map_err!(Deserialize))?;
                    last + 1
                }
                None => 1,
            };
            entry = AuditEntry {
                seq: next_seq,
                at,
                actor: actor.to_string(),
                event,
            };
            let value = serde_json::to_vec(&entry).map_err(map_err!(Serialize))?;
            table
                .insert(audit_key(next_seq).as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(seq = entry.seq, actor, "audit entry appended");
        Ok(entry)
    }

    /// List the most recent audit entries, newest first.
    pub fn list_audit(&self, limit: usize) -> StateResult<Vec<AuditEntry>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(AUDIT).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))?.rev() {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: AuditEntry =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }
}
