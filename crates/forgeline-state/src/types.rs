//! Domain types for the Forgeline state store.
//!
//! These types represent the persisted state of blueprint versions,
//! factory bindings, and audit log entries. All types are serializable
//! to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a blueprint.
pub type BlueprintId = String;

/// Unique identifier for a tenant factory.
pub type FactoryId = String;

// ── Versions ──────────────────────────────────────────────────────

/// Classification of the change a version carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Initial version of a blueprint.
    Create,
    /// Follow-up revision of an existing blueprint.
    Update,
    /// Publish event classification (audit vocabulary).
    Publish,
    /// Informational deprecation tag on a published version.
    Deprecate,
}

/// An immutable, numbered snapshot of a blueprint's content.
///
/// Versions start life as unpublished drafts. Publishing is one-way:
/// once `is_published` is set the content fields never change again.
/// The only post-publish mutation allowed is the informational
/// deprecation tag, which does not touch content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlueprintVersion {
    pub blueprint_id: BlueprintId,
    /// Strictly increasing per blueprint, starting at 1.
    pub version: u32,
    pub change_type: ChangeType,
    pub change_description: String,
    /// Diff against the previous published version, computed at publish.
    pub change_summary: VersionChangeSummary,
    /// Opaque form-field bodies keyed by field identifier.
    pub fields: BTreeMap<String, serde_json::Value>,
    /// Opaque rule bodies keyed by rule identifier.
    pub rules: BTreeMap<String, serde_json::Value>,
    pub is_published: bool,
    pub release_notes: Option<String>,
    /// Acting principal recorded when the draft was created.
    pub created_by: String,
    /// Unix timestamp (seconds) when the draft was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) when published. Set exactly once.
    pub published_at: Option<u64>,
}

/// Structural diff between two versions of the same blueprint.
///
/// All lists hold identifiers, lexically sorted, so comparing the same
/// pair twice produces byte-identical output. The lists are disjoint:
/// an identifier appears in at most one of added/removed/modified.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VersionChangeSummary {
    pub added_fields: Vec<String>,
    pub removed_fields: Vec<String>,
    pub modified_fields: Vec<String>,
    pub added_rules: Vec<String>,
    pub removed_rules: Vec<String>,
    pub modified_rules: Vec<String>,
}

impl VersionChangeSummary {
    /// True when the two compared versions are structurally identical.
    pub fn is_empty(&self) -> bool {
        self.added_fields.is_empty()
            && self.removed_fields.is_empty()
            && self.modified_fields.is_empty()
            && self.added_rules.is_empty()
            && self.removed_rules.is_empty()
            && self.modified_rules.is_empty()
    }

    /// True when the summary contains no removals and no modifications.
    ///
    /// Additive-only changes are what the `AutoMinor` update policy
    /// treats as a minor release.
    pub fn is_additive_only(&self) -> bool {
        self.removed_fields.is_empty()
            && self.modified_fields.is_empty()
            && self.removed_rules.is_empty()
            && self.modified_rules.is_empty()
    }
}

// ── Bindings ──────────────────────────────────────────────────────

/// Per-binding rule governing whether new publishes auto-propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    /// Never auto-apply; an operator must trigger rollout explicitly.
    Manual,
    /// Auto-apply additive-only UPDATE publishes.
    AutoMinor,
    /// Auto-apply every publish.
    AutoAll,
}

/// The record associating one factory with one blueprint.
///
/// `latest_version` is never stored — it is derived from the highest
/// published version of the blueprint at read time. Invariant:
/// `1 <= applied_version <= latest_version`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactoryBinding {
    pub factory_id: FactoryId,
    pub blueprint_id: BlueprintId,
    pub applied_version: u32,
    pub auto_update: bool,
    pub update_policy: UpdatePolicy,
    /// Unix timestamp (seconds) when the factory first adopted the blueprint.
    pub bound_at: u64,
    /// Unix timestamp (seconds) of the last applied-version mutation.
    pub last_applied_at: u64,
}

impl FactoryBinding {
    /// A binding is outdated iff it trails the latest published version.
    pub fn is_outdated(&self, latest_version: u32) -> bool {
        self.applied_version < latest_version
    }
}

// ── Audit ─────────────────────────────────────────────────────────

/// One entry in the append-only audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Monotonic sequence number, assigned by the store on append.
    pub seq: u64,
    /// Unix timestamp (seconds) of the event.
    pub at: u64,
    /// Acting principal.
    pub actor: String,
    pub event: AuditEvent,
}

/// Publish/upgrade/rollback events consumed externally for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    DraftCreated {
        blueprint_id: BlueprintId,
        version: u32,
    },
    Published {
        blueprint_id: BlueprintId,
        version: u32,
    },
    Deprecated {
        blueprint_id: BlueprintId,
        version: u32,
    },
    Upgraded {
        factory_id: FactoryId,
        blueprint_id: BlueprintId,
        from_version: u32,
        to_version: u32,
    },
    RolledBack {
        factory_id: FactoryId,
        blueprint_id: BlueprintId,
        from_version: u32,
        to_version: u32,
        reason: String,
    },
    SettingsChanged {
        factory_id: FactoryId,
        auto_update: bool,
        update_policy: UpdatePolicy,
    },
    Bound {
        factory_id: FactoryId,
        blueprint_id: BlueprintId,
        version: u32,
    },
}

impl BlueprintVersion {
    /// Build the composite key for the versions table.
    ///
    /// Zero-padding keeps lexical key order equal to numeric order.
    pub fn table_key(&self) -> String {
        version_key(&self.blueprint_id, self.version)
    }
}

/// Versions table key for a (blueprint, version) pair.
pub fn version_key(blueprint_id: &str, version: u32) -> String {
    format!("{blueprint_id}:{version:010}")
}

/// Audit table key for a sequence number.
pub fn audit_key(seq: u64) -> String {
    format!("{seq:020}")
}
