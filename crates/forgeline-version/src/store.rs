//! VersionStore — draft authoring and the publish workflow.
//!
//! Each blueprint has an append-only version history. At most one
//! unpublished draft exists per blueprint at a time, which serializes
//! authoring. Publishing is a single atomic write: readers never see a
//! record with `is_published` set but partially updated content.

use std::collections::BTreeMap;

use tracing::info;

use forgeline_state::{
    AuditEvent, BlueprintVersion, ChangeType, DraftUpdate, SharedActorContext, StateStore,
    StaticActor, VersionChangeSummary, epoch_secs,
};

use crate::compare::diff_versions;
use crate::error::{VersionError, VersionResult};
use crate::events::{PublishEvent, PublishSender};

/// Owns the version history of all blueprints.
#[derive(Clone)]
pub struct VersionStore {
    state: StateStore,
    actor: SharedActorContext,
    events: Option<PublishSender>,
}

impl VersionStore {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            actor: StaticActor::system(),
            events: None,
        }
    }

    /// Use the given identity context for audit entries.
    pub fn with_actor(mut self, actor: SharedActorContext) -> Self {
        self.actor = actor;
        self
    }

    /// Emit `PublishEvent`s on the given channel after each publish.
    pub fn with_events(mut self, events: PublishSender) -> Self {
        self.events = Some(events);
        self
    }

    /// Create a new unpublished draft, allocating the next version number.
    ///
    /// Content is seeded from the latest published version so authors
    /// start from the current state. Fails with `Conflict` if the
    /// blueprint already has an open draft. The single-draft check and
    /// the version allocation run in one store transaction, so racing
    /// callers cannot both create a draft or collide on a number.
    pub fn create_draft(
        &self,
        blueprint_id: &str,
        description: &str,
    ) -> VersionResult<BlueprintVersion> {
        // Blueprint IDs become the prefix of composite version keys; a
        // ':' inside one would bleed into another blueprint's scans.
        if blueprint_id.is_empty() || blueprint_id.contains(':') {
            return Err(VersionError::Validation(format!(
                "blueprint id must be non-empty and must not contain ':': {blueprint_id:?}"
            )));
        }

        let base = self.state.latest_published_version(blueprint_id)?;
        let created_by = self.actor.actor();
        let created_at = epoch_secs();

        let draft = self
            .state
            .insert_draft(blueprint_id, |next_version| BlueprintVersion {
                blueprint_id: blueprint_id.to_string(),
                version: next_version,
                change_type: if next_version == 1 {
                    ChangeType::Create
                } else {
                    ChangeType::Update
                },
                change_description: description.to_string(),
                change_summary: VersionChangeSummary::default(),
                fields: base.as_ref().map(|v| v.fields.clone()).unwrap_or_default(),
                rules: base.as_ref().map(|v| v.rules.clone()).unwrap_or_default(),
                is_published: false,
                release_notes: None,
                created_by: created_by.clone(),
                created_at,
                published_at: None,
            })?
            .ok_or_else(|| {
                VersionError::Conflict(format!(
                    "blueprint {blueprint_id} already has an open draft"
                ))
            })?;
        self.state.append_audit(
            created_at,
            &created_by,
            AuditEvent::DraftCreated {
                blueprint_id: blueprint_id.to_string(),
                version: draft.version,
            },
        )?;

        info!(blueprint = blueprint_id, version = draft.version, "draft created");
        Ok(draft)
    }

    /// Replace the content of an open draft.
    ///
    /// Published versions are immutable: corrections require a new draft.
    pub fn update_draft(
        &self,
        blueprint_id: &str,
        version: u32,
        fields: BTreeMap<String, serde_json::Value>,
        rules: BTreeMap<String, serde_json::Value>,
        description: &str,
    ) -> VersionResult<BlueprintVersion> {
        match self.state.update_draft_version(blueprint_id, version, |draft| {
            draft.fields = fields;
            draft.rules = rules;
            draft.change_description = description.to_string();
        })? {
            DraftUpdate::Updated(draft) => Ok(draft),
            DraftUpdate::AlreadyPublished => Err(VersionError::Conflict(format!(
                "version {version} of blueprint {blueprint_id} is published and immutable"
            ))),
            DraftUpdate::Missing => Err(VersionError::NotFound(format!(
                "version {version} of blueprint {blueprint_id}"
            ))),
        }
    }

    /// Transition a draft to published. One-way and idempotence-guarded:
    /// re-publishing an already published version is a conflict.
    ///
    /// The change summary against the previous published version is
    /// computed here and frozen into the record.
    pub fn publish(
        &self,
        blueprint_id: &str,
        version: u32,
        release_notes: &str,
        notify: bool,
    ) -> VersionResult<BlueprintVersion> {
        if release_notes.trim().is_empty() {
            return Err(VersionError::Validation(
                "release notes must not be empty".to_string(),
            ));
        }

        let previous = self.state.latest_published_version(blueprint_id)?;
        let published_at = epoch_secs();

        // Single conditional write: readers observe either the draft or
        // the fully published record, never an intermediate, and a
        // racing second publish lands on `AlreadyPublished`.
        let record = match self.state.update_draft_version(blueprint_id, version, |record| {
            record.change_summary = match &previous {
                Some(previous) => diff_versions(previous, record),
                // First publish: everything the draft contains is an addition.
                None => VersionChangeSummary {
                    added_fields: record.fields.keys().cloned().collect(),
                    added_rules: record.rules.keys().cloned().collect(),
                    ..Default::default()
                },
            };
            record.is_published = true;
            record.release_notes = Some(release_notes.to_string());
            record.published_at = Some(published_at);
        })? {
            DraftUpdate::Updated(record) => record,
            DraftUpdate::AlreadyPublished => {
                return Err(VersionError::Conflict(format!(
                    "version {version} of blueprint {blueprint_id} is already published"
                )));
            }
            DraftUpdate::Missing => {
                return Err(VersionError::NotFound(format!(
                    "version {version} of blueprint {blueprint_id}"
                )));
            }
        };
        self.state.append_audit(
            record.published_at.unwrap_or_default(),
            &self.actor.actor(),
            AuditEvent::Published {
                blueprint_id: blueprint_id.to_string(),
                version,
            },
        )?;

        info!(blueprint = blueprint_id, version, "version published");

        if notify {
            if let Some(events) = &self.events {
                // Receiver shutdown is not a publish failure.
                let _ = events.send(PublishEvent {
                    blueprint_id: blueprint_id.to_string(),
                    version,
                    change_type: record.change_type,
                    summary: record.change_summary.clone(),
                });
            }
        }

        Ok(record)
    }

    /// Tag a published version as deprecated.
    ///
    /// Informational only: bindings may still apply a deprecated version
    /// and its content stays frozen.
    pub fn deprecate(&self, blueprint_id: &str, version: u32) -> VersionResult<BlueprintVersion> {
        let mut record = self.load(blueprint_id, version)?;
        if !record.is_published {
            return Err(VersionError::Conflict(format!(
                "version {version} of blueprint {blueprint_id} is not published"
            )));
        }

        record.change_type = ChangeType::Deprecate;
        self.state.put_version(&record)?;
        self.state.append_audit(
            epoch_secs(),
            &self.actor.actor(),
            AuditEvent::Deprecated {
                blueprint_id: blueprint_id.to_string(),
                version,
            },
        )?;
        Ok(record)
    }

    /// All versions of a blueprint, newest first.
    pub fn version_history(&self, blueprint_id: &str) -> VersionResult<Vec<BlueprintVersion>> {
        let mut versions = self.state.list_versions(blueprint_id)?;
        versions.reverse();
        Ok(versions)
    }

    /// Highest-numbered published version.
    pub fn latest_version(&self, blueprint_id: &str) -> VersionResult<BlueprintVersion> {
        self.state
            .latest_published_version(blueprint_id)?
            .ok_or_else(|| {
                VersionError::NotFound(format!(
                    "blueprint {blueprint_id} has no published version"
                ))
            })
    }

    fn load(&self, blueprint_id: &str, version: u32) -> VersionResult<BlueprintVersion> {
        self.state
            .get_version(blueprint_id, version)?
            .ok_or_else(|| {
                VersionError::NotFound(format!("version {version} of blueprint {blueprint_id}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::publish_channel;
    use serde_json::json;

    fn store() -> VersionStore {
        VersionStore::new(StateStore::open_in_memory().unwrap())
    }

    fn content(ids: &[&str]) -> BTreeMap<String, serde_json::Value> {
        ids.iter().map(|id| (id.to_string(), json!({}))).collect()
    }

    #[test]
    fn first_draft_is_version_one() {
        let versions = store();
        let draft = versions.create_draft("bp1", "initial").unwrap();
        assert_eq!(draft.version, 1);
        assert_eq!(draft.change_type, ChangeType::Create);
        assert!(!draft.is_published);
        assert!(draft.published_at.is_none());
    }

    #[test]
    fn second_open_draft_rejected() {
        let versions = store();
        versions.create_draft("bp1", "initial").unwrap();

        let err = versions.create_draft("bp1", "again").unwrap_err();
        assert!(matches!(err, VersionError::Conflict(_)));
    }

    #[test]
    fn blueprint_id_with_colon_rejected() {
        let versions = store();

        let err = versions.create_draft("line:a", "initial").unwrap_err();
        assert!(matches!(err, VersionError::Validation(_)));
        let err = versions.create_draft("", "initial").unwrap_err();
        assert!(matches!(err, VersionError::Validation(_)));

        // A colon-bearing id would otherwise alias the key prefix of
        // the shorter blueprint and contaminate its history.
        versions.create_draft("line", "initial").unwrap();
        assert_eq!(versions.version_history("line").unwrap().len(), 1);
    }

    #[test]
    fn concurrent_draft_creation_yields_single_draft() {
        let versions = store();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let versions = versions.clone();
                std::thread::spawn(move || versions.create_draft("bp1", "race"))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();

        assert_eq!(created, 1);
        for result in &results {
            if let Err(err) = result {
                assert!(matches!(err, VersionError::Conflict(_)));
            }
        }
        // Exactly one record exists; nothing was silently overwritten.
        let history = versions.version_history("bp1").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
    }

    #[test]
    fn version_numbers_strictly_increase() {
        let versions = store();
        for expected in 1..=3 {
            let draft = versions.create_draft("bp1", "rev").unwrap();
            assert_eq!(draft.version, expected);
            versions.publish("bp1", expected, "notes", false).unwrap();
        }
        // Unrelated blueprint starts over at 1.
        assert_eq!(versions.create_draft("bp2", "other").unwrap().version, 1);
    }

    #[test]
    fn draft_seeded_from_latest_published() {
        let versions = store();
        let draft = versions.create_draft("bp1", "initial").unwrap();
        versions
            .update_draft("bp1", draft.version, content(&["a", "b"]), content(&["r1"]), "initial")
            .unwrap();
        versions.publish("bp1", 1, "notes", false).unwrap();

        let next = versions.create_draft("bp1", "follow-up").unwrap();
        assert_eq!(next.change_type, ChangeType::Update);
        assert_eq!(next.fields.len(), 2);
        assert_eq!(next.rules.len(), 1);
    }

    #[test]
    fn publish_requires_release_notes() {
        let versions = store();
        versions.create_draft("bp1", "initial").unwrap();

        let err = versions.publish("bp1", 1, "  ", false).unwrap_err();
        assert!(matches!(err, VersionError::Validation(_)));
    }

    #[test]
    fn publish_stamps_and_freezes() {
        let versions = store();
        versions.create_draft("bp1", "initial").unwrap();
        let published = versions.publish("bp1", 1, "first release", false).unwrap();

        assert!(published.is_published);
        assert!(published.published_at.is_some());
        assert_eq!(published.release_notes.as_deref(), Some("first release"));

        // Published content is immutable.
        let err = versions
            .update_draft("bp1", 1, content(&["x"]), BTreeMap::new(), "sneaky edit")
            .unwrap_err();
        assert!(matches!(err, VersionError::Conflict(_)));
    }

    #[test]
    fn republish_rejected() {
        let versions = store();
        versions.create_draft("bp1", "initial").unwrap();
        versions.publish("bp1", 1, "notes", false).unwrap();

        let err = versions.publish("bp1", 1, "notes", false).unwrap_err();
        assert!(matches!(err, VersionError::Conflict(_)));
    }

    #[test]
    fn publish_unknown_version_rejected() {
        let versions = store();
        let err = versions.publish("bp1", 4, "notes", false).unwrap_err();
        assert!(matches!(err, VersionError::NotFound(_)));
    }

    #[test]
    fn publish_computes_change_summary() {
        let versions = store();
        let draft = versions.create_draft("bp1", "initial").unwrap();
        versions
            .update_draft("bp1", draft.version, content(&["a", "b"]), BTreeMap::new(), "initial")
            .unwrap();
        let v1 = versions.publish("bp1", 1, "notes", false).unwrap();
        assert_eq!(v1.change_summary.added_fields, vec!["a", "b"]);

        let draft = versions.create_draft("bp1", "drop b, add c").unwrap();
        versions
            .update_draft("bp1", draft.version, content(&["a", "c"]), BTreeMap::new(), "rev")
            .unwrap();
        let v2 = versions.publish("bp1", 2, "notes", false).unwrap();
        assert_eq!(v2.change_summary.added_fields, vec!["c"]);
        assert_eq!(v2.change_summary.removed_fields, vec!["b"]);
    }

    #[test]
    fn history_is_newest_first() {
        let versions = store();
        versions.create_draft("bp1", "one").unwrap();
        versions.publish("bp1", 1, "notes", false).unwrap();
        versions.create_draft("bp1", "two").unwrap();

        let history = versions.version_history("bp1").unwrap();
        let numbers: Vec<u32> = history.iter().map(|v| v.version).collect();
        assert_eq!(numbers, vec![2, 1]);
    }

    #[test]
    fn latest_ignores_open_draft() {
        let versions = store();
        versions.create_draft("bp1", "one").unwrap();
        versions.publish("bp1", 1, "notes", false).unwrap();
        versions.create_draft("bp1", "two").unwrap();

        assert_eq!(versions.latest_version("bp1").unwrap().version, 1);
    }

    #[test]
    fn latest_errors_when_nothing_published() {
        let versions = store();
        versions.create_draft("bp1", "draft only").unwrap();

        let err = versions.latest_version("bp1").unwrap_err();
        assert!(matches!(err, VersionError::NotFound(_)));
    }

    #[test]
    fn deprecate_tags_published_version() {
        let versions = store();
        versions.create_draft("bp1", "one").unwrap();
        versions.publish("bp1", 1, "notes", false).unwrap();

        let tagged = versions.deprecate("bp1", 1).unwrap();
        assert_eq!(tagged.change_type, ChangeType::Deprecate);
        assert!(tagged.is_published);

        // Drafts cannot be deprecated.
        versions.create_draft("bp1", "two").unwrap();
        let err = versions.deprecate("bp1", 2).unwrap_err();
        assert!(matches!(err, VersionError::Conflict(_)));
    }

    #[tokio::test]
    async fn publish_emits_event_when_notify() {
        let (tx, mut rx) = publish_channel();
        let versions = store().with_events(tx);

        versions.create_draft("bp1", "one").unwrap();
        versions.publish("bp1", 1, "notes", true).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.blueprint_id, "bp1");
        assert_eq!(event.version, 1);
    }

    #[tokio::test]
    async fn publish_without_notify_stays_silent() {
        let (tx, mut rx) = publish_channel();
        let versions = store().with_events(tx);

        versions.create_draft("bp1", "one").unwrap();
        versions.publish("bp1", 1, "notes", false).unwrap();

        assert!(rx.try_recv().is_err());
    }
}
