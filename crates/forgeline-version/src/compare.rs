//! VersionComparator — structural diff between two blueprint versions.
//!
//! Comparison is directional in labeling: identifiers present only in
//! `to` are "added", only in `from` are "removed", present in both with
//! different bodies "modified". Output lists are lexically sorted so
//! repeated comparisons of the same pair are byte-identical.

use std::collections::BTreeMap;

use forgeline_state::{BlueprintVersion, StateStore, VersionChangeSummary};

use crate::error::{VersionError, VersionResult};

/// On-demand diffing of two versions in a blueprint's history.
#[derive(Clone)]
pub struct VersionComparator {
    state: StateStore,
}

impl VersionComparator {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// Compare two versions of the same blueprint.
    ///
    /// Comparing a version to itself yields an empty summary.
    pub fn compare(
        &self,
        blueprint_id: &str,
        from_version: u32,
        to_version: u32,
    ) -> VersionResult<VersionChangeSummary> {
        let from = self.load(blueprint_id, from_version)?;
        let to = self.load(blueprint_id, to_version)?;
        Ok(diff_versions(&from, &to))
    }

    fn load(&self, blueprint_id: &str, version: u32) -> VersionResult<BlueprintVersion> {
        self.state
            .get_version(blueprint_id, version)?
            .ok_or_else(|| {
                VersionError::NotFound(format!("version {version} of blueprint {blueprint_id}"))
            })
    }
}

/// Diff the field and rule content of two version records.
pub fn diff_versions(from: &BlueprintVersion, to: &BlueprintVersion) -> VersionChangeSummary {
    let (added_fields, removed_fields, modified_fields) = diff_maps(&from.fields, &to.fields);
    let (added_rules, removed_rules, modified_rules) = diff_maps(&from.rules, &to.rules);
    VersionChangeSummary {
        added_fields,
        removed_fields,
        modified_fields,
        added_rules,
        removed_rules,
        modified_rules,
    }
}

/// Diff content maps by identifier. BTreeMap iteration order makes the
/// output lists lexically sorted without an extra sort pass.
fn diff_maps(
    from: &BTreeMap<String, serde_json::Value>,
    to: &BTreeMap<String, serde_json::Value>,
) -> (Vec<String>, Vec<String>, Vec<String>) {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut modified = Vec::new();

    for (id, body) in to {
        match from.get(id) {
            None => added.push(id.clone()),
            Some(old) if old != body => modified.push(id.clone()),
            Some(_) => {}
        }
    }
    for id in from.keys() {
        if !to.contains_key(id) {
            removed.push(id.clone());
        }
    }

    (added, removed, modified)
}
