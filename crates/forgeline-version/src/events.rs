//! Publish events — the notification channel invoked on publish.
//!
//! Publishing a version emits a `PublishEvent` on an unbounded mpsc
//! channel. The auto-upgrade worker consumes events asynchronously;
//! delivery is at-least-once and consumers must be idempotent
//! (re-applying an already-applied upgrade is a no-op).

use forgeline_state::{BlueprintId, ChangeType, VersionChangeSummary};
use tokio::sync::mpsc;

/// Notification that a blueprint version was published.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PublishEvent {
    pub blueprint_id: BlueprintId,
    pub version: u32,
    pub change_type: ChangeType,
    pub summary: VersionChangeSummary,
}

/// Sending half of the publish notification channel.
pub type PublishSender = mpsc::UnboundedSender<PublishEvent>;

/// Receiving half of the publish notification channel.
pub type PublishReceiver = mpsc::UnboundedReceiver<PublishEvent>;

/// Create the publish notification channel.
pub fn publish_channel() -> (PublishSender, PublishReceiver) {
    mpsc::unbounded_channel()
}
