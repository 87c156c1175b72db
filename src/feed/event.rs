use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::registry::ListenerId;
use crate::notifier::NotifierId;
use crate::notifier::Version;

/// One entry of a notifier's change feed.
///
/// Applying an event means "set to `value`" (and replace the listener's
/// content with `html` when present), so applying it twice is harmless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: NotifierId,
    /// Per-notifier feed position, strictly increasing
    pub seq: u64,
    /// Notifier version the value was written at
    pub version: Version,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<ListenerId>,
    /// Milliseconds since epoch
    pub timestamp: u64,
}

/// Rebuilt listener fragment produced by a binding's change callback.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderUpdate {
    pub notifier_id: NotifierId,
    pub listener_id: ListenerId,
    pub version: Version,
    pub value: Value,
    pub html: String,
}

/// Body of `GET /state/{notifierID}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub id: NotifierId,
    pub value: Value,
    pub timestamp: u64,
    pub seq: u64,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl From<StateSnapshot> for ChangeEvent {
    fn from(s: StateSnapshot) -> Self {
        ChangeEvent {
            id: s.id,
            seq: s.seq,
            version: s.version,
            value: s.value,
            html: s.html,
            listener: None,
            timestamp: s.timestamp,
        }
    }
}

/// Frame sent over the push channel: a change event tagged with its channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub channel: String,
    #[serde(flatten)]
    pub event: ChangeEvent,
}
