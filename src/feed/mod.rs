//! Change feed: the one place push subscribers and polling requests read
//! notifier state from.
//!
//! Each notifier gets a bounded, append-only history of [`ChangeEvent`]s and
//! a broadcast channel. Notifiers publish raw value changes, the render
//! batcher publishes rebuilt listener fragments. The WebSocket writer
//! forwards the broadcast, the polling handler reads [`ChangeFeed::snapshot`];
//! neither keeps a cache of its own.
//!
//! ```text
//! ValueNotifier::set ──publish_value──┐
//!                                     ▼
//! RenderBatcher flush ─publish_render─► ChangeFeed ──broadcast──► /ws
//!                                     │
//!                                     └──snapshot/since─────────► /state/{id}
//! ```

mod event;


pub use event::*;

use std::collections::HashMap;
use std::collections::VecDeque;

use dashmap::DashMap;
#[cfg(test)]
use mockall::automock;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use tracing::trace;

use crate::config::DeliveryConfig;
use crate::notifier::Version;
use crate::registry::ListenerId;
use crate::utils::time::timestamp_millis;

/// Outward-facing side of the engine that notifiers and the batcher push to.
#[cfg_attr(test, automock)]
pub trait UpdateSink: Send + Sync + 'static {
    /// Records a new notifier value. Returns the assigned sequence number, or
    /// `None` when a newer version was already published.
    fn publish_value(
        &self,
        notifier_id: &str,
        version: Version,
        value: Value,
    ) -> Option<u64>;

    /// Records a rebuilt listener fragment. Returns `None` if stale.
    fn publish_render(
        &self,
        update: RenderUpdate,
    ) -> Option<u64>;

    /// Drops the latest fragment kept for one listener of a notifier.
    fn release_listener(
        &self,
        notifier_id: &str,
        listener_id: &str,
    );

    /// Drops all state kept for a notifier.
    fn forget(
        &self,
        notifier_id: &str,
    );
}

struct FeedEntry {
    next_seq: u64,
    latest_value: Option<ChangeEvent>,
    latest_render: HashMap<ListenerId, ChangeEvent>,
    history: VecDeque<ChangeEvent>,
    sender: broadcast::Sender<ChangeEvent>,
}

impl FeedEntry {
    fn new(channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity);
        Self {
            next_seq: 1,
            latest_value: None,
            latest_render: HashMap::new(),
            history: VecDeque::new(),
            sender,
        }
    }

    fn append(
        &mut self,
        mut event: ChangeEvent,
        history_capacity: usize,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        event.seq = seq;

        if self.history.len() == history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());

        // No receivers is fine; pollers still see history
        let _ = self.sender.send(event);
        seq
    }
}

pub struct ChangeFeed {
    entries: DashMap<String, FeedEntry>,
    history_capacity: usize,
    channel_capacity: usize,
}

impl ChangeFeed {
    pub fn new(config: &DeliveryConfig) -> Self {
        Self {
            entries: DashMap::new(),
            history_capacity: config.history_capacity.max(1),
            channel_capacity: config.channel_capacity.max(1),
        }
    }

    /// Latest value event of a notifier.
    pub fn latest(
        &self,
        notifier_id: &str,
    ) -> Option<ChangeEvent> {
        self.entries.get(notifier_id).and_then(|e| e.latest_value.clone())
    }

    /// Latest fragment rebuilt for one listener of a notifier.
    pub fn latest_render(
        &self,
        notifier_id: &str,
        listener_id: &str,
    ) -> Option<ChangeEvent> {
        self.entries
            .get(notifier_id)
            .and_then(|e| e.latest_render.get(listener_id).cloned())
    }

    /// Poll view of a notifier. `html` is only filled in when `listener_id`
    /// names a listener whose latest fragment was built from the current value.
    pub fn snapshot(
        &self,
        notifier_id: &str,
        listener_id: Option<&str>,
    ) -> Option<StateSnapshot> {
        let entry = self.entries.get(notifier_id)?;
        let latest = entry.latest_value.as_ref()?;

        let html = listener_id
            .and_then(|l| entry.latest_render.get(l))
            .filter(|render| render.value == latest.value)
            .and_then(|render| render.html.clone());

        Some(StateSnapshot {
            id: latest.id.clone(),
            value: latest.value.clone(),
            timestamp: latest.timestamp,
            seq: latest.seq,
            version: latest.version,
            html,
        })
    }

    /// Retained events with a sequence number greater than `seq`, oldest first.
    pub fn since(
        &self,
        notifier_id: &str,
        seq: u64,
    ) -> Option<Vec<ChangeEvent>> {
        self.entries
            .get(notifier_id)
            .map(|e| e.history.iter().filter(|ev| ev.seq > seq).cloned().collect())
    }

    /// Receiver for every future event of a notifier; `None` if unknown.
    pub fn subscribe(
        &self,
        notifier_id: &str,
    ) -> Option<broadcast::Receiver<ChangeEvent>> {
        self.entries.get(notifier_id).map(|e| e.sender.subscribe())
    }

    pub fn contains(
        &self,
        notifier_id: &str,
    ) -> bool {
        self.entries.contains_key(notifier_id)
    }

    pub fn notifier_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of listeners with a retained fragment for a notifier.
    pub fn render_count(
        &self,
        notifier_id: &str,
    ) -> usize {
        self.entries.get(notifier_id).map(|e| e.latest_render.len()).unwrap_or(0)
    }

    pub fn subscriber_count(
        &self,
        notifier_id: &str,
    ) -> usize {
        self.entries.get(notifier_id).map(|e| e.sender.receiver_count()).unwrap_or(0)
    }
}

impl UpdateSink for ChangeFeed {
    fn publish_value(
        &self,
        notifier_id: &str,
        version: Version,
        value: Value,
    ) -> Option<u64> {
        let mut entry = self
            .entries
            .entry(notifier_id.to_string())
            .or_insert_with(|| FeedEntry::new(self.channel_capacity));

        if let Some(latest) = &entry.latest_value {
            if latest.version >= version {
                trace!(notifier_id, version, latest = latest.version, "stale value dropped");
                return None;
            }
        }

        let event = ChangeEvent {
            id: notifier_id.to_string(),
            seq: 0,
            version,
            value,
            html: None,
            listener: None,
            timestamp: timestamp_millis(),
        };
        let seq = entry.append(event.clone(), self.history_capacity);
        entry.latest_value = Some(ChangeEvent { seq, ..event });
        Some(seq)
    }

    fn publish_render(
        &self,
        update: RenderUpdate,
    ) -> Option<u64> {
        let mut entry = self
            .entries
            .entry(update.notifier_id.clone())
            .or_insert_with(|| FeedEntry::new(self.channel_capacity));

        if let Some(previous) = entry.latest_render.get(&update.listener_id) {
            if previous.version > update.version {
                trace!(
                    notifier_id = %update.notifier_id,
                    listener_id = %update.listener_id,
                    "stale render dropped"
                );
                return None;
            }
        }

        let listener_id = update.listener_id.clone();
        let event = ChangeEvent {
            id: update.notifier_id,
            seq: 0,
            version: update.version,
            value: update.value,
            html: Some(update.html),
            listener: Some(update.listener_id),
            timestamp: timestamp_millis(),
        };
        let seq = entry.append(event.clone(), self.history_capacity);
        entry.latest_render.insert(listener_id, ChangeEvent { seq, ..event });
        Some(seq)
    }

    fn release_listener(
        &self,
        notifier_id: &str,
        listener_id: &str,
    ) {
        if let Some(mut entry) = self.entries.get_mut(notifier_id) {
            if entry.latest_render.remove(listener_id).is_some() {
                trace!(notifier_id, listener_id, "listener render released");
            }
        }
    }

    fn forget(
        &self,
        notifier_id: &str,
    ) {
        if self.entries.remove(notifier_id).is_some() {
            debug!(notifier_id, "change feed dropped");
        }
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("notifiers", &self.entries.len())
            .field("history_capacity", &self.history_capacity)
            .finish()
    }
}
