use tokio::time::Instant;

use crate::notifier::NotifierId;

pub type WidgetId = String;
pub type ListenerId = String;

/// Registry lifecycle of a widget or listener record.
///
/// `Active -> Inactive` happens on unregistration; the reclamation sweep then
/// reaps the record once it has been idle past the grace period. A reaped
/// record is simply gone, so there is no variant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Inactive,
}

#[derive(Debug, Clone)]
pub struct WidgetInfo {
    pub id: WidgetId,
    pub widget_type: String,
    /// Every notifier this widget observes; only grows until unregistration
    pub notifier_ids: Vec<NotifierId>,
    pub created_at: Instant,
    pub last_access: Instant,
    pub render_count: u64,
    pub state: Lifecycle,
}

impl WidgetInfo {
    pub fn is_active(&self) -> bool {
        self.state == Lifecycle::Active
    }
}

#[derive(Debug, Clone)]
pub struct ListenerInfo {
    pub id: ListenerId,
    pub widget_id: WidgetId,
    pub notifier_id: NotifierId,
    pub created_at: Instant,
    pub last_used: Instant,
    pub state: Lifecycle,
}

impl ListenerInfo {
    pub fn is_active(&self) -> bool {
        self.state == Lifecycle::Active
    }
}

/// Listener record removed by a sweep; whatever else was kept for it can go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapedListener {
    pub listener_id: ListenerId,
    pub notifier_id: NotifierId,
}

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub widgets_reaped: usize,
    pub listeners_reaped: usize,
    /// Notifiers whose listener list became empty and was dropped
    pub notifiers_dropped: usize,
    pub reaped_listeners: Vec<ReapedListener>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.widgets_reaped == 0 && self.listeners_reaped == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub widgets: usize,
    pub active_widgets: usize,
    pub listeners: usize,
    pub active_listeners: usize,
    pub notifiers: usize,
}
