//! Widget/Listener Registry.
//!
//! Metadata about every rendered widget and listener binding, with a
//! two-phase lifecycle: unregistration only marks a record inactive, the
//! periodic reclamation sweep reaps it once it has been idle past the grace
//! period. A render racing a teardown therefore still finds the (stale)
//! record instead of a hole.
//!
//! All maps sit behind one reader/writer lock. Records never own the
//! widgets or notifiers they describe.

mod info;


pub use info::*;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::trace;

use crate::config::RegistryConfig;
use crate::metrics::REAPED_RECORDS;
use crate::notifier::NotifierId;

#[derive(Debug, Default)]
struct RegistryState {
    widgets: HashMap<WidgetId, WidgetInfo>,
    /// Per-notifier listener lists, in registration order
    listeners: HashMap<NotifierId, Vec<ListenerInfo>>,
}

impl RegistryState {
    fn find_listener_mut(
        &mut self,
        listener_id: &str,
    ) -> Option<&mut ListenerInfo> {
        self.listeners
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .find(|l| l.id == listener_id)
    }
}

#[derive(Debug)]
pub struct Registry {
    state: RwLock<RegistryState>,
    sweep_interval: Duration,
    idle_threshold: Duration,
}

impl Registry {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            sweep_interval: config.sweep_interval(),
            idle_threshold: config.idle_threshold(),
        }
    }

    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }

    /// Records a widget. Registering a known id reactivates it and refreshes
    /// its access time; its notifier list is kept.
    pub fn register_widget(
        &self,
        widget_id: &str,
        widget_type: &str,
    ) {
        let now = Instant::now();
        let mut state = self.state.write();
        state
            .widgets
            .entry(widget_id.to_string())
            .and_modify(|w| {
                w.state = Lifecycle::Active;
                w.last_access = now;
            })
            .or_insert_with(|| WidgetInfo {
                id: widget_id.to_string(),
                widget_type: widget_type.to_string(),
                notifier_ids: Vec::new(),
                created_at: now,
                last_access: now,
                render_count: 0,
                state: Lifecycle::Active,
            });
        trace!(widget_id, widget_type, "widget registered");
    }

    /// Records a listener binding. Idempotent per listener id: a second call
    /// only reactivates and touches the existing record.
    ///
    /// The notifier is appended to the owning widget's notifier list when the
    /// widget is known.
    pub fn register_listener(
        &self,
        listener_id: &str,
        widget_id: &str,
        notifier_id: &str,
    ) {
        let now = Instant::now();
        let mut state = self.state.write();

        if let Some(existing) = state.find_listener_mut(listener_id) {
            existing.state = Lifecycle::Active;
            existing.last_used = now;
            trace!(listener_id, "listener already registered");
            return;
        }

        state
            .listeners
            .entry(notifier_id.to_string())
            .or_default()
            .push(ListenerInfo {
                id: listener_id.to_string(),
                widget_id: widget_id.to_string(),
                notifier_id: notifier_id.to_string(),
                created_at: now,
                last_used: now,
                state: Lifecycle::Active,
            });

        if let Some(widget) = state.widgets.get_mut(widget_id) {
            if !widget.notifier_ids.iter().any(|n| n == notifier_id) {
                widget.notifier_ids.push(notifier_id.to_string());
            }
        }
        trace!(listener_id, widget_id, notifier_id, "listener registered");
    }

    /// Marks a widget and every listener it owns inactive. The records stay
    /// readable until the sweep reaps them.
    pub fn unregister_widget(
        &self,
        widget_id: &str,
    ) -> bool {
        let now = Instant::now();
        let mut state = self.state.write();

        let Some(widget) = state.widgets.get_mut(widget_id) else {
            return false;
        };
        widget.state = Lifecycle::Inactive;
        widget.last_access = now;

        for listener in state
            .listeners
            .values_mut()
            .flat_map(|list| list.iter_mut())
            .filter(|l| l.widget_id == widget_id)
        {
            listener.state = Lifecycle::Inactive;
        }
        debug!(widget_id, "widget marked inactive");
        true
    }

    /// Marks one listener inactive.
    pub fn unregister_listener(
        &self,
        listener_id: &str,
    ) -> bool {
        let mut state = self.state.write();
        match state.find_listener_mut(listener_id) {
            Some(listener) => {
                listener.state = Lifecycle::Inactive;
                debug!(listener_id, "listener marked inactive");
                true
            }
            None => false,
        }
    }

    pub fn update_widget_access(
        &self,
        widget_id: &str,
    ) -> bool {
        let mut state = self.state.write();
        match state.widgets.get_mut(widget_id) {
            Some(widget) => {
                widget.last_access = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Touches a widget and counts one more render of it.
    pub fn record_render(
        &self,
        widget_id: &str,
    ) -> bool {
        let mut state = self.state.write();
        match state.widgets.get_mut(widget_id) {
            Some(widget) => {
                widget.last_access = Instant::now();
                widget.render_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn update_listener_access(
        &self,
        listener_id: &str,
    ) -> bool {
        let mut state = self.state.write();
        match state.find_listener_mut(listener_id) {
            Some(listener) => {
                listener.last_used = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Touches a listener and the widget that owns it. Returns false when
    /// the listener record is gone.
    pub fn touch_listener(
        &self,
        listener_id: &str,
    ) -> bool {
        let now = Instant::now();
        let mut state = self.state.write();
        let Some(listener) = state.find_listener_mut(listener_id) else {
            return false;
        };
        listener.last_used = now;
        let widget_id = listener.widget_id.clone();
        if let Some(widget) = state.widgets.get_mut(&widget_id) {
            widget.last_access = now;
        }
        true
    }

    /// Puts an inactive listener and its owning widget back to `Active`.
    /// Returns false when the listener record is gone.
    pub fn reactivate_listener(
        &self,
        listener_id: &str,
    ) -> bool {
        let now = Instant::now();
        let mut state = self.state.write();
        let Some(listener) = state.find_listener_mut(listener_id) else {
            return false;
        };
        listener.state = Lifecycle::Active;
        listener.last_used = now;
        let widget_id = listener.widget_id.clone();
        if let Some(widget) = state.widgets.get_mut(&widget_id) {
            widget.state = Lifecycle::Active;
            widget.last_access = now;
        }
        trace!(listener_id, "listener reactivated");
        true
    }

    /// True while a record exists, active or not.
    pub fn listener_exists(
        &self,
        listener_id: &str,
    ) -> bool {
        self.listener_info(listener_id).is_some()
    }

    pub fn widget_info(
        &self,
        widget_id: &str,
    ) -> Option<WidgetInfo> {
        self.state.read().widgets.get(widget_id).cloned()
    }

    pub fn listener_info(
        &self,
        listener_id: &str,
    ) -> Option<ListenerInfo> {
        self.state
            .read()
            .listeners
            .values()
            .flat_map(|list| list.iter())
            .find(|l| l.id == listener_id)
            .cloned()
    }

    pub fn listeners_for(
        &self,
        notifier_id: &str,
    ) -> Vec<ListenerInfo> {
        self.state.read().listeners.get(notifier_id).cloned().unwrap_or_default()
    }

    pub fn widget_count(&self) -> usize {
        self.state.read().widgets.len()
    }

    pub fn listener_count(&self) -> usize {
        self.state.read().listeners.values().map(Vec::len).sum()
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.read();
        let listeners = state.listeners.values().flat_map(|list| list.iter());
        RegistryStats {
            widgets: state.widgets.len(),
            active_widgets: state.widgets.values().filter(|w| w.is_active()).count(),
            listeners: listeners.clone().count(),
            active_listeners: listeners.filter(|l| l.is_active()).count(),
            notifiers: state.listeners.len(),
        }
    }

    /// Runs one reclamation pass against the current time.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    /// Runs one reclamation pass as if the clock read `now`.
    ///
    /// - an inactive widget idle for at least the threshold is deleted
    /// - a listener survives if it is active or was used within the threshold
    /// - a notifier whose listener list ends up empty loses its map entry
    pub fn sweep_at(
        &self,
        now: Instant,
    ) -> SweepReport {
        let threshold = self.idle_threshold;
        let idle = |last: Instant| now.saturating_duration_since(last) >= threshold;

        let mut report = SweepReport::default();
        let mut notifiers_dropped = 0;
        let mut state = self.state.write();

        let before = state.widgets.len();
        state.widgets.retain(|_, w| w.is_active() || !idle(w.last_access));
        report.widgets_reaped = before - state.widgets.len();

        let reaped = &mut report.reaped_listeners;
        state.listeners.retain(|_, list| {
            list.retain(|l| {
                let keep = l.is_active() || !idle(l.last_used);
                if !keep {
                    reaped.push(ReapedListener {
                        listener_id: l.id.clone(),
                        notifier_id: l.notifier_id.clone(),
                    });
                }
                keep
            });
            if list.is_empty() {
                notifiers_dropped += 1;
                false
            } else {
                true
            }
        });
        drop(state);
        report.listeners_reaped = report.reaped_listeners.len();
        report.notifiers_dropped = notifiers_dropped;

        if !report.is_empty() {
            REAPED_RECORDS.with_label_values(&["widget"]).inc_by(report.widgets_reaped as u64);
            REAPED_RECORDS
                .with_label_values(&["listener"])
                .inc_by(report.listeners_reaped as u64);
            debug!(
                "Reclamation sweep: reaped {} widgets, {} listeners",
                report.widgets_reaped, report.listeners_reaped
            );
        }
        report
    }

    /// Spawns the periodic reclamation worker. It runs until `shutdown_signal`
    /// fires or its sender is dropped. `on_sweep` gets every non-empty report.
    pub fn spawn_reclamation<F>(
        self: Arc<Self>,
        mut shutdown_signal: watch::Receiver<()>,
        on_sweep: F,
    ) -> JoinHandle<()>
    where
        F: Fn(SweepReport) + Send + 'static,
    {
        tokio::spawn(async move {
            let start = Instant::now() + self.sweep_interval;
            let mut interval = tokio::time::interval_at(start, self.sweep_interval);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = self.sweep();
                        if !report.is_empty() {
                            on_sweep(report);
                        }
                    }
                    _ = shutdown_signal.changed() => {
                        info!("Reclamation sweep received shutdown signal");
                        break;
                    }
                }
            }

            debug!("Reclamation sweep worker stopped");
        })
    }
}
