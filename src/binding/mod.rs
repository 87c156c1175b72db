//! Listener Binding: couples one [`ValueNotifier`] to one builder function.
//!
//! `render()` registers the binding on first use (registry records plus a
//! change callback on the notifier), builds the widget for the current value
//! and wraps it in a container the browser runtime can find again. Later
//! mutations re-run the builder from the callback and hand the fragment to
//! the render batcher, unless the change detector says the value this
//! binding last rendered is unchanged.
//!
//! Nothing here returns an error to the caller: every [`BindingError`] ends
//! up as a diagnostic fragment in the page.

mod builder;
mod markup;


pub use builder::*;

use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::Weak;

use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use self::markup::Container;
use crate::change_detector::ChangeDetector;
use crate::constants::VALUE_LISTENER_WIDGET_TYPE;
use crate::engine::SyncEngine;
use crate::errors::BindingError;
use crate::feed::RenderUpdate;
use crate::html::failure_fragment;
use crate::html::try_render;
use crate::html::ErrorStrategy;
use crate::metrics::BUILDER_FAILURES;
use crate::metrics::SUPPRESSED_UPDATES;
use crate::notifier::Serializable;
use crate::notifier::SubscriptionId;
use crate::notifier::ValueNotifier;
use crate::notifier::Version;
use crate::registry::ListenerId;
use crate::registry::WidgetId;
use crate::utils::async_task::panic_message;
use crate::utils::time::timestamp_millis;
use crate::widget::BoxedWidget;
use crate::widget::Widget;

pub type BuilderFn<T> = Arc<dyn Fn(&T) -> Option<BoxedWidget> + Send + Sync>;

pub struct ValueListener<T: Serializable> {
    id: ListenerId,
    widget_id: WidgetId,
    notifier: Option<Arc<ValueNotifier<T>>>,
    builder: Option<BuilderFn<T>>,
    error_strategy: ErrorStrategy,
    per_request: bool,
    engine: Arc<SyncEngine>,
    registered: AtomicBool,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl<T: Serializable> ValueListener<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn widget_id(&self) -> &str {
        &self.widget_id
    }

    pub fn notifier(&self) -> Option<&Arc<ValueNotifier<T>>> {
        self.notifier.as_ref()
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Renders the current value. Never fails: configuration and builder
    /// errors become an inline diagnostic fragment.
    pub fn render(&self) -> String {
        match self.try_render() {
            Ok(html) => html,
            Err(e) => {
                warn!(listener_id = %self.id, "listener cannot render: {}", e);
                BUILDER_FAILURES.with_label_values(&[e.kind()]).inc();
                failure_fragment(&self.error_strategy, e.kind(), &e.to_string())
            }
        }
    }

    fn try_render(&self) -> Result<String, BindingError> {
        let notifier = self.notifier.as_ref().ok_or_else(|| BindingError::MissingNotifier {
            listener_id: self.id.clone(),
        })?;
        let builder = self.builder.as_ref().ok_or_else(|| BindingError::MissingBuilder {
            listener_id: self.id.clone(),
        })?;

        self.ensure_registered(notifier, builder);
        self.engine.registry().record_render(&self.widget_id);

        let (value, _) = notifier.snapshot();
        let wire = value.to_wire()?;

        let content = match build_fragment(builder, &value, &self.id, notifier.id()) {
            Ok(html) => html,
            Err(e) => {
                warn!(listener_id = %self.id, "builder failed: {}", e);
                BUILDER_FAILURES.with_label_values(&[e.kind()]).inc();
                failure_fragment(&self.error_strategy, e.kind(), &e.to_string())
            }
        };

        // Baseline for the change callback
        self.engine
            .detector()
            .has_changed(&ChangeDetector::key(&self.id, notifier.id()), &wire);

        Ok(Container {
            notifier_id: notifier.id(),
            listener_id: &self.id,
            widget_id: &self.widget_id,
            value_type: T::TYPE_TAG,
            value: &wire,
            last_updated: timestamp_millis(),
        }
        .render(&content))
    }

    /// Registers with the registry and the notifier exactly once.
    ///
    /// A per-request binding starts out inactive: it stays alive only while a
    /// push session claims it or pollers keep touching it.
    fn ensure_registered(
        &self,
        notifier: &Arc<ValueNotifier<T>>,
        builder: &BuilderFn<T>,
    ) {
        if self.is_registered() {
            let registry = self.engine.registry();
            match registry.listener_info(&self.id) {
                None => {
                    debug!(listener_id = %self.id, "listener was reaped, binding again");
                    self.cleanup();
                }
                Some(info) if !info.is_active() && !self.per_request => {
                    registry.reactivate_listener(&self.id);
                }
                Some(_) => {}
            }
        }

        if self
            .registered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.engine.adopt(notifier);

        let registry = self.engine.registry();
        registry.register_widget(&self.widget_id, VALUE_LISTENER_WIDGET_TYPE);
        registry.register_listener(&self.id, &self.widget_id, notifier.id());
        if self.per_request {
            registry.unregister_widget(&self.widget_id);
        }

        let hook = ChangeHook {
            listener_id: self.id.clone(),
            widget_id: self.widget_id.clone(),
            notifier_id: notifier.id().to_string(),
            builder: builder.clone(),
            error_strategy: self.error_strategy.clone(),
            engine: self.engine.clone(),
            notifier: Arc::downgrade(notifier),
            subscription: Arc::new(OnceLock::new()),
        };
        let slot = hook.subscription.clone();
        let subscription = notifier.add_versioned_listener(move |value, version| hook.on_change(value, version));
        let _ = slot.set(subscription);
        *self.subscription.lock() = Some(subscription);

        debug!(listener_id = %self.id, widget_id = %self.widget_id, notifier_id = %notifier.id(), "listener bound");
    }

    /// Detaches the change callback, marks the registry records inactive and
    /// forgets the change detector baseline and retained fragment. Must not
    /// race a `render()` of the same binding.
    pub fn cleanup(&self) {
        let subscription = self.subscription.lock().take();
        if let (Some(notifier), Some(subscription)) = (&self.notifier, subscription) {
            notifier.remove_listener(subscription);
            self.engine.release_listener(&self.id, notifier.id());
        }

        let registry = self.engine.registry();
        registry.unregister_listener(&self.id);
        registry.unregister_widget(&self.widget_id);
        self.registered.store(false, Ordering::Release);
        debug!(listener_id = %self.id, "listener cleaned up");
    }
}

impl<T: Serializable> Widget for ValueListener<T> {
    fn render(&self) -> String {
        ValueListener::render(self)
    }

    fn widget_type(&self) -> &'static str {
        VALUE_LISTENER_WIDGET_TYPE
    }
}

impl<T: Serializable> std::fmt::Debug for ValueListener<T> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ValueListener")
            .field("id", &self.id)
            .field("widget_id", &self.widget_id)
            .field("notifier_id", &self.notifier.as_ref().map(|n| n.id().to_string()))
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// State captured by the callback a binding installs on its notifier.
struct ChangeHook<T> {
    listener_id: ListenerId,
    widget_id: WidgetId,
    notifier_id: String,
    builder: BuilderFn<T>,
    error_strategy: ErrorStrategy,
    engine: Arc<SyncEngine>,
    notifier: Weak<ValueNotifier<T>>,
    subscription: Arc<OnceLock<SubscriptionId>>,
}

impl<T: Serializable> ChangeHook<T> {
    fn on_change(
        &self,
        value: &T,
        version: Version,
    ) {
        let registry = self.engine.registry();

        // Reaped by the sweep without a cleanup call: unhook lazily
        let Some(info) = registry.listener_info(&self.listener_id) else {
            if let (Some(notifier), Some(subscription)) = (self.notifier.upgrade(), self.subscription.get()) {
                notifier.remove_listener(*subscription);
                debug!(listener_id = %self.listener_id, "reaped listener unhooked");
            }
            self.engine.release_listener(&self.listener_id, &self.notifier_id);
            return;
        };

        // Callbacks of concurrent mutations can arrive out of order
        if let Some(current) = self.notifier.upgrade().map(|n| n.version()) {
            if version < current {
                trace!(listener_id = %self.listener_id, version, current, "stale change skipped");
                return;
            }
        }

        let wire = match value.to_wire() {
            Ok(wire) => wire,
            Err(e) => {
                warn!(listener_id = %self.listener_id, "value serialization failed: {}", e);
                return;
            }
        };

        let key = ChangeDetector::key(&self.listener_id, &self.notifier_id);
        if !self.engine.detector().has_changed(&key, &wire) {
            SUPPRESSED_UPDATES.inc();
            trace!(listener_id = %self.listener_id, version, "unchanged value, rebuild skipped");
            return;
        }

        let html = match build_fragment(&self.builder, value, &self.listener_id, &self.notifier_id) {
            Ok(html) => html,
            Err(e) => {
                warn!(listener_id = %self.listener_id, "builder failed: {}", e);
                BUILDER_FAILURES.with_label_values(&[e.kind()]).inc();
                failure_fragment(&self.error_strategy, e.kind(), &e.to_string())
            }
        };

        // Rebuilds of unclaimed bindings must not hold off the sweep
        if info.is_active() {
            registry.update_listener_access(&self.listener_id);
            registry.update_widget_access(&self.widget_id);
        }

        let queued = self.engine.batcher().add_update_if(
            self.listener_id.clone(),
            RenderUpdate {
                notifier_id: self.notifier_id.clone(),
                listener_id: self.listener_id.clone(),
                version,
                value: wire,
                html,
            },
            |pending| pending.version <= version,
        );
        if !queued {
            trace!(listener_id = %self.listener_id, version, "newer render already pending");
        }
    }
}

/// Runs the builder and renders its widget, containing panics from either.
fn build_fragment<T>(
    builder: &BuilderFn<T>,
    value: &T,
    listener_id: &str,
    notifier_id: &str,
) -> Result<String, BindingError> {
    let widget = catch_unwind(AssertUnwindSafe(|| builder(value)))
        .map_err(|payload| BindingError::BuilderPanicked {
            listener_id: listener_id.to_string(),
            message: panic_message(payload.as_ref()),
        })?
        .ok_or_else(|| BindingError::EmptyBuild {
            listener_id: listener_id.to_string(),
            notifier_id: notifier_id.to_string(),
        })?;

    try_render(widget.as_ref()).map_err(|message| BindingError::BuilderPanicked {
        listener_id: listener_id.to_string(),
        message,
    })
}
