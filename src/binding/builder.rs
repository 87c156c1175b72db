use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use nanoid::nanoid;
use parking_lot::Mutex;

use super::BuilderFn;
use super::ValueListener;
use crate::constants::LISTENER_ID_PREFIX;
use crate::constants::WIDGET_ID_PREFIX;
use crate::engine::SyncEngine;
use crate::html::ErrorStrategy;
use crate::notifier::Serializable;
use crate::notifier::ValueNotifier;
use crate::widget::BoxedWidget;
use crate::widget::Widget;

/// Step-by-step construction of a [`ValueListener`].
///
/// Leaving out the notifier or the builder is allowed; the resulting binding
/// renders the matching diagnostic fragment.
///
/// ```ignore
/// let counter = engine.notifier(0i64);
/// let label = engine
///     .listener_builder()
///     .notifier(counter.clone())
///     .builder(|v: &i64| Some(Text::new(format!("count: {v}"))))
///     .build();
/// let html = label.render();
/// ```
pub struct ValueListenerBuilder<T: Serializable> {
    engine: Arc<SyncEngine>,
    notifier: Option<Arc<ValueNotifier<T>>>,
    builder: Option<BuilderFn<T>>,
    widget_id: Option<String>,
    error_strategy: ErrorStrategy,
    per_request: bool,
}

impl<T: Serializable> ValueListenerBuilder<T> {
    pub(crate) fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            notifier: None,
            builder: None,
            widget_id: None,
            error_strategy: ErrorStrategy::default(),
            per_request: false,
        }
    }

    pub fn notifier(
        mut self,
        notifier: Arc<ValueNotifier<T>>,
    ) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Function producing the widget for a value; `None` is reported as an
    /// empty build.
    pub fn builder<F, W>(
        mut self,
        builder: F,
    ) -> Self
    where
        F: Fn(&T) -> Option<W> + Send + Sync + 'static,
        W: Widget + 'static,
    {
        self.builder = Some(Arc::new(move |value: &T| {
            builder(value).map(|w| Box::new(w) as BoxedWidget)
        }));
        self
    }

    /// Owning widget the binding is registered under. A fresh id is
    /// generated when not set.
    pub fn widget_id(
        mut self,
        widget_id: impl Into<String>,
    ) -> Self {
        self.widget_id = Some(widget_id.into());
        self
    }

    pub fn error_strategy(
        mut self,
        strategy: ErrorStrategy,
    ) -> Self {
        self.error_strategy = strategy;
        self
    }

    /// Marks the binding as rendered for a single page response. It is
    /// registered inactive and reaped unless a push session claims it or
    /// pollers keep asking for it.
    pub fn per_request(mut self) -> Self {
        self.per_request = true;
        self
    }

    pub fn build(self) -> ValueListener<T> {
        ValueListener {
            id: format!("{}{}", LISTENER_ID_PREFIX, nanoid!(12)),
            widget_id: self
                .widget_id
                .unwrap_or_else(|| format!("{}{}", WIDGET_ID_PREFIX, nanoid!(12))),
            notifier: self.notifier,
            builder: self.builder,
            error_strategy: self.error_strategy,
            per_request: self.per_request,
            engine: self.engine,
            registered: AtomicBool::new(false),
            subscription: Mutex::new(None),
        }
    }
}
