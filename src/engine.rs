//! `SyncEngine` ties the pieces together.
//!
//! It owns the registry, the change detector, the render batcher and the
//! change feed; creates notifiers already attached to the feed; and hands
//! out listener bindings. One engine serves any number of notifiers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;

use crate::batcher::RenderBatcher;
use crate::binding::ValueListener;
use crate::binding::ValueListenerBuilder;
use crate::change_detector::ChangeDetector;
use crate::config::SyncConfig;
use crate::feed::ChangeFeed;
use crate::feed::RenderUpdate;
use crate::feed::UpdateSink;
use crate::metrics::BATCH_FLUSHES;
use crate::metrics::FLUSHED_UPDATES;
use crate::notifier::Serializable;
use crate::notifier::ValueNotifier;
use crate::registry::Registry;
use crate::registry::SweepReport;
use crate::widget::Widget;
use crate::Result;

pub struct SyncEngine {
    config: SyncConfig,
    registry: Arc<Registry>,
    detector: ChangeDetector,
    batcher: Arc<RenderBatcher<RenderUpdate>>,
    feed: Arc<ChangeFeed>,
}

impl SyncEngine {
    /// Builds an engine from validated configuration. Must be called inside
    /// a tokio runtime.
    pub fn new(config: SyncConfig) -> Result<Arc<Self>> {
        let feed = Arc::new(ChangeFeed::new(&config.delivery));

        let sink = feed.clone();
        let batcher = RenderBatcher::new(config.batcher.debounce(), move |batch: HashMap<String, RenderUpdate>| {
            BATCH_FLUSHES.inc();
            FLUSHED_UPDATES.inc_by(batch.len() as u64);
            for update in batch.into_values() {
                sink.publish_render(update);
            }
        })?;

        Ok(Arc::new(Self {
            registry: Arc::new(Registry::new(&config.registry)),
            detector: ChangeDetector::new(),
            batcher,
            feed,
            config,
        }))
    }

    /// Creates a notifier whose changes flow into this engine's feed.
    pub fn notifier<T: Serializable>(
        &self,
        initial: T,
    ) -> Arc<ValueNotifier<T>> {
        let notifier = Arc::new(ValueNotifier::new(initial));
        self.adopt(&notifier);
        notifier
    }

    /// Attaches a notifier created elsewhere. Returns false if it was already
    /// attached to a sink.
    pub fn adopt<T: Serializable>(
        &self,
        notifier: &ValueNotifier<T>,
    ) -> bool {
        if notifier.is_attached() {
            return false;
        }
        let attached = notifier.attach(self.feed.clone());
        if attached {
            debug!(notifier_id = %notifier.id(), "notifier attached to change feed");
        }
        attached
    }

    /// Binding of `notifier` to `builder`.
    pub fn listen<T, F, W>(
        self: &Arc<Self>,
        notifier: &Arc<ValueNotifier<T>>,
        builder: F,
    ) -> ValueListener<T>
    where
        T: Serializable,
        F: Fn(&T) -> Option<W> + Send + Sync + 'static,
        W: Widget + 'static,
    {
        self.listener_builder().notifier(notifier.clone()).builder(builder).build()
    }

    pub fn listener_builder<T: Serializable>(self: &Arc<Self>) -> ValueListenerBuilder<T> {
        ValueListenerBuilder::new(self.clone())
    }

    /// Spawns the registry reclamation worker. Listeners it reaps also lose
    /// their change detector baseline and retained fragment.
    pub fn start(
        self: &Arc<Self>,
        shutdown_signal: watch::Receiver<()>,
    ) -> JoinHandle<()> {
        info!(
            sweep_interval_ms = self.config.registry.sweep_interval_ms,
            idle_threshold_ms = self.config.registry.idle_threshold_ms,
            "starting reclamation sweep"
        );
        let engine = Arc::downgrade(self);
        self.registry.clone().spawn_reclamation(shutdown_signal, move |report| {
            if let Some(engine) = engine.upgrade() {
                engine.release_reaped(&report);
            }
        })
    }

    /// Runs one reclamation pass now, releasing what it reaped.
    pub fn sweep(&self) -> SweepReport {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(
        &self,
        now: Instant,
    ) -> SweepReport {
        let report = self.registry.sweep_at(now);
        self.release_reaped(&report);
        report
    }

    /// Forgets everything kept for one listener outside the registry: its
    /// detector baseline, a pending render and its latest fragment.
    pub(crate) fn release_listener(
        &self,
        listener_id: &str,
        notifier_id: &str,
    ) {
        self.detector.clear(&ChangeDetector::key(listener_id, notifier_id));
        self.batcher.discard(listener_id);
        self.feed.release_listener(notifier_id, listener_id);
    }

    fn release_reaped(
        &self,
        report: &SweepReport,
    ) {
        for reaped in &report.reaped_listeners {
            self.release_listener(&reaped.listener_id, &reaped.notifier_id);
        }
    }

    /// Pushes pending listener updates to the feed without waiting for the
    /// debounce window.
    pub fn flush(&self) -> usize {
        self.batcher.flush()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn batcher(&self) -> &Arc<RenderBatcher<RenderUpdate>> {
        &self.batcher
    }

    pub fn feed(&self) -> &Arc<ChangeFeed> {
        &self.feed
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("registry", &self.registry.stats())
            .field("feed", &self.feed)
            .field("batcher", &self.batcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::widget::Text;

    #[tokio::test(start_paused = true)]
    async fn test_mutation_reaches_feed_in_one_flush() {
        let engine = SyncEngine::new(SyncConfig::default()).unwrap();
        let counter = engine.notifier(0i64);
        let listener = engine.listen(&counter, |v: &i64| Some(Text::new(v.to_string())));
        listener.render();

        let mut rx = engine.feed().subscribe(counter.id()).unwrap();
        counter.set(5);

        let value_event = rx.recv().await.unwrap();
        assert_eq!(value_event.value, json!(5));
        assert!(value_event.listener.is_none());

        let render_event = rx.recv().await.unwrap();
        assert_eq!(render_event.value, json!(5));
        assert_eq!(render_event.listener.as_deref(), Some(listener.id()));
        assert_eq!(render_event.html.as_deref(), Some("5"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_value_skips_builder() {
        let engine = SyncEngine::new(SyncConfig::default()).unwrap();
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = engine.notifier(0i64);
        let listener = {
            let builds = builds.clone();
            engine.listen(&counter, move |v: &i64| {
                builds.fetch_add(1, Ordering::SeqCst);
                Some(Text::new(v.to_string()))
            })
        };
        listener.render();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        counter.set(5);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        counter.set(5);
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(engine.flush(), 1);
    }

    #[tokio::test]
    async fn test_adopt_is_idempotent() {
        let engine = SyncEngine::new(SyncConfig::default()).unwrap();
        let notifier = ValueNotifier::new(String::from("x"));
        assert!(engine.adopt(&notifier));
        assert!(!engine.adopt(&notifier));
        assert!(engine.feed().contains(notifier.id()));

        let id = notifier.id().to_string();
        drop(notifier);
        assert!(!engine.feed().contains(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stops_on_shutdown() {
        let engine = SyncEngine::new(SyncConfig::default()).unwrap();
        let (tx, rx) = watch::channel(());
        let handle = engine.start(rx);
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
