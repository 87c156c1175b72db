//! Render Batcher: debounced key→value aggregation.
//!
//! Every [`RenderBatcher::add_update`] stores into the pending map and
//! restarts the single debounce timer, so a burst collapses into one flush.
//! A flush swaps the pending map for an empty one and runs the callback on a
//! separate task; the callback never blocks producers.
//!
//! Only one of the two internal locks is ever held at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;

use crate::Error;
use crate::Result;

type FlushFn<V> = Arc<dyn Fn(HashMap<String, V>) + Send + Sync>;

pub struct RenderBatcher<V> {
    debounce: Duration,
    pending: Mutex<HashMap<String, V>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    on_flush: FlushFn<V>,
    runtime: Handle,
    this: Weak<Self>,
}

impl<V> RenderBatcher<V>
where
    V: Send + 'static,
{
    /// Must be called from within a tokio runtime; timers and flush
    /// callbacks are spawned onto it.
    pub fn new(
        debounce: Duration,
        on_flush: impl Fn(HashMap<String, V>) + Send + Sync + 'static,
    ) -> Result<Arc<Self>> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::Fatal(format!("render batcher needs a tokio runtime: {e}")))?;

        Ok(Arc::new_cyclic(|this| Self {
            debounce,
            pending: Mutex::new(HashMap::new()),
            timer: Mutex::new(None),
            on_flush: Arc::new(on_flush),
            runtime,
            this: this.clone(),
        }))
    }

    /// Stores `value` under `key`, replacing any pending value for it, and
    /// restarts the debounce timer.
    pub fn add_update(
        &self,
        key: impl Into<String>,
        value: V,
    ) {
        let key = key.into();
        trace!(%key, "batcher update queued");
        self.pending.lock().insert(key, value);
        self.restart_timer();
    }

    /// Like [`add_update`](Self::add_update), but keeps the pending value when
    /// `supersedes(pending)` is false. Returns whether `value` was queued.
    pub fn add_update_if(
        &self,
        key: impl Into<String>,
        value: V,
        supersedes: impl FnOnce(&V) -> bool,
    ) -> bool {
        let key = key.into();
        {
            let mut pending = self.pending.lock();
            if let Some(current) = pending.get(&key) {
                if !supersedes(current) {
                    trace!(%key, "pending update kept");
                    return false;
                }
            }
            pending.insert(key, value);
        }
        self.restart_timer();
        true
    }

    /// Drops the pending value for `key` without flushing it.
    pub fn discard(
        &self,
        key: &str,
    ) -> bool {
        self.pending.lock().remove(key).is_some()
    }

    /// Flushes immediately and cancels the timer. Returns the number of keys
    /// handed to the callback.
    pub fn flush(&self) -> usize {
        self.cancel_timer();
        self.fire()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    fn restart_timer(&self) {
        let weak = self.this.clone();
        let debounce = self.debounce;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            if let Some(batcher) = weak.upgrade() {
                batcher.fire();
            }
        });

        if let Some(previous) = self.timer.lock().replace(task) {
            previous.abort();
        }
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
    }

    fn fire(&self) -> usize {
        let batch = std::mem::take(&mut *self.pending.lock());
        if batch.is_empty() {
            return 0;
        }

        let size = batch.len();
        debug!(size, "flushing render batch");
        let on_flush = self.on_flush.clone();
        self.runtime.spawn(async move { on_flush(batch) });
        size
    }
}

impl<V> Drop for RenderBatcher<V> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

impl<V> std::fmt::Debug for RenderBatcher<V> {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("RenderBatcher")
            .field("debounce", &self.debounce)
            .field("pending", &self.pending.lock().len())
            .finish()
    }
}
