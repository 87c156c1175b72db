//! Value Notifier: an identity-bearing mutable cell with an insertion-ordered
//! listener list.
//!
//! The notifier computes nothing on mutation. It stores the new value, bumps
//! its version, hands the serialized value to the attached [`UpdateSink`] and
//! then calls every listener synchronously, in registration order, on the
//! mutator's stack.

mod serializable;


pub use serializable::*;

use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::OnceLock;

use nanoid::nanoid;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::constants::NOTIFIER_ID_PREFIX;
use crate::feed::UpdateSink;
use crate::utils::async_task::panic_message;

pub type NotifierId = String;

/// Handle returned by [`ValueNotifier::add_listener`], used to remove it again.
pub type SubscriptionId = u64;

/// Monotonic per-notifier mutation counter. The initial value is version 0.
pub type Version = u64;

type Callback<T> = Arc<dyn Fn(&T, Version) + Send + Sync>;

pub struct ValueNotifier<T> {
    id: NotifierId,
    /// Current value and the version it was written at
    value: RwLock<(T, Version)>,
    listeners: Mutex<Vec<(SubscriptionId, Callback<T>)>>,
    next_subscription: AtomicU64,
    /// Back-reference used to push changes outward; set once
    sink: OnceLock<Arc<dyn UpdateSink>>,
}

impl<T> ValueNotifier<T>
where
    T: Serializable,
{
    pub fn new(initial: T) -> Self {
        Self {
            id: format!("{}{}", NOTIFIER_ID_PREFIX, nanoid!(12)),
            value: RwLock::new((initial, 0)),
            listeners: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            sink: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.value.read().0.clone()
    }

    /// Current value together with the version it was written at.
    pub fn snapshot(&self) -> (T, Version) {
        let guard = self.value.read();
        (guard.0.clone(), guard.1)
    }

    pub fn version(&self) -> Version {
        self.value.read().1
    }

    /// Replaces the value and notifies.
    pub fn set(
        &self,
        value: T,
    ) {
        self.update(move |v| *v = value);
    }

    /// Mutates the value in place and notifies.
    pub fn update(
        &self,
        func: impl FnOnce(&mut T),
    ) {
        let (snapshot, version) = {
            let mut guard = self.value.write();
            func(&mut guard.0);
            guard.1 += 1;
            (guard.0.clone(), guard.1)
        };
        self.notify(&snapshot, version);
    }

    /// Registers a callback invoked with every new value.
    pub fn add_listener(
        &self,
        listener: impl Fn(&T) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.add_versioned_listener(move |value, _| listener(value))
    }

    /// Like [`add_listener`](Self::add_listener), also passing the version
    /// the value was written at.
    pub fn add_versioned_listener(
        &self,
        listener: impl Fn(&T, Version) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));
        trace!(notifier_id = %self.id, subscription = id, "listener added");
        id
    }

    /// Returns false if no listener with this id was registered.
    pub fn remove_listener(
        &self,
        subscription: SubscriptionId,
    ) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != subscription);
        let removed = listeners.len() != before;
        if removed {
            trace!(notifier_id = %self.id, subscription, "listener removed");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Attaches the sink changes are published to and publishes the current
    /// value. Returns false if a sink was already attached; the first one wins.
    pub fn attach(
        &self,
        sink: Arc<dyn UpdateSink>,
    ) -> bool {
        if self.sink.set(sink).is_err() {
            debug!(notifier_id = %self.id, "sink already attached, ignoring");
            return false;
        }
        let (value, version) = self.snapshot();
        self.publish(&value, version);
        true
    }

    pub fn is_attached(&self) -> bool {
        self.sink.get().is_some()
    }

    fn notify(
        &self,
        value: &T,
        version: Version,
    ) {
        self.publish(value, version);

        // Snapshot so callbacks may add or remove listeners
        let callbacks: Vec<Callback<T>> =
            self.listeners.lock().iter().map(|(_, cb)| cb.clone()).collect();

        for callback in callbacks {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(value, version))) {
                warn!(
                    notifier_id = %self.id,
                    "listener panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    fn publish(
        &self,
        value: &T,
        version: Version,
    ) {
        let Some(sink) = self.sink.get() else {
            return;
        };
        match value.to_wire() {
            Ok(wire) => {
                sink.publish_value(&self.id, version, wire);
            }
            Err(e) => warn!(notifier_id = %self.id, "value serialization failed: {}", e),
        }
    }
}

impl<T> Drop for ValueNotifier<T> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.get() {
            sink.forget(&self.id);
        }
    }
}

impl<T> std::fmt::Debug for ValueNotifier<T>
where
    T: std::fmt::Debug,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let guard = self.value.read();
        f.debug_struct("ValueNotifier")
            .field("id", &self.id)
            .field("value", &guard.0)
            .field("version", &guard.1)
            .finish_non_exhaustive()
    }
}
