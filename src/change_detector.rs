//! Change detection keyed by `(binding, notifier)`.
//!
//! A rebuild is only worth doing when the serialized value actually differs
//! from the one the binding last rendered. Comparison is structural
//! on [`serde_json::Value`], so two equal composite values are the same value
//! even if they live in distinct allocations.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

#[derive(Debug, Default)]
pub struct ChangeDetector {
    last_values: Mutex<HashMap<String, Value>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite key for a binding/notifier pair.
    pub fn key(
        owner_id: &str,
        notifier_id: &str,
    ) -> String {
        format!("{owner_id}:{notifier_id}")
    }

    /// Records `value` under `key` and reports whether it differs from the
    /// previously recorded one. The first observation of a key is a change.
    pub fn has_changed(
        &self,
        key: &str,
        value: &Value,
    ) -> bool {
        let mut last_values = self.last_values.lock();
        match last_values.get_mut(key) {
            Some(previous) if previous == value => {
                trace!(key, "value unchanged");
                false
            }
            Some(previous) => {
                *previous = value.clone();
                true
            }
            None => {
                last_values.insert(key.to_string(), value.clone());
                true
            }
        }
    }

    /// Forgets one key; the next observation counts as a change.
    pub fn clear(
        &self,
        key: &str,
    ) -> bool {
        self.last_values.lock().remove(key).is_some()
    }

    pub fn clear_all(&self) {
        self.last_values.lock().clear();
    }

    pub fn contains(
        &self,
        key: &str,
    ) -> bool {
        self.last_values.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.last_values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_values.lock().is_empty()
    }
}
