//! Observer registration with unsubscribe-on-drop handles.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback<T>>,
}

/// A set of callbacks notified with `&T`.
///
/// Callbacks run on the notifying thread, outside the registry lock, so they
/// may register or drop handles themselves.
pub struct ObserverSet<T> {
    registry: Arc<RwLock<Registry<T>>>,
}

impl<T: 'static> ObserverSet<T> {
    pub fn new() -> Self {
        Self { registry: Arc::new(RwLock::new(Registry { next_id: 0, callbacks: BTreeMap::new() })) }
    }

    /// Registers `callback`; it stays registered until the handle is dropped.
    pub fn register<F>(&self, callback: F) -> ObserverHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.insert(id, Arc::new(callback));

        let weak: Weak<RwLock<Registry<T>>> = Arc::downgrade(&self.registry);
        ObserverHandle {
            unregister: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.write().callbacks.remove(&id);
                }
            })),
        }
    }

    pub fn notify(&self, event: &T) {
        let callbacks: Vec<Callback<T>> = self.registry.read().callbacks.values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.read().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for ObserverSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters its callback when dropped.
#[must_use = "dropping the handle unregisters the observer"]
pub struct ObserverHandle {
    unregister: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl ObserverHandle {
    /// Keeps the observer registered for the lifetime of the set.
    pub fn detach(mut self) {
        self.unregister = None;
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}
