//! Keyed observable map.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use crate::observers::{Observers, SubscriptionId, UpdateParams};

pub trait MapObserver<K, V> {
    /// The map was cleared. Re-read rather than assuming per-key removals.
    fn on_reset(&mut self);

    fn on_add(&mut self, key: &K, value: &V);

    fn on_update(&mut self, key: &K, value: &V, params: Option<&UpdateParams>);

    fn on_remove(&mut self, key: &K, value: &V);
}

/// A `HashMap` that reports its changes.
///
/// Mutators return `false` instead of failing when the key is in the wrong
/// state (already present for `add`, absent for `update`/`remove`).
pub struct ObservableMap<K, V> {
    values: HashMap<K, V>,
    observers: RefCell<Observers<dyn MapObserver<K, V>>>,
}

impl<K: Eq + Hash, V> Default for ObservableMap<K, V> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
            observers: RefCell::new(Observers::new()),
        }
    }
}

impl<K: Eq + Hash, V> ObservableMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            values: values.into_iter().collect(),
            observers: RefCell::new(Observers::new()),
        }
    }

    pub fn add(&mut self, key: K, value: V) -> bool {
        if self.values.contains_key(&key) {
            return false;
        }
        self.observers.borrow().for_each(|o| o.on_add(&key, &value));
        self.values.insert(key, value);
        true
    }

    /// Announce that the value under `key` changed.
    ///
    /// Values with interior mutability change in place; this only emits.
    pub fn update(&mut self, key: &K, params: Option<UpdateParams>) -> bool {
        match self.values.get(key) {
            Some(value) => {
                self.observers
                    .borrow()
                    .for_each(|o| o.on_update(key, value, params.as_ref()));
                true
            }
            None => false,
        }
    }

    /// Mutate the value under `key` and emit an update.
    pub fn update_with(&mut self, key: &K, params: Option<UpdateParams>, f: impl FnOnce(&mut V)) -> bool {
        match self.values.get_mut(key) {
            Some(value) => {
                f(value);
                let value = &*value;
                self.observers
                    .borrow()
                    .for_each(|o| o.on_update(key, value, params.as_ref()));
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: &K) -> bool {
        match self.values.remove_entry(key) {
            Some((key, value)) => {
                self.observers.borrow().for_each(|o| o.on_remove(&key, &value));
                true
            }
            None => false,
        }
    }

    /// Clear every entry and emit one reset.
    pub fn reset(&mut self) {
        self.values.clear();
        self.observers.borrow().for_each(|o| o.on_reset());
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> std::collections::hash_map::Iter<'_, K, V> {
        self.values.iter()
    }

    pub fn values(&self) -> std::collections::hash_map::Values<'_, K, V> {
        self.values.values()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn subscribe(&self, observer: Rc<RefCell<dyn MapObserver<K, V>>>) -> SubscriptionId {
        self.observers.borrow_mut().add(observer).0
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.borrow_mut().remove(id).is_some()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ObservableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableMap")
            .field("values", &self.values)
            .field("observers", &self.observers.borrow().len())
            .finish()
    }
}
