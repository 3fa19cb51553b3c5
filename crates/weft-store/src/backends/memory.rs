//! In-memory store backend.
//!
//! Used for tests and sessions that don't persist. All data is lost when the
//! last handle drops.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::rc::Rc;

use async_trait::async_trait;
use tracing::trace;
use weft_types::Direction;

use crate::error::{StorageError, StorageResult};
use crate::key::StoreKey;
use crate::ops::{OrderedStore, StoreCursor};
use crate::range::KeyRange;

/// `BTreeMap`-backed store. Clones share the same map.
#[derive(Clone)]
pub struct MemoryStore<K, V> {
    name: String,
    map: Rc<RefCell<BTreeMap<K, V>>>,
}

impl<K: StoreKey, V: Clone + 'static> MemoryStore<K, V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            map: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }
}

impl<K: std::fmt::Debug, V> std::fmt::Debug for MemoryStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("name", &self.name)
            .field("len", &self.map.borrow().len())
            .finish()
    }
}

#[async_trait(?Send)]
impl<K: StoreKey, V: Clone + 'static> OrderedStore<K, V> for MemoryStore<K, V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &K) -> StorageResult<Option<V>> {
        Ok(self.map.borrow().get(key).cloned())
    }

    async fn open_cursor(
        &self,
        range: KeyRange<K>,
        direction: Direction,
    ) -> StorageResult<Box<dyn StoreCursor<K, V>>> {
        trace!(store = %self.name, ?direction, "open memory cursor");
        Ok(Box::new(MemoryCursor {
            map: self.map.clone(),
            range,
            forward: direction.is_forward(),
        }))
    }

    async fn put(&self, key: K, value: V) -> StorageResult<()> {
        self.map.borrow_mut().insert(key, value);
        Ok(())
    }

    async fn add(&self, key: K, value: V) -> StorageResult<()> {
        let mut map = self.map.borrow_mut();
        if map.contains_key(&key) {
            return Err(StorageError::key_exists(&self.name, &key));
        }
        map.insert(key, value);
        Ok(())
    }

    async fn delete(&self, key: &K) -> StorageResult<()> {
        self.map.borrow_mut().remove(key);
        Ok(())
    }
}

/// Cursor that re-queries the map on every step, narrowing its remaining
/// range past the last key it returned.
struct MemoryCursor<K, V> {
    map: Rc<RefCell<BTreeMap<K, V>>>,
    range: KeyRange<K>,
    forward: bool,
}

#[async_trait(?Send)]
impl<K: StoreKey, V: Clone + 'static> StoreCursor<K, V> for MemoryCursor<K, V> {
    async fn next(&mut self) -> StorageResult<Option<(K, V)>> {
        if self.range.is_empty() {
            return Ok(None);
        }
        let found = {
            let map = self.map.borrow();
            let mut iter = map.range((self.range.lower.clone(), self.range.upper.clone()));
            let item = if self.forward { iter.next() } else { iter.next_back() };
            item.map(|(k, v)| (k.clone(), v.clone()))
        };
        if let Some((key, _)) = &found {
            self.range = self.range.narrowed(Bound::Excluded(key.clone()), self.forward);
        }
        Ok(found)
    }

    async fn seek(&mut self, key: &K) -> StorageResult<()> {
        self.range = self.range.narrowed(Bound::Included(key.clone()), self.forward);
        Ok(())
    }
}
