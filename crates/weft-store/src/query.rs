//! Range queries over an [`OrderedStore`].
//!
//! Every query opens one cursor and walks it until the query is satisfied, so
//! bounded selects and finds stop reading as soon as they can instead of
//! scanning the whole range.

use std::rc::Rc;

use tracing::trace;
use weft_types::Direction;

use crate::error::StorageResult;
use crate::key::StoreKey;
use crate::ops::OrderedStore;
use crate::range::KeyRange;

pub struct QueryTarget<K, V> {
    store: Rc<dyn OrderedStore<K, V>>,
}

impl<K, V> Clone for QueryTarget<K, V> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K: StoreKey, V: 'static> QueryTarget<K, V> {
    pub fn new(store: Rc<dyn OrderedStore<K, V>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &dyn OrderedStore<K, V> {
        self.store.as_ref()
    }

    pub fn name(&self) -> &str {
        self.store.name()
    }

    pub async fn get(&self, key: &K) -> StorageResult<Option<V>> {
        self.store.get(key).await
    }

    pub async fn put(&self, key: K, value: V) -> StorageResult<()> {
        self.store.put(key, value).await
    }

    pub async fn add(&self, key: K, value: V) -> StorageResult<()> {
        self.store.add(key, value).await
    }

    pub async fn delete(&self, key: &K) -> StorageResult<()> {
        self.store.delete(key).await
    }

    // ========================================================================
    // Folds
    // ========================================================================

    /// Fold over `range` in ascending key order.
    pub async fn reduce<A>(&self, range: KeyRange<K>, initial: A, reducer: impl FnMut(A, V) -> A) -> StorageResult<A> {
        self.fold(range, Direction::Forward, initial, reducer).await
    }

    /// Fold over `range` in descending key order.
    pub async fn reduce_reverse<A>(
        &self,
        range: KeyRange<K>,
        initial: A,
        reducer: impl FnMut(A, V) -> A,
    ) -> StorageResult<A> {
        self.fold(range, Direction::Backward, initial, reducer).await
    }

    async fn fold<A>(
        &self,
        range: KeyRange<K>,
        direction: Direction,
        initial: A,
        mut reducer: impl FnMut(A, V) -> A,
    ) -> StorageResult<A> {
        let mut cursor = self.store.open_cursor(range, direction).await?;
        let mut acc = initial;
        while let Some((_, value)) = cursor.next().await? {
            acc = reducer(acc, value);
        }
        Ok(acc)
    }

    // ========================================================================
    // Selects
    // ========================================================================

    /// Up to `amount` values in ascending key order.
    pub async fn select_limit(&self, range: KeyRange<K>, amount: usize) -> StorageResult<Vec<V>> {
        self.select_limit_in(range, amount, Direction::Forward).await
    }

    /// Up to `amount` values in descending key order.
    pub async fn select_limit_reverse(&self, range: KeyRange<K>, amount: usize) -> StorageResult<Vec<V>> {
        self.select_limit_in(range, amount, Direction::Backward).await
    }

    async fn select_limit_in(&self, range: KeyRange<K>, amount: usize, direction: Direction) -> StorageResult<Vec<V>> {
        if amount == 0 {
            return Ok(Vec::new());
        }
        self.select_while_in(range, |results| results.len() < amount, direction)
            .await
    }

    /// Collect ascending while `predicate(results so far)` holds.
    ///
    /// The predicate is checked after each value is pushed, so the value that
    /// makes it false is included.
    pub async fn select_while(&self, range: KeyRange<K>, predicate: impl FnMut(&[V]) -> bool) -> StorageResult<Vec<V>> {
        self.select_while_in(range, predicate, Direction::Forward).await
    }

    pub async fn select_while_reverse(
        &self,
        range: KeyRange<K>,
        predicate: impl FnMut(&[V]) -> bool,
    ) -> StorageResult<Vec<V>> {
        self.select_while_in(range, predicate, Direction::Backward).await
    }

    async fn select_while_in(
        &self,
        range: KeyRange<K>,
        mut predicate: impl FnMut(&[V]) -> bool,
        direction: Direction,
    ) -> StorageResult<Vec<V>> {
        let mut cursor = self.store.open_cursor(range, direction).await?;
        let mut results = Vec::new();
        while let Some((_, value)) = cursor.next().await? {
            results.push(value);
            if !predicate(&results) {
                break;
            }
        }
        trace!(store = %self.store.name(), count = results.len(), ?direction, "select");
        Ok(results)
    }

    /// Every value in `range`, in `direction` order.
    pub async fn select_all(&self, range: KeyRange<K>, direction: Direction) -> StorageResult<Vec<V>> {
        self.select_while_in(range, |_| true, direction).await
    }

    // ========================================================================
    // Finds
    // ========================================================================

    pub async fn select_first(&self, range: KeyRange<K>) -> StorageResult<Option<V>> {
        self.find_in(range, |_| true, Direction::Forward).await
    }

    pub async fn select_last(&self, range: KeyRange<K>) -> StorageResult<Option<V>> {
        self.find_in(range, |_| true, Direction::Backward).await
    }

    /// First value (ascending) matching `predicate`. Stops at the match.
    pub async fn find(&self, range: KeyRange<K>, predicate: impl FnMut(&V) -> bool) -> StorageResult<Option<V>> {
        self.find_in(range, predicate, Direction::Forward).await
    }

    /// First value (descending) matching `predicate`. Stops at the match.
    pub async fn find_reverse(
        &self,
        range: KeyRange<K>,
        predicate: impl FnMut(&V) -> bool,
    ) -> StorageResult<Option<V>> {
        self.find_in(range, predicate, Direction::Backward).await
    }

    async fn find_in(
        &self,
        range: KeyRange<K>,
        mut predicate: impl FnMut(&V) -> bool,
        direction: Direction,
    ) -> StorageResult<Option<V>> {
        let mut cursor = self.store.open_cursor(range, direction).await?;
        while let Some((_, value)) = cursor.next().await? {
            if predicate(&value) {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Existence checks
    // ========================================================================

    /// Report which of `keys` exist, with one key-cursor pass.
    ///
    /// `callback(key, found)` is called once per distinct key, in key order
    /// (descending when `backwards`). Returning `true` from the callback halts the search;
    /// keys after that point are never reported.
    ///
    /// Candidates are sorted, one key cursor spans first..=last candidate,
    /// and the cursor and candidate list advance in lockstep. After each
    /// store key the cursor seeks straight to the next unresolved candidate,
    /// so runs of unrelated keys between candidates are skipped.
    pub async fn find_existing_keys(
        &self,
        keys: &[K],
        backwards: bool,
        mut callback: impl FnMut(&K, bool) -> bool,
    ) -> StorageResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut sorted: Vec<&K> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();
        if backwards {
            sorted.reverse();
        }
        // `before(a, b)`: a comes strictly earlier than b in scan order
        let before = |a: &K, b: &K| if backwards { a > b } else { a < b };

        let (lowest, highest) = if backwards {
            (sorted[sorted.len() - 1], sorted[0])
        } else {
            (sorted[0], sorted[sorted.len() - 1])
        };
        let direction = if backwards { Direction::Backward } else { Direction::Forward };
        let range = KeyRange::bound(lowest.clone(), highest.clone(), false, false);
        let mut cursor = self.store.open_key_cursor(range, direction).await?;

        let mut i = 0;
        let mut halted = false;
        while let Some((key, ())) = cursor.next().await? {
            while i < sorted.len() && !halted && before(sorted[i], &key) {
                halted = callback(sorted[i], false);
                i += 1;
            }
            if i < sorted.len() && !halted && *sorted[i] == key {
                halted = callback(sorted[i], true);
                i += 1;
            }
            if halted || i >= sorted.len() {
                break;
            }
            cursor.seek(sorted[i]).await?;
        }
        while !halted && i < sorted.len() {
            halted = callback(sorted[i], false);
            i += 1;
        }
        Ok(())
    }
}
