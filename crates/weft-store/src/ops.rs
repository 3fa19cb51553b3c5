//! Backend contract for ordered stores.

use async_trait::async_trait;
use weft_types::Direction;

use crate::error::StorageResult;
use crate::key::StoreKey;
use crate::range::KeyRange;

/// A positioned scan over a store.
///
/// Every `next` is a suspension point; the store may change between steps.
/// A cursor sees the store as it is when each step runs.
#[async_trait(?Send)]
pub trait StoreCursor<K, V> {
    /// Step to the next record in scan order.
    async fn next(&mut self) -> StorageResult<Option<(K, V)>>;

    /// Skip ahead so the next record returned is the first one at or past
    /// `key` in scan order. Seeking backwards (to a key already passed) is a
    /// no-op.
    async fn seek(&mut self, key: &K) -> StorageResult<()>;
}

/// Cursor over keys only.
pub type KeyCursor<K> = Box<dyn StoreCursor<K, ()>>;

/// An ordered key-value store.
#[async_trait(?Send)]
pub trait OrderedStore<K: StoreKey, V: 'static> {
    /// Name used in error messages and logs.
    fn name(&self) -> &str;

    async fn get(&self, key: &K) -> StorageResult<Option<V>>;

    async fn open_cursor(
        &self,
        range: KeyRange<K>,
        direction: Direction,
    ) -> StorageResult<Box<dyn StoreCursor<K, V>>>;

    /// Like [`open_cursor`](Self::open_cursor) but without values.
    ///
    /// Backends that can scan keys without decoding values should override.
    async fn open_key_cursor(&self, range: KeyRange<K>, direction: Direction) -> StorageResult<KeyCursor<K>> {
        let inner = self.open_cursor(range, direction).await?;
        Ok(Box::new(KeysOnly { inner }))
    }

    /// Insert or overwrite.
    async fn put(&self, key: K, value: V) -> StorageResult<()>;

    /// Insert; fails with [`crate::StorageError::KeyExists`] if present.
    async fn add(&self, key: K, value: V) -> StorageResult<()>;

    async fn delete(&self, key: &K) -> StorageResult<()>;
}

struct KeysOnly<K, V> {
    inner: Box<dyn StoreCursor<K, V>>,
}

#[async_trait(?Send)]
impl<K: StoreKey, V: 'static> StoreCursor<K, ()> for KeysOnly<K, V> {
    async fn next(&mut self) -> StorageResult<Option<(K, ())>> {
        Ok(self.inner.next().await?.map(|(k, _)| (k, ())))
    }

    async fn seek(&mut self, key: &K) -> StorageResult<()> {
        self.inner.seek(key).await
    }
}
