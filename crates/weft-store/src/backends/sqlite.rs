//! SQLite store backend.
//!
//! Each store is one `WITHOUT ROWID` table keyed by the [`StoreKey`] encoding
//! of its keys, with JSON values. SQLite compares BLOBs bytewise, which the
//! key encoding makes equal to key order. Cursors read in pages so a long scan
//! doesn't hold a statement open across suspension points.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::ops::Bound;
use std::path::Path;
use std::rc::Rc;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use weft_types::Direction;

use crate::error::{BackendError, StorageError, StorageResult, StoreOp};
use crate::key::StoreKey;
use crate::ops::{KeyCursor, OrderedStore, StoreCursor};
use crate::range::KeyRange;

/// Open (or create) a database file shared by every store in a session.
pub fn open_connection(path: impl AsRef<Path>) -> StorageResult<Rc<Connection>> {
    let path = path.as_ref();
    let conn = Connection::open(path).map_err(|e| StorageError::operation("sqlite", StoreOp::Open, e))?;
    debug!(path = %path.display(), "opened sqlite store");
    Ok(Rc::new(conn))
}

/// In-memory database (for testing).
pub fn open_memory_connection() -> StorageResult<Rc<Connection>> {
    let conn = Connection::open_in_memory().map_err(|e| StorageError::operation("sqlite", StoreOp::Open, e))?;
    Ok(Rc::new(conn))
}

/// One table of a shared SQLite connection.
pub struct SqliteStore<K, V> {
    conn: Rc<Connection>,
    table: String,
    page_size: usize,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for SqliteStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            table: self.table.clone(),
            page_size: self.page_size,
            _marker: PhantomData,
        }
    }
}

impl<K: StoreKey, V: Serialize + DeserializeOwned + 'static> SqliteStore<K, V> {
    /// Bind to `table`, creating it if needed.
    ///
    /// Table names are interpolated into SQL, so only `[A-Za-z0-9_]` is accepted.
    pub fn new(conn: Rc<Connection>, table: &str, page_size: usize) -> StorageResult<Self> {
        if table.is_empty() || !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StorageError::inconsistent(table, "invalid table name"));
        }
        let schema = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key BLOB PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            ) WITHOUT ROWID;"
        );
        conn.execute_batch(&schema)
            .map_err(|e| StorageError::operation(table, StoreOp::Open, e))?;
        Ok(Self {
            conn,
            table: table.to_string(),
            page_size: page_size.max(1),
            _marker: PhantomData,
        })
    }

    fn op_err(&self, op: StoreOp) -> impl FnOnce(rusqlite::Error) -> StorageError + '_ {
        move |e| StorageError::operation(&self.table, op, e)
    }

    fn encode_value(&self, value: &V, op: StoreOp) -> StorageResult<String> {
        serde_json::to_string(value).map_err(|e| StorageError::operation(&self.table, op, e))
    }

    fn cursor<T: 'static>(
        &self,
        range: KeyRange<K>,
        direction: Direction,
        select_value: bool,
        decode: fn(Option<String>) -> Result<T, BackendError>,
    ) -> SqliteCursor<K, T> {
        SqliteCursor {
            conn: self.conn.clone(),
            table: self.table.clone(),
            range: range.map(StoreKey::encode),
            forward: direction.is_forward(),
            page_size: self.page_size,
            select_value,
            decode,
            buffer: VecDeque::new(),
            exhausted: false,
            _marker: PhantomData,
        }
    }
}

fn decode_json<V: DeserializeOwned>(raw: Option<String>) -> Result<V, BackendError> {
    Ok(serde_json::from_str(raw.as_deref().unwrap_or("null"))?)
}

fn decode_nothing(_: Option<String>) -> Result<(), BackendError> {
    Ok(())
}

#[async_trait(?Send)]
impl<K: StoreKey, V: Serialize + DeserializeOwned + 'static> OrderedStore<K, V> for SqliteStore<K, V> {
    fn name(&self) -> &str {
        &self.table
    }

    async fn get(&self, key: &K) -> StorageResult<Option<V>> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", self.table);
        let raw: Option<String> = self
            .conn
            .query_row(&sql, params![key.encode()], |row| row.get(0))
            .optional()
            .map_err(self.op_err(StoreOp::Get))?;
        raw.map(|raw| decode_json(Some(raw)))
            .transpose()
            .map_err(|e| StorageError::operation(&self.table, StoreOp::Get, e))
    }

    async fn open_cursor(
        &self,
        range: KeyRange<K>,
        direction: Direction,
    ) -> StorageResult<Box<dyn StoreCursor<K, V>>> {
        trace!(store = %self.table, ?direction, "open sqlite cursor");
        Ok(Box::new(self.cursor(range, direction, true, decode_json::<V>)))
    }

    async fn open_key_cursor(&self, range: KeyRange<K>, direction: Direction) -> StorageResult<KeyCursor<K>> {
        trace!(store = %self.table, ?direction, "open sqlite key cursor");
        Ok(Box::new(self.cursor(range, direction, false, decode_nothing)))
    }

    async fn put(&self, key: K, value: V) -> StorageResult<()> {
        let json = self.encode_value(&value, StoreOp::Put)?;
        let sql = format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)", self.table);
        self.conn
            .execute(&sql, params![key.encode(), json])
            .map_err(self.op_err(StoreOp::Put))?;
        Ok(())
    }

    async fn add(&self, key: K, value: V) -> StorageResult<()> {
        let json = self.encode_value(&value, StoreOp::Add)?;
        let sql = format!("INSERT INTO {} (key, value) VALUES (?1, ?2)", self.table);
        match self.conn.execute(&sql, params![key.encode(), json]) {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(StorageError::key_exists(&self.table, &key))
            }
            Err(e) => Err(StorageError::operation(&self.table, StoreOp::Add, e)),
        }
    }

    async fn delete(&self, key: &K) -> StorageResult<()> {
        let sql = format!("DELETE FROM {} WHERE key = ?1", self.table);
        self.conn
            .execute(&sql, params![key.encode()])
            .map_err(self.op_err(StoreOp::Delete))?;
        Ok(())
    }
}

/// Paged cursor. `range` always describes what hasn't been fetched yet.
struct SqliteCursor<K, T> {
    conn: Rc<Connection>,
    table: String,
    range: KeyRange<Vec<u8>>,
    forward: bool,
    page_size: usize,
    select_value: bool,
    decode: fn(Option<String>) -> Result<T, BackendError>,
    buffer: VecDeque<(Vec<u8>, Option<String>)>,
    exhausted: bool,
    _marker: PhantomData<fn() -> K>,
}

impl<K, T> SqliteCursor<K, T> {
    fn fetch_page(&mut self) -> Result<(), rusqlite::Error> {
        if self.range.is_empty() {
            self.exhausted = true;
            return Ok(());
        }
        let value_col = if self.select_value { "value" } else { "NULL" };
        let mut sql = format!("SELECT key, {value_col} FROM {} WHERE 1 = 1", self.table);
        let mut args: Vec<&Vec<u8>> = Vec::with_capacity(2);
        match &self.range.lower {
            Bound::Included(k) => {
                sql.push_str(" AND key >= ?");
                args.push(k);
            }
            Bound::Excluded(k) => {
                sql.push_str(" AND key > ?");
                args.push(k);
            }
            Bound::Unbounded => {}
        }
        match &self.range.upper {
            Bound::Included(k) => {
                sql.push_str(" AND key <= ?");
                args.push(k);
            }
            Bound::Excluded(k) => {
                sql.push_str(" AND key < ?");
                args.push(k);
            }
            Bound::Unbounded => {}
        }
        sql.push_str(if self.forward { " ORDER BY key ASC" } else { " ORDER BY key DESC" });
        sql.push_str(&format!(" LIMIT {}", self.page_size));

        let page: Vec<(Vec<u8>, Option<String>)> = {
            let mut stmt = self.conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Option<String>>(1)?))
            })?;
            rows.collect::<Result<_, _>>()?
        };
        trace!(store = %self.table, rows = page.len(), "fetched cursor page");

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            self.range = self.range.narrowed(Bound::Excluded(last.clone()), self.forward);
        }
        self.buffer.extend(page);
        Ok(())
    }
}

#[async_trait(?Send)]
impl<K: StoreKey, T: 'static> StoreCursor<K, T> for SqliteCursor<K, T> {
    async fn next(&mut self) -> StorageResult<Option<(K, T)>> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch_page()
                .map_err(|e| StorageError::operation(&self.table, StoreOp::Advance, e))?;
        }
        let Some((raw_key, raw_value)) = self.buffer.pop_front() else {
            return Ok(None);
        };
        let key = K::decode(&raw_key).map_err(|e| StorageError::operation(&self.table, StoreOp::Advance, e))?;
        let value = (self.decode)(raw_value).map_err(|e| StorageError::operation(&self.table, StoreOp::Advance, e))?;
        Ok(Some((key, value)))
    }

    async fn seek(&mut self, key: &K) -> StorageResult<()> {
        let target = key.encode();
        let forward = self.forward;
        while let Some((front, _)) = self.buffer.front() {
            let passed = if forward { *front < target } else { *front > target };
            if !passed {
                break;
            }
            self.buffer.pop_front();
        }
        self.range = self.range.narrowed(Bound::Included(target), forward);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(page_size: usize) -> SqliteStore<(String, u32), String> {
        let conn = open_memory_connection().unwrap();
        SqliteStore::new(conn, "numbers", page_size).unwrap()
    }

    fn k(room: &str, n: u32) -> (String, u32) {
        (room.to_string(), n)
    }

    #[tokio::test]
    async fn test_get_put_add_delete() {
        let store = numbers(4);
        assert_eq!(store.get(&k("!a", 1)).await.unwrap(), None);
        store.put(k("!a", 1), "one".into()).await.unwrap();
        store.put(k("!a", 1), "uno".into()).await.unwrap();
        assert_eq!(store.get(&k("!a", 1)).await.unwrap().as_deref(), Some("uno"));

        let err = store.add(k("!a", 1), "again".into()).await.unwrap_err();
        assert!(matches!(err, StorageError::KeyExists { .. }));

        store.delete(&k("!a", 1)).await.unwrap();
        store.add(k("!a", 1), "again".into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_paged_scan_matches_key_order() {
        // page size smaller than the scan so several pages are fetched
        let store = numbers(2);
        for n in [300u32, 2, 70_000, 9, 1] {
            store.put(k("!a", n), format!("v{n}")).await.unwrap();
        }
        store.put(k("!b", 0), "other room".into()).await.unwrap();

        let range = KeyRange::bound(k("!a", 0), k("!a", u32::MAX), false, false);
        let mut cursor = store.open_cursor(range.clone(), Direction::Forward).await.unwrap();
        let mut seen = Vec::new();
        while let Some(((_, n), v)) = cursor.next().await.unwrap() {
            assert_eq!(v, format!("v{n}"));
            seen.push(n);
        }
        assert_eq!(seen, vec![1, 2, 9, 300, 70_000]);

        let mut keys = store.open_key_cursor(range, Direction::Backward).await.unwrap();
        let mut seen = Vec::new();
        while let Some(((_, n), ())) = keys.next().await.unwrap() {
            seen.push(n);
        }
        assert_eq!(seen, vec![70_000, 300, 9, 2, 1]);
    }

    #[tokio::test]
    async fn test_seek_within_and_past_buffer() {
        let store = numbers(3);
        for n in 1..=10u32 {
            store.put(k("!a", n), String::new()).await.unwrap();
        }
        let mut cursor = store.open_key_cursor(KeyRange::all(), Direction::Forward).await.unwrap();
        assert_eq!(cursor.next().await.unwrap().map(|(k, _)| k.1), Some(1));
        // 2 and 3 are buffered; 3 is still in the buffer after the seek
        cursor.seek(&k("!a", 3)).await.unwrap();
        assert_eq!(cursor.next().await.unwrap().map(|(k, _)| k.1), Some(3));
        // past the buffer
        cursor.seek(&k("!a", 8)).await.unwrap();
        assert_eq!(cursor.next().await.unwrap().map(|(k, _)| k.1), Some(8));
        // backwards target is ignored
        cursor.seek(&k("!a", 2)).await.unwrap();
        assert_eq!(cursor.next().await.unwrap().map(|(k, _)| k.1), Some(9));
    }

    #[tokio::test]
    async fn test_on_disk_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weft.db");
        {
            let store: SqliteStore<u32, String> = SqliteStore::new(open_connection(&path).unwrap(), "t", 8).unwrap();
            store.put(7, "kept".into()).await.unwrap();
        }
        let store: SqliteStore<u32, String> = SqliteStore::new(open_connection(&path).unwrap(), "t", 8).unwrap();
        assert_eq!(store.get(&7).await.unwrap().as_deref(), Some("kept"));
    }

    #[test]
    fn test_rejects_unsafe_table_name() {
        let conn = open_memory_connection().unwrap();
        assert!(SqliteStore::<u32, String>::new(conn, "t; DROP TABLE x", 8).is_err());
    }
}
