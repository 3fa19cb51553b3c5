//! Persisted timeline events.
//!
//! Events are keyed `(room, fragment, index)`, so one fragment's events are a
//! contiguous key range in index order. A second store maps
//! `(room, event_id)` to the event's [`EventKey`] for dedup and overlap
//! detection.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;
use weft_types::{EventId, EventKey, FragmentId, RoomEvent, RoomId};

use crate::error::{StorageError, StorageResult};
use crate::ops::OrderedStore;
use crate::query::QueryTarget;
use crate::range::KeyRange;

pub(crate) type EventStoreKey = (String, u32, u32);
pub(crate) type EventIdStoreKey = (String, String);

/// One stored event and where it sits in the timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEventRecord {
    pub room_id: RoomId,
    pub key: EventKey,
    pub event: RoomEvent,
}

impl TimelineEventRecord {
    pub fn new(room_id: RoomId, key: EventKey, event: RoomEvent) -> Self {
        Self { room_id, key, event }
    }

    fn store_key(&self) -> EventStoreKey {
        encode_event_key(&self.room_id, &self.key)
    }
}

fn encode_event_key(room_id: &RoomId, key: &EventKey) -> EventStoreKey {
    (room_id.as_str().to_string(), key.fragment_id.as_u32(), key.event_index)
}

fn encode_event_id_key(room_id: &RoomId, event_id: &EventId) -> EventIdStoreKey {
    (room_id.as_str().to_string(), event_id.as_str().to_string())
}

/// Every key of `fragment_id`, boundaries included.
fn fragment_range(room_id: &RoomId, fragment_id: FragmentId) -> KeyRange<EventStoreKey> {
    KeyRange::bound(
        encode_event_key(room_id, &EventKey::fragment_start(fragment_id)),
        encode_event_key(room_id, &EventKey::fragment_end(fragment_id)),
        false,
        false,
    )
}

#[derive(Clone)]
pub struct TimelineEventStore {
    events: QueryTarget<EventStoreKey, TimelineEventRecord>,
    by_event_id: QueryTarget<EventIdStoreKey, EventKey>,
}

impl TimelineEventStore {
    pub fn new(
        events: Rc<dyn OrderedStore<EventStoreKey, TimelineEventRecord>>,
        by_event_id: Rc<dyn OrderedStore<EventIdStoreKey, EventKey>>,
    ) -> Self {
        Self {
            events: QueryTarget::new(events),
            by_event_id: QueryTarget::new(by_event_id),
        }
    }

    /// The last `amount` events of a fragment, in ascending order.
    pub async fn last_events(
        &self,
        room_id: &RoomId,
        fragment_id: FragmentId,
        amount: usize,
    ) -> StorageResult<Vec<TimelineEventRecord>> {
        let mut events = self
            .events
            .select_limit_reverse(fragment_range(room_id, fragment_id), amount)
            .await?;
        events.reverse();
        Ok(events)
    }

    /// The first `amount` events of a fragment, in ascending order.
    pub async fn first_events(
        &self,
        room_id: &RoomId,
        fragment_id: FragmentId,
        amount: usize,
    ) -> StorageResult<Vec<TimelineEventRecord>> {
        self.events
            .select_limit(fragment_range(room_id, fragment_id), amount)
            .await
    }

    /// Up to `amount` events of `key`'s fragment strictly after `key`, ascending.
    pub async fn events_after(
        &self,
        room_id: &RoomId,
        key: &EventKey,
        amount: usize,
    ) -> StorageResult<Vec<TimelineEventRecord>> {
        let range = KeyRange::bound(
            encode_event_key(room_id, key),
            encode_event_key(room_id, &EventKey::fragment_end(key.fragment_id)),
            true,
            false,
        );
        self.events.select_limit(range, amount).await
    }

    /// Up to `amount` events of `key`'s fragment strictly before `key`, ascending.
    pub async fn events_before(
        &self,
        room_id: &RoomId,
        key: &EventKey,
        amount: usize,
    ) -> StorageResult<Vec<TimelineEventRecord>> {
        let range = KeyRange::bound(
            encode_event_key(room_id, &EventKey::fragment_start(key.fragment_id)),
            encode_event_key(room_id, key),
            false,
            true,
        );
        let mut events = self.events.select_limit_reverse(range, amount).await?;
        events.reverse();
        Ok(events)
    }

    /// The first id in `event_ids` (in the given order) that is already
    /// stored for this room.
    ///
    /// The existence scan runs in key order, but the answer is positional:
    /// an id only counts once every id before it in `event_ids` has been
    /// resolved, so the scan halts as soon as that is settled.
    pub async fn find_first_occurring_event_id(
        &self,
        room_id: &RoomId,
        event_ids: &[EventId],
    ) -> StorageResult<Option<EventId>> {
        let keys: Vec<EventIdStoreKey> = event_ids.iter().map(|id| encode_event_id_key(room_id, id)).collect();
        let mut positions: HashMap<&EventIdStoreKey, Vec<usize>> = HashMap::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            positions.entry(key).or_default().push(i);
        }
        let mut results: Vec<Option<bool>> = vec![None; keys.len()];
        // results[..settled] are all known misses
        let mut settled = 0;
        let mut first_found = None;
        self.by_event_id
            .find_existing_keys(&keys, false, |key, found| {
                if let Some(indices) = positions.get(key) {
                    for &i in indices {
                        results[i] = Some(found);
                    }
                }
                while results.get(settled) == Some(&Some(false)) {
                    settled += 1;
                }
                if results.get(settled) == Some(&Some(true)) {
                    first_found = Some(settled);
                }
                first_found.is_some()
            })
            .await?;
        Ok(first_found.map(|i| event_ids[i].clone()))
    }

    /// The subset of `event_ids` already stored for this room, in key order.
    pub async fn stored_event_ids(&self, room_id: &RoomId, event_ids: &[EventId]) -> StorageResult<Vec<EventId>> {
        let keys: Vec<EventIdStoreKey> = event_ids.iter().map(|id| encode_event_id_key(room_id, id)).collect();
        let mut stored = Vec::new();
        self.by_event_id
            .find_existing_keys(&keys, false, |(_, event_id), found| {
                if found {
                    stored.push(EventId::new(event_id.as_str()));
                }
                false
            })
            .await?;
        Ok(stored)
    }

    /// Store a new event. Fails with `KeyExists` if either its key or its
    /// event id is already taken.
    pub async fn insert(&self, record: TimelineEventRecord) -> StorageResult<()> {
        trace!(room_id = %record.room_id, key = %record.key, event_id = %record.event.event_id, "insert event");
        let store_key = record.store_key();
        let id_key = encode_event_id_key(&record.room_id, &record.event.event_id);
        let key = record.key;
        self.events.add(store_key.clone(), record).await?;
        if let Err(err) = self.by_event_id.add(id_key, key).await {
            self.events.delete(&store_key).await?;
            return Err(err);
        }
        Ok(())
    }

    /// Overwrite an existing event record in place.
    pub async fn update(&self, record: TimelineEventRecord) -> StorageResult<()> {
        self.events.put(record.store_key(), record).await
    }

    pub async fn get(&self, room_id: &RoomId, key: &EventKey) -> StorageResult<Option<TimelineEventRecord>> {
        self.events.get(&encode_event_key(room_id, key)).await
    }

    pub async fn get_by_event_id(
        &self,
        room_id: &RoomId,
        event_id: &EventId,
    ) -> StorageResult<Option<TimelineEventRecord>> {
        let Some(key) = self.by_event_id.get(&encode_event_id_key(room_id, event_id)).await? else {
            return Ok(None);
        };
        match self.get(room_id, &key).await? {
            Some(record) => Ok(Some(record)),
            None => Err(StorageError::inconsistent(
                self.by_event_id.name(),
                format!("{event_id} indexed at {key} but not stored"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Storage;
    use weft_types::event_types;

    fn room() -> RoomId {
        RoomId::new("!room:weft.test")
    }

    fn record(fragment: u32, index: u32, id: &str) -> TimelineEventRecord {
        let event = RoomEvent::new(id, "@alice:weft.test", event_types::MESSAGE, 0, serde_json::json!({"body": id}));
        TimelineEventRecord::new(room(), EventKey::new(FragmentId(fragment), index), event)
    }

    fn query(event_ids: &[&str]) -> Vec<EventId> {
        event_ids.iter().map(|id| EventId::new(*id)).collect()
    }

    fn ids(records: &[TimelineEventRecord]) -> Vec<&str> {
        records.iter().map(|r| r.event.event_id.as_str()).collect()
    }

    async fn seeded(storage: &Storage) {
        let base = EventKey::MIDDLE_INDEX;
        for (i, id) in ["$a", "$b", "$c", "$d"].into_iter().enumerate() {
            storage.events.insert(record(1, base + i as u32, id)).await.unwrap();
        }
        storage.events.insert(record(2, base, "$other")).await.unwrap();
    }

    #[tokio::test]
    async fn test_fragment_reads_stay_inside_fragment() {
        for storage in [Storage::in_memory(), Storage::sqlite_in_memory().unwrap()] {
            seeded(&storage).await;
            let room = room();
            assert_eq!(ids(&storage.events.last_events(&room, FragmentId(1), 2).await.unwrap()), ["$c", "$d"]);
            assert_eq!(ids(&storage.events.first_events(&room, FragmentId(1), 3).await.unwrap()), ["$a", "$b", "$c"]);
            assert_eq!(ids(&storage.events.last_events(&room, FragmentId(2), 10).await.unwrap()), ["$other"]);

            let b = EventKey::new(FragmentId(1), EventKey::MIDDLE_INDEX + 1);
            assert_eq!(ids(&storage.events.events_before(&room, &b, 5).await.unwrap()), ["$a"]);
            assert_eq!(ids(&storage.events.events_after(&room, &b, 1).await.unwrap()), ["$c"]);
            assert_eq!(ids(&storage.events.events_after(&room, &b, 5).await.unwrap()), ["$c", "$d"]);
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_event_id() {
        let storage = Storage::in_memory();
        seeded(&storage).await;
        let err = storage.events.insert(record(3, 7, "$a")).await.unwrap_err();
        assert!(matches!(err, StorageError::KeyExists { .. }));
    }

    #[tokio::test]
    async fn test_get_by_event_id() {
        let storage = Storage::sqlite_in_memory().unwrap();
        seeded(&storage).await;
        let found = storage
            .events
            .get_by_event_id(&room(), &EventId::new("$c"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.key, EventKey::new(FragmentId(1), EventKey::MIDDLE_INDEX + 2));
        assert!(storage
            .events
            .get_by_event_id(&room(), &EventId::new("$zzz"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_find_first_occurring_event_id_with_repeated_and_long_lists() {
        let storage = Storage::in_memory();
        seeded(&storage).await;
        let room = room();

        let found = storage
            .events
            .find_first_occurring_event_id(&room, &query(&["$x", "$c", "$x", "$a", "$c"]))
            .await
            .unwrap();
        assert_eq!(found, Some(EventId::new("$c")));

        // a long run of misses ahead of the only stored id
        let mut long: Vec<String> = (0..500).map(|i| format!("$miss{i:03}")).collect();
        long.push("$b".into());
        let long: Vec<EventId> = long.iter().map(|id| EventId::new(id.as_str())).collect();
        let found = storage.events.find_first_occurring_event_id(&room, &long).await.unwrap();
        assert_eq!(found, Some(EventId::new("$b")));
    }

    #[tokio::test]
    async fn test_find_first_occurring_event_id_is_positional() {
        let storage = Storage::in_memory();
        seeded(&storage).await;
        let room = room();

        // "$d" sorts after "$b" but comes first in the list
        let found = storage
            .events
            .find_first_occurring_event_id(&room, &query(&["$x", "$d", "$b"]))
            .await
            .unwrap();
        assert_eq!(found, Some(EventId::new("$d")));

        let found = storage
            .events
            .find_first_occurring_event_id(&room, &query(&["$x", "$y"]))
            .await
            .unwrap();
        assert_eq!(found, None);

        let stored = storage
            .events
            .stored_event_ids(&room, &query(&["$d", "$x", "$a", "$a"]))
            .await
            .unwrap();
        assert_eq!(stored, query(&["$a", "$d"]));

        let other_room = RoomId::new("!elsewhere:weft.test");
        let found = storage
            .events
            .find_first_occurring_event_id(&other_room, &query(&["$a"]))
            .await
            .unwrap();
        assert_eq!(found, None);
    }
}
