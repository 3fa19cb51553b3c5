//! Persisting the live edge of a room's timeline from sync.

use std::cell::Cell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, info};
use weft_store::{Storage, TimelineEventRecord};
use weft_types::{Entry, EventId, EventKey, Fragment, FragmentIdComparer, JoinedRoom, RoomEvent, RoomId};

use crate::error::{TimelineError, TimelineResult};

/// Appends sync batches to the room's live fragment.
pub struct SyncWriter {
    room_id: RoomId,
    storage: Storage,
    comparer: Rc<FragmentIdComparer>,
    /// Key of the last event written to the live fragment. `None` until the
    /// room has synced once.
    last_live_key: Cell<Option<EventKey>>,
}

impl SyncWriter {
    pub fn new(room_id: RoomId, storage: Storage, comparer: Rc<FragmentIdComparer>) -> Self {
        Self {
            room_id,
            storage,
            comparer,
            last_live_key: Cell::new(None),
        }
    }

    /// Recover the live key from storage.
    pub async fn load(&self) -> TimelineResult<()> {
        let Some(live) = self.storage.fragments.live_fragment(&self.room_id).await? else {
            return Ok(());
        };
        self.comparer.add(&live);
        let last = self.storage.events.last_events(&self.room_id, live.id, 1).await?;
        let key = last
            .first()
            .map_or_else(|| EventKey::default_live_key(live.id), |record| record.key);
        debug!(room_id = %self.room_id, %key, "sync writer loaded");
        self.last_live_key.set(Some(key));
        Ok(())
    }

    pub fn last_live_key(&self) -> Option<EventKey> {
        self.last_live_key.get()
    }

    /// Persist one room's sync batch. Returns the entries that became
    /// visible: boundary entries of any fragment created or relinked, then
    /// the new events in order.
    pub async fn write_sync(&self, room: &JoinedRoom) -> TimelineResult<Vec<Entry>> {
        let mut entries = Vec::new();
        let timeline = &room.timeline;

        let start_key = match self.last_live_key.get() {
            None => {
                let live = self.create_live_fragment(timeline.prev_batch.clone()).await?;
                entries.push(Entry::fragment_start(&live));
                EventKey::default_live_key(live.id)
            }
            Some(last) if timeline.limited => {
                let (old, new) = self
                    .replace_live_fragment(last, timeline.prev_batch.clone())
                    .await?;
                entries.push(Entry::fragment_end(&old));
                entries.push(Entry::fragment_start(&new));
                EventKey::default_live_key(new.id)
            }
            Some(last) => last,
        };

        let events = self.new_events(&timeline.events).await?;
        let mut key = start_key;
        for event in events {
            key = key.next_key();
            let record = TimelineEventRecord::new(self.room_id.clone(), key, event.clone());
            self.storage.events.insert(record).await?;
            entries.push(Entry::event(key, event.clone()));
        }

        self.last_live_key.set(Some(key));
        debug!(room_id = %self.room_id, entries = entries.len(), limited = timeline.limited, "wrote sync");
        Ok(entries)
    }

    /// The batch minus events repeated within it or already stored.
    async fn new_events<'a>(&self, events: &'a [RoomEvent]) -> TimelineResult<Vec<&'a RoomEvent>> {
        let mut seen = HashSet::new();
        let unique: Vec<&RoomEvent> = events.iter().filter(|e| seen.insert(e.event_id.clone())).collect();
        let ids: Vec<EventId> = unique.iter().map(|e| e.event_id.clone()).collect();
        let stored: HashSet<EventId> = self
            .storage
            .events
            .stored_event_ids(&self.room_id, &ids)
            .await?
            .into_iter()
            .collect();
        if !stored.is_empty() {
            debug!(room_id = %self.room_id, skipped = stored.len(), "skipping already stored events");
        }
        Ok(unique.into_iter().filter(|e| !stored.contains(&e.event_id)).collect())
    }

    async fn create_live_fragment(&self, previous_token: Option<String>) -> TimelineResult<Fragment> {
        if let Some(live) = self.storage.fragments.live_fragment(&self.room_id).await? {
            return Ok(live);
        }
        let id = self.storage.fragments.next_fragment_id(&self.room_id).await?;
        let mut fragment = Fragment::new(self.room_id.clone(), id);
        fragment.previous_token = previous_token;
        self.storage.fragments.add(fragment.clone()).await?;
        self.comparer.add(&fragment);
        info!(room_id = %self.room_id, fragment_id = %id, "created live fragment");
        Ok(fragment)
    }

    /// A limited sync skipped events: start a new live fragment after the
    /// old one, with the sync's `prev_batch` as the token for the hole.
    async fn replace_live_fragment(
        &self,
        last: EventKey,
        previous_token: Option<String>,
    ) -> TimelineResult<(Fragment, Fragment)> {
        let mut old = self
            .storage
            .fragments
            .get(&self.room_id, last.fragment_id)
            .await?
            .ok_or_else(|| TimelineError::missing_fragment(&self.room_id, last.fragment_id))?;
        let new_id = self.storage.fragments.next_fragment_id(&self.room_id).await?;

        let mut new = Fragment::new(self.room_id.clone(), new_id);
        new.previous_id = Some(old.id);
        new.previous_token = previous_token;
        old.next_id = Some(new_id);

        self.storage.fragments.update(old.clone()).await?;
        self.storage.fragments.add(new.clone()).await?;
        self.comparer.add_all([&old, &new]);
        info!(room_id = %self.room_id, old = %old.id, new = %new_id, "replaced live fragment after limited sync");
        Ok((old, new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_types::{TimelineChunk, event_types};

    fn message(id: &str) -> RoomEvent {
        RoomEvent::new(id, "@alice:weft.test", event_types::MESSAGE, 1, serde_json::json!({"body": id}))
    }

    fn batch(ids: &[&str], limited: bool, prev_batch: Option<&str>) -> JoinedRoom {
        JoinedRoom {
            timeline: TimelineChunk {
                events: ids.iter().map(|id| message(id)).collect(),
                limited,
                prev_batch: prev_batch.map(str::to_string),
            },
            ..Default::default()
        }
    }

    fn writer(storage: &Storage) -> SyncWriter {
        SyncWriter::new(RoomId::new("!r:weft.test"), storage.clone(), Rc::new(FragmentIdComparer::new()))
    }

    fn event_ids(entries: &[Entry]) -> Vec<&str> {
        entries.iter().filter_map(|e| e.event_id()).map(|id| id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_first_sync_creates_live_fragment_with_gap() {
        let storage = Storage::in_memory();
        let writer = writer(&storage);
        writer.load().await.unwrap();
        let entries = writer.write_sync(&batch(&["$1", "$2"], true, Some("t-prev"))).await.unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries[0].is_gap());
        assert_eq!(entries[0].as_boundary().unwrap().token.as_deref(), Some("t-prev"));
        assert_eq!(event_ids(&entries), ["$1", "$2"]);
        assert_eq!(entries[1].sort_key, EventKey::default_live_key(entries[0].fragment_id()).next_key());
        assert_eq!(writer.last_live_key(), Some(entries[2].sort_key));
    }

    #[tokio::test]
    async fn test_reload_resumes_after_last_event() {
        let storage = Storage::in_memory();
        let first = writer(&storage);
        first.load().await.unwrap();
        first.write_sync(&batch(&["$1", "$2"], false, None)).await.unwrap();

        let second = writer(&storage);
        second.load().await.unwrap();
        assert_eq!(second.last_live_key(), first.last_live_key());
        let entries = second.write_sync(&batch(&["$2", "$3", "$3"], false, None)).await.unwrap();
        assert_eq!(event_ids(&entries), ["$3"]);
        assert_eq!(entries[0].sort_key, first.last_live_key().unwrap().next_key());
    }

    #[tokio::test]
    async fn test_limited_sync_starts_linked_fragment() {
        let storage = Storage::sqlite_in_memory().unwrap();
        let writer = writer(&storage);
        writer.load().await.unwrap();
        writer.write_sync(&batch(&["$1"], false, Some("t0"))).await.unwrap();
        let entries = writer.write_sync(&batch(&["$9"], true, Some("t8"))).await.unwrap();

        let old_end = entries[0].as_boundary().unwrap();
        let new_start = entries[1].as_boundary().unwrap();
        assert_eq!(old_end.linked_fragment_id, Some(new_start.fragment_id));
        assert!(!entries[0].is_gap());
        assert!(entries[1].is_gap());
        assert_eq!(new_start.linked_fragment_id, Some(old_end.fragment_id));
        assert_eq!(event_ids(&entries), ["$9"]);

        let room = RoomId::new("!r:weft.test");
        let live = storage.fragments.live_fragment(&room).await.unwrap().unwrap();
        assert_eq!(live.id, new_start.fragment_id);
        assert_eq!(live.previous_token.as_deref(), Some("t8"));
    }
}
