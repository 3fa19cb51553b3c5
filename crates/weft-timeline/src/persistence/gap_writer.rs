//! Persisting a page of history into a gap.
//!
//! A gap is one edge of a fragment that still has a pagination token. A
//! filled page is written outward from that edge. If the page runs into
//! events already stored in another fragment, the two fragments are linked
//! and both facing edges lose their tokens: the hole is closed.

use std::rc::Rc;

use tracing::{debug, info, warn};
use weft_store::{Storage, TimelineEventRecord};
use weft_types::{
    Direction, Entry, EventId, EventKey, Fragment, FragmentBoundary, FragmentId, FragmentIdComparer, MessagesResponse,
    RoomEvent, RoomId,
};

use crate::error::{TimelineError, TimelineResult};

pub struct GapWriter {
    room_id: RoomId,
    storage: Storage,
    comparer: Rc<FragmentIdComparer>,
}

impl GapWriter {
    pub fn new(room_id: RoomId, storage: Storage, comparer: Rc<FragmentIdComparer>) -> Self {
        Self {
            room_id,
            storage,
            comparer,
        }
    }

    /// Write `response` into the gap `boundary`.
    ///
    /// Returns the new event entries (in `chunk` order) followed by the
    /// rewritten boundary entries: the filled edge, and the neighbour's facing
    /// edge if the fill linked the two fragments.
    pub async fn write_fragment_fill(
        &self,
        boundary: &FragmentBoundary,
        response: &MessagesResponse,
    ) -> TimelineResult<Vec<Entry>> {
        let direction = boundary.direction;
        // re-read: the entry the caller holds may be stale
        let mut fragment = self.fragment(boundary.fragment_id).await?;
        if fragment.token(direction) != Some(response.start.as_str()) {
            return Err(TimelineError::TokenMismatch {
                expected: fragment.token(direction).map(str::to_string),
                received: response.start.clone(),
            });
        }
        let end = if response.chunk.is_empty() {
            None
        } else {
            response.end.clone()
        };

        let edge_key = self.fragment_edge_key(fragment.id, direction).await?;
        let (new_events, neighbour) = self.find_overlap(fragment.id, &response.chunk).await?;

        let mut entries = Vec::with_capacity(new_events.len() + 2);
        let mut key = edge_key;
        for event in new_events {
            key = key.next_key_in(direction);
            let record = TimelineEventRecord::new(self.room_id.clone(), key, event.clone());
            self.storage.events.insert(record).await?;
            entries.push(Entry::event(key, event.clone()));
        }

        match neighbour {
            Some(mut neighbour) => {
                link(&mut fragment, &mut neighbour, direction)?;
                self.storage.fragments.update(neighbour.clone()).await?;
                self.storage.fragments.update(fragment.clone()).await?;
                self.comparer.add_all([&fragment, &neighbour]);
                info!(
                    room_id = %self.room_id,
                    fragment_id = %fragment.id,
                    neighbour = %neighbour.id,
                    "gap closed, fragments linked"
                );
                entries.push(Entry::boundary(&fragment, direction));
                entries.push(Entry::boundary(&neighbour, direction.reverse()));
            }
            None => {
                fragment.set_token(direction, end);
                self.storage.fragments.update(fragment.clone()).await?;
                self.comparer.add(&fragment);
                entries.push(Entry::boundary(&fragment, direction));
            }
        }
        debug!(
            room_id = %self.room_id,
            fragment_id = %fragment.id,
            ?direction,
            entries = entries.len(),
            "wrote gap fill"
        );
        Ok(entries)
    }

    async fn fragment(&self, id: FragmentId) -> TimelineResult<Fragment> {
        self.storage
            .fragments
            .get(&self.room_id, id)
            .await?
            .ok_or_else(|| TimelineError::missing_fragment(&self.room_id, id))
    }

    /// Key of the outermost event on the `direction` edge, or the fragment's
    /// default key if it has no events.
    async fn fragment_edge_key(&self, fragment_id: FragmentId, direction: Direction) -> TimelineResult<EventKey> {
        let edge = match direction {
            Direction::Backward => self.storage.events.first_events(&self.room_id, fragment_id, 1).await?,
            Direction::Forward => self.storage.events.last_events(&self.room_id, fragment_id, 1).await?,
        };
        Ok(edge
            .first()
            .map_or_else(|| EventKey::default_live_key(fragment_id), |record| record.key))
    }

    /// Split `chunk` at the first event that is already stored.
    ///
    /// Returns the events before it and, if it lives in another fragment,
    /// that fragment.
    async fn find_overlap<'a>(
        &self,
        fragment_id: FragmentId,
        chunk: &'a [RoomEvent],
    ) -> TimelineResult<(&'a [RoomEvent], Option<Fragment>)> {
        let ids: Vec<EventId> = chunk.iter().map(|e| e.event_id.clone()).collect();
        let Some(first_stored) = self
            .storage
            .events
            .find_first_occurring_event_id(&self.room_id, &ids)
            .await?
        else {
            return Ok((chunk, None));
        };
        let split = chunk
            .iter()
            .position(|e| e.event_id == first_stored)
            .unwrap_or(chunk.len());
        let new_events = &chunk[..split];

        let Some(stored) = self
            .storage
            .events
            .get_by_event_id(&self.room_id, &first_stored)
            .await?
        else {
            return Ok((new_events, None));
        };
        let neighbour_id = stored.key.fragment_id;
        if neighbour_id == fragment_id {
            warn!(
                room_id = %self.room_id,
                fragment_id = %fragment_id,
                event_id = %first_stored,
                "page overlaps its own fragment, not linking"
            );
            return Ok((new_events, None));
        }
        Ok((new_events, Some(self.fragment(neighbour_id).await?)))
    }
}

/// Link `fragment`'s `direction` edge to `neighbour`'s opposite edge and
/// clear both tokens. Refuses to overwrite an existing different link.
fn link(fragment: &mut Fragment, neighbour: &mut Fragment, direction: Direction) -> TimelineResult<()> {
    let facing = direction.reverse();
    for (from, to, edge) in [(&*fragment, neighbour.id, direction), (&*neighbour, fragment.id, facing)] {
        if let Some(existing) = from.linked_fragment(edge)
            && existing != to
        {
            return Err(TimelineError::LinkConflict {
                fragment_id: from.id,
                existing,
                requested: to,
            });
        }
    }
    fragment.set_linked_fragment(direction, Some(neighbour.id));
    fragment.set_token(direction, None);
    neighbour.set_linked_fragment(facing, Some(fragment.id));
    neighbour.set_token(facing, None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SyncWriter;
    use weft_types::{JoinedRoom, TimelineChunk, event_types};

    fn room() -> RoomId {
        RoomId::new("!r:weft.test")
    }

    fn message(id: &str) -> RoomEvent {
        RoomEvent::new(id, "@bob:weft.test", event_types::MESSAGE, 1, serde_json::json!({"body": id}))
    }

    fn page(start: &str, ids: &[&str], end: Option<&str>) -> MessagesResponse {
        MessagesResponse {
            chunk: ids.iter().map(|id| message(id)).collect(),
            start: start.into(),
            end: end.map(str::to_string),
        }
    }

    fn sync(ids: &[&str], limited: bool, prev_batch: &str) -> JoinedRoom {
        JoinedRoom {
            timeline: TimelineChunk {
                events: ids.iter().map(|id| message(id)).collect(),
                limited,
                prev_batch: Some(prev_batch.into()),
            },
            ..Default::default()
        }
    }

    struct Fixture {
        storage: Storage,
        sync: SyncWriter,
        gaps: GapWriter,
    }

    async fn fixture() -> Fixture {
        let storage = Storage::in_memory();
        let comparer = Rc::new(FragmentIdComparer::new());
        let sync = SyncWriter::new(room(), storage.clone(), comparer.clone());
        sync.load().await.unwrap();
        let gaps = GapWriter::new(room(), storage.clone(), comparer);
        Fixture { storage, sync, gaps }
    }

    fn gap_of(entries: &[Entry]) -> FragmentBoundary {
        entries
            .iter()
            .find(|e| e.is_gap())
            .and_then(|e| e.as_boundary())
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn test_backward_fill_writes_before_first_event() {
        let f = fixture().await;
        let written = f.sync.write_sync(&sync(&["$3", "$4"], true, "t3")).await.unwrap();
        let gap = gap_of(&written);

        let entries = f
            .gaps
            .write_fragment_fill(&gap, &page("t3", &["$2", "$1"], Some("t1")))
            .await
            .unwrap();
        let first_live = written.iter().find(|e| e.event_id().is_some()).unwrap().sort_key;
        assert_eq!(entries[0].event_id().unwrap().as_str(), "$2");
        assert_eq!(entries[0].sort_key, first_live.previous_key());
        assert_eq!(entries[1].sort_key, first_live.previous_key().previous_key());
        let boundary = entries[2].as_boundary().unwrap();
        assert_eq!(boundary.token.as_deref(), Some("t1"));

        let stored = f.storage.fragments.get(&room(), gap.fragment_id).await.unwrap().unwrap();
        assert_eq!(stored.previous_token.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_empty_page_exhausts_history() {
        let f = fixture().await;
        let gap = gap_of(&f.sync.write_sync(&sync(&["$1"], true, "t0")).await.unwrap());
        let entries = f.gaps.write_fragment_fill(&gap, &page("t0", &[], Some("t0"))).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_gap());
    }

    #[tokio::test]
    async fn test_token_mismatch_is_rejected() {
        let f = fixture().await;
        let gap = gap_of(&f.sync.write_sync(&sync(&["$1"], true, "t0")).await.unwrap());
        let err = f
            .gaps
            .write_fragment_fill(&gap, &page("stale", &["$0"], None))
            .await
            .unwrap_err();
        assert!(matches!(err, TimelineError::TokenMismatch { .. }));
        assert!(f.storage.events.get_by_event_id(&room(), &EventId::new("$0")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overlap_links_fragments_and_clears_tokens() {
        let f = fixture().await;
        f.sync.write_sync(&sync(&["$1", "$2"], false, "t0")).await.unwrap();
        let written = f.sync.write_sync(&sync(&["$5", "$6"], true, "t4")).await.unwrap();
        let gap = gap_of(&written);

        let entries = f
            .gaps
            .write_fragment_fill(&gap, &page("t4", &["$4", "$3", "$2", "$1"], Some("t0")))
            .await
            .unwrap();
        let ids: Vec<&str> = entries.iter().filter_map(|e| e.event_id()).map(|id| id.as_str()).collect();
        assert_eq!(ids, ["$4", "$3"]);

        let boundaries: Vec<&FragmentBoundary> = entries.iter().filter_map(|e| e.as_boundary()).collect();
        assert_eq!(boundaries.len(), 2);
        assert!(boundaries.iter().all(|b| b.token.is_none()));
        assert_eq!(boundaries[0].fragment_id, gap.fragment_id);
        assert_eq!(boundaries[0].linked_fragment_id, Some(boundaries[1].fragment_id));
        assert_eq!(boundaries[1].direction, Direction::Forward);

        let filled = f.storage.fragments.get(&room(), gap.fragment_id).await.unwrap().unwrap();
        assert_eq!(filled.previous_token, None);
    }

    #[test]
    fn test_link_refuses_conflicting_neighbour() {
        let mut a = Fragment::new(room(), FragmentId(1));
        a.previous_id = Some(FragmentId(7));
        let mut b = Fragment::new(room(), FragmentId(2));
        let err = link(&mut a, &mut b, Direction::Backward).unwrap_err();
        assert!(matches!(err, TimelineError::LinkConflict { existing: FragmentId(7), .. }));
    }
}
