//! The set of rooms a client knows about.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};
use weft_observable::{MapObserver, ObservableMap, SubscriptionId, UpdateParams};
use weft_store::Storage;
use weft_types::{Membership, RoomId, SyncResponse};

use crate::api::HistoryApi;
use crate::config::TimelineConfig;
use crate::error::RoomError;
use crate::room::{Room, SyncChanges};

/// Write-phase output of [`Session::persist_sync`], one item per room touched.
pub struct SessionChanges {
    rooms: Vec<(Rc<Room>, bool, SyncChanges)>,
}

impl SessionChanges {
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Rooms touched by the batch, with their changes.
    pub fn iter(&self) -> impl Iterator<Item = (&Rc<Room>, &SyncChanges)> {
        self.rooms.iter().map(|(room, _, changes)| (room, changes))
    }
}

pub struct Session {
    storage: Storage,
    history: Rc<dyn HistoryApi>,
    config: TimelineConfig,
    rooms: RefCell<ObservableMap<RoomId, Rc<Room>>>,
}

impl Session {
    pub fn new(storage: Storage, history: Rc<dyn HistoryApi>, config: TimelineConfig) -> Self {
        Self {
            storage,
            history,
            config,
            rooms: RefCell::new(ObservableMap::new()),
        }
    }

    /// Restore every room with a stored summary.
    pub async fn load(&self) -> Result<(), RoomError> {
        let summaries = self.storage.summaries.all().await?;
        let mut loaded = Vec::with_capacity(summaries.len());
        for record in summaries {
            let room = self.new_room(record.room_id.clone());
            room.load(Some(record)).await?;
            loaded.push(room);
        }
        let count = loaded.len();
        let mut rooms = self.rooms.borrow_mut();
        for room in loaded {
            rooms.add(room.id().clone(), room);
        }
        info!(rooms = count, "session loaded");
        Ok(())
    }

    pub fn room(&self, room_id: &RoomId) -> Option<Rc<Room>> {
        self.rooms.borrow().get(room_id).cloned()
    }

    /// Rooms sorted by id.
    pub fn rooms(&self) -> Vec<Rc<Room>> {
        let mut rooms: Vec<Rc<Room>> = self.rooms.borrow().values().cloned().collect();
        rooms.sort_by(|a, b| a.id().as_str().cmp(b.id().as_str()));
        rooms
    }

    pub fn subscribe_rooms(&self, observer: Rc<RefCell<dyn MapObserver<RoomId, Rc<Room>>>>) -> SubscriptionId {
        self.rooms.borrow().subscribe(observer)
    }

    pub fn unsubscribe_rooms(&self, id: SubscriptionId) -> bool {
        self.rooms.borrow().unsubscribe(id)
    }

    /// Write phase for a whole sync batch. Rooms seen for the first time are
    /// created here but only become visible in [`emit_sync`](Self::emit_sync).
    pub async fn persist_sync(&self, sync: &SyncResponse) -> Result<SessionChanges, RoomError> {
        let mut rooms = Vec::with_capacity(sync.rooms.join.len());
        for (room_id, joined) in &sync.rooms.join {
            let (room, is_new) = match self.room(room_id) {
                Some(room) => (room, false),
                None => {
                    let room = self.new_room(room_id.clone());
                    room.load(None).await?;
                    (room, true)
                }
            };
            let changes = room.persist_sync(joined, Membership::Join).await?;
            rooms.push((room, is_new, changes));
        }
        debug!(rooms = rooms.len(), next_batch = %sync.next_batch, "persisted sync");
        Ok(SessionChanges { rooms })
    }

    /// Apply phase: publish new rooms, forward each room's changes, and
    /// announce summary changes on the rooms map.
    pub fn emit_sync(&self, changes: SessionChanges) {
        for (room, is_new, room_changes) in changes.rooms {
            let summary_changed = room_changes.summary.is_some();
            room.emit_sync(room_changes);
            let mut rooms = self.rooms.borrow_mut();
            if is_new {
                rooms.add(room.id().clone(), room);
            } else if summary_changed {
                rooms.update(room.id(), Some(UpdateParams::Field("summary")));
            }
        }
    }

    fn new_room(&self, room_id: RoomId) -> Rc<Room> {
        Rc::new(Room::new(
            room_id,
            self.storage.clone(),
            self.history.clone(),
            self.config.clone(),
        ))
    }
}
