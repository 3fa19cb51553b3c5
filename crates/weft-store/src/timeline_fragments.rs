//! Persisted fragments, keyed `(room, fragment id)`.

use std::rc::Rc;

use tracing::debug;
use weft_types::{Direction, Fragment, FragmentId, RoomId};

use crate::error::StorageResult;
use crate::ops::OrderedStore;
use crate::query::QueryTarget;
use crate::range::KeyRange;

pub(crate) type FragmentStoreKey = (String, u32);

fn encode_fragment_key(room_id: &RoomId, id: FragmentId) -> FragmentStoreKey {
    (room_id.as_str().to_string(), id.as_u32())
}

fn room_range(room_id: &RoomId) -> KeyRange<FragmentStoreKey> {
    KeyRange::bound(
        encode_fragment_key(room_id, FragmentId(u32::MIN)),
        encode_fragment_key(room_id, FragmentId(u32::MAX)),
        false,
        false,
    )
}

#[derive(Clone)]
pub struct TimelineFragmentStore {
    fragments: QueryTarget<FragmentStoreKey, Fragment>,
}

impl TimelineFragmentStore {
    pub fn new(store: Rc<dyn OrderedStore<FragmentStoreKey, Fragment>>) -> Self {
        Self {
            fragments: QueryTarget::new(store),
        }
    }

    pub async fn get(&self, room_id: &RoomId, id: FragmentId) -> StorageResult<Option<Fragment>> {
        self.fragments.get(&encode_fragment_key(room_id, id)).await
    }

    /// Store a new fragment; fails with `KeyExists` if the id is taken.
    pub async fn add(&self, fragment: Fragment) -> StorageResult<()> {
        debug!(room_id = %fragment.room_id, fragment_id = %fragment.id, "add fragment");
        self.fragments
            .add(encode_fragment_key(&fragment.room_id, fragment.id), fragment)
            .await
    }

    pub async fn update(&self, fragment: Fragment) -> StorageResult<()> {
        self.fragments
            .put(encode_fragment_key(&fragment.room_id, fragment.id), fragment)
            .await
    }

    /// The newest fragment with nothing linked or fetchable after it.
    pub async fn live_fragment(&self, room_id: &RoomId) -> StorageResult<Option<Fragment>> {
        self.fragments
            .find_reverse(room_range(room_id), |f| f.is_live())
            .await
    }

    /// Every fragment of the room, by ascending id.
    pub async fn all(&self, room_id: &RoomId) -> StorageResult<Vec<Fragment>> {
        self.fragments.select_all(room_range(room_id), Direction::Forward).await
    }

    /// One past the highest fragment id in the room, or 0 for a new room.
    pub async fn next_fragment_id(&self, room_id: &RoomId) -> StorageResult<FragmentId> {
        let last = self.fragments.select_last(room_range(room_id)).await?;
        Ok(last.map_or(FragmentId(0), |f| FragmentId(f.id.as_u32() + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Storage;

    fn fragment(room: &str, id: u32) -> Fragment {
        Fragment::new(RoomId::new(room), FragmentId(id))
    }

    #[tokio::test]
    async fn test_live_fragment_and_next_id() {
        for storage in [Storage::in_memory(), Storage::sqlite_in_memory().unwrap()] {
            let room = RoomId::new("!a:weft.test");
            assert_eq!(storage.fragments.next_fragment_id(&room).await.unwrap(), FragmentId(0));
            assert!(storage.fragments.live_fragment(&room).await.unwrap().is_none());

            let mut first = fragment("!a:weft.test", 0);
            first.previous_token = Some("t0".into());
            storage.fragments.add(first.clone()).await.unwrap();
            assert_eq!(storage.fragments.live_fragment(&room).await.unwrap().map(|f| f.id), Some(FragmentId(0)));

            let mut second = fragment("!a:weft.test", 1);
            second.previous_id = Some(FragmentId(0));
            first.next_id = Some(FragmentId(1));
            storage.fragments.update(first).await.unwrap();
            storage.fragments.add(second).await.unwrap();
            storage.fragments.add(fragment("!b:weft.test", 9)).await.unwrap();

            assert_eq!(storage.fragments.live_fragment(&room).await.unwrap().map(|f| f.id), Some(FragmentId(1)));
            assert_eq!(storage.fragments.next_fragment_id(&room).await.unwrap(), FragmentId(2));
            assert_eq!(storage.fragments.all(&room).await.unwrap().len(), 2);
            assert_eq!(
                storage.fragments.get(&room, FragmentId(0)).await.unwrap().and_then(|f| f.next_id),
                Some(FragmentId(1))
            );
        }
    }

    #[tokio::test]
    async fn test_historical_fragment_with_token_is_not_live() {
        let storage = Storage::in_memory();
        let room = RoomId::new("!a:weft.test");
        let mut live = fragment("!a:weft.test", 0);
        live.previous_id = Some(FragmentId(1));
        storage.fragments.add(live).await.unwrap();
        let mut older = fragment("!a:weft.test", 1);
        older.next_id = Some(FragmentId(0));
        older.previous_token = Some("back".into());
        storage.fragments.add(older).await.unwrap();
        assert_eq!(storage.fragments.live_fragment(&room).await.unwrap().map(|f| f.id), Some(FragmentId(0)));
    }
}
