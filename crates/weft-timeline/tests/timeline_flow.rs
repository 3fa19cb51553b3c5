//! Sync → room → timeline → tiles, end to end on the in-memory store.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use weft_observable::ObservableList;
use weft_observable::testing::{ListEvent, ListRecorder};
use weft_store::Storage;
use weft_timeline::{
    ApiError, HistoryApi, RoomError, Session, Tile, TileOptions, TileView, WeftConfig,
};
use weft_types::{
    JoinedRoom, MessagesRequest, MessagesResponse, RoomEvent, RoomId, SyncResponse, TimelineChunk, UserId,
    event_types,
};

#[derive(Default)]
struct Pages {
    pages: RefCell<VecDeque<MessagesResponse>>,
}

#[async_trait(?Send)]
impl HistoryApi for Pages {
    async fn messages(&self, _room_id: &RoomId, request: MessagesRequest) -> Result<MessagesResponse, ApiError> {
        let page = self.pages.borrow_mut().pop_front().ok_or(ApiError::Unavailable)?;
        assert_eq!(page.start, request.from);
        Ok(page)
    }
}

fn lobby() -> RoomId {
    RoomId::new("!lobby:weft.test")
}

fn message(n: u64, sender: &str) -> RoomEvent {
    RoomEvent::new(
        format!("${n}"),
        sender,
        event_types::MESSAGE,
        1_700_000_000_000 + n * 1000,
        serde_json::json!({"msgtype": "m.text", "body": format!("message {n}")}),
    )
}

fn live_sync() -> SyncResponse {
    let mut sync = SyncResponse {
        next_batch: "s1".into(),
        ..Default::default()
    };
    sync.rooms.join.insert(
        lobby(),
        JoinedRoom {
            timeline: TimelineChunk {
                events: vec![
                    message(5, "@alice:weft.test"),
                    message(6, "@alice:weft.test"),
                    message(7, "@bob:weft.test"),
                ],
                limited: true,
                prev_batch: Some("t5".into()),
            },
            ..Default::default()
        },
    );
    sync
}

fn session(storage: &Storage, history: Rc<dyn HistoryApi>, initial_load: usize) -> Session {
    let config = WeftConfig::default().with_initial_load(initial_load);
    Session::new(storage.clone(), history, config.timeline)
}

fn lines(views: &[TileView]) -> Vec<String> {
    views.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn test_sync_fill_and_reload() {
    let storage = Storage::in_memory();
    let pages = Rc::new(Pages::default());
    pages.pages.borrow_mut().push_back(MessagesResponse {
        chunk: vec![message(4, "@carol:weft.test"), message(3, "@carol:weft.test")],
        start: "t5".into(),
        end: Some("t2".into()),
    });

    let session = session(&storage, pages.clone(), 50);
    let changes = session.persist_sync(&live_sync()).await.unwrap();
    session.emit_sync(changes);
    let room = session.room(&lobby()).unwrap();

    let timeline = room.open_timeline().await.unwrap();
    assert!(matches!(
        room.open_timeline().await,
        Err(RoomError::TimelineAlreadyOpen(_))
    ));

    let tiles = timeline.tiles(TileOptions {
        own_user_id: Some(UserId::new("@alice:weft.test")),
    });
    let recorder = ListRecorder::<Tile>::shared();
    tiles.subscribe(recorder.clone());

    let before = lines(&tiles.views());
    assert_eq!(before.len(), 4);
    assert_eq!(before[0], "[gap] older history not loaded");
    assert!(before[1].ends_with("alice: message 5"));
    assert_eq!(before[2], "[message]   message 6");
    assert!(before[3].ends_with("bob: message 7"));
    assert!(matches!(&tiles.views()[1], TileView::Message { is_own: true, .. }));

    let gap = timeline.entry_snapshot()[0].clone();
    assert_eq!(timeline.fill_gap(&gap, 2).await.unwrap(), 2);

    let after = lines(&tiles.views());
    assert_eq!(after.len(), 6);
    assert_eq!(after[0], "[gap] older history not loaded");
    assert!(after[1].ends_with("carol: message 3"));
    assert_eq!(after[2], "[message]   message 4");
    assert!(after[3].ends_with("alice: message 5"));

    let events = recorder.borrow_mut().take();
    let adds = events.iter().filter(|e| matches!(e, ListEvent::Add(..))).count();
    assert_eq!(adds, 2);
    assert!(events.iter().any(|e| matches!(e, ListEvent::Update(0, Tile::Gap(_), _))));

    // a restarted client reads the filled page back from storage
    let restarted = self::session(&storage, Rc::new(Pages::default()), 3);
    restarted.load().await.unwrap();
    let room = restarted.room(&lobby()).unwrap();
    let timeline = room.open_timeline().await.unwrap();
    let entries = timeline.entry_snapshot();
    let earliest = entries[0].sort_key;
    assert_eq!(entries[0].event_id().map(|id| id.as_str()), Some("$5"));

    assert_eq!(timeline.load_at_top(2).await.unwrap(), 2);
    let entries = timeline.entry_snapshot();
    let ids: Vec<&str> = entries.iter().filter_map(|e| e.event_id()).map(|id| id.as_str()).collect();
    assert_eq!(ids, ["$3", "$4", "$5", "$6", "$7"]);
    for entry in &entries[..2] {
        assert_eq!(entry.sort_key.fragment_id, earliest.fragment_id);
        assert!(entry.sort_key.event_index < earliest.event_index);
    }

    assert_eq!(timeline.load_at_top(5).await.unwrap(), 0);
    let first = timeline.entry_snapshot()[0].clone();
    assert_eq!(first.as_boundary().and_then(|b| b.token.as_deref()), Some("t2"));
}

#[tokio::test]
async fn test_exhausted_history_closes_gap_tile() {
    let storage = Storage::in_memory();
    let pages = Rc::new(Pages::default());
    pages.pages.borrow_mut().push_back(MessagesResponse {
        chunk: Vec::new(),
        start: "t5".into(),
        end: None,
    });
    let session = session(&storage, pages, 50);
    let changes = session.persist_sync(&live_sync()).await.unwrap();
    session.emit_sync(changes);
    let timeline = session.room(&lobby()).unwrap().open_timeline().await.unwrap();

    let tiles = timeline.tiles(TileOptions::default());
    let recorder = ListRecorder::<Tile>::shared();
    tiles.subscribe(recorder.clone());
    assert_eq!(tiles.len(), 4);

    let gap = timeline.entry_snapshot()[0].clone();
    assert_eq!(timeline.fill_gap(&gap, 10).await.unwrap(), 0);
    assert_eq!(tiles.len(), 3);
    assert!(matches!(
        &recorder.borrow_mut().take()[..],
        [ListEvent::Remove(0, Tile::Gap(_))]
    ));
    assert!(!timeline.entry_snapshot()[0].is_gap());
}
