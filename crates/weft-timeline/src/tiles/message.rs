use chrono::{DateTime, Utc};
use weft_observable::UpdateParams;
use weft_types::{Entry, EventKey, UserId};

use super::{SiblingInfo, TileBehavior, TileOptions, TileShape, TileUpdate, TileView};

/// One `m.room.message` event.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageTile {
    entry: Entry,
    sender: UserId,
    timestamp: u64,
    is_own: bool,
    is_continuation: bool,
}

impl MessageTile {
    pub fn new(entry: &Entry, options: &TileOptions) -> Option<Self> {
        let event = entry.as_event()?;
        Some(Self {
            entry: entry.clone(),
            sender: event.sender.clone(),
            timestamp: event.origin_server_ts,
            is_own: options.own_user_id.as_ref() == Some(&event.sender),
            is_continuation: false,
        })
    }

    pub fn sender(&self) -> &UserId {
        &self.sender
    }

    pub fn body(&self) -> &str {
        self.entry
            .as_event()
            .and_then(|e| e.body())
            .unwrap_or_default()
    }

    pub fn is_continuation(&self) -> bool {
        self.is_continuation
    }

    pub fn is_own(&self) -> bool {
        self.is_own
    }

    fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(i64::try_from(self.timestamp).ok()?)
    }

    pub fn date(&self) -> String {
        self.datetime()
            .map(|dt| dt.format("%-m/%-d").to_string())
            .unwrap_or_default()
    }

    pub fn time(&self) -> String {
        self.datetime()
            .map(|dt| dt.format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

impl TileBehavior for MessageTile {
    fn shape(&self) -> TileShape {
        TileShape::Message
    }

    fn lower_key(&self) -> EventKey {
        self.entry.sort_key
    }

    fn upper_key(&self) -> EventKey {
        self.entry.sort_key
    }

    fn update_entry(&mut self, entry: &Entry, params: Option<&UpdateParams>) -> TileUpdate {
        let Some(event) = entry.as_event() else {
            return TileUpdate::Remove;
        };
        self.sender = event.sender.clone();
        self.timestamp = event.origin_server_ts;
        self.entry = entry.clone();
        TileUpdate::Update(params.cloned())
    }

    fn remove_entry(&mut self, _entry: &Entry) -> bool {
        true
    }

    fn update_previous_sibling(&mut self, prev: Option<&SiblingInfo>) -> Option<UpdateParams> {
        let is_continuation =
            prev.is_some_and(|prev| prev.shape == TileShape::Message && prev.sender.as_ref() == Some(&self.sender));
        if is_continuation == self.is_continuation {
            return None;
        }
        self.is_continuation = is_continuation;
        Some(UpdateParams::Field("is_continuation"))
    }

    fn sibling_info(&self) -> SiblingInfo {
        SiblingInfo {
            shape: TileShape::Message,
            sender: Some(self.sender.clone()),
        }
    }

    fn view(&self) -> TileView {
        TileView::Message {
            sender: self.sender.localpart().to_string(),
            date: self.date(),
            time: self.time(),
            is_own: self.is_own,
            is_continuation: self.is_continuation,
            body: self.body().to_string(),
        }
    }
}
