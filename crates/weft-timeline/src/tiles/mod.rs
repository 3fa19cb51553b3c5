//! Tiles: what a renderer draws for a run of timeline entries.
//!
//! | Type | Role |
//! |------|------|
//! | [`Tile`] | Closed set of tile variants |
//! | [`TileBehavior`] | Capabilities every variant implements |
//! | [`TileCreator`] | Maps an entry to a new tile (or none) |
//! | [`TilesCollection`] | Derived observable list of tiles over an entry list |
//!
//! A tile covers one or more consecutive entries. Most cover exactly one;
//! [`MembershipTile`] folds a run of membership changes into one line.

mod announcement;
mod collection;
mod gap;
mod message;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use strum::EnumString;
use weft_observable::UpdateParams;
use weft_types::{Direction, Entry, EventKey, FragmentIdComparer, UserId, event_types};

pub use announcement::{MembershipTile, RoomNameTile};
pub use collection::{TileId, TilesCollection};
pub use gap::GapTile;
pub use message::MessageTile;

/// How a renderer should lay a tile out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TileShape {
    Message,
    Announcement,
    Gap,
}

impl TileShape {
    /// Parse from string, returning None for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TileShape::Message => "message",
            TileShape::Announcement => "announcement",
            TileShape::Gap => "gap",
        }
    }
}

impl fmt::Display for TileShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only render state of a tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TileView {
    Message {
        sender: String,
        date: String,
        time: String,
        is_own: bool,
        is_continuation: bool,
        body: String,
    },
    Announcement {
        text: String,
    },
    Gap {
        direction: Direction,
        has_token: bool,
    },
}

impl TileView {
    pub fn shape(&self) -> TileShape {
        match self {
            TileView::Message { .. } => TileShape::Message,
            TileView::Announcement { .. } => TileShape::Announcement,
            TileView::Gap { .. } => TileShape::Gap,
        }
    }
}

impl fmt::Display for TileView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileView::Message {
                sender,
                date,
                time,
                is_continuation,
                body,
                ..
            } => {
                if *is_continuation {
                    write!(f, "[message]   {body}")
                } else {
                    write!(f, "[message] {date} {time} {sender}: {body}")
                }
            }
            TileView::Announcement { text } => write!(f, "[announcement] {text}"),
            TileView::Gap { direction, has_token } => {
                let side = if *direction == Direction::Backward { "older" } else { "newer" };
                if *has_token {
                    write!(f, "[gap] {side} history not loaded")
                } else {
                    write!(f, "[gap] no {side} history")
                }
            }
        }
    }
}

/// What a neighbouring tile exposes to its siblings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiblingInfo {
    pub shape: TileShape,
    pub sender: Option<UserId>,
}

/// Outcome of handing a tile an updated entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TileUpdate {
    /// Nothing a renderer shows changed.
    Unchanged,
    /// Emit an update with these params.
    Update(Option<UpdateParams>),
    /// The entry no longer warrants this tile.
    Remove,
}

/// Capabilities shared by every tile variant.
pub trait TileBehavior {
    fn shape(&self) -> TileShape;

    /// Key of the first entry covered.
    fn lower_key(&self) -> EventKey;

    /// Key of the last entry covered.
    fn upper_key(&self) -> EventKey;

    /// Absorb `entry` into this tile if it belongs here.
    fn try_include_entry(&mut self, _entry: &Entry, _comparer: &FragmentIdComparer) -> bool {
        false
    }

    /// Split off the part of this tile after `key`, which must fall strictly
    /// inside the tile's range. `None` for tiles that cover a single entry.
    fn split_off(&mut self, _key: &EventKey, _comparer: &FragmentIdComparer) -> Option<Tile> {
        None
    }

    /// Fold the following tile into this one if the two form a single run.
    fn try_merge_next(&mut self, _next: &Tile) -> bool {
        false
    }

    fn update_entry(&mut self, entry: &Entry, params: Option<&UpdateParams>) -> TileUpdate;

    /// Drop `entry` from this tile. Returns true if the tile is now empty.
    fn remove_entry(&mut self, entry: &Entry) -> bool;

    /// Where this tile sits relative to `key`: `Less` if entirely before it,
    /// `Greater` if entirely after, `Equal` if `key` falls in its range.
    fn compare_sort_key(&self, key: &EventKey, comparer: &FragmentIdComparer) -> Ordering {
        if comparer.compare_keys(&self.upper_key(), key) == Ordering::Less {
            Ordering::Less
        } else if comparer.compare_keys(&self.lower_key(), key) == Ordering::Greater {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }

    /// The tile before this one changed. Returns params if a derived field
    /// changed as a result.
    fn update_previous_sibling(&mut self, _prev: Option<&SiblingInfo>) -> Option<UpdateParams> {
        None
    }

    fn update_next_sibling(&mut self, _next: Option<&SiblingInfo>) -> Option<UpdateParams> {
        None
    }

    fn sibling_info(&self) -> SiblingInfo {
        SiblingInfo {
            shape: self.shape(),
            sender: None,
        }
    }

    fn view(&self) -> TileView;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Tile {
    Message(MessageTile),
    RoomName(RoomNameTile),
    Membership(MembershipTile),
    Gap(GapTile),
}

impl Tile {
    fn behavior(&self) -> &dyn TileBehavior {
        match self {
            Tile::Message(t) => t,
            Tile::RoomName(t) => t,
            Tile::Membership(t) => t,
            Tile::Gap(t) => t,
        }
    }

    fn behavior_mut(&mut self) -> &mut dyn TileBehavior {
        match self {
            Tile::Message(t) => t,
            Tile::RoomName(t) => t,
            Tile::Membership(t) => t,
            Tile::Gap(t) => t,
        }
    }
}

impl TileBehavior for Tile {
    fn shape(&self) -> TileShape {
        self.behavior().shape()
    }

    fn lower_key(&self) -> EventKey {
        self.behavior().lower_key()
    }

    fn upper_key(&self) -> EventKey {
        self.behavior().upper_key()
    }

    fn try_include_entry(&mut self, entry: &Entry, comparer: &FragmentIdComparer) -> bool {
        self.behavior_mut().try_include_entry(entry, comparer)
    }

    fn split_off(&mut self, key: &EventKey, comparer: &FragmentIdComparer) -> Option<Tile> {
        self.behavior_mut().split_off(key, comparer)
    }

    fn try_merge_next(&mut self, next: &Tile) -> bool {
        self.behavior_mut().try_merge_next(next)
    }

    fn update_entry(&mut self, entry: &Entry, params: Option<&UpdateParams>) -> TileUpdate {
        self.behavior_mut().update_entry(entry, params)
    }

    fn remove_entry(&mut self, entry: &Entry) -> bool {
        self.behavior_mut().remove_entry(entry)
    }

    fn compare_sort_key(&self, key: &EventKey, comparer: &FragmentIdComparer) -> Ordering {
        self.behavior().compare_sort_key(key, comparer)
    }

    fn update_previous_sibling(&mut self, prev: Option<&SiblingInfo>) -> Option<UpdateParams> {
        self.behavior_mut().update_previous_sibling(prev)
    }

    fn update_next_sibling(&mut self, next: Option<&SiblingInfo>) -> Option<UpdateParams> {
        self.behavior_mut().update_next_sibling(next)
    }

    fn sibling_info(&self) -> SiblingInfo {
        self.behavior().sibling_info()
    }

    fn view(&self) -> TileView {
        self.behavior().view()
    }
}

// ============================================================================
// Tile creation
// ============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TileOptions {
    /// Messages from this user render as own messages.
    pub own_user_id: Option<UserId>,
}

type CreateFn = Box<dyn Fn(&Entry) -> Option<Tile>>;

/// Pluggable entry → tile factory.
pub struct TileCreator {
    create: CreateFn,
}

impl TileCreator {
    /// The stock mapping: messages, room name changes, membership changes and
    /// gaps get tiles; everything else is skipped.
    pub fn new(options: TileOptions) -> Self {
        Self::custom(move |entry| default_tile_for(entry, &options))
    }

    pub fn custom(create: impl Fn(&Entry) -> Option<Tile> + 'static) -> Self {
        Self {
            create: Box::new(create),
        }
    }

    pub fn create(&self, entry: &Entry) -> Option<Tile> {
        (self.create)(entry)
    }
}

impl Default for TileCreator {
    fn default() -> Self {
        Self::new(TileOptions::default())
    }
}

fn default_tile_for(entry: &Entry, options: &TileOptions) -> Option<Tile> {
    if entry.is_gap() {
        return GapTile::new(entry).map(Tile::Gap);
    }
    let event = entry.as_event()?;
    match event.event_type.as_str() {
        event_types::MESSAGE => Some(Tile::Message(MessageTile::new(entry, options)?)),
        event_types::NAME => Some(Tile::RoomName(RoomNameTile::new(entry)?)),
        event_types::MEMBER => Some(Tile::Membership(MembershipTile::new(entry)?)),
        _ => None,
    }
}
