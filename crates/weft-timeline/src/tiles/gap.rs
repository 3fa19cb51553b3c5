use weft_observable::UpdateParams;
use weft_types::{Direction, Entry, EntryContent, EventKey, FragmentBoundary};

use super::{TileBehavior, TileShape, TileUpdate, TileView};

/// A fragment edge with unfetched history behind it.
#[derive(Clone, Debug, PartialEq)]
pub struct GapTile {
    sort_key: EventKey,
    boundary: FragmentBoundary,
}

impl GapTile {
    /// `None` unless `entry` is a boundary that still has a token.
    pub fn new(entry: &Entry) -> Option<Self> {
        let boundary = entry.as_boundary().filter(|b| b.token.is_some())?;
        Some(Self {
            sort_key: entry.sort_key,
            boundary: boundary.clone(),
        })
    }

    pub fn direction(&self) -> Direction {
        self.boundary.direction
    }

    pub fn token(&self) -> Option<&str> {
        self.boundary.token.as_deref()
    }

    /// The boundary entry to pass to `Timeline::fill_gap`.
    pub fn entry(&self) -> Entry {
        Entry {
            sort_key: self.sort_key,
            content: EntryContent::Boundary(self.boundary.clone()),
        }
    }
}

impl TileBehavior for GapTile {
    fn shape(&self) -> TileShape {
        TileShape::Gap
    }

    fn lower_key(&self) -> EventKey {
        self.sort_key
    }

    fn upper_key(&self) -> EventKey {
        self.sort_key
    }

    /// A boundary that lost its token is a seam, not a gap.
    fn update_entry(&mut self, entry: &Entry, _params: Option<&UpdateParams>) -> TileUpdate {
        match entry.as_boundary() {
            Some(boundary) if boundary.token.is_some() => {
                if *boundary == self.boundary {
                    return TileUpdate::Unchanged;
                }
                self.boundary = boundary.clone();
                TileUpdate::Update(Some(UpdateParams::Field("gap")))
            }
            _ => TileUpdate::Remove,
        }
    }

    fn remove_entry(&mut self, _entry: &Entry) -> bool {
        true
    }

    fn view(&self) -> TileView {
        TileView::Gap {
            direction: self.boundary.direction,
            has_token: self.boundary.token.is_some(),
        }
    }
}
