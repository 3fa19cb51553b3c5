//! Timeline and room error types.

use thiserror::Error;
use weft_store::StorageError;
use weft_types::{FragmentId, RoomId};

use crate::api::ApiError;

#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Network(#[from] ApiError),

    /// The history page doesn't continue from the token stored on the gap.
    #[error("page starts at {received:?}, gap expects {expected:?}")]
    TokenMismatch {
        expected: Option<String>,
        received: String,
    },

    #[error("fragment {fragment_id} of {room_id} is not stored")]
    MissingFragment { room_id: RoomId, fragment_id: FragmentId },

    /// `fill_gap` was given an entry that isn't a gap.
    #[error("entry at {0} is not a gap")]
    NotAGap(String),

    /// Two fragments claim different neighbours on the same edge.
    #[error("fragment {fragment_id} already linked to {existing}, cannot link to {requested}")]
    LinkConflict {
        fragment_id: FragmentId,
        existing: FragmentId,
        requested: FragmentId,
    },
}

impl TimelineError {
    pub fn missing_fragment(room_id: &RoomId, fragment_id: FragmentId) -> Self {
        Self::MissingFragment {
            room_id: room_id.clone(),
            fragment_id,
        }
    }

    /// True for failures that came from the history API rather than storage.
    pub fn is_network(&self) -> bool {
        matches!(self, TimelineError::Network(_))
    }
}

pub type TimelineResult<T> = Result<T, TimelineError>;

#[derive(Debug, Error)]
pub enum RoomError {
    #[error("room {0} already has an open timeline")]
    TimelineAlreadyOpen(RoomId),

    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

impl From<StorageError> for RoomError {
    fn from(err: StorageError) -> Self {
        RoomError::Timeline(TimelineError::Storage(err))
    }
}
