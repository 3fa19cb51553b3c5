//! The history-fetch seam.
//!
//! Weft doesn't speak HTTP. Whatever does implements [`HistoryApi`] and hands
//! it to [`crate::Room`]; the timeline only ever asks for one page at a time.

use async_trait::async_trait;
use weft_types::{MessagesRequest, MessagesResponse, RoomId};

/// Failure reported by a [`HistoryApi`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("history API unavailable")]
    Unavailable,
}

impl ApiError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }
}

/// Paginated room history.
#[async_trait(?Send)]
pub trait HistoryApi {
    /// Fetch one page of events starting at `request.from` in `request.dir`.
    async fn messages(&self, room_id: &RoomId, request: MessagesRequest) -> Result<MessagesResponse, ApiError>;
}

/// A history source with nothing behind it, for rooms opened offline.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

#[async_trait(?Send)]
impl HistoryApi for NoHistory {
    async fn messages(&self, _room_id: &RoomId, _request: MessagesRequest) -> Result<MessagesResponse, ApiError> {
        Err(ApiError::Unavailable)
    }
}
