//! Test doubles.

use std::cell::RefCell;
use std::collections::VecDeque;

use async_trait::async_trait;
use weft_types::{MessagesRequest, MessagesResponse, RoomId};

use crate::api::{ApiError, HistoryApi};

/// Serves queued pages in order and records every request.
/// Answers `Unavailable` once the queue is empty.
#[derive(Default)]
pub struct ScriptedHistory {
    responses: RefCell<VecDeque<Result<MessagesResponse, ApiError>>>,
    requests: RefCell<Vec<MessagesRequest>>,
}

impl ScriptedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&self, page: MessagesResponse) {
        self.responses.borrow_mut().push_back(Ok(page));
    }

    pub fn push_error(&self, err: ApiError) {
        self.responses.borrow_mut().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<MessagesRequest> {
        self.requests.borrow().clone()
    }
}

#[async_trait(?Send)]
impl HistoryApi for ScriptedHistory {
    async fn messages(&self, _room_id: &RoomId, request: MessagesRequest) -> Result<MessagesResponse, ApiError> {
        self.requests.borrow_mut().push(request);
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(ApiError::Unavailable))
    }
}
