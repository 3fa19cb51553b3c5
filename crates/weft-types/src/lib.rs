//! Shared identifiers and timeline types for weft.
//!
//! This crate is the leaf of the workspace: room/user/event identifiers, the
//! event payloads that arrive over sync and history requests, and the
//! fragment-relative sort keys that order a room's timeline. It has **no
//! internal weft dependencies**.
//!
//! # Key Types
//!
//! |-------------------------|----------------------------------------------------|
//! | Type                    | Purpose                                            |
//! |-------------------------|----------------------------------------------------|
//! | [`RoomId`]              | Which room                                         |
//! | [`UserId`]              | Who sent an event                                  |
//! | [`EventId`]             | Server-assigned event identity                     |
//! | [`EventKey`]            | Sort key: fragment id + index within the fragment  |
//! | [`Fragment`]            | Contiguous run of history, linked to neighbours    |
//! | [`FragmentIdComparer`]  | Total order over fragment ids via their links      |
//! | [`Entry`]               | Item of a timeline: event or fragment boundary     |
//! | [`RoomEvent`]           | Event payload as delivered by the server           |
//! | [`SyncResponse`]        | Incremental sync batch                             |
//! |-------------------------|----------------------------------------------------|

pub mod entry;
pub mod event;
pub mod fragment;
pub mod ids;
pub mod key;
pub mod wire;

pub use entry::{Entry, EntryContent, FragmentBoundary};
pub use event::{Membership, RoomEvent, event_types};
pub use fragment::{Fragment, FragmentIdComparer};
pub use ids::{EventId, FragmentId, RoomId, UserId};
pub use key::{Direction, EventKey};
pub use wire::{
    JoinedRoom, MessagesRequest, MessagesResponse, RoomSummaryChunk, Rooms, StateChunk, SyncResponse,
    TimelineChunk,
};
