//! Typed identifiers for rooms, users, events, and fragments.
//!
//! Room, user, and event ids are server-assigned opaque strings with a one
//! character sigil (`!room:host`, `@user:host`, `$event`). They're kept as
//! strings on the wire and in storage; `parse()` checks the sigil for input
//! that comes from outside (CLI arguments, config), while `new()` trusts its
//! caller the way deserialization does.
//!
//! `FragmentId` is local: allocated by the store, never sent to a server.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A room identifier (`!opaque:server`).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

/// A user identifier (`@localpart:server`).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

/// An event identifier (`$opaque`).
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

/// Error from [`RoomId::parse`] and friends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("{kind} id is empty")]
    Empty { kind: &'static str },
    #[error("{kind} id {value:?} must start with '{sigil}'")]
    MissingSigil {
        kind: &'static str,
        sigil: char,
        value: String,
    },
}

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_string_id {
    ($T:ident, $name:literal, $sigil:literal) => {
        impl $T {
            /// Sigil every well-formed id starts with.
            pub const SIGIL: char = $sigil;

            /// Wrap a string without validation.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Parse user-supplied text, checking the sigil.
            pub fn parse(value: &str) -> Result<Self, IdError> {
                let value = value.trim();
                if value.is_empty() {
                    return Err(IdError::Empty { kind: $name });
                }
                if !value.starts_with($sigil) {
                    return Err(IdError::MissingSigil {
                        kind: $name,
                        sigil: $sigil,
                        value: value.to_string(),
                    });
                }
                Ok(Self(value.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.0)
            }
        }

        impl From<&str> for $T {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $T {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $T {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

impl_string_id!(RoomId, "Room", '!');
impl_string_id!(UserId, "User", '@');
impl_string_id!(EventId, "Event", '$');

impl UserId {
    /// The part between the sigil and the server name, for compact display.
    pub fn localpart(&self) -> &str {
        let rest = self.0.strip_prefix('@').unwrap_or(&self.0);
        rest.split_once(':').map_or(rest, |(local, _)| local)
    }
}

/// Store-allocated identifier of a timeline fragment.
///
/// Numeric order carries no meaning; fragments are ordered by their links
/// (see [`crate::FragmentIdComparer`]).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FragmentId(pub u32);

impl FragmentId {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fragment({})", self.0)
    }
}
