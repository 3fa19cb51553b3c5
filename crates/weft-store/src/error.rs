//! Storage error types.

use std::str::FromStr;

use strum::EnumString;
use thiserror::Error;

use crate::key::KeyDecodeError;

/// The store operation that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StoreOp {
    Get,
    OpenCursor,
    OpenKeyCursor,
    Advance,
    Seek,
    Put,
    Add,
    Delete,
    Open,
}

impl StoreOp {
    /// Parse from string, returning None for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Get => "get",
            StoreOp::OpenCursor => "open_cursor",
            StoreOp::OpenKeyCursor => "open_key_cursor",
            StoreOp::Advance => "advance",
            StoreOp::Seek => "seek",
            StoreOp::Put => "put",
            StoreOp::Add => "add",
            StoreOp::Delete => "delete",
            StoreOp::Open => "open",
        }
    }
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Underlying cause of a failed operation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("value codec: {0}")]
    Json(#[from] serde_json::Error),

    #[error("key codec: {0}")]
    Key(#[from] KeyDecodeError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    /// A backend call failed; `op` names which one.
    #[error("{store}: {op} failed: {source}")]
    Operation {
        store: String,
        op: StoreOp,
        #[source]
        source: BackendError,
    },

    /// `add` found the key already present.
    #[error("{store}: key already exists: {key}")]
    KeyExists { store: String, key: String },

    /// Stored data contradicts itself (e.g. an index entry with no record).
    #[error("{store}: inconsistent data: {detail}")]
    Inconsistent { store: String, detail: String },
}

impl StorageError {
    /// Wrap a backend failure with the operation that produced it.
    pub fn operation(store: impl Into<String>, op: StoreOp, source: impl Into<BackendError>) -> Self {
        Self::Operation {
            store: store.into(),
            op,
            source: source.into(),
        }
    }

    pub fn key_exists(store: impl Into<String>, key: impl std::fmt::Debug) -> Self {
        Self::KeyExists {
            store: store.into(),
            key: format!("{key:?}"),
        }
    }

    pub fn inconsistent(store: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Inconsistent {
            store: store.into(),
            detail: detail.into(),
        }
    }

    /// The failed operation, if this wraps a backend error.
    pub fn op(&self) -> Option<StoreOp> {
        match self {
            StorageError::Operation { op, .. } => Some(*op),
            StorageError::KeyExists { .. } => Some(StoreOp::Add),
            StorageError::Inconsistent { .. } => None,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
