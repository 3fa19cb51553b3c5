//! Weft configuration, loaded from RON.
//!
//! ```ron
//! (
//!     timeline: (initial_load: 50, fill_amount: 30),
//!     storage: (path: Some("/home/me/.local/share/weft/weft.db")),
//! )
//! ```
//!
//! Every field is optional; missing ones take their defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use weft_store::StorageConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
    pub timeline: TimelineConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Entries read from the end of the timeline when it opens.
    pub initial_load: usize,
    /// Events requested per gap fill.
    pub fill_amount: usize,
    /// Buffered room change notifications per subscriber.
    pub event_capacity: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            initial_load: 50,
            fill_amount: 30,
            event_capacity: 64,
        }
    }
}

impl WeftConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    pub fn with_initial_load(mut self, amount: usize) -> Self {
        self.timeline.initial_load = amount;
        self
    }

    pub fn with_fill_amount(mut self, amount: usize) -> Self {
        self.timeline.fill_amount = amount;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.timeline.event_capacity = capacity.max(1);
        self
    }

    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage = self.storage.with_path(path);
        self
    }
}
