//! Durable local conversation history.
//!
//! One JSON file holds the full confirmed message sequence. Writes go
//! through a temp file and an atomic rename so a crash mid-save never
//! leaves a truncated history behind.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::session::Message;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// On-disk shape of a persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredHistory {
    /// Schema version, bumped on incompatible layout changes.
    #[serde(default)]
    pub schema_version: u32,
    /// Full confirmed message sequence, oldest first.
    pub messages: Vec<Message>,
}

impl Default for StoredHistory {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            messages: Vec::new(),
        }
    }
}

impl StoredHistory {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            messages,
        }
    }
}

/// Durable storage seam for the conversation log.
pub trait HistoryStore: Send + Sync {
    /// Load the stored conversation. A missing file is an empty history,
    /// not an error.
    fn load(&self) -> Result<StoredHistory, ChatError>;

    /// Replace the stored conversation.
    fn save(&self, history: &StoredHistory) -> Result<(), ChatError>;
}

/// File-backed store writing pretty-printed JSON.
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoryStore for FileHistoryStore {
    fn load(&self) -> Result<StoredHistory, ChatError> {
        if !self.path.exists() {
            debug!("No stored history at {:?}", self.path);
            return Ok(StoredHistory::default());
        }

        let raw = fs::read(&self.path)
            .map_err(|e| ChatError::serialization(format!("Failed to read history: {}", e)))?;

        match serde_json::from_slice::<StoredHistory>(&raw) {
            Ok(history) => {
                if history.schema_version > SCHEMA_VERSION {
                    warn!(
                        "History schema {} is newer than supported {}; loading anyway",
                        history.schema_version, SCHEMA_VERSION
                    );
                }
                Ok(history)
            }
            // Early builds stored a bare message array.
            Err(parse_err) => match serde_json::from_slice::<Vec<Message>>(&raw) {
                Ok(messages) => {
                    info!("Migrating legacy history format ({} messages)", messages.len());
                    Ok(StoredHistory::new(messages))
                }
                Err(_) => Err(ChatError::serialization(format!(
                    "Failed to parse history: {}",
                    parse_err
                ))),
            },
        }
    }

    fn save(&self, history: &StoredHistory) -> Result<(), ChatError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ChatError::serialization(format!("Failed to create history dir: {}", e))
            })?;
        }

        let data = serde_json::to_vec_pretty(history)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &data)
            .map_err(|e| ChatError::serialization(format!("Failed to write history: {}", e)))?;

        if let Err(err) = fs::rename(&tmp, &self.path) {
            // On Windows rename does not replace an existing file.
            warn!("Atomic rename failed ({}), retrying with replace", err);
            let _ = fs::remove_file(&self.path);
            fs::rename(&tmp, &self.path).map_err(|e| {
                ChatError::serialization(format!("Failed to replace history: {}", e))
            })?;
        }

        debug!("History saved: {} messages", history.messages.len());
        Ok(())
    }
}
