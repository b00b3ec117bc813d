//! Long-term user memory
//!
//! Short facts about the user, saved either locally or through the
//! `save_memory` tool during a live session. Most recent first, exact
//! duplicates are dropped, and the list is capped at 50 entries with the
//! oldest falling off. Persisted as JSON next to the settings file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard cap on stored facts; the oldest entry is dropped beyond this.
pub const MAX_MEMORIES: usize = 50;

const MEMORY_FILE_NAME: &str = "memories.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub fact: String,
    pub saved_at: DateTime<Utc>,
}

/// Persistent store of user facts.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Vec<MemoryEntry>,
    path: PathBuf,
}

impl MemoryStore {
    /// Default location under the user config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nia").join(MEMORY_FILE_NAME))
    }

    /// Load from `path`, starting empty if the file is missing or corrupt.
    pub fn load_from(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Vec<MemoryEntry>>(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("Memory: failed to parse {:?}: {}", path, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                log::warn!("Memory: failed to read {:?}: {}", path, e);
                Vec::new()
            }
        };

        Self { entries, path }
    }

    /// Save a fact at the front of the list.
    ///
    /// An exact duplicate of an existing entry is a no-op. Returns whether
    /// the list changed; persistence failures are logged, not surfaced, so
    /// a read-only disk never breaks a running conversation.
    pub fn save_fact(&mut self, fact: &str) -> bool {
        let fact = fact.trim();
        if fact.is_empty() {
            return false;
        }
        if self.entries.iter().any(|e| e.fact == fact) {
            log::debug!("Memory: duplicate fact ignored");
            return false;
        }

        self.entries.insert(
            0,
            MemoryEntry {
                fact: fact.to_string(),
                saved_at: Utc::now(),
            },
        );
        self.entries.truncate(MAX_MEMORIES);

        if let Err(e) = self.persist() {
            log::warn!("Memory: {}", e);
        }
        true
    }

    /// Drop every stored fact.
    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.persist() {
            log::warn!("Memory: {}", e);
        }
    }

    /// Facts, most recent first.
    pub fn facts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.fact.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<(), String> {
        write_json_atomic(&self.path, &self.entries)
    }
}

/// Write atomically: write to a temp file in the same directory, then rename.
/// This prevents a partial/corrupt file if the app crashes mid-write.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(value).map_err(|e| format!("Serialize {:?}: {}", path, e))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp file {:?}: {}", tmp_path, e))?;

    // On Unix, rename will atomically replace the destination. On Windows,
    // rename fails if the destination exists, so we remove it first.
    if cfg!(windows) && path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(format!("Remove existing file {:?}: {}", path, e));
            }
        }
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| format!("Rename {:?} to {:?}: {}", tmp_path, path, e))
}
