//! Versioned persistence of the chat state into a string-keyed blob.
//!
//! Blob layout:
//!
//! ```text
//! {
//!   "state": { "chats": [Conversation, ...], "activeChat": "<id>" | null },
//!   "version": 1
//! }
//! ```
//!
//! Version 0 is the unversioned layout written by the first client. It has the
//! same shape; conversations may lack an `icon`, which migration fills in from
//! the subject table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::subject;
use crate::types::Conversation;

pub const SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_STORAGE_KEY: &str = "educational-chats";

/// The persisted part of the store. The typing flag is never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub chats: Vec<Conversation>,
    #[serde(default)]
    pub active_chat: Option<String>,
}

#[derive(Serialize)]
struct BlobOut<'a> {
    state: &'a PersistedState,
    version: u32,
}

#[derive(Deserialize)]
struct BlobIn {
    state: PersistedState,
}

#[derive(Deserialize)]
struct VersionProbe {
    #[serde(default)]
    version: u32,
}

pub fn encode(state: &PersistedState) -> Result<String> {
    let blob = BlobOut {
        state,
        version: SCHEMA_VERSION,
    };
    Ok(serde_json::to_string(&blob)?)
}

pub fn decode(raw: &str) -> Result<PersistedState> {
    let VersionProbe { version } = serde_json::from_str(raw)?;
    if version > SCHEMA_VERSION {
        return Err(StoreError::UnsupportedVersion {
            found: version,
            supported: SCHEMA_VERSION,
        });
    }

    let BlobIn { mut state } = serde_json::from_str(raw)?;
    if version < 1 {
        migrate_v0(&mut state);
    }
    Ok(state)
}

fn migrate_v0(state: &mut PersistedState) {
    debug!(chats = state.chats.len(), "migrating persisted state from v0");
    for chat in &mut state.chats {
        if chat.icon.is_empty() {
            chat.icon = subject::resolve(&chat.subject).icon.to_string();
        }
    }
}

/// A string-keyed blob store.
pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process storage. Clones share the same map, so a second store opened
/// on a clone sees what the first one wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write then rename so a crash never leaves a half-written blob.
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
