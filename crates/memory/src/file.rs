//! File-backed memory port (SPEC_FULL §4.6 supplement (b), §6).
//!
//! Grounded in the teacher's `SessionStore`, which keeps the same
//! read-through-at-startup, write-through-cache shape but persists via a
//! bare `std::fs::write` — a crash mid-write truncates the committed file.
//! This version writes to a `NamedTempFile` in the same directory and
//! renames it over the committed path, so the file on disk is always
//! either the previous complete snapshot or the new one, never a partial
//! write. `persist()` snapshots and rewrites the whole shared file, so
//! every writer — regardless of conversation id — is serialized through a
//! single file-wide lock around mutate+persist; otherwise two writers on
//! different conversations could race their snapshot/rename pairs and the
//! later rename would silently drop the other's update.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use agentcore_domain::message::Message;

use crate::error::{MemoryError, Result};
use crate::port::MemoryPort;

pub struct FileMemoryPort {
    path: PathBuf,
    conversations: Mutex<HashMap<String, Vec<Message>>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl FileMemoryPort {
    /// Load `path` if it exists, or start empty. The parent directory must
    /// already exist; atomic rename requires the temp file and the target
    /// to share a filesystem.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conversations = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        Ok(Self { path, conversations: Mutex::new(conversations), write_lock: tokio::sync::Mutex::new(()) })
    }

    fn persist(&self) -> Result<()> {
        let snapshot = self.conversations.lock().clone();
        let json = serde_json::to_string_pretty(&snapshot)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| MemoryError::Other(format!("persisting memory file: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl MemoryPort for FileMemoryPort {
    async fn append(&self, conversation_id: &str, messages: &[Message]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        self.conversations
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .extend_from_slice(messages);

        self.persist()
    }

    async fn get(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self.conversations.lock().get(conversation_id).cloned().unwrap_or_default())
    }

    async fn clear(&self, conversation_id: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        self.conversations.lock().remove(conversation_id);
        self.persist()
    }
}
