//! Session document stores: in-memory and one-JSON-file-per-session.

use crate::recorder::{RecordedMessage, RecorderError, SessionId, SessionRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Document-style persistence keyed by session id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, record: SessionRecord) -> Result<(), RecorderError>;

    /// Append one message and set the session's end time; `NotFound` if the session is unknown.
    async fn append_message(
        &self,
        id: &SessionId,
        message: RecordedMessage,
        end_time: DateTime<Utc>,
    ) -> Result<(), RecorderError>;

    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, RecorderError>;

    async fn list(&self) -> Result<Vec<SessionRecord>, RecorderError>;
}

/// In-memory store (tests and ephemeral runs).
pub struct MemorySessionStore {
    inner: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, record: SessionRecord) -> Result<(), RecorderError> {
        self.inner.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn append_message(
        &self,
        id: &SessionId,
        message: RecordedMessage,
        end_time: DateTime<Utc>,
    ) -> Result<(), RecorderError> {
        let mut g = self.inner.write().await;
        let session = g
            .get_mut(id)
            .ok_or_else(|| RecorderError::NotFound(id.clone()))?;
        session.messages.push(message);
        session.end_time = end_time;
        Ok(())
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, RecorderError> {
        Ok(self.inner.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, RecorderError> {
        Ok(self.inner.read().await.values().cloned().collect())
    }
}

/// Stores each session as `<dir>/<id>.json`. Writes go to a temp file and are renamed into place.
pub struct FileSessionStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSessionStore {
    /// Open (and create if needed) the session directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Session ids become file names, so only accept plain identifier characters.
    fn path_for(&self, id: &SessionId) -> Option<PathBuf> {
        let valid = !id.0.is_empty()
            && id
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| self.dir.join(format!("{}.json", id.0)))
    }

    async fn read(&self, path: &Path) -> Result<Option<SessionRecord>, RecorderError> {
        match tokio::fs::read_to_string(path).await {
            Ok(s) => Ok(Some(serde_json::from_str(&s)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, record: &SessionRecord) -> Result<(), RecorderError> {
        let json = serde_json::to_string_pretty(record)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn insert(&self, record: SessionRecord) -> Result<(), RecorderError> {
        let path = self
            .path_for(&record.id)
            .ok_or_else(|| RecorderError::NotFound(record.id.clone()))?;
        let _guard = self.write_lock.lock().await;
        self.write(&path, &record).await
    }

    async fn append_message(
        &self,
        id: &SessionId,
        message: RecordedMessage,
        end_time: DateTime<Utc>,
    ) -> Result<(), RecorderError> {
        let path = self
            .path_for(id)
            .ok_or_else(|| RecorderError::NotFound(id.clone()))?;
        let _guard = self.write_lock.lock().await;
        let mut record = self
            .read(&path)
            .await?
            .ok_or_else(|| RecorderError::NotFound(id.clone()))?;
        record.messages.push(message);
        record.end_time = end_time;
        self.write(&path, &record).await
    }

    async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, RecorderError> {
        match self.path_for(id) {
            Some(path) => self.read(&path).await,
            None => Ok(None),
        }
    }

    async fn list(&self) -> Result<Vec<SessionRecord>, RecorderError> {
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path).await {
                Ok(Some(record)) => out.push(record),
                Ok(None) => {}
                Err(e) => log::warn!("recorder: skipping {}: {}", path.display(), e),
            }
        }
        Ok(out)
    }
}
