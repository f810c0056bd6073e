//! Session recorder: one document per chat session with its running message list.
//!
//! The UI calls the recorder after each orchestrator call; the orchestrator never does.
//! Optional fields with no value are omitted from persisted documents, never written as null.

mod analytics;
mod store;

pub use analytics::{AnalyticsOverview, SessionSummary};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};

use crate::remote::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique session identifier (UUID string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    TextOnly,
    Avatar,
}

/// A message as persisted in a session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Assistant response time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

/// Message handed to [`SessionRecorder::track_message`]; the recorder adds the timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    /// Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub duration: Option<u64>,
}

impl NewMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration = Some(duration_ms);
        self
    }
}

/// A session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub mode: SessionMode,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<RecordedMessage>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("session not found: {0}")]
    NotFound(SessionId),
    #[error("session store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session document invalid: {0}")]
    Serde(#[from] serde_json::Error),
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Starts sessions and appends messages to them in a [`SessionStore`].
#[derive(Clone)]
pub struct SessionRecorder {
    store: Arc<dyn SessionStore>,
    clock: Clock,
}

impl SessionRecorder {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the wall clock (tests).
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Create a new session document; start and end time are both "now".
    pub async fn start_session(&self, mode: SessionMode) -> Result<SessionId, RecorderError> {
        let now = (self.clock)();
        let record = SessionRecord {
            id: SessionId(uuid::Uuid::new_v4().to_string()),
            mode,
            start_time: now,
            end_time: now,
            messages: Vec::new(),
        };
        let id = record.id.clone();
        self.store.insert(record).await?;
        log::info!("recorder: started {:?} session {}", mode, id);
        Ok(id)
    }

    /// Stamp the message with the capture time, append it, and move the session's end time.
    pub async fn track_message(
        &self,
        session_id: &SessionId,
        message: NewMessage,
    ) -> Result<RecordedMessage, RecorderError> {
        let now = (self.clock)();
        let recorded = RecordedMessage {
            id: message
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            role: message.role,
            content: message.content,
            timestamp: now,
            duration: message.duration,
        };
        self.store
            .append_message(session_id, recorded.clone(), now)
            .await?;
        log::debug!(
            "recorder: session {} tracked {} message {}",
            session_id,
            recorded.role,
            recorded.id
        );
        Ok(recorded)
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<Option<SessionRecord>, RecorderError> {
        self.store.get(id).await
    }

    /// All sessions, oldest first.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>, RecorderError> {
        let mut sessions = self.store.list().await?;
        sessions.sort_by_key(|s| s.start_time);
        Ok(sessions)
    }
}
