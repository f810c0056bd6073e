//! Gateway HTTP request/response bodies.

use crate::orchestrator::ChatMessage;
use crate::recorder::{SessionId, SessionMode, SessionRecord, SessionSummary};
use serde::{Deserialize, Serialize};

/// Body of `POST /login` and `POST /analytics/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginParams {
    pub email: String,
    pub password: String,
}

/// Body of `POST /chat`: the full message history as the UI holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParams {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionParams {
    pub mode: SessionMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub id: SessionId,
}

/// One row of `GET /analytics/sessions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    pub session: SessionRecord,
    pub summary: SessionSummary,
}

/// Error body: `{ "error": "..." }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
