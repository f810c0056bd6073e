//! Remote conversation service: the thread/run capability the orchestrator drives.
//!
//! `ConversationClient` is the seam; `AssistantsClient` talks to an
//! OpenAI-compatible Assistants v2 API over HTTP.

mod assistants;
mod types;

pub use assistants::AssistantsClient;
pub use types::{
    ContentBlock, ContextId, MessageId, RemoteMessage, RemoteText, Role, RunHandle, RunId,
    RunStatus,
};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("remote api error: {0}")]
    Api(String),
    #[error("remote response could not be decoded: {0}")]
    Decode(String),
}

/// Operations of the remote conversation service.
///
/// Every call is independent; implementations hold no per-conversation state.
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Create a fresh conversation context (thread).
    async fn create_context(&self) -> Result<ContextId, RemoteError>;

    /// Append a message to the context; returns the remote message id.
    async fn append_message(
        &self,
        context: &ContextId,
        role: Role,
        content: &str,
    ) -> Result<MessageId, RemoteError>;

    /// Start a run of the given assistant against the context.
    async fn start_run(
        &self,
        context: &ContextId,
        assistant_id: &str,
    ) -> Result<RunHandle, RemoteError>;

    /// Current status of a run.
    async fn get_run_status(
        &self,
        context: &ContextId,
        run: &RunId,
    ) -> Result<RunStatus, RemoteError>;

    /// Messages in the context, newest first.
    async fn list_messages(&self, context: &ContextId) -> Result<Vec<RemoteMessage>, RemoteError>;

    /// Ask the service to stop a run.
    async fn cancel_run(&self, context: &ContextId, run: &RunId) -> Result<(), RemoteError>;

    /// Delete a context and everything in it.
    async fn delete_context(&self, context: &ContextId) -> Result<(), RemoteError>;
}
