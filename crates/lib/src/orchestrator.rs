//! Run orchestrator: turn the newest user message into one assistant reply.
//!
//! Workflow per invocation: create context → append user message → start run →
//! poll until terminal → read the newest assistant text. Every invocation owns its
//! own context and run; nothing is shared or cached between calls.

use crate::remote::{
    ContextId, ConversationClient, RemoteError, RemoteMessage, Role, RunId, RunStatus,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

/// Message shown to callers for every failure; the detailed cause only goes to the log.
pub const REPLY_FAILED_MESSAGE: &str = "Failed to generate assistant response.";

/// One message of the conversation history as the UI holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Successful orchestration result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Remote assistant profile every run is bound to.
    pub assistant_id: String,
    /// Delay between run status checks.
    pub poll_interval: Duration,
    /// Upper bound on time spent waiting for a pending run.
    pub max_wait: Duration,
}

impl OrchestratorConfig {
    pub fn new(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

/// Remote call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateContext,
    AppendMessage,
    StartRun,
    PollStatus,
    ListMessages,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::CreateContext => "create context",
            Step::AppendMessage => "append message",
            Step::StartRun => "start run",
            Step::PollStatus => "poll run status",
            Step::ListMessages => "list messages",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("no user message found in history")]
    NoUserMessage,
    #[error("remote call failed during {step}: {source}")]
    Remote {
        step: Step,
        #[source]
        source: RemoteError,
    },
    #[error("run ended with status: {0}")]
    RunNotCompleted(String),
    #[error("no valid text response found")]
    NoAssistantText,
    #[error("run still pending after {waited:?}")]
    Timeout { waited: Duration },
    #[error("reply generation cancelled")]
    Cancelled,
}

impl OrchestrationError {
    fn remote(step: Step) -> impl FnOnce(RemoteError) -> Self {
        move |source| OrchestrationError::Remote { step, source }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            OrchestrationError::NoUserMessage => FailureKind::InvalidRequest,
            OrchestrationError::Remote { .. } => FailureKind::Upstream,
            OrchestrationError::RunNotCompleted(_) | OrchestrationError::NoAssistantText => {
                FailureKind::NoReply
            }
            OrchestrationError::Timeout { .. } => FailureKind::Timeout,
            OrchestrationError::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// Coarse failure class exposed at the boundary; carries no remote-protocol detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    InvalidRequest,
    Upstream,
    NoReply,
    Timeout,
    Cancelled,
}

/// Opaque boundary failure returned by [`Orchestrator::generate_reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Failed to generate assistant response.")]
pub struct ReplyFailed {
    kind: FailureKind,
}

impl ReplyFailed {
    pub fn kind(&self) -> FailureKind {
        self.kind
    }
}

impl From<&OrchestrationError> for ReplyFailed {
    fn from(e: &OrchestrationError) -> Self {
        Self { kind: e.kind() }
    }
}

/// Newest user message in the history, ignoring anything after it.
pub fn last_user_message(history: &[ChatMessage]) -> Option<&ChatMessage> {
    history.iter().rev().find(|m| m.role == Role::User)
}

/// Newest assistant message's first text block. `messages` is newest first.
fn newest_assistant_text(messages: &[RemoteMessage]) -> Option<&str> {
    messages
        .iter()
        .find(|m| m.role == Role::Assistant)
        .and_then(RemoteMessage::first_text)
}

/// Scoped ownership of a remote context: released on every exit path.
///
/// `release` is the normal path. If the lease is dropped unreleased (the caller dropped the
/// orchestration future), the delete is spawned on the current runtime.
struct ContextLease<C: ConversationClient + ?Sized + 'static> {
    client: Arc<C>,
    id: ContextId,
    released: bool,
}

impl<C: ConversationClient + ?Sized + 'static> ContextLease<C> {
    fn new(client: Arc<C>, id: ContextId) -> Self {
        Self {
            client,
            id,
            released: false,
        }
    }

    fn id(&self) -> &ContextId {
        &self.id
    }

    async fn release(mut self) {
        self.released = true;
        delete_context(self.client.as_ref(), &self.id).await;
    }
}

impl<C: ConversationClient + ?Sized + 'static> Drop for ContextLease<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let id = self.id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let client = self.client.clone();
                handle.spawn(async move {
                    delete_context(client.as_ref(), &id).await;
                });
            }
            Err(_) => log::warn!("orchestrator: no runtime to release context {}", id),
        }
    }
}

async fn delete_context<C: ConversationClient + ?Sized>(client: &C, id: &ContextId) {
    match client.delete_context(id).await {
        Ok(()) => log::debug!("orchestrator: released context {}", id),
        Err(e) => log::warn!("orchestrator: releasing context {} failed: {}", id, e),
    }
}

/// Drives the remote create → submit → run → poll → extract workflow.
pub struct Orchestrator<C: ConversationClient + ?Sized + 'static> {
    client: Arc<C>,
    config: OrchestratorConfig,
}

impl<C: ConversationClient + ?Sized + 'static> Orchestrator<C> {
    pub fn new(client: Arc<C>, config: OrchestratorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Boundary entry point: every failure collapses into [`ReplyFailed`]; the cause is logged.
    pub async fn generate_reply(&self, history: &[ChatMessage]) -> Result<Reply, ReplyFailed> {
        self.generate_reply_cancellable(history, &CancellationToken::new())
            .await
    }

    pub async fn generate_reply_cancellable(
        &self,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<Reply, ReplyFailed> {
        self.produce_reply_cancellable(history, cancel)
            .await
            .map_err(|e| {
                log::error!("orchestrator: generate reply failed: {}", e);
                ReplyFailed::from(&e)
            })
    }

    pub async fn produce_reply(&self, history: &[ChatMessage]) -> Result<Reply, OrchestrationError> {
        self.produce_reply_cancellable(history, &CancellationToken::new())
            .await
    }

    /// Like [`produce_reply`](Self::produce_reply), but stops polling when `cancel` fires and
    /// asks the remote service to cancel the run.
    pub async fn produce_reply_cancellable(
        &self,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<Reply, OrchestrationError> {
        let message = last_user_message(history).ok_or(OrchestrationError::NoUserMessage)?;

        let context = self
            .client
            .create_context()
            .await
            .map_err(OrchestrationError::remote(Step::CreateContext))?;
        log::debug!("orchestrator: created context {}", context);
        let lease = ContextLease::new(self.client.clone(), context);

        let outcome = self.run_in_context(lease.id(), &message.content, cancel).await;
        lease.release().await;
        outcome
    }

    async fn run_in_context(
        &self,
        context: &ContextId,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<Reply, OrchestrationError> {
        self.client
            .append_message(context, Role::User, content)
            .await
            .map_err(OrchestrationError::remote(Step::AppendMessage))?;

        if cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }

        let run = self
            .client
            .start_run(context, &self.config.assistant_id)
            .await
            .map_err(OrchestrationError::remote(Step::StartRun))?;
        log::debug!(
            "orchestrator: started run {} ({}) with assistant {}",
            run.id,
            run.status,
            self.config.assistant_id
        );

        let status = self.wait_for_terminal(context, &run.id, cancel).await?;
        if status != RunStatus::Completed {
            return Err(OrchestrationError::RunNotCompleted(status.to_string()));
        }

        let messages = self
            .client
            .list_messages(context)
            .await
            .map_err(OrchestrationError::remote(Step::ListMessages))?;
        let text = newest_assistant_text(&messages).ok_or(OrchestrationError::NoAssistantText)?;
        Ok(Reply {
            text: text.to_string(),
        })
    }

    /// Poll the run until it leaves the pending class, the deadline passes, or `cancel` fires.
    /// The last wait is shortened to end at the deadline, where one final status check runs.
    async fn wait_for_terminal(
        &self,
        context: &ContextId,
        run: &RunId,
        cancel: &CancellationToken,
    ) -> Result<RunStatus, OrchestrationError> {
        let started = Instant::now();
        let deadline = started + self.config.max_wait;
        let mut status = self.fetch_status(context, run).await?;
        while status.is_pending() {
            let now = Instant::now();
            if now >= deadline {
                log::warn!(
                    "orchestrator: run {} still {} after {:?}, giving up",
                    run,
                    status,
                    started.elapsed()
                );
                self.cancel_run(context, run).await;
                return Err(OrchestrationError::Timeout {
                    waited: started.elapsed(),
                });
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::info!("orchestrator: run {} cancelled by caller", run);
                    self.cancel_run(context, run).await;
                    return Err(OrchestrationError::Cancelled);
                }
                _ = tokio::time::sleep(self.config.poll_interval.min(deadline - now)) => {}
            }
            status = self.fetch_status(context, run).await?;
        }
        log::debug!("orchestrator: run {} finished with status {}", run, status);
        Ok(status)
    }

    async fn fetch_status(
        &self,
        context: &ContextId,
        run: &RunId,
    ) -> Result<RunStatus, OrchestrationError> {
        self.client
            .get_run_status(context, run)
            .await
            .map_err(OrchestrationError::remote(Step::PollStatus))
    }

    async fn cancel_run(&self, context: &ContextId, run: &RunId) {
        if let Err(e) = self.client.cancel_run(context, run).await {
            log::warn!("orchestrator: cancelling run {} failed: {}", run, e);
        }
    }
}
