//! Assistants API client (threads, messages, runs).
//!
//! Targets an OpenAI-compatible Assistants v2 endpoint (https://api.openai.com/v1 by default).
//! Every request carries the bearer key and the `OpenAI-Beta: assistants=v2` header.

use crate::remote::{
    ContextId, ConversationClient, MessageId, RemoteError, RemoteMessage, Role, RunHandle, RunId,
    RunStatus,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const BETA_HEADER: &str = "assistants=v2";

/// HTTP client for the remote assistants service.
#[derive(Clone)]
pub struct AssistantsClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AssistantsClient {
    pub fn new(base_url: Option<String>, api_key: impl Into<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, url)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", BETA_HEADER)
    }

    /// Send and decode a JSON body; non-2xx responses become `RemoteError::Api` with status and body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, RemoteError> {
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(RemoteError::Api(format!("{} {}", status, body)));
        }
        let text = res.text().await?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<RemoteMessage>,
}

#[async_trait]
impl ConversationClient for AssistantsClient {
    /// POST /threads
    async fn create_context(&self) -> Result<ContextId, RemoteError> {
        let req = self
            .request(reqwest::Method::POST, "/threads")
            .json(&serde_json::json!({}));
        let thread: IdObject = self.send_json(req).await?;
        Ok(ContextId(thread.id))
    }

    /// POST /threads/{thread_id}/messages
    async fn append_message(
        &self,
        context: &ContextId,
        role: Role,
        content: &str,
    ) -> Result<MessageId, RemoteError> {
        let path = format!("/threads/{}/messages", context);
        let req = self
            .request(reqwest::Method::POST, &path)
            .json(&CreateMessageRequest {
                role: role.as_str(),
                content,
            });
        let msg: IdObject = self.send_json(req).await?;
        Ok(MessageId(msg.id))
    }

    /// POST /threads/{thread_id}/runs
    async fn start_run(
        &self,
        context: &ContextId,
        assistant_id: &str,
    ) -> Result<RunHandle, RemoteError> {
        let path = format!("/threads/{}/runs", context);
        let req = self
            .request(reqwest::Method::POST, &path)
            .json(&CreateRunRequest { assistant_id });
        let run: RunObject = self.send_json(req).await?;
        Ok(RunHandle {
            id: RunId(run.id),
            status: run.status,
        })
    }

    /// GET /threads/{thread_id}/runs/{run_id}
    async fn get_run_status(
        &self,
        context: &ContextId,
        run: &RunId,
    ) -> Result<RunStatus, RemoteError> {
        let path = format!("/threads/{}/runs/{}", context, run);
        let run: RunObject = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(run.status)
    }

    /// GET /threads/{thread_id}/messages?order=desc
    async fn list_messages(&self, context: &ContextId) -> Result<Vec<RemoteMessage>, RemoteError> {
        let path = format!("/threads/{}/messages?order=desc", context);
        let list: MessageList = self
            .send_json(self.request(reqwest::Method::GET, &path))
            .await?;
        Ok(list.data)
    }

    /// POST /threads/{thread_id}/runs/{run_id}/cancel
    async fn cancel_run(&self, context: &ContextId, run: &RunId) -> Result<(), RemoteError> {
        let path = format!("/threads/{}/runs/{}/cancel", context, run);
        let _: serde_json::Value = self
            .send_json(self.request(reqwest::Method::POST, &path))
            .await?;
        Ok(())
    }

    /// DELETE /threads/{thread_id}
    async fn delete_context(&self, context: &ContextId) -> Result<(), RemoteError> {
        let path = format!("/threads/{}", context);
        let _: serde_json::Value = self
            .send_json(self.request(reqwest::Method::DELETE, &path))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local_addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    fn has_expected_headers(headers: &HeaderMap) -> bool {
        headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bearer sk-test")
            && headers.get("openai-beta").and_then(|v| v.to_str().ok()) == Some(BETA_HEADER)
    }

    #[tokio::test]
    async fn thread_run_and_messages_decode() {
        let app = Router::new()
            .route(
                "/threads",
                post(|headers: HeaderMap| async move {
                    if !has_expected_headers(&headers) {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    Ok(Json(json!({ "id": "thread_1", "object": "thread" })))
                }),
            )
            .route(
                "/threads/:thread/runs",
                post(|Path(thread): Path<String>, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(thread, "thread_1");
                    assert_eq!(body["assistant_id"], "asst_1");
                    Json(json!({ "id": "run_1", "status": "queued" }))
                }),
            )
            .route(
                "/threads/:thread/runs/:run",
                get(|| async { Json(json!({ "id": "run_1", "status": "in_progress" })) }),
            )
            .route(
                "/threads/:thread/messages",
                get(|| async {
                    Json(json!({
                        "object": "list",
                        "data": [
                            { "id": "m2", "role": "assistant", "content": [
                                { "type": "text", "text": { "value": "hi there", "annotations": [] } }
                            ]},
                            { "id": "m1", "role": "user", "content": [
                                { "type": "text", "text": { "value": "hello" } }
                            ]}
                        ]
                    }))
                }),
            );
        let base = spawn(app).await;
        let client = AssistantsClient::new(Some(format!("{}/", base)), "sk-test");

        let ctx = client.create_context().await.unwrap();
        assert_eq!(ctx, ContextId("thread_1".to_string()));
        let run = client.start_run(&ctx, "asst_1").await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        let status = client.get_run_status(&ctx, &run.id).await.unwrap();
        assert_eq!(status, RunStatus::InProgress);
        let messages = client.list_messages(&ctx).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].first_text(), Some("hi there"));
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let app = Router::new().route(
            "/threads",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = spawn(app).await;
        let client = AssistantsClient::new(Some(base), "sk-test");
        match client.create_context().await {
            Err(RemoteError::Api(msg)) => {
                assert!(msg.contains("429"), "{}", msg);
                assert!(msg.contains("slow down"), "{}", msg);
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }
}
