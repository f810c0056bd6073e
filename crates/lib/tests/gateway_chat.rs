//! Integration tests: the gateway router in front of a mock assistants service.
//! Covers the login cookie, the chat entry point, session recording, and the analytics listing.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use lib::gate::{CredentialGate, CredentialPair};
use lib::gateway::{router, GatewayState};
use lib::orchestrator::{Orchestrator, OrchestratorConfig, REPLY_FAILED_MESSAGE};
use lib::recorder::{MemorySessionStore, SessionRecorder};
use lib::remote::{AssistantsClient, ConversationClient};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Upstream {
    threads: AtomicUsize,
    deleted: AtomicUsize,
    last_user_text: Mutex<String>,
}

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}", addr)
}

/// Mock assistants service: every run completes on the first check and replies with an echo.
/// A user message of "fail" makes its run end as `failed`.
fn mock_assistants(upstream: Arc<Upstream>) -> Router {
    Router::new()
        .route(
            "/threads",
            post(|State(u): State<Arc<Upstream>>| async move {
                let n = u.threads.fetch_add(1, Ordering::SeqCst) + 1;
                Json(json!({ "id": format!("thread_{}", n) }))
            }),
        )
        .route(
            "/threads/:thread/messages",
            post(
                |State(u): State<Arc<Upstream>>, Json(body): Json<Value>| async move {
                    let text = body["content"].as_str().unwrap_or_default().to_string();
                    *u.last_user_text.lock().unwrap() = text;
                    Json(json!({ "id": "msg_user" }))
                },
            )
            .get(|State(u): State<Arc<Upstream>>| async move {
                let text = u.last_user_text.lock().unwrap().clone();
                Json(json!({
                    "data": [
                        {
                            "id": "msg_reply",
                            "role": "assistant",
                            "content": [{ "type": "text", "text": { "value": format!("echo: {}", text) } }]
                        },
                        {
                            "id": "msg_user",
                            "role": "user",
                            "content": [{ "type": "text", "text": { "value": text } }]
                        }
                    ]
                }))
            }),
        )
        .route(
            "/threads/:thread/runs",
            post(|| async { Json(json!({ "id": "run_1", "status": "queued" })) }),
        )
        .route(
            "/threads/:thread/runs/:run",
            get(|State(u): State<Arc<Upstream>>| async move {
                let failed = u.last_user_text.lock().unwrap().as_str() == "fail";
                let status = if failed { "failed" } else { "completed" };
                Json(json!({ "id": "run_1", "status": status }))
            }),
        )
        .route(
            "/threads/:thread",
            delete(
                |State(u): State<Arc<Upstream>>, Path(thread): Path<String>| async move {
                    u.deleted.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "id": thread, "deleted": true }))
                },
            ),
        )
        .with_state(upstream)
}

struct Harness {
    base: String,
    upstream: Arc<Upstream>,
    client: reqwest::Client,
}

async fn start_gateway() -> Harness {
    let upstream = Arc::new(Upstream::default());
    let upstream_url = serve(mock_assistants(upstream.clone())).await;

    let remote: Arc<dyn ConversationClient> =
        Arc::new(AssistantsClient::new(Some(upstream_url), "sk-test"));
    let mut orchestrator_config = OrchestratorConfig::new("asst_test");
    orchestrator_config.poll_interval = Duration::from_millis(10);
    orchestrator_config.max_wait = Duration::from_secs(5);

    let state = GatewayState {
        port: 0,
        gate: Arc::new(CredentialGate::new(
            CredentialPair::new("user@example.com", "pw"),
            CredentialPair::new("admin@example.com", "apw"),
        )),
        orchestrator: Arc::new(Orchestrator::new(remote, orchestrator_config)),
        recorder: SessionRecorder::new(Arc::new(MemorySessionStore::new())),
    };
    let base = serve(router(state)).await;
    Harness {
        base,
        upstream,
        client: reqwest::Client::new(),
    }
}

const CHAT_COOKIE: &str = "isAuthenticated=true";
const ANALYTICS: &str = "analyticsAuth=true";

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, cookie: Option<&str>, body: Value) -> reqwest::Response {
        let mut req = self.client.post(self.url(path)).json(&body);
        if let Some(c) = cookie {
            req = req.header("cookie", c);
        }
        req.send().await.expect("send")
    }
}

#[tokio::test]
async fn login_sets_week_long_cookie() {
    let h = start_gateway().await;
    let res = h
        .post(
            "/login",
            None,
            json!({ "email": "user@example.com", "password": "pw" }),
        )
        .await;
    assert_eq!(res.status(), 200);
    let cookie = res
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("isAuthenticated=true"));
    assert!(cookie.contains("Max-Age=604800"));
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let h = start_gateway().await;
    let res = h
        .post(
            "/login",
            None,
            json!({ "email": "user@example.com", "password": "nope" }),
        )
        .await;
    assert_eq!(res.status(), 401);
    assert!(res.headers().get("set-cookie").is_none());
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "Invalid email or password");
}

#[tokio::test]
async fn chat_requires_cookie() {
    let h = start_gateway().await;
    let res = h
        .post(
            "/chat",
            None,
            json!({ "messages": [{ "role": "user", "content": "hi" }] }),
        )
        .await;
    assert_eq!(res.status(), 401);
    assert_eq!(h.upstream.threads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn chat_returns_reply_and_deletes_thread() {
    let h = start_gateway().await;
    let res = h
        .post(
            "/chat",
            Some(CHAT_COOKIE),
            json!({ "messages": [
                { "role": "user", "content": "first" },
                { "role": "assistant", "content": "earlier reply" },
                { "role": "user", "content": "hello" }
            ] }),
        )
        .await;
    assert_eq!(res.status(), 200);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["text"], "echo: hello");
    assert_eq!(h.upstream.threads.load(Ordering::SeqCst), 1);
    assert_eq!(h.upstream.deleted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chat_failure_is_opaque() {
    let h = start_gateway().await;
    let res = h
        .post(
            "/chat",
            Some(CHAT_COOKIE),
            json!({ "messages": [{ "role": "user", "content": "fail" }] }),
        )
        .await;
    assert_eq!(res.status(), 502);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": REPLY_FAILED_MESSAGE }));
    assert_eq!(h.upstream.deleted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn chat_without_user_message_is_bad_request() {
    let h = start_gateway().await;
    let res = h
        .post(
            "/chat",
            Some(CHAT_COOKIE),
            json!({ "messages": [{ "role": "assistant", "content": "hi" }] }),
        )
        .await;
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], REPLY_FAILED_MESSAGE);
    assert_eq!(h.upstream.threads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sessions_are_recorded_and_summarized() {
    let h = start_gateway().await;
    let res = h
        .post("/sessions", Some(CHAT_COOKIE), json!({ "mode": "text-only" }))
        .await;
    assert_eq!(res.status(), 201);
    let id = res.json::<Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let path = format!("/sessions/{}/messages", id);
    let res = h
        .post(&path, Some(CHAT_COOKIE), json!({ "role": "user", "content": "hello" }))
        .await;
    assert_eq!(res.status(), 204);
    let res = h
        .post(
            &path,
            Some(CHAT_COOKIE),
            json!({ "role": "assistant", "content": "echo: hello", "duration": 1500 }),
        )
        .await;
    assert_eq!(res.status(), 204);

    let res = h
        .client
        .get(h.url("/analytics/sessions"))
        .header("cookie", ANALYTICS)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let reports: Value = res.json().await.unwrap();
    let reports = reports.as_array().unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report["session"]["id"], id.as_str());
    assert_eq!(report["session"]["mode"], "text-only");
    let messages = report["session"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].get("duration").is_none());
    assert_eq!(messages[1]["duration"], 1500);
    assert_eq!(report["summary"]["messageCount"], 2);
    assert_eq!(report["summary"]["averageResponseMs"], 1500);
}

#[tokio::test]
async fn analytics_overview_totals_sessions_by_mode() {
    let h = start_gateway().await;
    for mode in ["text-only", "avatar", "text-only"] {
        let res = h
            .post("/sessions", Some(CHAT_COOKIE), json!({ "mode": mode }))
            .await;
        assert_eq!(res.status(), 201);
        let id = res.json::<Value>().await.unwrap()["id"]
            .as_str()
            .unwrap()
            .to_string();
        let res = h
            .post(
                &format!("/sessions/{}/messages", id),
                Some(CHAT_COOKIE),
                json!({ "role": "user", "content": "hello" }),
            )
            .await;
        assert_eq!(res.status(), 204);
    }

    let url = h.url("/analytics/overview");
    let res = h.client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = h.client.get(&url).header("cookie", ANALYTICS).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let overview: Value = res.json().await.unwrap();
    assert_eq!(
        overview,
        json!({
            "totalSessions": 3,
            "textOnlySessions": 2,
            "avatarSessions": 1,
            "totalMessages": 3
        })
    );
}

#[tokio::test]
async fn tracking_unknown_session_is_not_found() {
    let h = start_gateway().await;
    let res = h
        .post(
            "/sessions/missing/messages",
            Some(CHAT_COOKIE),
            json!({ "role": "user", "content": "hello" }),
        )
        .await;
    assert_eq!(res.status(), 404);
}

#[tokio::test]
async fn analytics_needs_its_own_cookie() {
    let h = start_gateway().await;
    let res = h
        .client
        .get(h.url("/analytics/sessions"))
        .header("cookie", CHAT_COOKIE)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let res = h
        .post(
            "/analytics/login",
            None,
            json!({ "email": "user@example.com", "password": "pw" }),
        )
        .await;
    assert_eq!(res.status(), 401);

    let res = h
        .post(
            "/analytics/login",
            None,
            json!({ "email": "admin@example.com", "password": "apw" }),
        )
        .await;
    assert_eq!(res.status(), 200);
    let cookie = res
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("analyticsAuth=true"));
}

#[tokio::test]
async fn logout_clears_cookie() {
    let h = start_gateway().await;
    let res = h.post("/logout", Some(CHAT_COOKIE), json!({})).await;
    assert_eq!(res.status(), 200);
    let cookie = res
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cookie.starts_with("isAuthenticated=;"));
    assert!(cookie.contains("Max-Age=0"));
}
