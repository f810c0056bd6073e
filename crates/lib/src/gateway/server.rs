//! Gateway HTTP server (single port).

use crate::config::{self, Config};
use crate::gate::cookie::{self, ANALYTICS_COOKIE, AUTH_COOKIE, AUTH_COOKIE_MAX_AGE_SECS};
use crate::gate::CredentialGate;
use crate::gateway::protocol::{
    ChatParams, ErrorBody, LoginParams, SessionReport, StartSessionParams, StartSessionResponse,
};
use crate::init;
use crate::orchestrator::{FailureKind, Orchestrator, REPLY_FAILED_MESSAGE};
use crate::recorder::{
    AnalyticsOverview, NewMessage, RecorderError, SessionId, SessionRecorder, SessionSummary,
};
use crate::remote::{AssistantsClient, ConversationClient};
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Port reported by the health endpoint.
    pub port: u16,
    pub gate: Arc<CredentialGate>,
    pub orchestrator: Arc<Orchestrator<dyn ConversationClient>>,
    pub recorder: SessionRecorder,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

fn unauthorized() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "unauthorized")
}

fn recorder_error(e: RecorderError) -> Response {
    match e {
        RecorderError::NotFound(id) => {
            error_response(StatusCode::NOT_FOUND, format!("session not found: {}", id))
        }
        other => {
            log::error!("gateway: recorder failed: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "session store failed")
        }
    }
}

/// Build the router over the given state. Used by [`run_gateway`] and tests.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/chat", post(chat))
        .route("/sessions", post(start_session))
        .route("/sessions/:id/messages", post(track_message))
        .route("/analytics/login", post(analytics_login))
        .route("/analytics/logout", post(analytics_logout))
        .route("/analytics/sessions", get(analytics_sessions))
        .route("/analytics/overview", get(analytics_overview))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Requires an API key and assistant id. When bind is not loopback, gate credentials must be configured.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config, config_path: PathBuf) -> Result<()> {
    let bind = config.gateway.bind.trim().to_string();
    let gate = CredentialGate::from_config(&config.gate);
    if !gate.is_configured() {
        if !config::is_loopback_bind(&bind) {
            anyhow::bail!(
                "refusing to bind gateway to {} without login credentials (set gate.identifier and gate.secret or PARLEY_GATE_IDENTIFIER/PARLEY_GATE_SECRET)",
                bind
            );
        }
        log::warn!("gateway: no login credentials configured; every login will be rejected");
    }

    let api_key = config::resolve_api_key(&config)
        .context("no API key configured (set assistant.apiKey or OPENAI_API_KEY)")?;
    let orchestrator_config = config::orchestrator_config(&config)?;
    let client: Arc<dyn ConversationClient> = Arc::new(AssistantsClient::new(
        config::resolve_base_url(&config),
        api_key,
    ));
    log::info!(
        "gateway: assistant {} (poll every {:?}, give up after {:?})",
        orchestrator_config.assistant_id,
        orchestrator_config.poll_interval,
        orchestrator_config.max_wait
    );

    let sessions_dir = config::resolve_sessions_dir(&config, &config_path);
    let store = init::open_session_store(&sessions_dir).await?;
    log::info!("gateway: recording sessions to {}", sessions_dir.display());

    let state = GatewayState {
        port: config.gateway.port,
        gate: Arc::new(gate),
        orchestrator: Arc::new(Orchestrator::new(client, orchestrator_config)),
        recorder: SessionRecorder::new(Arc::new(store)),
    };
    let app = router(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
    }))
}

/// POST /login: sets the `isAuthenticated` cookie (7 days) on a credential match.
async fn login(State(state): State<GatewayState>, Json(params): Json<LoginParams>) -> Response {
    if !state.gate.check_credentials(&params.email, &params.password) {
        log::info!("gateway: login rejected");
        return error_response(StatusCode::UNAUTHORIZED, "Invalid email or password");
    }
    let mut headers = HeaderMap::new();
    cookie::append(
        &mut headers,
        cookie::set_flag(AUTH_COOKIE, Some(AUTH_COOKIE_MAX_AGE_SECS)),
    );
    (headers, Json(json!({ "ok": true }))).into_response()
}

/// POST /logout: clears the `isAuthenticated` cookie.
async fn logout() -> Response {
    let mut headers = HeaderMap::new();
    cookie::append(&mut headers, cookie::clear_flag(AUTH_COOKIE));
    (headers, Json(json!({ "ok": true }))).into_response()
}

/// POST /chat: run the orchestrator over the submitted history.
/// Every failure returns the same message; only the status separates a bad request from an upstream failure.
async fn chat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(params): Json<ChatParams>,
) -> Response {
    if !cookie::has_flag(&headers, AUTH_COOKIE) {
        return unauthorized();
    }
    match state.orchestrator.generate_reply(&params.messages).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => {
            let status = match e.kind() {
                FailureKind::InvalidRequest => StatusCode::BAD_REQUEST,
                FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            error_response(status, REPLY_FAILED_MESSAGE)
        }
    }
}

/// POST /sessions: start a recorded session.
async fn start_session(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(params): Json<StartSessionParams>,
) -> Response {
    if !cookie::has_flag(&headers, AUTH_COOKIE) {
        return unauthorized();
    }
    match state.recorder.start_session(params.mode).await {
        Ok(id) => (StatusCode::CREATED, Json(StartSessionResponse { id })).into_response(),
        Err(e) => recorder_error(e),
    }
}

/// POST /sessions/:id/messages: append one message to a recorded session.
async fn track_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(message): Json<NewMessage>,
) -> Response {
    if !cookie::has_flag(&headers, AUTH_COOKIE) {
        return unauthorized();
    }
    match state.recorder.track_message(&SessionId(id), message).await {
        Ok(_) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => recorder_error(e),
    }
}

/// POST /analytics/login: sets the `analyticsAuth` cookie on a credential match.
async fn analytics_login(
    State(state): State<GatewayState>,
    Json(params): Json<LoginParams>,
) -> Response {
    if !state
        .gate
        .check_analytics_credentials(&params.email, &params.password)
    {
        log::info!("gateway: analytics login rejected");
        return error_response(StatusCode::UNAUTHORIZED, "Invalid email or password");
    }
    let mut headers = HeaderMap::new();
    cookie::append(&mut headers, cookie::set_flag(ANALYTICS_COOKIE, None));
    (headers, Json(json!({ "ok": true }))).into_response()
}

/// POST /analytics/logout: clears the `analyticsAuth` cookie.
async fn analytics_logout() -> Response {
    let mut headers = HeaderMap::new();
    cookie::append(&mut headers, cookie::clear_flag(ANALYTICS_COOKIE));
    (headers, Json(json!({ "ok": true }))).into_response()
}

/// GET /analytics/sessions: every recorded session with its summary, oldest first.
async fn analytics_sessions(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    if !cookie::has_flag(&headers, ANALYTICS_COOKIE) {
        return unauthorized();
    }
    match state.recorder.list_sessions().await {
        Ok(sessions) => {
            let reports: Vec<SessionReport> = sessions
                .into_iter()
                .map(|session| SessionReport {
                    summary: SessionSummary::of(&session),
                    session,
                })
                .collect();
            Json(reports).into_response()
        }
        Err(e) => recorder_error(e),
    }
}

/// GET /analytics/overview: session counts by mode and the total message count.
async fn analytics_overview(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    if !cookie::has_flag(&headers, ANALYTICS_COOKIE) {
        return unauthorized();
    }
    match state.recorder.list_sessions().await {
        Ok(sessions) => Json(AnalyticsOverview::of(&sessions)).into_response(),
        Err(e) => recorder_error(e),
    }
}
