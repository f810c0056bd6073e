//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parley/config.json`) and environment.
//! Secrets (API key, gate credentials) may come from env so they stay out of the file.

use crate::gate::{CredentialPair, IdleConfig};
use crate::orchestrator::{OrchestratorConfig, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Remote assistant service and polling settings.
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Login credentials and inactivity timeout.
    #[serde(default)]
    pub gate: GateConfig,

    /// Where session documents are stored.
    #[serde(default)]
    pub recorder: RecorderConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 15151).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    15151
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Remote assistants API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantConfig {
    /// API base URL (default https://api.openai.com/v1). Overridden by OPENAI_BASE_URL env.
    pub base_url: Option<String>,

    /// API key. Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,

    /// Assistant every run is bound to. Overridden by OPENAI_ASSISTANT_ID env.
    pub assistant_id: Option<String>,

    /// Delay between run status checks (default 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Give up on a pending run after this long (default 120000).
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

fn default_max_wait_ms() -> u64 {
    DEFAULT_MAX_WAIT.as_millis() as u64
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            assistant_id: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

/// Gate credentials and idle timer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateConfig {
    /// Chat login identifier (email). Overridden by PARLEY_GATE_IDENTIFIER env.
    pub identifier: Option<String>,

    /// Chat login secret. Overridden by PARLEY_GATE_SECRET env.
    pub secret: Option<String>,

    /// Analytics login identifier. Overridden by PARLEY_ANALYTICS_IDENTIFIER env.
    pub analytics_identifier: Option<String>,

    /// Analytics login secret. Overridden by PARLEY_ANALYTICS_SECRET env.
    pub analytics_secret: Option<String>,

    /// Inactivity before the warning is shown (default 60).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Countdown shown before forced logout (default 10). 0 logs out as soon as the idle period ends.
    #[serde(default = "default_warning_countdown_secs")]
    pub warning_countdown_secs: u64,

    /// Whether activity during the warning restarts the timer (default false: only an explicit confirmation does).
    #[serde(default)]
    pub reset_while_warning: bool,
}

fn default_idle_timeout_secs() -> u64 {
    60
}

fn default_warning_countdown_secs() -> u64 {
    10
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            secret: None,
            analytics_identifier: None,
            analytics_secret: None,
            idle_timeout_secs: default_idle_timeout_secs(),
            warning_countdown_secs: default_warning_countdown_secs(),
            reset_while_warning: false,
        }
    }
}

/// Session document storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderConfig {
    /// Directory for session JSON documents. Relative paths resolve against the config file's parent. Default: `sessions` next to the config file.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// Trimmed non-empty env var.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env var wins over the config value; blank values count as unset.
fn resolve(env: &str, configured: Option<&String>) -> Option<String> {
    env_value(env).or_else(|| {
        configured
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the API key: env OPENAI_API_KEY overrides config.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    resolve("OPENAI_API_KEY", config.assistant.api_key.as_ref())
}

/// Resolve the assistant id: env OPENAI_ASSISTANT_ID overrides config.
pub fn resolve_assistant_id(config: &Config) -> Option<String> {
    resolve("OPENAI_ASSISTANT_ID", config.assistant.assistant_id.as_ref())
}

/// Resolve the API base URL: env OPENAI_BASE_URL overrides config. None means the client default.
pub fn resolve_base_url(config: &Config) -> Option<String> {
    resolve("OPENAI_BASE_URL", config.assistant.base_url.as_ref())
}

/// Resolve chat and analytics credential pairs (env overrides config). Unset pairs never match.
pub fn resolve_gate_credentials(gate: &GateConfig) -> (CredentialPair, CredentialPair) {
    let chat = CredentialPair::new(
        resolve("PARLEY_GATE_IDENTIFIER", gate.identifier.as_ref()).unwrap_or_default(),
        resolve("PARLEY_GATE_SECRET", gate.secret.as_ref()).unwrap_or_default(),
    );
    let analytics = CredentialPair::new(
        resolve("PARLEY_ANALYTICS_IDENTIFIER", gate.analytics_identifier.as_ref())
            .unwrap_or_default(),
        resolve("PARLEY_ANALYTICS_SECRET", gate.analytics_secret.as_ref()).unwrap_or_default(),
    );
    (chat, analytics)
}

/// Orchestrator settings; fails when no assistant id is configured.
pub fn orchestrator_config(config: &Config) -> Result<OrchestratorConfig> {
    let assistant_id = resolve_assistant_id(config).context(
        "no assistant configured (set assistant.assistantId or OPENAI_ASSISTANT_ID)",
    )?;
    if config.assistant.poll_interval_ms == 0 {
        anyhow::bail!("assistant.pollIntervalMs must be greater than 0");
    }
    if config.assistant.max_wait_ms == 0 {
        anyhow::bail!("assistant.maxWaitMs must be greater than 0");
    }
    Ok(OrchestratorConfig {
        assistant_id,
        poll_interval: Duration::from_millis(config.assistant.poll_interval_ms),
        max_wait: Duration::from_millis(config.assistant.max_wait_ms),
    })
}

/// Idle timer settings; fails on a zero idle timeout.
pub fn idle_config(gate: &GateConfig) -> Result<IdleConfig> {
    if gate.idle_timeout_secs == 0 {
        anyhow::bail!("gate.idleTimeoutSecs must be greater than 0");
    }
    Ok(IdleConfig {
        idle_timeout: Duration::from_secs(gate.idle_timeout_secs),
        warning_countdown_secs: gate.warning_countdown_secs,
        reset_while_warning: gate.reset_while_warning,
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLEY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".parley").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or default path). Missing file => default config.
/// Returns the config and the path that was used (for resolving the sessions directory).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Resolve the sessions directory: `recorder.directory` if set (relative to the config file's parent), otherwise `sessions` next to the config file.
pub fn resolve_sessions_dir(config: &Config, config_path: &Path) -> PathBuf {
    let parent = config_parent(config_path);
    match &config.recorder.directory {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                parent.join(d)
            }
        }
        _ => parent.join("sessions"),
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}
