//! Integration tests for `run_gateway` started from an initialized config directory.
//! The assistants service is never contacted; only health and login are exercised.

use lib::config::{self, Config};
use lib::gateway;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// `parley init` into a fresh directory, then overwrite config.json with `body`.
fn init_with(body: Value) -> (PathBuf, Config, PathBuf) {
    let dir = std::env::temp_dir().join(format!("parley-gateway-{}", uuid::Uuid::new_v4()));
    let config_path = dir.join("config.json");
    lib::init::init_config_dir(&config_path).expect("init config dir");
    std::fs::write(&config_path, body.to_string()).expect("write config.json");
    let (config, path) = config::load_config(Some(config_path)).expect("load config");
    (dir, config, path)
}

fn assistant_section() -> Value {
    json!({ "apiKey": "sk-test", "assistantId": "asst_test" })
}

/// Poll `GET /` until the gateway answers or ~5s pass.
async fn wait_for_health(client: &reqwest::Client, base: &str) -> Value {
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(format!("{}/", base)).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("health JSON");
            }
            Ok(resp) => last_err = Some(format!("status {}", resp.status())),
            Err(e) => last_err = Some(e.to_string()),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("gateway at {} never became healthy: {:?}", base, last_err);
}

async fn login(client: &reqwest::Client, base: &str, email: &str, password: &str) -> reqwest::Response {
    client
        .post(format!("{}/login", base))
        .json(&json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("login request")
}

fn cleanup(dir: &Path) {
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn configured_gateway_reports_health_and_accepts_login() {
    let port = free_port();
    let (dir, config, path) = init_with(json!({
        "gateway": { "port": port },
        "assistant": assistant_section(),
        "gate": { "identifier": "user@example.com", "secret": "pw" }
    }));
    assert!(dir.join("sessions").is_dir());

    let server = tokio::spawn(gateway::run_gateway(config, path));
    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();

    let health = wait_for_health(&client, &base).await;
    assert_eq!(health, json!({ "runtime": "running", "port": port }));

    if std::env::var("PARLEY_GATE_IDENTIFIER").is_err() {
        let res = login(&client, &base, "user@example.com", "pw").await;
        assert_eq!(res.status(), 200);
        assert!(res.headers().get("set-cookie").is_some());
    }

    server.abort();
    cleanup(&dir);
}

#[tokio::test]
async fn loopback_gateway_without_credentials_starts_but_rejects_every_login() {
    if std::env::var("PARLEY_GATE_IDENTIFIER").is_ok() {
        return;
    }
    let port = free_port();
    let (dir, config, path) = init_with(json!({
        "gateway": { "port": port, "bind": "127.0.0.1" },
        "assistant": assistant_section()
    }));

    let server = tokio::spawn(gateway::run_gateway(config, path));
    let base = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();
    wait_for_health(&client, &base).await;

    let res = login(&client, &base, "", "").await;
    assert_eq!(res.status(), 401);

    server.abort();
    cleanup(&dir);
}

#[tokio::test]
async fn public_bind_without_credentials_is_refused() {
    if std::env::var("PARLEY_GATE_IDENTIFIER").is_ok() {
        return;
    }
    let (dir, config, path) = init_with(json!({
        "gateway": { "port": free_port(), "bind": "0.0.0.0" },
        "assistant": assistant_section()
    }));

    let err = gateway::run_gateway(config, path)
        .await
        .expect_err("public bind without credentials must fail");
    assert!(err.to_string().contains("without login credentials"));
    cleanup(&dir);
}
