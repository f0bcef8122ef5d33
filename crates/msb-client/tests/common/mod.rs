//! Shared fixtures for the mock-orchestrator tests.

#![allow(dead_code)]

use msb_client::{Language, Sandbox, SandboxOptions};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Session pointed at `server`, isolated from `MSB_*` variables.
pub fn sandbox(server: &MockServer, name: &str) -> Sandbox {
    let options = SandboxOptions::builder()
        .server_url(server.uri())
        .name(name)
        .ignore_env()
        .build()
        .unwrap();
    Sandbox::new(options).unwrap()
}

pub fn python_sandbox(server: &MockServer, name: &str) -> Sandbox {
    let options = SandboxOptions::builder()
        .server_url(server.uri())
        .name(name)
        .language(Language::Python)
        .ignore_env()
        .build()
        .unwrap();
    Sandbox::new(options).unwrap()
}

/// Answer `POST /sandboxes` for `name` with `sandbox_id`.
pub async fn mount_start(server: &MockServer, name: &str, sandbox_id: &str) {
    Mock::given(method("POST"))
        .and(path("/sandboxes"))
        .and(body_partial_json(json!({ "name": name })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "sandboxId": sandbox_id,
            "status": "running"
        })))
        .mount(server)
        .await;
}

/// Answer `DELETE /sandboxes/{sandbox_id}` with an empty 204.
pub async fn mount_stop(server: &MockServer, sandbox_id: &str) {
    Mock::given(method("DELETE"))
        .and(path(format!("/sandboxes/{sandbox_id}")))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

/// Answer `POST /sandboxes/{sandbox_id}/execute` with `body`.
pub async fn mount_execute(server: &MockServer, sandbox_id: &str, body: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/sandboxes/{sandbox_id}/execute")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
