//! HTTP adapter for a live automation bridge server.
//!
//! Talks to the bridge with small JSON requests, one endpoint per
//! primitive. Transport is a `curl` subprocess with explicit connect and
//! request timeouts; any non-JSON or error reply surfaces as a backend
//! error, which the resolution cascade treats as "not found".
//!
//! Bridge endpoints:
//! - `POST /tree` → `{"tree": "<serialized element tree>"}`
//! - `POST /find` → `{"found": bool, "element": {...}}`
//! - `POST /tap`, `/type`, `/scroll`, `/swipe`, `/press` → `{"ok": true}`
//! - `POST /screenshot` → `{"data": "<base64 png>"}`

use base64::Engine;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

use crate::config;

use super::types::{
    AccessibilityTree, AutomationBackend, BackendError, BackendResult, DeviceButton,
    GestureDirection, Locator, UiElement,
};

/// Configuration for the HTTP bridge backend
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// Base URL of the bridge server
    pub endpoint: String,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Per-request timeout (seconds) for calls without an explicit budget
    pub request_timeout: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            endpoint: cfg.backend.endpoint.clone(),
            connect_timeout: cfg.backend.connect_timeout,
            request_timeout: cfg.playback.step_timeout_ms / 1_000,
        }
    }
}

impl HttpBackendConfig {
    /// Create a config for the given bridge endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, seconds: u64) -> Self {
        self.connect_timeout = seconds;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }
}

/// Automation backend driving a bridge server over HTTP
pub struct HttpBackend {
    config: HttpBackendConfig,
}

impl HttpBackend {
    /// Create a backend with the given configuration
    pub fn new(config: HttpBackendConfig) -> Self {
        Self { config }
    }

    /// Create a backend for the configured default endpoint
    pub fn from_env() -> Self {
        Self::new(HttpBackendConfig::default())
    }

    fn post(&self, path: &str, body: serde_json::Value, timeout_secs: u64) -> BackendResult<serde_json::Value> {
        let url = format!("{}/{}", self.config.endpoint.trim_end_matches('/'), path);
        let body_json = serde_json::to_string(&body)
            .map_err(|e| BackendError::Protocol(e.to_string()))?;

        debug!(url = %url, "bridge request");

        let output = Command::new("curl")
            .args([
                "-s",
                "-X", "POST",
                &url,
                "-H", "Content-Type: application/json",
                "-d", &body_json,
                "--connect-timeout", &self.config.connect_timeout.to_string(),
                "--max-time", &timeout_secs.max(1).to_string(),
            ])
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // curl exit 28 is its timeout code
            if output.status.code() == Some(28) {
                return Err(BackendError::Timeout(Duration::from_secs(timeout_secs)));
            }
            return Err(BackendError::Transport(format!(
                "curl failed for {}: {}",
                path, stderr
            )));
        }

        let reply: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| BackendError::Protocol(format!("bad reply from {}: {}", path, e)))?;

        if let Some(message) = reply["error"].as_str() {
            return Err(BackendError::Transport(format!(
                "bridge error from {}: {}",
                path, message
            )));
        }

        Ok(reply)
    }

    fn post_action(&self, path: &str, body: serde_json::Value) -> BackendResult<()> {
        self.post(path, body, self.config.request_timeout).map(|_| ())
    }
}

impl AutomationBackend for HttpBackend {
    fn accessibility_tree(&mut self) -> BackendResult<AccessibilityTree> {
        let reply = self.post("tree", serde_json::json!({}), self.config.request_timeout)?;
        let raw = reply["tree"]
            .as_str()
            .ok_or_else(|| BackendError::Protocol("reply missing 'tree'".to_string()))?;
        Ok(AccessibilityTree::new(raw))
    }

    fn find(&mut self, locator: &Locator, timeout: Duration) -> BackendResult<Option<UiElement>> {
        let reply = self.post(
            "find",
            serde_json::json!({
                "strategy": locator.strategy.as_str(),
                "value": locator.value,
            }),
            timeout.as_secs().max(1),
        )?;

        if !reply["found"].as_bool().unwrap_or(false) {
            return Ok(None);
        }
        let element = UiElement {
            identifier: reply["element"]["identifier"].as_str().map(String::from),
            label: reply["element"]["label"].as_str().map(String::from),
        };
        Ok(Some(element))
    }

    fn tap(&mut self, locator: &Locator) -> BackendResult<()> {
        self.post_action(
            "tap",
            serde_json::json!({
                "strategy": locator.strategy.as_str(),
                "value": locator.value,
            }),
        )
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> BackendResult<()> {
        self.post_action(
            "type",
            serde_json::json!({
                "strategy": locator.strategy.as_str(),
                "value": locator.value,
                "text": text,
            }),
        )
    }

    fn scroll(&mut self, direction: GestureDirection) -> BackendResult<()> {
        self.post_action("scroll", serde_json::json!({ "direction": direction.as_str() }))
    }

    fn swipe(&mut self, direction: GestureDirection) -> BackendResult<()> {
        self.post_action("swipe", serde_json::json!({ "direction": direction.as_str() }))
    }

    fn press_button(&mut self, button: DeviceButton) -> BackendResult<()> {
        self.post_action("press", serde_json::json!({ "button": button.as_str() }))
    }

    fn screenshot(&mut self) -> BackendResult<Vec<u8>> {
        let reply = self.post("screenshot", serde_json::json!({}), self.config.request_timeout)?;
        let encoded = reply["data"]
            .as_str()
            .ok_or_else(|| BackendError::Protocol("reply missing 'data'".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| BackendError::Protocol(format!("bad screenshot payload: {}", e)))
    }

    fn source_type(&self) -> &str {
        "bridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ProbeStrategy;
    use httpmock::prelude::*;

    #[test]
    fn test_find_parses_bridge_reply() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/find");
            then.status(200).json_body(serde_json::json!({
                "found": true,
                "element": {"identifier": "login_button", "label": "Log In"}
            }));
        });

        let mut backend = HttpBackend::new(HttpBackendConfig::new(server.base_url()));
        let hit = backend
            .find(
                &Locator::new(ProbeStrategy::Identifier, "login_button"),
                Duration::from_secs(2),
            )
            .unwrap();
        assert_eq!(hit.unwrap().label.as_deref(), Some("Log In"));
    }

    #[test]
    fn test_bridge_error_reply_is_transport_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tap");
            then.status(200)
                .json_body(serde_json::json!({"error": "no active session"}));
        });

        let mut backend = HttpBackend::new(HttpBackendConfig::new(server.base_url()));
        let result = backend.tap(&Locator::new(
            ProbeStrategy::Identifier,
            "x",
        ));
        assert!(matches!(result, Err(BackendError::Transport(_))));
    }

    #[test]
    fn test_screenshot_decodes_base64() {
        let server = MockServer::start();
        let payload = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3, 4]);
        server.mock(|when, then| {
            when.method(POST).path("/screenshot");
            then.status(200).json_body(serde_json::json!({"data": payload}));
        });

        let mut backend = HttpBackend::new(HttpBackendConfig::new(server.base_url()));
        assert_eq!(backend.screenshot().unwrap(), vec![1, 2, 3, 4]);
    }
}
