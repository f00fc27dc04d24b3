//! Decision-service client for selector fallback.
//!
//! When the deterministic cascade exhausts every candidate, the executor
//! can ask an external decision service to propose a fresh selector from
//! the original candidate bundle and the current element tree. The service
//! is tiered: a fast default model is consulted first, with a single
//! escalation to a stronger model on failure. The tier is a per-call
//! parameter; client configuration is never mutated between calls.
//!
//! # Configuration
//!
//! Decision settings can be configured via environment variables:
//! - `APP_REPLAY_DECISION_ENDPOINT`: API endpoint URL
//! - `APP_REPLAY_DECISION_MODEL`: default (fast) model name
//! - `APP_REPLAY_DECISION_ESCALATION_MODEL`: escalation (strong) model name
//! - `APP_REPLAY_DECISION_MAX_TOKENS`: max tokens in a reply
//! - `APP_REPLAY_DECISION_TIMEOUT`: request timeout (seconds)
//! - `APP_REPLAY_DECISION_CONNECT_TIMEOUT`: connection timeout (seconds)

use std::collections::VecDeque;
use std::process::Command;
use tracing::{debug, warn};

use crate::backend::{AccessibilityTree, ProbeStrategy};
use crate::config;
use crate::recording::ElementSelector;

/// Result type for decision operations
pub type DecisionResult<T> = Result<T, DecisionError>;

/// Errors that can occur during decision-service operations
#[derive(Debug)]
pub enum DecisionError {
    /// Failed to reach the decision endpoint
    ConnectionFailed(String),
    /// The service replied with something unusable
    InvalidReply(String),
    /// IO error
    Io(std::io::Error),
}

impl std::fmt::Display for DecisionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecisionError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            DecisionError::InvalidReply(msg) => write!(f, "Invalid reply: {}", msg),
            DecisionError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for DecisionError {}

impl From<std::io::Error> for DecisionError {
    fn from(e: std::io::Error) -> Self {
        DecisionError::Io(e)
    }
}

/// The service tier to consult
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionTier {
    /// Fast, cheap model, always tried first
    Default,
    /// Stronger model, at most one escalation per step
    Escalated,
}

impl DecisionTier {
    /// Stable name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionTier::Default => "default",
            DecisionTier::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for DecisionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the decision-service client
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Default (fast) model name
    pub default_model: String,
    /// Escalation (strong) model name
    pub escalation_model: String,
    /// Maximum tokens in a reply
    pub max_tokens: u32,
    /// Timeout for initial connection (seconds)
    pub connection_timeout: u64,
    /// Timeout for the whole request (seconds)
    pub request_timeout: u64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        let cfg = config::get();
        Self {
            endpoint: cfg.decision.endpoint.clone(),
            default_model: cfg.decision.default_model.clone(),
            escalation_model: cfg.decision.escalation_model.clone(),
            max_tokens: cfg.decision.max_tokens,
            connection_timeout: cfg.decision.connect_timeout,
            request_timeout: cfg.decision.request_timeout,
        }
    }
}

impl DecisionConfig {
    /// Create a config for the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the default model
    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Set the escalation model
    pub fn escalation_model(mut self, model: impl Into<String>) -> Self {
        self.escalation_model = model.into();
        self
    }

    /// Set the reply token limit
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, seconds: u64) -> Self {
        self.request_timeout = seconds;
        self
    }

    /// The model name behind a tier
    pub fn model_for(&self, tier: DecisionTier) -> &str {
        match tier {
            DecisionTier::Default => &self.default_model,
            DecisionTier::Escalated => &self.escalation_model,
        }
    }
}

/// One fallback consultation: the original candidates plus the live tree
#[derive(Debug, Clone, Copy)]
pub struct DecisionRequest<'a> {
    /// The selector bundle the cascade failed to resolve, verbatim
    pub selector: &'a ElementSelector,
    /// The current element tree
    pub tree: &'a AccessibilityTree,
}

/// A parsed decision reply
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionReply {
    /// The proposed selector string
    pub selector: String,
    /// The strategy to probe it with
    pub strategy: ProbeStrategy,
    /// Advisory explanation; logged, never machine-checked
    pub reasoning: Option<String>,
    /// The model that produced the reply
    pub model: String,
    /// Total tokens the consultation used
    pub tokens: u64,
}

/// Trait for decision services.
///
/// `HttpDecisionClient` talks to a live endpoint; `MockDecision` replays a
/// scripted sequence for tests.
pub trait DecisionService {
    /// Ask the given tier to propose a selector
    fn propose(&mut self, request: &DecisionRequest<'_>, tier: DecisionTier)
        -> DecisionResult<DecisionReply>;
}

/// Check if a decision or bridge endpoint is reachable (connection-only check).
///
/// This only verifies the server accepts connections - it doesn't wait for
/// a full response since decision requests can take tens of seconds.
pub fn check_health(endpoint: &str, timeout_secs: u64) -> DecisionResult<bool> {
    // Extract host:port from endpoint URL for connection test
    let url = endpoint.trim_start_matches("http://").trim_start_matches("https://");
    let host_port = url.split('/').next().unwrap_or("127.0.0.1:8080");

    let output = Command::new("curl")
        .args([
            "-s",
            "-o", "/dev/null",
            "-w", "%{http_code}",
            "--connect-timeout", &timeout_secs.to_string(),
            "--max-time", &timeout_secs.to_string(),
            "-I",
            &format!("http://{}", host_port),
        ])
        .output()?;

    let status = String::from_utf8_lossy(&output.stdout);
    // Any response (even 4xx/5xx) means the server is reachable
    // 000 means connection failed entirely
    let code: u16 = status.trim().parse().unwrap_or(0);
    Ok(code > 0)
}

/// HTTP decision-service client (chat-completions shaped endpoint)
#[derive(Debug, Clone, Default)]
pub struct HttpDecisionClient {
    config: DecisionConfig,
}

impl HttpDecisionClient {
    /// Create a client with the given configuration
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    /// Create a client from the environment configuration
    pub fn from_env() -> Self {
        Self::new(DecisionConfig::default())
    }
}

impl DecisionService for HttpDecisionClient {
    fn propose(
        &mut self,
        request: &DecisionRequest<'_>,
        tier: DecisionTier,
    ) -> DecisionResult<DecisionReply> {
        let model = self.config.model_for(tier).to_string();
        let prompt = build_decision_prompt(request.selector, request.tree);

        let body = serde_json::json!({
            "model": model,
            "messages": [{
                "role": "user",
                "content": prompt
            }],
            "max_tokens": self.config.max_tokens
        });

        let body_json = serde_json::to_string(&body)
            .map_err(|e| DecisionError::InvalidReply(e.to_string()))?;

        debug!(%tier, %model, "decision consultation");

        let output = Command::new("curl")
            .args([
                "-s",
                "-X", "POST",
                &self.config.endpoint,
                "-H", "Content-Type: application/json",
                "-d", &body_json,
                "--connect-timeout", &self.config.connection_timeout.to_string(),
                "--max-time", &self.config.request_timeout.to_string(),
            ])
            .output()?;

        if !output.status.success() {
            return Err(DecisionError::ConnectionFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let response: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| DecisionError::InvalidReply(e.to_string()))?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");
        if content.is_empty() {
            return Err(DecisionError::InvalidReply(
                "reply carried no content".to_string(),
            ));
        }

        let tokens = response["usage"]["total_tokens"].as_u64().unwrap_or(0);
        let (selector, strategy, reasoning) = parse_reply_content(content)?;

        if let Some(reason) = &reasoning {
            debug!(%model, reason, "decision reasoning");
        }

        Ok(DecisionReply {
            selector,
            strategy,
            reasoning,
            model,
            tokens,
        })
    }
}

/// Build the consultation prompt from the failed candidates and the tree
pub fn build_decision_prompt(selector: &ElementSelector, tree: &AccessibilityTree) -> String {
    let candidates = serde_json::to_string_pretty(selector).unwrap_or_default();
    format!(
        "A UI automation step failed to locate its target element. \
         The recorded candidate selectors were:\n{}\n\n\
         The current element tree of the screen is:\n{}\n\n\
         Propose one selector that locates the intended element in this tree. \
         Reply with JSON only: {{\"selector\": \"<string>\", \
         \"method\": \"identifier\"|\"label\"|\"path\", \
         \"reasoning\": \"<short explanation>\"}}",
        candidates,
        tree.raw()
    )
}

/// Parse the reply content into (selector, strategy, reasoning).
///
/// Models often wrap JSON in markdown fences; those are stripped first.
pub fn parse_reply_content(
    content: &str,
) -> DecisionResult<(String, ProbeStrategy, Option<String>)> {
    let trimmed = strip_code_fences(content);

    let value: serde_json::Value = serde_json::from_str(trimmed)
        .map_err(|e| DecisionError::InvalidReply(format!("reply is not JSON: {}", e)))?;

    let selector = value["selector"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| DecisionError::InvalidReply("reply missing 'selector'".to_string()))?
        .to_string();

    let strategy = match value["method"].as_str() {
        Some("identifier") => ProbeStrategy::Identifier,
        Some("label") => ProbeStrategy::Label,
        Some("path") => ProbeStrategy::Path,
        Some(other) => {
            return Err(DecisionError::InvalidReply(format!(
                "unsupported method '{}'",
                other
            )));
        }
        None => {
            return Err(DecisionError::InvalidReply(
                "reply missing 'method'".to_string(),
            ));
        }
    };

    let reasoning = value["reasoning"].as_str().map(String::from);
    Ok((selector, strategy, reasoning))
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag after the opening fence
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim().strip_suffix("```").unwrap_or(rest).trim()
}

/// Scripted decision service for tests and dry runs.
///
/// Replies are consumed in push order regardless of tier; an empty script
/// yields connection failures. Every consultation is recorded.
#[derive(Debug, Default)]
pub struct MockDecision {
    script: VecDeque<DecisionResult<DecisionReply>>,
    consultations: Vec<DecisionTier>,
}

impl MockDecision {
    /// Create a service with an empty script
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful reply
    pub fn push_reply(&mut self, reply: DecisionReply) -> &mut Self {
        self.script.push_back(Ok(reply));
        self
    }

    /// Script a connection failure
    pub fn push_failure(&mut self, message: impl Into<String>) -> &mut Self {
        self.script
            .push_back(Err(DecisionError::ConnectionFailed(message.into())));
        self
    }

    /// Tiers consulted so far, in order
    pub fn consultations(&self) -> &[DecisionTier] {
        &self.consultations
    }

    /// Number of consultations so far
    pub fn call_count(&self) -> usize {
        self.consultations.len()
    }
}

impl DecisionService for MockDecision {
    fn propose(
        &mut self,
        _request: &DecisionRequest<'_>,
        tier: DecisionTier,
    ) -> DecisionResult<DecisionReply> {
        self.consultations.push(tier);
        match self.script.pop_front() {
            Some(result) => result,
            None => {
                warn!("mock decision script exhausted");
                Err(DecisionError::ConnectionFailed(
                    "script exhausted".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_reply_content_plain() {
        let (selector, strategy, reasoning) = parse_reply_content(
            r#"{"selector": "Sign In", "method": "label", "reasoning": "button text changed"}"#,
        )
        .unwrap();
        assert_eq!(selector, "Sign In");
        assert_eq!(strategy, ProbeStrategy::Label);
        assert_eq!(reasoning.as_deref(), Some("button text changed"));
    }

    #[test]
    fn test_parse_reply_content_fenced() {
        let content = "```json\n{\"selector\": \"//button[2]\", \"method\": \"path\"}\n```";
        let (selector, strategy, reasoning) = parse_reply_content(content).unwrap();
        assert_eq!(selector, "//button[2]");
        assert_eq!(strategy, ProbeStrategy::Path);
        assert_eq!(reasoning, None);
    }

    #[test]
    fn test_parse_reply_rejects_unknown_method() {
        let result = parse_reply_content(r#"{"selector": "x", "method": "bounds"}"#);
        assert!(matches!(result, Err(DecisionError::InvalidReply(_))));
    }

    #[test]
    fn test_parse_reply_rejects_missing_selector() {
        let result = parse_reply_content(r#"{"method": "label"}"#);
        assert!(matches!(result, Err(DecisionError::InvalidReply(_))));
    }

    #[test]
    fn test_build_decision_prompt_carries_candidates_and_tree() {
        let selector = ElementSelector::by_identifier("login_button").label("Log In");
        let tree = AccessibilityTree::new("<screen name='login'/>");
        let prompt = build_decision_prompt(&selector, &tree);
        assert!(prompt.contains("login_button"));
        assert!(prompt.contains("Log In"));
        assert!(prompt.contains("<screen name='login'/>"));
    }

    #[test]
    fn test_decision_config_builder() {
        let config = DecisionConfig::new("http://localhost:8080")
            .default_model("fast-model")
            .escalation_model("strong-model")
            .max_tokens(200)
            .request_timeout(30);

        assert_eq!(config.endpoint, "http://localhost:8080");
        assert_eq!(config.model_for(DecisionTier::Default), "fast-model");
        assert_eq!(config.model_for(DecisionTier::Escalated), "strong-model");
        assert_eq!(config.max_tokens, 200);
        assert_eq!(config.request_timeout, 30);
    }

    #[test]
    fn test_mock_decision_records_tiers() {
        let mut mock = MockDecision::new();
        mock.push_failure("down");
        mock.push_reply(DecisionReply {
            selector: "Sign In".to_string(),
            strategy: ProbeStrategy::Label,
            reasoning: None,
            model: "strong-model".to_string(),
            tokens: 120,
        });

        let selector = ElementSelector::by_label("Log In");
        let tree = AccessibilityTree::new("<screen/>");
        let request = DecisionRequest {
            selector: &selector,
            tree: &tree,
        };

        assert!(mock.propose(&request, DecisionTier::Default).is_err());
        let reply = mock.propose(&request, DecisionTier::Escalated).unwrap();
        assert_eq!(reply.selector, "Sign In");
        assert_eq!(
            mock.consultations(),
            &[DecisionTier::Default, DecisionTier::Escalated]
        );
    }
}
