//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for App Replay, supporting:
//! - Environment variables for all configurable values
//! - Sensible defaults for local development setups
//! - Group-per-concern settings structs with `from_env()`/`defaults()`
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `APP_REPLAY_BACKEND_ENDPOINT` | Automation bridge base URL | `http://127.0.0.1:4723` |
//! | `APP_REPLAY_BACKEND_CONNECT_TIMEOUT` | Bridge connection timeout (seconds) | `5` |
//! | `APP_REPLAY_DECISION_ENDPOINT` | Decision service API endpoint | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `APP_REPLAY_DECISION_MODEL` | Default (fast) decision model | `qwen3` |
//! | `APP_REPLAY_DECISION_ESCALATION_MODEL` | Escalation (strong) decision model | `qwen3-thinking` |
//! | `APP_REPLAY_DECISION_MAX_TOKENS` | Max tokens in a decision reply | `400` |
//! | `APP_REPLAY_DECISION_CONNECT_TIMEOUT` | Decision connection timeout (seconds) | `10` |
//! | `APP_REPLAY_DECISION_TIMEOUT` | Decision request timeout (seconds) | `60` |
//! | `APP_REPLAY_PRICE_DEFAULT` | USD per 1k tokens, default tier | `0.0005` |
//! | `APP_REPLAY_PRICE_ESCALATED` | USD per 1k tokens, escalated tier | `0.003` |
//! | `APP_REPLAY_SESSION_DIR` | Base directory for sessions | `/tmp/app-replay` |
//! | `APP_REPLAY_CACHE_DIR` | Directory for selector caches | `/tmp/app-replay/cache` |
//! | `APP_REPLAY_MAX_STEPS` | Default max steps per recording | `50` |
//! | `APP_REPLAY_STEP_TIMEOUT_MS` | Default per-step timeout (ms) | `10000` |
//! | `APP_REPLAY_RUN_TIMEOUT_MS` | Default run timeout (ms) | `300000` |
//! | `APP_REPLAY_STEP_RETRIES` | Default retries per step | `2` |
//! | `APP_REPLAY_RETRY_DELAY_MS` | Delay between step retries (ms) | `500` |
//! | `APP_REPLAY_COST_CAP_USD` | Default decision-service cost cap | `1.0` |
//! | `APP_REPLAY_DEFAULT_WAIT_MS` | Default duration for wait steps (ms) | `1000` |
//!
//! # Example
//!
//! ```bash
//! # Point at a hosted decision service
//! export APP_REPLAY_DECISION_ENDPOINT="http://localhost:11434/v1/chat/completions"
//! export APP_REPLAY_DECISION_MODEL="llama3"
//!
//! # Use a custom session directory
//! export APP_REPLAY_SESSION_DIR="/var/tmp/app-replay-sessions"
//! ```

use std::env;
use std::sync::OnceLock;

// ============================================================================
// Default Values
// ============================================================================

/// Default automation bridge base URL
pub const DEFAULT_BACKEND_ENDPOINT: &str = "http://127.0.0.1:4723";

/// Default bridge connection timeout (seconds)
pub const DEFAULT_BACKEND_CONNECT_TIMEOUT: u64 = 5;

/// Default decision service endpoint
pub const DEFAULT_DECISION_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default (fast) decision model name
pub const DEFAULT_DECISION_MODEL: &str = "qwen3";

/// Escalation (strong) decision model name
pub const DEFAULT_ESCALATION_MODEL: &str = "qwen3-thinking";

/// Default max tokens for decision replies
pub const DEFAULT_DECISION_MAX_TOKENS: u32 = 400;

/// Default decision connection timeout (seconds)
pub const DEFAULT_DECISION_CONNECT_TIMEOUT: u64 = 10;

/// Default decision request timeout (seconds)
pub const DEFAULT_DECISION_TIMEOUT: u64 = 60;

/// Default-tier price in USD per 1k tokens
pub const DEFAULT_PRICE_DEFAULT_TIER: f64 = 0.0005;

/// Escalated-tier price in USD per 1k tokens
pub const DEFAULT_PRICE_ESCALATED_TIER: f64 = 0.003;

/// Default session base directory
pub const DEFAULT_SESSION_DIR: &str = "/tmp/app-replay";

/// Default selector cache directory
pub const DEFAULT_CACHE_DIR: &str = "/tmp/app-replay/cache";

/// Default maximum steps per recording
pub const DEFAULT_MAX_STEPS: usize = 50;

/// Default per-step timeout (milliseconds)
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 10_000;

/// Default run timeout (milliseconds)
pub const DEFAULT_RUN_TIMEOUT_MS: u64 = 300_000;

/// Default retries per step (attempts = retries + 1)
pub const DEFAULT_STEP_RETRIES: u32 = 2;

/// Default delay between step retries (milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Default decision-service cost cap in USD
pub const DEFAULT_COST_CAP_USD: f64 = 1.0;

/// Default duration for `wait` steps without a value (milliseconds)
pub const DEFAULT_WAIT_MS: u64 = 1_000;

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for the bridge endpoint
pub const ENV_BACKEND_ENDPOINT: &str = "APP_REPLAY_BACKEND_ENDPOINT";

/// Environment variable for the bridge connection timeout
pub const ENV_BACKEND_CONNECT_TIMEOUT: &str = "APP_REPLAY_BACKEND_CONNECT_TIMEOUT";

/// Environment variable for the decision endpoint
pub const ENV_DECISION_ENDPOINT: &str = "APP_REPLAY_DECISION_ENDPOINT";

/// Environment variable for the default decision model
pub const ENV_DECISION_MODEL: &str = "APP_REPLAY_DECISION_MODEL";

/// Environment variable for the escalation decision model
pub const ENV_ESCALATION_MODEL: &str = "APP_REPLAY_DECISION_ESCALATION_MODEL";

/// Environment variable for decision max tokens
pub const ENV_DECISION_MAX_TOKENS: &str = "APP_REPLAY_DECISION_MAX_TOKENS";

/// Environment variable for the decision connection timeout
pub const ENV_DECISION_CONNECT_TIMEOUT: &str = "APP_REPLAY_DECISION_CONNECT_TIMEOUT";

/// Environment variable for the decision request timeout
pub const ENV_DECISION_TIMEOUT: &str = "APP_REPLAY_DECISION_TIMEOUT";

/// Environment variable for default-tier pricing
pub const ENV_PRICE_DEFAULT: &str = "APP_REPLAY_PRICE_DEFAULT";

/// Environment variable for escalated-tier pricing
pub const ENV_PRICE_ESCALATED: &str = "APP_REPLAY_PRICE_ESCALATED";

/// Environment variable for the session directory
pub const ENV_SESSION_DIR: &str = "APP_REPLAY_SESSION_DIR";

/// Environment variable for the cache directory
pub const ENV_CACHE_DIR: &str = "APP_REPLAY_CACHE_DIR";

/// Environment variable for the default max steps
pub const ENV_MAX_STEPS: &str = "APP_REPLAY_MAX_STEPS";

/// Environment variable for the default step timeout
pub const ENV_STEP_TIMEOUT_MS: &str = "APP_REPLAY_STEP_TIMEOUT_MS";

/// Environment variable for the default run timeout
pub const ENV_RUN_TIMEOUT_MS: &str = "APP_REPLAY_RUN_TIMEOUT_MS";

/// Environment variable for the default step retries
pub const ENV_STEP_RETRIES: &str = "APP_REPLAY_STEP_RETRIES";

/// Environment variable for the retry delay
pub const ENV_RETRY_DELAY_MS: &str = "APP_REPLAY_RETRY_DELAY_MS";

/// Environment variable for the cost cap
pub const ENV_COST_CAP_USD: &str = "APP_REPLAY_COST_CAP_USD";

/// Environment variable for the default wait duration
pub const ENV_DEFAULT_WAIT_MS: &str = "APP_REPLAY_DEFAULT_WAIT_MS";

// ============================================================================
// Configuration Getters (with caching)
// ============================================================================

static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration (initialized from environment on first access)
pub fn get() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Centralized configuration for App Replay
#[derive(Debug, Clone)]
pub struct Config {
    /// Automation bridge configuration
    pub backend: BackendSettings,
    /// Decision service configuration
    pub decision: DecisionServiceSettings,
    /// Session configuration
    pub session: SessionSettings,
    /// Selector cache configuration
    pub cache: CacheSettings,
    /// Default playback limits
    pub playback: PlaybackDefaults,
}

/// Automation-bridge settings
#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL of the automation bridge server
    pub endpoint: String,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
}

/// Decision-service settings
#[derive(Debug, Clone)]
pub struct DecisionServiceSettings {
    /// API endpoint URL
    pub endpoint: String,
    /// Default (fast) model name
    pub default_model: String,
    /// Escalation (strong) model name
    pub escalation_model: String,
    /// Maximum tokens in a reply
    pub max_tokens: u32,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Request timeout (seconds)
    pub request_timeout: u64,
    /// USD per 1k tokens, default tier
    pub price_default_per_1k: f64,
    /// USD per 1k tokens, escalated tier
    pub price_escalated_per_1k: f64,
}

/// Session-related settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Base directory for session storage
    pub base_dir: String,
}

/// Selector-cache settings
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Directory for persisted selector caches
    pub dir: String,
}

/// Default playback limits (overridable per run)
#[derive(Debug, Clone)]
pub struct PlaybackDefaults {
    /// Maximum steps per recording
    pub max_steps: usize,
    /// Per-step timeout (milliseconds)
    pub step_timeout_ms: u64,
    /// Run timeout (milliseconds)
    pub run_timeout_ms: u64,
    /// Retries per step (attempts = retries + 1)
    pub step_retries: u32,
    /// Delay between retries (milliseconds)
    pub retry_delay_ms: u64,
    /// Decision-service cost cap (USD)
    pub cost_cap_usd: f64,
    /// Default duration for `wait` steps (milliseconds)
    pub default_wait_ms: u64,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            backend: BackendSettings::from_env(),
            decision: DecisionServiceSettings::from_env(),
            session: SessionSettings::from_env(),
            cache: CacheSettings::from_env(),
            playback: PlaybackDefaults::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            backend: BackendSettings::defaults(),
            decision: DecisionServiceSettings::defaults(),
            session: SessionSettings::defaults(),
            cache: CacheSettings::defaults(),
            playback: PlaybackDefaults::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback)
}

impl BackendSettings {
    /// Create backend settings from environment variables
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_BACKEND_ENDPOINT)
                .unwrap_or_else(|_| DEFAULT_BACKEND_ENDPOINT.to_string()),
            connect_timeout: env_parsed(ENV_BACKEND_CONNECT_TIMEOUT, DEFAULT_BACKEND_CONNECT_TIMEOUT),
        }
    }

    /// Create backend settings with defaults
    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_BACKEND_ENDPOINT.to_string(),
            connect_timeout: DEFAULT_BACKEND_CONNECT_TIMEOUT,
        }
    }
}

impl DecisionServiceSettings {
    /// Create decision-service settings from environment variables
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_DECISION_ENDPOINT)
                .unwrap_or_else(|_| DEFAULT_DECISION_ENDPOINT.to_string()),
            default_model: env::var(ENV_DECISION_MODEL)
                .unwrap_or_else(|_| DEFAULT_DECISION_MODEL.to_string()),
            escalation_model: env::var(ENV_ESCALATION_MODEL)
                .unwrap_or_else(|_| DEFAULT_ESCALATION_MODEL.to_string()),
            max_tokens: env_parsed(ENV_DECISION_MAX_TOKENS, DEFAULT_DECISION_MAX_TOKENS),
            connect_timeout: env_parsed(ENV_DECISION_CONNECT_TIMEOUT, DEFAULT_DECISION_CONNECT_TIMEOUT),
            request_timeout: env_parsed(ENV_DECISION_TIMEOUT, DEFAULT_DECISION_TIMEOUT),
            price_default_per_1k: env_parsed(ENV_PRICE_DEFAULT, DEFAULT_PRICE_DEFAULT_TIER),
            price_escalated_per_1k: env_parsed(ENV_PRICE_ESCALATED, DEFAULT_PRICE_ESCALATED_TIER),
        }
    }

    /// Create decision-service settings with defaults
    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_DECISION_ENDPOINT.to_string(),
            default_model: DEFAULT_DECISION_MODEL.to_string(),
            escalation_model: DEFAULT_ESCALATION_MODEL.to_string(),
            max_tokens: DEFAULT_DECISION_MAX_TOKENS,
            connect_timeout: DEFAULT_DECISION_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_DECISION_TIMEOUT,
            price_default_per_1k: DEFAULT_PRICE_DEFAULT_TIER,
            price_escalated_per_1k: DEFAULT_PRICE_ESCALATED_TIER,
        }
    }
}

impl SessionSettings {
    /// Create session settings from environment variables
    pub fn from_env() -> Self {
        Self {
            base_dir: env::var(ENV_SESSION_DIR)
                .unwrap_or_else(|_| DEFAULT_SESSION_DIR.to_string()),
        }
    }

    /// Create session settings with defaults
    pub fn defaults() -> Self {
        Self {
            base_dir: DEFAULT_SESSION_DIR.to_string(),
        }
    }
}

impl CacheSettings {
    /// Create cache settings from environment variables
    pub fn from_env() -> Self {
        Self {
            dir: env::var(ENV_CACHE_DIR).unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string()),
        }
    }

    /// Create cache settings with defaults
    pub fn defaults() -> Self {
        Self {
            dir: DEFAULT_CACHE_DIR.to_string(),
        }
    }
}

impl PlaybackDefaults {
    /// Create playback defaults from environment variables
    pub fn from_env() -> Self {
        Self {
            max_steps: env_parsed(ENV_MAX_STEPS, DEFAULT_MAX_STEPS),
            step_timeout_ms: env_parsed(ENV_STEP_TIMEOUT_MS, DEFAULT_STEP_TIMEOUT_MS),
            run_timeout_ms: env_parsed(ENV_RUN_TIMEOUT_MS, DEFAULT_RUN_TIMEOUT_MS),
            step_retries: env_parsed(ENV_STEP_RETRIES, DEFAULT_STEP_RETRIES),
            retry_delay_ms: env_parsed(ENV_RETRY_DELAY_MS, DEFAULT_RETRY_DELAY_MS),
            cost_cap_usd: env_parsed(ENV_COST_CAP_USD, DEFAULT_COST_CAP_USD),
            default_wait_ms: env_parsed(ENV_DEFAULT_WAIT_MS, DEFAULT_WAIT_MS),
        }
    }

    /// Create playback defaults with hardcoded values
    pub fn defaults() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            run_timeout_ms: DEFAULT_RUN_TIMEOUT_MS,
            step_retries: DEFAULT_STEP_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            cost_cap_usd: DEFAULT_COST_CAP_USD,
            default_wait_ms: DEFAULT_WAIT_MS,
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Get the bridge endpoint from environment (convenience function)
pub fn backend_endpoint() -> String {
    get().backend.endpoint.clone()
}

/// Get the decision endpoint from environment (convenience function)
pub fn decision_endpoint() -> String {
    get().decision.endpoint.clone()
}

/// Get the session base directory (convenience function)
pub fn session_base_dir() -> String {
    get().session.base_dir.clone()
}

/// Get the selector cache directory (convenience function)
pub fn cache_dir() -> String {
    get().cache.dir.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::defaults();
        assert_eq!(config.backend.endpoint, DEFAULT_BACKEND_ENDPOINT);
        assert_eq!(config.decision.endpoint, DEFAULT_DECISION_ENDPOINT);
        assert_eq!(config.decision.default_model, DEFAULT_DECISION_MODEL);
        assert_eq!(config.session.base_dir, DEFAULT_SESSION_DIR);
        assert_eq!(config.cache.dir, DEFAULT_CACHE_DIR);
    }

    #[test]
    fn test_playback_defaults() {
        let playback = PlaybackDefaults::defaults();
        assert_eq!(playback.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(playback.step_retries, DEFAULT_STEP_RETRIES);
        assert!(playback.cost_cap_usd > 0.0);
    }

    #[test]
    fn test_env_parsed_fallback() {
        assert_eq!(env_parsed("APP_REPLAY_NOT_A_REAL_VAR", 42u64), 42);
    }
}
