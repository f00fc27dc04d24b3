//! App Replay - UI walkthrough playback with selector caching and
//! model-assisted recovery.
//!
//! This crate provides:
//! - Declarative step playback (tap, type, scroll, swipe, back, home, wait)
//!   against an automation bridge
//! - A multi-strategy selector resolution cascade with a trust-gated cache
//! - Optional decision-service fallback with tiered escalation and a cost cap
//! - Post-action verification and per-step checkpoints
//! - Session management for organized screenshot artifacts
//!
//! # Example
//!
//! ```rust,no_run
//! use app_replay::{
//!     FileCacheStore, HttpBackend, PlaybackOptions, Recording, Session, StepExecutor,
//! };
//!
//! let recording = Recording::from_json_file("walkthrough.json").unwrap();
//! let mut backend = HttpBackend::from_env();
//! let store = FileCacheStore::from_env();
//! let session = Session::for_recording(&recording.id);
//! session.init().unwrap();
//!
//! let mut executor =
//!     StepExecutor::new(&mut backend, &store, &session, PlaybackOptions::default());
//! let result = executor.run(&recording);
//! println!("{} steps passed", result.success_count);
//! ```

pub mod backend;
pub mod cache;
pub mod config;
pub mod cost;
pub mod decision;
pub mod executor;
pub mod guardrails;
pub mod recording;
pub mod report;
pub mod resolver;
pub mod session;
pub mod verify;

// Re-export recording types
pub use recording::{
    Bounds, Checkpoint, ElementSelector, Recording, RecordingError, RecordingResult, Step,
    StepAction,
};

// Re-export backend types and adapters
pub use backend::{
    AccessibilityTree, AutomationBackend, BackendError, BackendResult, DeviceButton,
    GestureDirection, HttpBackend, HttpBackendConfig, Locator, MockDevice, MockElement,
    MockScreen, ProbeStrategy, UiElement,
};

// Re-export resolution types
pub use resolver::{ResolutionMethod, ResolveError, ResolveResult, ResolvedSelector, resolve};

// Re-export cache types
pub use cache::{CacheEntry, CacheError, CacheResult, CacheStore, FileCacheStore, SelectorCache};

// Re-export decision-service client
pub use decision::{
    DecisionConfig, DecisionError, DecisionReply, DecisionRequest, DecisionResult,
    DecisionService, DecisionTier, HttpDecisionClient, MockDecision, check_health,
};

// Re-export cost tracking
pub use cost::{CostTracker, TierPricing};

// Re-export verification
pub use verify::{VerifyError, VerifyResult, verify_state};

// Re-export guardrails
pub use guardrails::{GuardrailViolation, Guardrails};

// Re-export executor and result types
pub use executor::{FailureMode, PlaybackOptions, StepError, StepExecutor};
pub use report::{PlaybackResult, RunState, StepResult, StepStatus};

// Re-export session management
pub use session::{Session, cleanup_old_sessions, list_sessions};
