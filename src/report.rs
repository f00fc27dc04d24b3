//! Types for playback run results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::recording::StepAction;
use crate::resolver::ResolvedSelector;

/// Terminal and intermediate states of a playback run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    /// No step has been pulled yet
    NotStarted,
    /// Steps are executing
    Running,
    /// The step list was exhausted normally
    Completed,
    /// The run timeout tripped between steps (graceful, not an error)
    TimedOut,
    /// A terminal step failure stopped the run early
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::NotStarted => "notStarted",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::TimedOut => "timedOut",
            RunState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Outcome of one attempted step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Result of a single attempted step. Appended once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Index of the step in the recording
    pub step_index: usize,

    /// The step's action
    pub action: StepAction,

    /// Whether the step succeeded
    pub status: StepStatus,

    /// Wall-clock time the step took (milliseconds)
    pub duration_ms: u64,

    /// How the target was resolved (absent for selector-less steps and
    /// steps that failed before resolution)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<ResolvedSelector>,

    /// Whether the decision-service fallback was used
    pub used_fallback: bool,

    /// Error code and message for failed steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// True when the step succeeded
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Success
    }
}

/// Result of a complete playback run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackResult {
    /// Recording that was played
    pub recording_id: String,

    /// Locale the run was played in
    pub locale: String,

    /// Terminal state of the run
    pub state: RunState,

    /// One entry per attempted step
    pub steps: Vec<StepResult>,

    /// Paths of captured screenshot artifacts
    pub artifacts: Vec<PathBuf>,

    /// Number of attempted steps that succeeded
    pub success_count: usize,

    /// Number of attempted steps that failed
    pub failure_count: usize,

    /// Screenshot captures that failed (best-effort, does not fail steps)
    pub capture_failures: usize,

    /// Total wall-clock time (milliseconds)
    pub duration_ms: u64,

    /// Decision-service consultations made
    pub fallback_calls: u32,

    /// Decision-service spend (USD)
    pub cost_usd: f64,

    /// Run-level error, set when the run never started or aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlaybackResult {
    /// True when every step ran and none failed
    pub fn passed(&self) -> bool {
        self.state == RunState::Completed && self.failure_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passed_requires_completion() {
        let result = PlaybackResult {
            recording_id: "r".to_string(),
            locale: "en-US".to_string(),
            state: RunState::TimedOut,
            steps: Vec::new(),
            artifacts: Vec::new(),
            success_count: 0,
            failure_count: 0,
            capture_failures: 0,
            duration_ms: 0,
            fallback_calls: 0,
            cost_usd: 0.0,
            error: None,
        };
        assert!(!result.passed());

        let completed = PlaybackResult {
            state: RunState::Completed,
            ..result.clone()
        };
        assert!(completed.passed());

        let failed = PlaybackResult {
            state: RunState::Completed,
            failure_count: 1,
            ..result
        };
        assert!(!failed.passed());
    }

    #[test]
    fn test_result_serializes_with_camel_case_state() {
        let result = PlaybackResult {
            recording_id: "r".to_string(),
            locale: "en-US".to_string(),
            state: RunState::TimedOut,
            steps: Vec::new(),
            artifacts: Vec::new(),
            success_count: 0,
            failure_count: 0,
            capture_failures: 0,
            duration_ms: 0,
            fallback_calls: 0,
            cost_usd: 0.0,
            error: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"timedOut\""));
    }
}
