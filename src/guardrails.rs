//! Pre-flight and per-step execution limits.
//!
//! Guardrails bound a playback run before and while it executes: a step
//! budget checked before anything runs, a forbidden-action screen applied
//! to each step before any backend call, a cooperative run timeout checked
//! at step boundaries, and a cost cap consulted by the fallback path.

use std::time::{Duration, Instant};

use crate::recording::{Recording, Step};

/// Execution limits for one playback run. Read-only once the run starts.
#[derive(Debug, Clone)]
pub struct Guardrails {
    /// Maximum number of steps a recording may contain
    pub max_steps: usize,

    /// Time budget per step
    pub step_timeout: Duration,

    /// Wall-clock budget for the whole run, checked at step boundaries
    pub run_timeout: Duration,

    /// Case-insensitive substrings that block a step from executing
    pub forbidden_actions: Vec<String>,

    /// Cumulative decision-service spend cap in USD
    pub cost_cap_usd: f64,
}

impl Default for Guardrails {
    fn default() -> Self {
        let cfg = crate::config::get();
        Self {
            max_steps: cfg.playback.max_steps,
            step_timeout: Duration::from_millis(cfg.playback.step_timeout_ms),
            run_timeout: Duration::from_millis(cfg.playback.run_timeout_ms),
            forbidden_actions: Vec::new(),
            cost_cap_usd: cfg.playback.cost_cap_usd,
        }
    }
}

impl Guardrails {
    /// Set the step budget
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the per-step timeout
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Set the run timeout
    pub fn run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Set the forbidden-action patterns
    pub fn forbidden_actions(mut self, patterns: Vec<String>) -> Self {
        self.forbidden_actions = patterns;
        self
    }

    /// Set the cost cap
    pub fn cost_cap_usd(mut self, cap: f64) -> Self {
        self.cost_cap_usd = cap;
        self
    }

    /// Validate a recording before execution begins.
    ///
    /// A recording over the step budget fails fast: no step executes and
    /// no artifact is produced.
    pub fn preflight(&self, recording: &Recording) -> Result<(), GuardrailViolation> {
        let steps = recording.step_count();
        if steps > self.max_steps {
            return Err(GuardrailViolation::MaxSteps {
                steps,
                limit: self.max_steps,
            });
        }
        Ok(())
    }

    /// Screen one step against the forbidden-action patterns.
    ///
    /// The step's action, literal value, and selector label are folded into
    /// one lowercase string; any pattern matching as a substring blocks the
    /// step before any resolution attempt.
    pub fn screen_step(&self, step: &Step) -> Result<(), GuardrailViolation> {
        if self.forbidden_actions.is_empty() {
            return Ok(());
        }

        let mut haystack = step.action.as_str().to_string();
        if let Some(value) = &step.value {
            haystack.push(' ');
            haystack.push_str(value);
        }
        if let Some(label) = step.selector.as_ref().and_then(|s| s.display_label()) {
            haystack.push(' ');
            haystack.push_str(label);
        }
        let haystack = haystack.to_lowercase();

        for pattern in &self.forbidden_actions {
            if haystack.contains(&pattern.to_lowercase()) {
                return Err(GuardrailViolation::ForbiddenAction {
                    pattern: pattern.clone(),
                });
            }
        }
        Ok(())
    }

    /// True once the run's wall-clock budget is spent
    pub fn run_expired(&self, started: Instant) -> bool {
        started.elapsed() > self.run_timeout
    }
}

/// A guardrail violation
#[derive(Debug, Clone, PartialEq)]
pub enum GuardrailViolation {
    /// The recording has more steps than the budget allows
    MaxSteps { steps: usize, limit: usize },

    /// A forbidden-action pattern matched the step
    ForbiddenAction { pattern: String },
}

impl std::fmt::Display for GuardrailViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardrailViolation::MaxSteps { steps, limit } => {
                write!(f, "recording has {} steps, limit is {}", steps, limit)
            }
            GuardrailViolation::ForbiddenAction { pattern } => {
                write!(f, "step matches forbidden pattern '{}'", pattern)
            }
        }
    }
}

impl std::error::Error for GuardrailViolation {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{ElementSelector, StepAction};

    fn limits() -> Guardrails {
        Guardrails {
            max_steps: 3,
            step_timeout: Duration::from_secs(5),
            run_timeout: Duration::from_secs(60),
            forbidden_actions: vec!["delete".to_string()],
            cost_cap_usd: 1.0,
        }
    }

    #[test]
    fn test_preflight_over_budget() {
        let recording = Recording::new(
            "long",
            (0..5).map(|_| Step::new(StepAction::Back)).collect(),
        );
        assert_eq!(
            limits().preflight(&recording),
            Err(GuardrailViolation::MaxSteps { steps: 5, limit: 3 })
        );
    }

    #[test]
    fn test_preflight_at_budget_passes() {
        let recording = Recording::new(
            "short",
            (0..3).map(|_| Step::new(StepAction::Back)).collect(),
        );
        assert!(limits().preflight(&recording).is_ok());
    }

    #[test]
    fn test_forbidden_matches_value_case_insensitive() {
        let step = Step::type_text(ElementSelector::by_identifier("field"), "Delete Account");
        assert_eq!(
            limits().screen_step(&step),
            Err(GuardrailViolation::ForbiddenAction {
                pattern: "delete".to_string()
            })
        );
    }

    #[test]
    fn test_forbidden_matches_selector_label() {
        let step = Step::tap(ElementSelector::by_label("Delete profile"));
        assert!(limits().screen_step(&step).is_err());
    }

    #[test]
    fn test_harmless_step_passes_screen() {
        let step = Step::tap(ElementSelector::by_label("Log In"));
        assert!(limits().screen_step(&step).is_ok());
    }

    #[test]
    fn test_empty_patterns_never_block() {
        let guardrails = Guardrails {
            forbidden_actions: Vec::new(),
            ..limits()
        };
        let step = Step::tap(ElementSelector::by_label("Delete everything"));
        assert!(guardrails.screen_step(&step).is_ok());
    }

    #[test]
    fn test_run_expired() {
        let guardrails = Guardrails {
            run_timeout: Duration::ZERO,
            ..limits()
        };
        let started = Instant::now() - Duration::from_millis(10);
        assert!(guardrails.run_expired(started));

        let generous = Guardrails {
            run_timeout: Duration::from_secs(600),
            ..limits()
        };
        assert!(!generous.run_expired(Instant::now()));
    }
}
