//! The playback step executor.
//!
//! Composes the guardrails, the resolution cascade, the decision-service
//! fallback, the verifier and the selector cache into a full run over one
//! recording. Execution is strictly sequential; the only suspension points
//! are backend calls, decision-service calls, and explicit wait steps.
//!
//! A run moves through `NotStarted → Running` and ends in one of
//! `Completed` (step list exhausted), `TimedOut` (run budget spent between
//! steps) or `Aborted` (terminal step failure under the abort policy).

use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backend::{AutomationBackend, DeviceButton, GestureDirection, Locator};
use crate::cache::{CacheEntry, CacheStore, SelectorCache};
use crate::cost::CostTracker;
use crate::decision::{DecisionRequest, DecisionService, DecisionTier};
use crate::guardrails::{GuardrailViolation, Guardrails};
use crate::recording::{ElementSelector, Recording, Step, StepAction};
use crate::report::{PlaybackResult, RunState, StepResult, StepStatus};
use crate::resolver::{self, ResolutionMethod, ResolveError, ResolvedSelector};
use crate::session::Session;
use crate::verify::{VerifyError, verify_state};

/// What happens to the run when a step fails terminally.
///
/// Chosen once at run configuration time, not per error: `Abort` stops at
/// the first failed step and keeps all results so far; `Continue` records
/// the failure and moves on, so one broken step does not doom the rest of
/// the artifact set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Abort,
    Continue,
}

/// Per-run execution options
#[derive(Debug, Clone)]
pub struct PlaybackOptions {
    /// Locale the run plays in (cache key component)
    pub locale: String,

    /// Execution limits
    pub guardrails: Guardrails,

    /// Retries per step for not-found/timeout failures
    /// (attempts = retries + 1)
    pub step_retries: u32,

    /// Fixed delay between retry attempts. UI settle time is roughly
    /// constant, so the delay is linear rather than exponential.
    pub retry_delay: Duration,

    /// Abort-vs-continue policy for failed steps
    pub failure_mode: FailureMode,

    /// Duration for `wait` steps that carry no value
    pub default_wait: Duration,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        let cfg = crate::config::get();
        Self {
            locale: "en-US".to_string(),
            guardrails: Guardrails::default(),
            step_retries: cfg.playback.step_retries,
            retry_delay: Duration::from_millis(cfg.playback.retry_delay_ms),
            failure_mode: FailureMode::Abort,
            default_wait: Duration::from_millis(cfg.playback.default_wait_ms),
        }
    }
}

impl PlaybackOptions {
    /// Set the locale
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Set the guardrails
    pub fn guardrails(mut self, guardrails: Guardrails) -> Self {
        self.guardrails = guardrails;
        self
    }

    /// Set the retry count
    pub fn step_retries(mut self, retries: u32) -> Self {
        self.step_retries = retries;
        self
    }

    /// Set the retry delay
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the failure policy
    pub fn failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }
}

/// Why a step failed
#[derive(Debug)]
pub enum StepError {
    /// A guardrail pattern blocked the step before any backend call
    Forbidden(GuardrailViolation),

    /// The deterministic cascade exhausted every candidate
    NotFound(ElementSelector),

    /// The step's time budget ran out
    Timeout(Duration),

    /// The backend failed executing the action primitive
    Action(String),

    /// The decision-service fallback could not produce a working selector
    FallbackFailed(String),

    /// The decision-service budget is spent
    CostCapExceeded { spent_usd: f64, cap_usd: f64 },

    /// The app state after the action failed verification
    Verification(VerifyError),
}

impl StepError {
    /// Stable error code for reports
    pub fn code(&self) -> &'static str {
        match self {
            StepError::Forbidden(_) => "FORBIDDEN_ACTION",
            // Transport failures and timeouts share the not-found class
            StepError::NotFound(_) | StepError::Timeout(_) | StepError::Action(_) => {
                "SELECTOR_NOT_FOUND"
            }
            StepError::FallbackFailed(_) => "AI_FALLBACK_FAILED",
            StepError::CostCapExceeded { .. } => "COST_CAP_EXCEEDED",
            StepError::Verification(_) => "VERIFICATION_FAILED",
        }
    }

    /// Whether the executor may retry the step after this error.
    ///
    /// Only the not-found/timeout class retries; forbidden actions are
    /// never attempted again and verification failures describe an action
    /// that already happened.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            StepError::NotFound(_) | StepError::Timeout(_) | StepError::Action(_)
        )
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", self.code())?;
        match self {
            StepError::Forbidden(violation) => write!(f, "{}", violation),
            StepError::NotFound(selector) => write!(f, "no element matched [{}]", selector),
            StepError::Timeout(budget) => write!(f, "step exceeded its {:?} budget", budget),
            StepError::Action(msg) => write!(f, "action failed: {}", msg),
            StepError::FallbackFailed(msg) => write!(f, "{}", msg),
            StepError::CostCapExceeded { spent_usd, cap_usd } => {
                write!(f, "spent ${:.4} of ${:.4} budget", spent_usd, cap_usd)
            }
            StepError::Verification(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for StepError {}

impl From<ResolveError> for StepError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(selector) => StepError::NotFound(selector),
            ResolveError::Timeout(budget) => StepError::Timeout(budget),
        }
    }
}

/// Executes one recording against a backend.
///
/// The executor exclusively owns the selector cache for the duration of the
/// run and persists it at the end only when no attempted step failed: a
/// cache is only as trustworthy as the run that produced it.
pub struct StepExecutor<'a> {
    backend: &'a mut dyn AutomationBackend,
    decision: Option<&'a mut dyn DecisionService>,
    store: &'a dyn CacheStore,
    session: &'a Session,
    options: PlaybackOptions,
    state: RunState,
    cost: CostTracker,
}

impl<'a> StepExecutor<'a> {
    /// Create an executor without decision-service fallback
    pub fn new(
        backend: &'a mut dyn AutomationBackend,
        store: &'a dyn CacheStore,
        session: &'a Session,
        options: PlaybackOptions,
    ) -> Self {
        Self {
            backend,
            decision: None,
            store,
            session,
            options,
            state: RunState::NotStarted,
            cost: CostTracker::default(),
        }
    }

    /// Enable decision-service fallback for this run
    pub fn with_fallback(mut self, decision: &'a mut dyn DecisionService) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Play the recording to completion or early termination
    pub fn run(&mut self, recording: &Recording) -> PlaybackResult {
        let started = Instant::now();

        if let Err(violation) = self.options.guardrails.preflight(recording) {
            warn!(%violation, "pre-flight check failed");
            self.state = RunState::Aborted;
            return self.build_result(
                recording,
                Vec::new(),
                Vec::new(),
                0,
                started,
                Some(format!("MAX_STEPS_EXCEEDED: {}", violation)),
            );
        }

        let template_hash = recording.template_hash();
        let mut cache = match self
            .store
            .load(&recording.id, &self.options.locale, &template_hash)
        {
            Ok(Some(cache)) => {
                info!(entries = cache.len(), "selector cache loaded");
                cache
            }
            Ok(None) => SelectorCache::new(&recording.id, &self.options.locale, &template_hash),
            Err(err) => {
                warn!(error = %err, "cache store unavailable, starting cold");
                SelectorCache::new(&recording.id, &self.options.locale, &template_hash)
            }
        };

        self.state = RunState::Running;
        info!(
            recording = %recording.id,
            locale = %self.options.locale,
            steps = recording.step_count(),
            "playback started"
        );

        let mut steps: Vec<StepResult> = Vec::new();
        let mut artifacts: Vec<PathBuf> = Vec::new();
        let mut capture_failures = 0usize;
        let mut run_error = None;

        for (index, step) in recording.steps.iter().enumerate() {
            if self.options.guardrails.run_expired(started) {
                info!(index, "run timeout reached, stopping gracefully");
                self.state = RunState::TimedOut;
                break;
            }

            let step_started = Instant::now();
            let outcome = self.execute_step(index, step, &cache);
            let duration_ms = step_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(resolved) => {
                    debug!(index, action = %step.action, "step succeeded");
                    if let (Some(resolved), Some(selector)) = (&resolved, &step.selector) {
                        cache.add_entry(CacheEntry::new(
                            index,
                            selector.digest(),
                            resolved.selector.clone(),
                            resolved.strategy,
                        ));
                    }

                    if step.capture {
                        match self.capture_artifact(index, step.action) {
                            Ok(path) => artifacts.push(path),
                            Err(msg) => {
                                // Capture is best-effort; the step keeps
                                // its verified status
                                warn!(index, error = %msg, "screenshot capture failed");
                                capture_failures += 1;
                            }
                        }
                    }

                    steps.push(StepResult {
                        step_index: index,
                        action: step.action,
                        status: StepStatus::Success,
                        duration_ms,
                        used_fallback: resolved
                            .as_ref()
                            .map(|r| r.used_fallback)
                            .unwrap_or(false),
                        resolved,
                        error: None,
                    });
                }
                Err(err) => {
                    warn!(index, action = %step.action, error = %err, "step failed");
                    let used_fallback = matches!(
                        err,
                        StepError::FallbackFailed(_) | StepError::CostCapExceeded { .. }
                    );
                    steps.push(StepResult {
                        step_index: index,
                        action: step.action,
                        status: StepStatus::Failed,
                        duration_ms,
                        resolved: None,
                        used_fallback,
                        error: Some(err.to_string()),
                    });

                    if self.options.failure_mode == FailureMode::Abort {
                        run_error = Some(err.to_string());
                        self.state = RunState::Aborted;
                        break;
                    }
                }
            }
        }

        if self.state == RunState::Running {
            self.state = RunState::Completed;
        }

        let failure_count = steps.iter().filter(|s| !s.succeeded()).count();
        if failure_count == 0 {
            if let Err(err) = self.store.save(&cache) {
                warn!(error = %err, "selector cache could not be persisted");
            }
        } else {
            // A run with failures never overwrites a previously good cache
            debug!(failure_count, "selector cache not persisted");
        }

        let result = self.build_result(recording, steps, artifacts, capture_failures, started, run_error);
        info!(
            state = %result.state,
            succeeded = result.success_count,
            failed = result.failure_count,
            "playback finished"
        );
        result
    }

    fn build_result(
        &self,
        recording: &Recording,
        steps: Vec<StepResult>,
        artifacts: Vec<PathBuf>,
        capture_failures: usize,
        started: Instant,
        error: Option<String>,
    ) -> PlaybackResult {
        let success_count = steps.iter().filter(|s| s.succeeded()).count();
        let failure_count = steps.len() - success_count;
        PlaybackResult {
            recording_id: recording.id.clone(),
            locale: self.options.locale.clone(),
            state: self.state,
            steps,
            artifacts,
            success_count,
            failure_count,
            capture_failures,
            duration_ms: started.elapsed().as_millis() as u64,
            fallback_calls: self.cost.call_count(),
            cost_usd: self.cost.total_usd(),
            error,
        }
    }

    /// Run one step: guardrail screen, bounded deterministic retries, then
    /// at most one decision-service consultation.
    fn execute_step(
        &mut self,
        index: usize,
        step: &Step,
        cache: &SelectorCache,
    ) -> Result<Option<ResolvedSelector>, StepError> {
        self.options
            .guardrails
            .screen_step(step)
            .map_err(StepError::Forbidden)?;

        let retries = self.options.step_retries;
        let mut attempt = 0u32;
        loop {
            let result = attempt_deterministic(
                &mut *self.backend,
                step,
                cache.entry(index),
                self.options.guardrails.step_timeout,
                self.options.default_wait,
            );

            match result {
                Ok(resolved) => return Ok(resolved),
                Err(err) if err.retryable() && attempt < retries => {
                    attempt += 1;
                    debug!(index, attempt, error = %err, "retrying step");
                    std::thread::sleep(self.options.retry_delay);
                }
                Err(err @ StepError::NotFound(_)) => {
                    // Deterministic candidates are spent; hand the original
                    // bundle to the decision service if one is attached
                    let Some(decision) = self.decision.as_deref_mut() else {
                        return Err(err);
                    };
                    let resolved = consult_fallback(
                        &mut *self.backend,
                        decision,
                        &mut self.cost,
                        &self.options.guardrails,
                        step,
                    )?;
                    perform_action(&mut *self.backend, step, Some(&resolved), self.options.default_wait)?;
                    check_state(&mut *self.backend, step)?;
                    return Ok(Some(resolved));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn capture_artifact(&mut self, index: usize, action: StepAction) -> Result<PathBuf, String> {
        let bytes = self.backend.screenshot().map_err(|e| e.to_string())?;
        let source = self.backend.source_type().to_string();
        self.session
            .save_step_artifact(index, action, &source, &bytes)
            .map_err(|e| e.to_string())
    }
}

/// One deterministic attempt: resolve (if the action targets an element),
/// perform the action, verify the resulting state.
fn attempt_deterministic(
    backend: &mut dyn AutomationBackend,
    step: &Step,
    cached: Option<&CacheEntry>,
    step_timeout: Duration,
    default_wait: Duration,
) -> Result<Option<ResolvedSelector>, StepError> {
    let resolved = match &step.selector {
        Some(selector) if step.action.needs_selector() => {
            Some(resolver::resolve(backend, selector, cached, step_timeout)?)
        }
        _ => None,
    };

    perform_action(backend, step, resolved.as_ref(), default_wait)?;
    check_state(backend, step)?;
    Ok(resolved)
}

/// Execute the step's action primitive against the backend
fn perform_action(
    backend: &mut dyn AutomationBackend,
    step: &Step,
    resolved: Option<&ResolvedSelector>,
    default_wait: Duration,
) -> Result<(), StepError> {
    let result = match (step.action, resolved) {
        (StepAction::Tap, Some(resolved)) => backend.tap(&resolved.locator()),
        (StepAction::Type, Some(resolved)) => {
            backend.type_text(&resolved.locator(), step.value.as_deref().unwrap_or_default())
        }
        (StepAction::Scroll, _) => {
            backend.scroll(GestureDirection::parse_or_down(step.value.as_deref()))
        }
        (StepAction::Swipe, _) => {
            backend.swipe(GestureDirection::parse_or_down(step.value.as_deref()))
        }
        (StepAction::Back, _) => backend.press_button(DeviceButton::Back),
        (StepAction::Home, _) => backend.press_button(DeviceButton::Home),
        (StepAction::Wait, _) => {
            let ms = step.wait_ms_or(default_wait.as_millis() as u64);
            std::thread::sleep(Duration::from_millis(ms));
            Ok(())
        }
        (action, None) => {
            // Recording validation guarantees a selector for these actions
            return Err(StepError::Action(format!(
                "{} step reached execution without a resolution",
                action
            )));
        }
    };

    result.map_err(|e| StepError::Action(e.to_string()))
}

/// Verify the post-action state, mapping into the step error taxonomy
fn check_state(backend: &mut dyn AutomationBackend, step: &Step) -> Result<(), StepError> {
    verify_state(backend, step.checkpoint.as_ref()).map_err(StepError::Verification)
}

/// Consult the decision service for a replacement selector.
///
/// The default tier is tried first; on failure a single escalation reuses
/// the same request, budget permitting. The proposed selector is probed
/// exactly once; there is no fallback within fallback.
fn consult_fallback(
    backend: &mut dyn AutomationBackend,
    decision: &mut dyn DecisionService,
    cost: &mut CostTracker,
    guardrails: &Guardrails,
    step: &Step,
) -> Result<ResolvedSelector, StepError> {
    let Some(selector) = step.selector.as_ref() else {
        return Err(StepError::FallbackFailed(
            "step carries no selector to recover".to_string(),
        ));
    };

    let cap_usd = guardrails.cost_cap_usd;
    if cost.is_over_budget(cap_usd) {
        return Err(StepError::CostCapExceeded {
            spent_usd: cost.total_usd(),
            cap_usd,
        });
    }

    let tree = backend
        .accessibility_tree()
        .map_err(|e| StepError::FallbackFailed(format!("could not fetch tree: {}", e)))?;
    let request = DecisionRequest {
        selector,
        tree: &tree,
    };

    let reply = match decision.propose(&request, DecisionTier::Default) {
        Ok(reply) => {
            cost.record_usage(DecisionTier::Default, reply.tokens);
            reply
        }
        Err(default_err) => {
            warn!(error = %default_err, "default decision tier failed");
            if cost.is_over_budget(cap_usd) {
                // Escalation refused rather than overspending
                return Err(StepError::CostCapExceeded {
                    spent_usd: cost.total_usd(),
                    cap_usd,
                });
            }
            info!("escalating to the stronger decision tier");
            match decision.propose(&request, DecisionTier::Escalated) {
                Ok(reply) => {
                    cost.record_usage(DecisionTier::Escalated, reply.tokens);
                    reply
                }
                Err(escalated_err) => {
                    return Err(StepError::FallbackFailed(format!(
                        "both tiers failed: {}; {}",
                        default_err, escalated_err
                    )));
                }
            }
        }
    };

    let locator = Locator::new(reply.strategy, reply.selector.clone());
    let deadline = Instant::now() + guardrails.step_timeout;
    match resolver::probe(backend, &locator, deadline, guardrails.step_timeout) {
        Ok(true) => Ok(ResolvedSelector {
            selector: reply.selector,
            method: ResolutionMethod::Model(reply.model),
            strategy: reply.strategy,
            used_fallback: true,
        }),
        Ok(false) => Err(StepError::FallbackFailed(format!(
            "proposed selector matched nothing: {}",
            locator
        ))),
        Err(err) => Err(StepError::FallbackFailed(err.to_string())),
    }
}
