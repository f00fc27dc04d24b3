//! Multi-strategy element resolution.
//!
//! Resolution runs a fixed cascade over the candidate identifiers of a
//! selector bundle: cached resolution, stable identifier, accessibility
//! label, visible text label, path expression. The first candidate the
//! backend can locate wins. Each probe is bounded by the remaining portion
//! of the step's time budget, and backend transport errors are treated as
//! "not found" so a flaky probe falls through instead of failing the step.
//!
//! The decision-service fallback is not part of this module; the step
//! executor consults it separately once the deterministic cascade is
//! exhausted.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backend::{AutomationBackend, Locator, ProbeStrategy};
use crate::cache::CacheEntry;
use crate::recording::ElementSelector;

/// How a selector was resolved, one variant per strategy.
///
/// Serialized as its wire string (`cached`, `identifier`,
/// `accessibilityLabel`, `label`, `path`, or the decision model name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionMethod {
    /// Replayed from the selector cache
    Cached,
    /// Located by stable identifier
    Identifier,
    /// Located by accessibility label
    AccessibilityLabel,
    /// Located by visible text label
    Label,
    /// Located by path expression
    Path,
    /// Proposed by a decision model; carries the model name
    Model(String),
}

impl ResolutionMethod {
    /// The wire string for this method
    pub fn as_wire(&self) -> &str {
        match self {
            ResolutionMethod::Cached => "cached",
            ResolutionMethod::Identifier => "identifier",
            ResolutionMethod::AccessibilityLabel => "accessibilityLabel",
            ResolutionMethod::Label => "label",
            ResolutionMethod::Path => "path",
            ResolutionMethod::Model(name) => name,
        }
    }

    /// The method corresponding to a deterministic probe strategy
    pub fn from_strategy(strategy: ProbeStrategy) -> Self {
        match strategy {
            ProbeStrategy::Identifier => ResolutionMethod::Identifier,
            ProbeStrategy::AccessibilityLabel => ResolutionMethod::AccessibilityLabel,
            ProbeStrategy::Label => ResolutionMethod::Label,
            ProbeStrategy::Path => ResolutionMethod::Path,
        }
    }
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

// Serialized as a bare string so results read naturally in JSON reports
impl Serialize for ResolutionMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for ResolutionMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            "cached" => Ok(ResolutionMethod::Cached),
            "identifier" => Ok(ResolutionMethod::Identifier),
            "accessibilityLabel" => Ok(ResolutionMethod::AccessibilityLabel),
            "label" => Ok(ResolutionMethod::Label),
            "path" => Ok(ResolutionMethod::Path),
            "" => Err(D::Error::custom("empty resolution method")),
            model => Ok(ResolutionMethod::Model(model.to_string())),
        }
    }
}

/// The outcome of one resolution attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSelector {
    /// The selector string that located the element
    pub selector: String,

    /// How the element was located
    pub method: ResolutionMethod,

    /// The concrete probe strategy behind the resolution; actions and
    /// cache entries address the element through this
    pub strategy: ProbeStrategy,

    /// Whether the decision-service fallback produced this resolution
    pub used_fallback: bool,
}

impl ResolvedSelector {
    /// The locator actions should use to address the element
    pub fn locator(&self) -> Locator {
        Locator::new(self.strategy, self.selector.clone())
    }
}

/// Result type for resolution
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Error types for resolution
#[derive(Debug)]
pub enum ResolveError {
    /// Every applicable candidate was probed without a match; carries the
    /// full original selector for diagnostics
    NotFound(ElementSelector),

    /// The step's time budget ran out mid-cascade
    Timeout(Duration),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolveError::NotFound(selector) => {
                write!(f, "no element matched [{}]", selector)
            }
            ResolveError::Timeout(budget) => {
                write!(f, "resolution exceeded its {:?} budget", budget)
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Run the deterministic cascade for one selector bundle.
///
/// `cached` is the prior resolution for this step, if any; it is probed
/// first and silently distrusted on any miss or backend error. The whole
/// cascade shares one time budget; a probe only runs if budget remains.
pub fn resolve(
    backend: &mut dyn AutomationBackend,
    selector: &ElementSelector,
    cached: Option<&CacheEntry>,
    budget: Duration,
) -> ResolveResult<ResolvedSelector> {
    let deadline = Instant::now() + budget;

    if let Some(entry) = cached {
        if entry.selector_digest == selector.digest() {
            let locator = Locator::new(entry.strategy, entry.resolved_selector.clone());
            match probe(backend, &locator, deadline, budget)? {
                true => {
                    debug!(%locator, "cache hit");
                    return Ok(ResolvedSelector {
                        selector: entry.resolved_selector.clone(),
                        method: ResolutionMethod::Cached,
                        strategy: entry.strategy,
                        used_fallback: false,
                    });
                }
                false => {
                    debug!(%locator, "cached selector no longer matches, falling through");
                }
            }
        } else {
            debug!("cache entry digest mismatch, ignoring entry");
        }
    }

    let candidates = [
        (ProbeStrategy::Identifier, selector.identifier.as_deref()),
        (
            ProbeStrategy::AccessibilityLabel,
            selector.accessibility_label.as_deref(),
        ),
        (ProbeStrategy::Label, selector.label.as_deref()),
        (ProbeStrategy::Path, selector.path.as_deref()),
    ];

    for (strategy, candidate) in candidates {
        let Some(value) = candidate else { continue };
        let locator = Locator::new(strategy, value);
        if probe(backend, &locator, deadline, budget)? {
            debug!(%locator, "resolved");
            return Ok(ResolvedSelector {
                selector: value.to_string(),
                method: ResolutionMethod::from_strategy(strategy),
                strategy,
                used_fallback: false,
            });
        }
    }

    Err(ResolveError::NotFound(selector.clone()))
}

/// Probe a single locator once, bounded by the remaining budget.
///
/// Transport errors count as "not found" so the cascade can fall through.
pub fn probe(
    backend: &mut dyn AutomationBackend,
    locator: &Locator,
    deadline: Instant,
    budget: Duration,
) -> ResolveResult<bool> {
    let now = Instant::now();
    if now >= deadline {
        return Err(ResolveError::Timeout(budget));
    }
    let remaining = deadline - now;

    match backend.find(locator, remaining) {
        Ok(Some(_)) => Ok(true),
        Ok(None) => Ok(false),
        Err(err) => {
            debug!(%locator, error = %err, "probe failed, treating as not found");
            Ok(false)
        }
    }
}
