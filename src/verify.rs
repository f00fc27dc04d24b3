//! Post-action state verification.
//!
//! After an action executes, the verifier fetches a fresh element tree and
//! asserts the app reached a sane state: the tree is non-blank, no known
//! failure text is showing, and any per-step checkpoint holds. A failure
//! here is recorded against the step even though the underlying action
//! succeeded, and is never retried.

use tracing::{debug, warn};

use crate::backend::AutomationBackend;
use crate::recording::Checkpoint;

/// Generic indicators that some alert or error surface is on screen.
/// Presence alone is not a failure; it gates the specific keyword scan.
const GENERIC_INDICATORS: &[&str] = &["alert", "error occurred"];

/// Specific failure keywords. Any match, when a generic indicator is also
/// present, fails verification.
const FAILURE_KEYWORDS: &[&str] = &[
    "cannot connect",
    "network error",
    "server error",
    "invalid",
    "failed to",
];

/// Result type for verification
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Error types for verification
#[derive(Debug)]
pub enum VerifyError {
    /// The tree came back empty; the app may have crashed
    BlankTree,

    /// A failure keyword was found alongside an alert indicator
    ErrorIndicator(String),

    /// A required checkpoint element is missing from the tree
    MissingRequired(String),

    /// A forbidden checkpoint element is present in the tree
    ForbiddenPresent(String),

    /// The expected screen marker is missing from the tree
    WrongScreen(String),

    /// The tree could not be fetched at all
    TreeFetch(String),
}

impl std::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyError::BlankTree => write!(f, "element tree is blank (possible crash)"),
            VerifyError::ErrorIndicator(keyword) => {
                write!(f, "error indicator on screen: '{}'", keyword)
            }
            VerifyError::MissingRequired(element) => {
                write!(f, "required element missing: '{}'", element)
            }
            VerifyError::ForbiddenPresent(element) => {
                write!(f, "forbidden element present: '{}'", element)
            }
            VerifyError::WrongScreen(screen) => {
                write!(f, "expected screen not reached: '{}'", screen)
            }
            VerifyError::TreeFetch(msg) => write!(f, "could not fetch tree: {}", msg),
        }
    }
}

impl std::error::Error for VerifyError {}

/// Verify the current app state after an action.
///
/// Checks run in a fixed order and short-circuit on the first violation:
/// tree fetch, blank tree, error indicators, then the checkpoint's
/// required elements, forbidden elements, and expected screen.
pub fn verify_state(
    backend: &mut dyn AutomationBackend,
    checkpoint: Option<&Checkpoint>,
) -> VerifyResult<()> {
    let tree = backend
        .accessibility_tree()
        .map_err(|e| VerifyError::TreeFetch(e.to_string()))?;

    if tree.is_blank() {
        warn!("blank element tree after action");
        return Err(VerifyError::BlankTree);
    }

    if GENERIC_INDICATORS
        .iter()
        .any(|indicator| tree.contains_ci(indicator))
    {
        for keyword in FAILURE_KEYWORDS {
            if tree.contains_ci(keyword) {
                warn!(keyword, "failure text on screen");
                return Err(VerifyError::ErrorIndicator((*keyword).to_string()));
            }
        }
        debug!("alert indicator present without failure keywords, accepting");
    }

    if let Some(checkpoint) = checkpoint {
        for required in &checkpoint.required_elements {
            if !tree.contains(required) {
                return Err(VerifyError::MissingRequired(required.clone()));
            }
        }
        for forbidden in &checkpoint.forbidden_elements {
            if tree.contains(forbidden) {
                return Err(VerifyError::ForbiddenPresent(forbidden.clone()));
            }
        }
        if let Some(expected) = &checkpoint.expected_screen {
            if !tree.contains(expected) {
                return Err(VerifyError::WrongScreen(expected.clone()));
            }
        }
    }

    Ok(())
}
