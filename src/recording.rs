//! Recording data model: steps, selectors, checkpoints.
//!
//! A recording is an ordered list of declarative steps, loaded from JSON and
//! immutable once a playback run starts. The template hash is a content
//! digest of the step sequence; any edit to the steps changes the hash and
//! invalidates previously cached selector resolutions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// The primitive UI action a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    /// Tap the resolved element
    Tap,
    /// Type the step value into the resolved element
    Type,
    /// Scroll in the direction given by the step value
    Scroll,
    /// Swipe in the direction given by the step value
    Swipe,
    /// Press the hardware/navigation back button
    Back,
    /// Press the home button
    Home,
    /// Sleep for the duration given by the step value (milliseconds)
    Wait,
}

impl StepAction {
    /// Stable lowercase name, as used in artifact filenames and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Tap => "tap",
            StepAction::Type => "type",
            StepAction::Scroll => "scroll",
            StepAction::Swipe => "swipe",
            StepAction::Back => "back",
            StepAction::Home => "home",
            StepAction::Wait => "wait",
        }
    }

    /// Whether this action targets an on-screen element
    pub fn needs_selector(&self) -> bool {
        matches!(self, StepAction::Tap | StepAction::Type)
    }
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw bounding box of a recorded element, in points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Candidate identifiers for one on-screen element.
///
/// Candidates are ordered by stability: stable identifier, accessibility
/// label, visible text label, path expression. The bounding box is carried
/// for diagnostics only. Any subset may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSelector {
    /// Stable identifier assigned by the app (most trustworthy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Accessibility label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_label: Option<String>,

    /// Visible text label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Generic path expression into the element tree (least stable)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Recorded bounding box, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
}

impl ElementSelector {
    /// Selector with only a stable identifier
    pub fn by_identifier(id: impl Into<String>) -> Self {
        Self {
            identifier: Some(id.into()),
            ..Default::default()
        }
    }

    /// Selector with only a visible text label
    pub fn by_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Default::default()
        }
    }

    /// Set the accessibility label
    pub fn accessibility_label(mut self, label: impl Into<String>) -> Self {
        self.accessibility_label = Some(label.into());
        self
    }

    /// Set the visible text label
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the path expression
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// True when no candidate identifier is present
    pub fn is_empty(&self) -> bool {
        self.identifier.is_none()
            && self.accessibility_label.is_none()
            && self.label.is_none()
            && self.path.is_none()
    }

    /// The most human-readable candidate, for logs and guardrail screening
    pub fn display_label(&self) -> Option<&str> {
        self.label
            .as_deref()
            .or(self.accessibility_label.as_deref())
            .or(self.identifier.as_deref())
            .or(self.path.as_deref())
    }

    /// Content digest of the candidate bundle (hex SHA-256).
    ///
    /// Cache entries carry this digest so a cached resolution is only
    /// replayed against the selector it was produced for.
    pub fn digest(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Display for ElementSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = &self.identifier {
            parts.push(format!("identifier={}", id));
        }
        if let Some(axl) = &self.accessibility_label {
            parts.push(format!("accessibilityLabel={}", axl));
        }
        if let Some(label) = &self.label {
            parts.push(format!("label={}", label));
        }
        if let Some(path) = &self.path {
            parts.push(format!("path={}", path));
        }
        if parts.is_empty() {
            write!(f, "<empty selector>")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Optional per-step assertion set, checked after the action executes.
///
/// All checks are substring checks against the serialized element tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Every entry must appear in the tree
    #[serde(default)]
    pub required_elements: Vec<String>,

    /// No entry may appear in the tree
    #[serde(default)]
    pub forbidden_elements: Vec<String>,

    /// If set, must appear in the tree (screen title or marker)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_screen: Option<String>,
}

impl Checkpoint {
    /// True when the checkpoint asserts nothing
    pub fn is_empty(&self) -> bool {
        self.required_elements.is_empty()
            && self.forbidden_elements.is_empty()
            && self.expected_screen.is_none()
    }
}

/// One declarative playback step. Immutable once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// The action to perform
    pub action: StepAction,

    /// Target element candidates (required for tap/type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<ElementSelector>,

    /// Literal value: text for `type`, direction for `scroll`/`swipe`,
    /// milliseconds for `wait`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Post-action assertions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,

    /// Capture a screenshot artifact after this step succeeds
    #[serde(default)]
    pub capture: bool,
}

impl Step {
    /// Create a bare step for the given action
    pub fn new(action: StepAction) -> Self {
        Self {
            action,
            selector: None,
            value: None,
            checkpoint: None,
            capture: false,
        }
    }

    /// Tap step targeting the given selector
    pub fn tap(selector: ElementSelector) -> Self {
        Self {
            selector: Some(selector),
            ..Self::new(StepAction::Tap)
        }
    }

    /// Type step targeting the given selector
    pub fn type_text(selector: ElementSelector, text: impl Into<String>) -> Self {
        Self {
            selector: Some(selector),
            value: Some(text.into()),
            ..Self::new(StepAction::Type)
        }
    }

    /// Wait step sleeping for the given milliseconds
    pub fn wait_ms(ms: u64) -> Self {
        Self {
            value: Some(ms.to_string()),
            ..Self::new(StepAction::Wait)
        }
    }

    /// Set the checkpoint
    pub fn checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Mark this step as screenshot-bearing
    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Wait duration in milliseconds, falling back to the configured default
    pub fn wait_ms_or(&self, default_ms: u64) -> u64 {
        self.value
            .as_deref()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default_ms)
    }
}

/// A recorded walkthrough: ordered, 0-indexed steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Stable identifier for this recording (cache key component)
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// The step sequence
    pub steps: Vec<Step>,
}

impl Recording {
    /// Create a recording from parts
    pub fn new(id: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            steps,
        }
    }

    /// Load and validate a recording from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> RecordingResult<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&data)
    }

    /// Parse and validate a recording from a JSON string
    pub fn from_json_str(data: &str) -> RecordingResult<Self> {
        let recording: Recording = serde_json::from_str(data)?;
        recording.validate()?;
        Ok(recording)
    }

    /// Number of steps
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Content digest of the step sequence (hex SHA-256).
    ///
    /// Selector caches are keyed by this hash; editing any step produces a
    /// different hash, so stale entries surface as misses, not corruption.
    pub fn template_hash(&self) -> String {
        let canonical = serde_json::to_string(&self.steps).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Check structural invariants: element-targeting steps need a non-empty
    /// selector bundle, `type` steps need a value
    pub fn validate(&self) -> RecordingResult<()> {
        if self.id.trim().is_empty() {
            return Err(RecordingError::Invalid("recording id is empty".to_string()));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.action.needs_selector() {
                match &step.selector {
                    Some(selector) if !selector.is_empty() => {}
                    _ => {
                        return Err(RecordingError::Invalid(format!(
                            "step {} ({}) has no usable selector",
                            index, step.action
                        )));
                    }
                }
            }
            if step.action == StepAction::Type && step.value.is_none() {
                return Err(RecordingError::Invalid(format!(
                    "step {} (type) has no value",
                    index
                )));
            }
        }
        Ok(())
    }
}

/// Result type for recording operations
pub type RecordingResult<T> = Result<T, RecordingError>;

/// Error types for recording operations
#[derive(Debug)]
pub enum RecordingError {
    /// I/O error reading the recording file
    Io(std::io::Error),

    /// JSON parse error
    Parse(serde_json::Error),

    /// Structural validation failure
    Invalid(String),
}

impl std::fmt::Display for RecordingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingError::Io(err) => write!(f, "I/O error: {}", err),
            RecordingError::Parse(err) => write!(f, "Parse error: {}", err),
            RecordingError::Invalid(msg) => write!(f, "Invalid recording: {}", msg),
        }
    }
}

impl std::error::Error for RecordingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordingError::Io(err) => Some(err),
            RecordingError::Parse(err) => Some(err),
            RecordingError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(err: std::io::Error) -> Self {
        RecordingError::Io(err)
    }
}

impl From<serde_json::Error> for RecordingError {
    fn from(err: serde_json::Error) -> Self {
        RecordingError::Parse(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_recording() -> Recording {
        Recording::new(
            "onboarding",
            vec![
                Step::tap(ElementSelector::by_identifier("login_button")),
                Step::type_text(ElementSelector::by_identifier("email_field"), "a@b.c"),
                Step::wait_ms(250),
            ],
        )
    }

    #[test]
    fn test_template_hash_changes_with_steps() {
        let recording = sample_recording();
        let original = recording.template_hash();

        let mut edited = recording.clone();
        edited.steps[2] = Step::wait_ms(300);
        assert_ne!(original, edited.template_hash());

        // Hash covers steps only, not the name
        let mut renamed = recording.clone();
        renamed.name = "renamed".to_string();
        assert_eq!(original, renamed.template_hash());
    }

    #[test]
    fn test_selector_digest_is_stable() {
        let a = ElementSelector::by_identifier("login").label("Log In");
        let b = ElementSelector::by_identifier("login").label("Log In");
        assert_eq!(a.digest(), b.digest());

        let c = ElementSelector::by_identifier("login").label("Sign In");
        assert_ne!(a.digest(), c.digest());
    }

    #[test]
    fn test_validate_rejects_empty_selector() {
        let recording = Recording::new("bad", vec![Step::new(StepAction::Tap)]);
        assert!(matches!(
            recording.validate(),
            Err(RecordingError::Invalid(_))
        ));
    }

    #[test]
    fn test_validate_rejects_type_without_value() {
        let mut step = Step::tap(ElementSelector::by_identifier("field"));
        step.action = StepAction::Type;
        let recording = Recording::new("bad", vec![step]);
        assert!(matches!(
            recording.validate(),
            Err(RecordingError::Invalid(_))
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let json = r#"{
            "id": "checkout",
            "name": "Checkout flow",
            "steps": [
                {"action": "tap", "selector": {"identifier": "cart"}, "capture": true},
                {"action": "scroll", "value": "down"},
                {"action": "wait", "value": "500"},
                {"action": "back"}
            ]
        }"#;
        let recording = Recording::from_json_str(json).unwrap();
        assert_eq!(recording.step_count(), 4);
        assert_eq!(recording.steps[0].action, StepAction::Tap);
        assert!(recording.steps[0].capture);
        assert_eq!(recording.steps[2].wait_ms_or(1000), 500);
    }

    #[test]
    fn test_display_label_priority() {
        let selector = ElementSelector::by_identifier("id_x").label("Visible");
        assert_eq!(selector.display_label(), Some("Visible"));

        let selector = ElementSelector::by_identifier("id_x");
        assert_eq!(selector.display_label(), Some("id_x"));

        assert_eq!(ElementSelector::default().display_label(), None);
    }
}
