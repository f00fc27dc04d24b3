// Core types for the automation backend abstraction

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Snapshot of the on-screen element tree, serialized by the backend.
///
/// Used both for element lookup diagnostics and for post-action
/// verification. The lowercase shadow is computed once so repeated
/// case-insensitive scans stay cheap.
#[derive(Debug, Clone)]
pub struct AccessibilityTree {
    raw: String,
    lowered: String,
}

impl AccessibilityTree {
    /// Wrap a serialized tree
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let lowered = raw.to_lowercase();
        Self { raw, lowered }
    }

    /// The serialized tree as received from the backend
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True when the tree is empty or whitespace (possible app crash)
    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }

    /// Case-sensitive substring check
    pub fn contains(&self, needle: &str) -> bool {
        self.raw.contains(needle)
    }

    /// Case-insensitive substring check
    pub fn contains_ci(&self, needle: &str) -> bool {
        self.lowered.contains(&needle.to_lowercase())
    }
}

/// The single lookup strategy a probe uses against the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProbeStrategy {
    /// Stable identifier lookup
    Identifier,
    /// Accessibility label lookup
    AccessibilityLabel,
    /// Rendered text lookup
    Label,
    /// Path expression lookup
    Path,
}

impl ProbeStrategy {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStrategy::Identifier => "identifier",
            ProbeStrategy::AccessibilityLabel => "accessibilityLabel",
            ProbeStrategy::Label => "label",
            ProbeStrategy::Path => "path",
        }
    }
}

impl std::fmt::Display for ProbeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProbeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identifier" => Ok(ProbeStrategy::Identifier),
            "accessibilityLabel" => Ok(ProbeStrategy::AccessibilityLabel),
            "label" => Ok(ProbeStrategy::Label),
            "path" => Ok(ProbeStrategy::Path),
            other => Err(format!("unknown probe strategy '{}'", other)),
        }
    }
}

/// A concrete element address: one strategy plus one selector string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    /// How to look the element up
    pub strategy: ProbeStrategy,
    /// The selector string for that strategy
    pub value: String,
}

impl Locator {
    /// Create a locator
    pub fn new(strategy: ProbeStrategy, value: impl Into<String>) -> Self {
        Self {
            strategy,
            value: value.into(),
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.strategy, self.value)
    }
}

/// A located on-screen element, as reported by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiElement {
    /// Stable identifier, if the element has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Visible or accessibility label, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Direction for scroll and swipe gestures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GestureDirection {
    Up,
    Down,
    Left,
    Right,
}

impl GestureDirection {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            GestureDirection::Up => "up",
            GestureDirection::Down => "down",
            GestureDirection::Left => "left",
            GestureDirection::Right => "right",
        }
    }

    /// Parse a direction, falling back to `Down` for absent or unknown input
    pub fn parse_or_down(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("up") => GestureDirection::Up,
            Some("left") => GestureDirection::Left,
            Some("right") => GestureDirection::Right,
            _ => GestureDirection::Down,
        }
    }
}

impl std::fmt::Display for GestureDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware/navigation buttons the backend can press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceButton {
    Back,
    Home,
}

impl DeviceButton {
    /// Stable wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceButton::Back => "back",
            DeviceButton::Home => "home",
        }
    }
}

impl std::fmt::Display for DeviceButton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug)]
pub enum BackendError {
    /// Transport failure talking to the bridge
    Transport(String),

    /// The bridge replied with something unparseable
    Protocol(String),

    /// The operation exceeded its time budget
    Timeout(Duration),

    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Transport(msg) => write!(f, "Transport error: {}", msg),
            BackendError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BackendError::Timeout(d) => write!(f, "Timed out after {:?}", d),
            BackendError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackendError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err)
    }
}

/// Trait for automation backends.
///
/// This is the single abstraction point for device-dependent operations.
/// `find` returns `Ok(Some(..))` on a match, `Ok(None)` when the selector
/// matched nothing, and `Err` on transport failure; the resolution cascade
/// treats transport failures as "not found" and falls through.
///
/// Implementations:
/// - `HttpBackend` drives a live automation bridge server
/// - `MockDevice` is a scripted in-memory device for tests
pub trait AutomationBackend {
    /// Fetch the current serialized element tree
    fn accessibility_tree(&mut self) -> BackendResult<AccessibilityTree>;

    /// Look up an element, bounded by `timeout`
    fn find(&mut self, locator: &Locator, timeout: Duration) -> BackendResult<Option<UiElement>>;

    /// Tap the element addressed by `locator`
    fn tap(&mut self, locator: &Locator) -> BackendResult<()>;

    /// Type text into the element addressed by `locator`
    fn type_text(&mut self, locator: &Locator, text: &str) -> BackendResult<()>;

    /// Scroll the active view
    fn scroll(&mut self, direction: GestureDirection) -> BackendResult<()>;

    /// Swipe across the active view
    fn swipe(&mut self, direction: GestureDirection) -> BackendResult<()>;

    /// Press a hardware/navigation button
    fn press_button(&mut self, button: DeviceButton) -> BackendResult<()>;

    /// Capture a PNG screenshot of the current screen
    fn screenshot(&mut self) -> BackendResult<Vec<u8>>;

    /// Get the source type identifier (e.g., "bridge", "mock")
    fn source_type(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_contains_ci() {
        let tree = AccessibilityTree::new("<screen><button label='Log In'/></screen>");
        assert!(tree.contains_ci("log in"));
        assert!(tree.contains_ci("LOG IN"));
        assert!(tree.contains("Log In"));
        assert!(!tree.contains("log in"));
        assert!(!tree.is_blank());
    }

    #[test]
    fn test_blank_tree() {
        assert!(AccessibilityTree::new("   \n ").is_blank());
        assert!(AccessibilityTree::new("").is_blank());
    }

    #[test]
    fn test_probe_strategy_roundtrip() {
        for strategy in [
            ProbeStrategy::Identifier,
            ProbeStrategy::AccessibilityLabel,
            ProbeStrategy::Label,
            ProbeStrategy::Path,
        ] {
            let parsed: ProbeStrategy = strategy.as_str().parse().unwrap();
            assert_eq!(parsed, strategy);
        }
        assert!("bounds".parse::<ProbeStrategy>().is_err());
    }

    #[test]
    fn test_gesture_direction_parse() {
        assert_eq!(
            GestureDirection::parse_or_down(Some("UP")),
            GestureDirection::Up
        );
        assert_eq!(
            GestureDirection::parse_or_down(Some("sideways")),
            GestureDirection::Down
        );
        assert_eq!(GestureDirection::parse_or_down(None), GestureDirection::Down);
    }

    #[test]
    fn test_locator_display() {
        let locator = Locator::new(ProbeStrategy::Identifier, "login_button");
        assert_eq!(locator.to_string(), "identifier=login_button");
    }
}
