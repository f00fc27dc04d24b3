//! Scripted in-memory device for tests and dry runs.
//!
//! `MockDevice` plays the role a real automation bridge plays in
//! production: it holds a sequence of scripted screens, answers element
//! lookups against the current screen, records every primitive it is asked
//! to perform, and can inject transport failures on demand.

use std::collections::VecDeque;
use std::time::Duration;

use super::types::{
    AccessibilityTree, AutomationBackend, BackendError, BackendResult, DeviceButton,
    GestureDirection, Locator, ProbeStrategy, UiElement,
};

/// Minimal valid PNG (1x1 pixel), used as the default screenshot payload
const TINY_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00, 0x90,
    0x77, 0x53, 0xDE, 0x00, 0x00, 0x00, 0x0C, 0x49, 0x44, 0x41, 0x54, 0x08, 0xD7, 0x63, 0xF8,
    0xCF, 0xC0, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x9A, 0x60, 0xE1, 0xD5, 0x00, 0x00, 0x00,
    0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// A scripted element on a mock screen
#[derive(Debug, Clone, Default)]
pub struct MockElement {
    /// Stable identifier
    pub identifier: Option<String>,
    /// Accessibility label
    pub accessibility_label: Option<String>,
    /// Visible text label
    pub label: Option<String>,
    /// Path expression
    pub path: Option<String>,
}

impl MockElement {
    /// Create an empty element
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stable identifier
    pub fn identifier(mut self, id: impl Into<String>) -> Self {
        self.identifier = Some(id.into());
        self
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

    fn attribute(&self, strategy: ProbeStrategy) -> Option<&str> {
        match strategy {
            ProbeStrategy::Identifier => self.identifier.as_deref(),
            ProbeStrategy::AccessibilityLabel => self.accessibility_label.as_deref(),
            ProbeStrategy::Label => self.label.as_deref(),
            ProbeStrategy::Path => self.path.as_deref(),
        }
    }

    fn render(&self, out: &mut String) {
        out.push_str("<element");
        if let Some(id) = &self.identifier {
            out.push_str(&format!(" identifier='{}'", id));
        }
        if let Some(axl) = &self.accessibility_label {
            out.push_str(&format!(" accessibilityLabel='{}'", axl));
        }
        if let Some(label) = &self.label {
            out.push_str(&format!(" label='{}'", label));
        }
        if let Some(path) = &self.path {
            out.push_str(&format!(" path='{}'", path));
        }
        out.push_str("/>");
    }
}

/// One scripted screen state
#[derive(Debug, Clone, Default)]
pub struct MockScreen {
    /// Screen name, rendered into the tree
    pub name: String,
    /// Elements visible on this screen
    pub elements: Vec<MockElement>,
    /// Extra raw text injected into the tree (banners, alerts)
    pub banner: Option<String>,
}

impl MockScreen {
    /// Create a named screen
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an element
    pub fn with(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// Inject extra raw text into the rendered tree
    pub fn banner(mut self, text: impl Into<String>) -> Self {
        self.banner = Some(text.into());
        self
    }

    /// Render this screen as a serialized element tree
    pub fn render(&self) -> String {
        let mut out = format!("<screen name='{}'>", self.name);
        for element in &self.elements {
            element.render(&mut out);
        }
        if let Some(banner) = &self.banner {
            out.push_str(banner);
        }
        out.push_str("</screen>");
        out
    }
}

/// A scripted in-memory device.
///
/// The device starts on the first pushed screen and advances to the next
/// one after each successful action primitive (tap, type, scroll, swipe,
/// button press), saturating at the last screen. Every primitive issued is
/// recorded for assertions.
#[derive(Debug, Default)]
pub struct MockDevice {
    screens: Vec<MockScreen>,
    current: usize,
    auto_advance: bool,
    calls: Vec<String>,
    fail_finds: VecDeque<()>,
    fail_trees: VecDeque<()>,
    fail_actions: VecDeque<()>,
    fail_screenshot: bool,
    screenshot_data: Option<Vec<u8>>,
}

impl MockDevice {
    /// Create an empty device (blank tree until screens are pushed)
    pub fn new() -> Self {
        Self {
            auto_advance: true,
            ..Default::default()
        }
    }

    /// Create a device showing a single screen for the whole run
    pub fn with_screen(screen: MockScreen) -> Self {
        let mut device = Self::new();
        device.push_screen(screen);
        device
    }

    /// Append a screen to the script
    pub fn push_screen(&mut self, screen: MockScreen) -> &mut Self {
        self.screens.push(screen);
        self
    }

    /// Disable advancing to the next screen after each action
    pub fn freeze_screen(&mut self) -> &mut Self {
        self.auto_advance = false;
        self
    }

    /// Fail the next `n` element lookups with a transport error
    pub fn fail_next_finds(&mut self, n: usize) -> &mut Self {
        self.fail_finds = (0..n).map(|_| ()).collect();
        self
    }

    /// Fail the next `n` tree fetches with a transport error
    pub fn fail_next_trees(&mut self, n: usize) -> &mut Self {
        self.fail_trees = (0..n).map(|_| ()).collect();
        self
    }

    /// Fail the next `n` action primitives with a transport error
    pub fn fail_next_actions(&mut self, n: usize) -> &mut Self {
        self.fail_actions = (0..n).map(|_| ()).collect();
        self
    }

    /// Make screenshot capture fail
    pub fn fail_screenshot(&mut self, fail: bool) -> &mut Self {
        self.fail_screenshot = fail;
        self
    }

    /// Override the screenshot payload
    pub fn screenshot_data(&mut self, data: Vec<u8>) -> &mut Self {
        self.screenshot_data = Some(data);
        self
    }

    /// Every primitive issued so far, in order
    pub fn calls(&self) -> &[String] {
        &self.calls
    }

    /// Index of the screen currently shown
    pub fn current_screen(&self) -> usize {
        self.current
    }

    fn screen(&self) -> Option<&MockScreen> {
        self.screens.get(self.current)
    }

    fn advance(&mut self) {
        if self.auto_advance && self.current + 1 < self.screens.len() {
            self.current += 1;
        }
    }

    fn record_action(&mut self, call: String) -> BackendResult<()> {
        if self.fail_actions.pop_front().is_some() {
            return Err(BackendError::Transport(format!("injected failure: {}", call)));
        }
        self.calls.push(call);
        self.advance();
        Ok(())
    }
}

impl AutomationBackend for MockDevice {
    fn accessibility_tree(&mut self) -> BackendResult<AccessibilityTree> {
        if self.fail_trees.pop_front().is_some() {
            return Err(BackendError::Transport("injected tree failure".to_string()));
        }
        let raw = self.screen().map(MockScreen::render).unwrap_or_default();
        Ok(AccessibilityTree::new(raw))
    }

    fn find(&mut self, locator: &Locator, _timeout: Duration) -> BackendResult<Option<UiElement>> {
        if self.fail_finds.pop_front().is_some() {
            return Err(BackendError::Transport(format!(
                "injected find failure: {}",
                locator
            )));
        }
        self.calls.push(format!("find {}", locator));
        let found = self.screen().and_then(|screen| {
            screen
                .elements
                .iter()
                .find(|element| element.attribute(locator.strategy) == Some(locator.value.as_str()))
        });
        Ok(found.map(|element| UiElement {
            identifier: element.identifier.clone(),
            label: element.label.clone().or_else(|| element.accessibility_label.clone()),
        }))
    }

    fn tap(&mut self, locator: &Locator) -> BackendResult<()> {
        self.record_action(format!("tap {}", locator))
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> BackendResult<()> {
        self.record_action(format!("type {} '{}'", locator, text))
    }

    fn scroll(&mut self, direction: GestureDirection) -> BackendResult<()> {
        self.record_action(format!("scroll {}", direction))
    }

    fn swipe(&mut self, direction: GestureDirection) -> BackendResult<()> {
        self.record_action(format!("swipe {}", direction))
    }

    fn press_button(&mut self, button: DeviceButton) -> BackendResult<()> {
        self.record_action(format!("press {}", button))
    }

    fn screenshot(&mut self) -> BackendResult<Vec<u8>> {
        if self.fail_screenshot {
            return Err(BackendError::Transport("injected screenshot failure".to_string()));
        }
        self.calls.push("screenshot".to_string());
        Ok(self
            .screenshot_data
            .clone()
            .unwrap_or_else(|| TINY_PNG.to_vec()))
    }

    fn source_type(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_screen() -> MockScreen {
        MockScreen::named("login")
            .with(
                MockElement::new()
                    .identifier("login_button")
                    .label("Log In"),
            )
            .with(MockElement::new().accessibility_label("Email field"))
    }

    #[test]
    fn test_find_by_each_strategy() {
        let mut device = MockDevice::with_screen(login_screen());

        let hit = device
            .find(
                &Locator::new(ProbeStrategy::Identifier, "login_button"),
                Duration::from_secs(1),
            )
            .unwrap();
        assert!(hit.is_some());

        let hit = device
            .find(
                &Locator::new(ProbeStrategy::Label, "Log In"),
                Duration::from_secs(1),
            )
            .unwrap();
        assert_eq!(hit.unwrap().identifier.as_deref(), Some("login_button"));

        let miss = device
            .find(
                &Locator::new(ProbeStrategy::Path, "//cell[3]"),
                Duration::from_secs(1),
            )
            .unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn test_screens_advance_on_actions() {
        let mut device = MockDevice::new();
        device.push_screen(login_screen());
        device.push_screen(MockScreen::named("home"));

        assert_eq!(device.current_screen(), 0);
        device
            .tap(&Locator::new(ProbeStrategy::Identifier, "login_button"))
            .unwrap();
        assert_eq!(device.current_screen(), 1);

        // Saturates at the last screen
        device.scroll(GestureDirection::Down).unwrap();
        assert_eq!(device.current_screen(), 1);
    }

    #[test]
    fn test_injected_failures_drain() {
        let mut device = MockDevice::with_screen(login_screen());
        device.fail_next_finds(1);

        let locator = Locator::new(ProbeStrategy::Identifier, "login_button");
        assert!(device.find(&locator, Duration::from_secs(1)).is_err());
        assert!(device.find(&locator, Duration::from_secs(1)).unwrap().is_some());
    }

    #[test]
    fn test_rendered_tree_contains_labels() {
        let mut device = MockDevice::with_screen(login_screen());
        let tree = device.accessibility_tree().unwrap();
        assert!(tree.contains("Log In"));
        assert!(tree.contains("login_button"));
        assert!(tree.contains_ci("email FIELD"));
    }

    #[test]
    fn test_blank_tree_without_screens() {
        let mut device = MockDevice::new();
        assert!(device.accessibility_tree().unwrap().is_blank());
    }

    #[test]
    fn test_screenshot_payload_is_png() {
        let mut device = MockDevice::with_screen(login_screen());
        let bytes = device.screenshot().unwrap();
        assert_eq!(&bytes[0..4], &[0x89, 0x50, 0x4E, 0x47]);
    }
}
