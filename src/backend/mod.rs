pub mod http;
pub mod mock;
pub mod types;

pub use http::{HttpBackend, HttpBackendConfig};
pub use mock::{MockDevice, MockElement, MockScreen};
pub use types::{
    AccessibilityTree, AutomationBackend, BackendError, BackendResult, DeviceButton,
    GestureDirection, Locator, ProbeStrategy, UiElement,
};
