//! Per-verb option structs.
//!
//! Every struct carries explicit defaults and every verb substitutes the
//! default for a zero timeout. A zero-duration deadline aborts a CDP call
//! before it can begin, so an uninitialized timeout must never reach the
//! wire.

use std::time::Duration;

pub const NAVIGATE_TIMEOUT: Duration = Duration::from_secs(60);
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Operation defaults for one executor instance.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub navigate_timeout: Duration,
    pub operation_timeout: Duration,
    pub extraction_timeout: Duration,
    /// Interval between predicate polls in waits.
    pub poll_interval: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            navigate_timeout: NAVIGATE_TIMEOUT,
            operation_timeout: OPERATION_TIMEOUT,
            extraction_timeout: crate::semantic::DEFAULT_EXTRACTION_TIMEOUT,
            poll_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl WaitUntil {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "load" => Some(WaitUntil::Load),
            "domcontentloaded" => Some(WaitUntil::DomContentLoaded),
            "networkidle" => Some(WaitUntil::NetworkIdle),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle => "networkidle",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self { wait_until: WaitUntil::Load, timeout: NAVIGATE_TIMEOUT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(MouseButton::Left),
            "middle" => Some(MouseButton::Middle),
            "right" => Some(MouseButton::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Middle => "middle",
            MouseButton::Right => "right",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClickOptions {
    pub wait_visible: bool,
    pub wait_enabled: bool,
    pub button: MouseButton,
    pub click_count: u32,
    pub timeout: Duration,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            wait_visible: true,
            wait_enabled: true,
            button: MouseButton::Left,
            click_count: 1,
            timeout: OPERATION_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeOptions {
    /// Select-all and delete before typing.
    pub clear: bool,
    pub wait_visible: bool,
    pub timeout: Duration,
    /// Per-keystroke delay; zero types via a single value assignment.
    pub delay: Duration,
}

impl Default for TypeOptions {
    fn default() -> Self {
        Self {
            clear: true,
            wait_visible: true,
            timeout: OPERATION_TIMEOUT,
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectOptions {
    pub timeout: Duration,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self { timeout: OPERATION_TIMEOUT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    Visible,
    Hidden,
    Enabled,
    Attached,
    Detached,
}

impl WaitState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "visible" => Some(WaitState::Visible),
            "hidden" => Some(WaitState::Hidden),
            "enabled" => Some(WaitState::Enabled),
            "attached" => Some(WaitState::Attached),
            "detached" => Some(WaitState::Detached),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Enabled => "enabled",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WaitForOptions {
    pub state: WaitState,
    pub timeout: Duration,
}

impl Default for WaitForOptions {
    fn default() -> Self {
        Self { state: WaitState::Visible, timeout: OPERATION_TIMEOUT }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractKind {
    Text,
    Html,
    Attribute,
    Property,
}

impl ExtractKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ExtractKind::Text),
            "html" => Some(ExtractKind::Html),
            "attribute" => Some(ExtractKind::Attribute),
            "property" => Some(ExtractKind::Property),
            _ => None,
        }
    }
}

/// One column of a compound-row extraction.
#[derive(Debug, Clone)]
pub struct ExtractField {
    pub name: String,
    pub selector: String,
    pub kind: ExtractKind,
    pub attr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub selector: String,
    pub kind: ExtractKind,
    /// Attribute or property name, required for those kinds.
    pub attr: Option<String>,
    pub multiple: bool,
    /// With `multiple`, extract each matched row into a field mapping
    /// instead of a single value.
    pub fields: Option<Vec<ExtractField>>,
    pub timeout: Duration,
}

impl ExtractOptions {
    pub fn new(selector: impl Into<String>) -> Self {
        Self { selector: selector.into(), ..Default::default() }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            selector: String::new(),
            kind: ExtractKind::Text,
            attr: None,
            multiple: false,
            fields: None,
            timeout: OPERATION_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "png" => Some(ImageFormat::Png),
            "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScreenshotOptions {
    pub full_page: bool,
    /// Compression quality for jpeg, ignored for png.
    pub quality: u32,
    pub format: ImageFormat,
    pub timeout: Duration,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            full_page: false,
            quality: 80,
            format: ImageFormat::Png,
            timeout: OPERATION_TIMEOUT,
        }
    }
}

/// Target of a scroll: a page edge or an element identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollTarget {
    Top,
    Bottom,
    Element(String),
}

impl ScrollTarget {
    pub fn parse(direction: &str) -> Self {
        match direction {
            "top" => ScrollTarget::Top,
            "bottom" => ScrollTarget::Bottom,
            other => ScrollTarget::Element(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ScrollTarget::Top => "top",
            ScrollTarget::Bottom => "bottom",
            ScrollTarget::Element(id) => id,
        }
    }
}

/// Zero timeouts never reach the wire.
pub(crate) fn effective_timeout(requested: Duration, default: Duration) -> Duration {
    if requested.is_zero() { default } else { requested }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_never_zero() {
        assert_eq!(NavigateOptions::default().timeout, Duration::from_secs(60));
        assert_eq!(ClickOptions::default().timeout, Duration::from_secs(30));
        assert_eq!(TypeOptions::default().timeout, Duration::from_secs(30));
        assert_eq!(SelectOptions::default().timeout, Duration::from_secs(30));
        assert_eq!(WaitForOptions::default().timeout, Duration::from_secs(30));
        assert!(!ExecutorConfig::default().navigate_timeout.is_zero());
        assert!(!ExecutorConfig::default().extraction_timeout.is_zero());
    }

    #[test]
    fn click_defaults() {
        let opts = ClickOptions::default();
        assert!(opts.wait_visible);
        assert!(opts.wait_enabled);
        assert_eq!(opts.button, MouseButton::Left);
        assert_eq!(opts.click_count, 1);
    }

    #[test]
    fn zero_timeout_is_substituted() {
        assert_eq!(
            effective_timeout(Duration::ZERO, NAVIGATE_TIMEOUT),
            NAVIGATE_TIMEOUT
        );
        assert_eq!(
            effective_timeout(Duration::from_secs(5), NAVIGATE_TIMEOUT),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn enum_parsing() {
        assert_eq!(WaitUntil::parse("load"), Some(WaitUntil::Load));
        assert_eq!(WaitUntil::parse("networkidle"), Some(WaitUntil::NetworkIdle));
        assert_eq!(WaitUntil::parse("eventually"), None);
        assert_eq!(WaitState::parse("hidden"), Some(WaitState::Hidden));
        assert_eq!(ScrollTarget::parse("top"), ScrollTarget::Top);
        assert_eq!(
            ScrollTarget::parse("#footer"),
            ScrollTarget::Element("#footer".to_string())
        );
    }
}
