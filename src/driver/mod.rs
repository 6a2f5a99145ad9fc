//! Page driver capability.
//!
//! Everything above this module talks to a rendered page through the
//! [`PageDriver`] → [`BrowserSession`] → [`Page`] traits and opaque
//! [`Locator`] values. Only the concrete driver (see [`chrome`]) knows how a
//! locator maps onto CSS, XPath or text filtering.

pub mod chrome;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Timed out after {0:?} waiting for page readiness")]
    Timeout(Duration),

    #[error("Page script failed: {0}")]
    Script(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser session closed: {0}")]
    Closed(String),
}

/// An opaque element locator.
///
/// Config files spell locators as strings: `xpath=<expr>` selects by XPath,
/// `<css>:has-text("<text>")` keeps CSS matches whose text contains `<text>`,
/// anything else is a plain CSS selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum Locator {
    Css(String),
    XPath(String),
    CssWithText { css: String, text: String },
}

const HAS_TEXT_OPEN: &str = ":has-text(\"";
const HAS_TEXT_CLOSE: &str = "\")";

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(expr) = raw.strip_prefix("xpath=") {
            return Locator::XPath(expr.to_string());
        }
        if raw.ends_with(HAS_TEXT_CLOSE) {
            if let Some(idx) = raw.rfind(HAS_TEXT_OPEN) {
                let css = raw[..idx].trim().to_string();
                let text = raw[idx + HAS_TEXT_OPEN.len()..raw.len() - HAS_TEXT_CLOSE.len()].to_string();
                if !css.is_empty() {
                    return Locator::CssWithText { css, text };
                }
            }
        }
        Locator::Css(raw.to_string())
    }
}

impl From<String> for Locator {
    fn from(raw: String) -> Self {
        Locator::parse(&raw)
    }
}

impl From<&str> for Locator {
    fn from(raw: &str) -> Self {
        Locator::parse(raw)
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(css) => write!(f, "{}", css),
            Locator::XPath(expr) => write!(f, "xpath={}", expr),
            Locator::CssWithText { css, text } => write!(f, "{}:has-text(\"{}\")", css, text),
        }
    }
}

/// A hyperlink as rendered on the page. `href` is the resolved absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Anchor {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub href: String,
}

/// One open page (tab).
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigate and wait for the load to settle, bounded by `timeout`.
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), DriverError>;

    /// Wait until any of `locators` matches. Returns the index of the one that did.
    async fn wait_for_any(&self, locators: &[Locator], timeout: Duration) -> Result<usize, DriverError>;

    /// Text content of the first match, `None` when nothing matches.
    async fn text(&self, locator: &Locator) -> Result<Option<String>, DriverError>;

    async fn attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>, DriverError>;

    async fn anchors(&self) -> Result<Vec<Anchor>, DriverError>;

    /// Visible text of the whole document.
    async fn inner_text(&self) -> Result<String, DriverError>;

    /// Serialized HTML of the whole document.
    async fn content(&self) -> Result<String, DriverError>;

    /// Scroll height of the first match, `None` when nothing matches.
    async fn scroll_extent(&self, locator: &Locator) -> Result<Option<f64>, DriverError>;

    async fn scroll_by(&self, locator: &Locator, dy: f64) -> Result<(), DriverError>;

    /// First element matched by `candidates` whose content overflows its box,
    /// returned as a locator that resolves to exactly that element.
    async fn find_overflowing(&self, candidates: &Locator) -> Result<Option<Locator>, DriverError>;

    /// Click the first match. Returns `false` when nothing matched.
    async fn click(&self, locator: &Locator) -> Result<bool, DriverError>;

    async fn clear_cookies(&self) -> Result<(), DriverError>;

    async fn screenshot(&self, path: &Path) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// A browser context that hands out pages.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn Page>, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// Factory for browser sessions. Each email worker opens its own.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn new_session(&self) -> Result<Arc<dyn BrowserSession>, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_css() {
        assert_eq!(Locator::parse("div[role=\"feed\"]"), Locator::Css("div[role=\"feed\"]".into()));
    }

    #[test]
    fn test_parse_xpath() {
        assert_eq!(
            Locator::parse("xpath=/html/body/div[2]"),
            Locator::XPath("/html/body/div[2]".into())
        );
    }

    #[test]
    fn test_parse_has_text() {
        assert_eq!(
            Locator::parse("button:has-text(\"Accept all\")"),
            Locator::CssWithText { css: "button".into(), text: "Accept all".into() }
        );
        assert_eq!(
            Locator::parse("button[jstcache]:has-text(\"address\")"),
            Locator::CssWithText { css: "button[jstcache]".into(), text: "address".into() }
        );
    }

    #[test]
    fn test_selector_list_stays_css() {
        let raw = "a[data-tooltip=\"Open website\"], a[data-tooltip=\"Open menu link\"]";
        assert_eq!(Locator::parse(raw), Locator::Css(raw.into()));
    }

    #[test]
    fn test_display_round_trips() {
        for raw in ["h1", "xpath=//h1", "span:has-text(\"Show more\")"] {
            assert_eq!(Locator::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            locators: Vec<Locator>,
        }
        let parsed: Wrapper = toml::from_str(r#"locators = ['h1', 'xpath=//main']"#).unwrap();
        assert_eq!(parsed.locators, vec![Locator::css("h1"), Locator::XPath("//main".into())]);
    }
}
