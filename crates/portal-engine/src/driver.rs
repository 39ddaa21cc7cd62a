//! The browser-automation collaborator.
//!
//! Everything the engine does to a page goes through [`Driver`]. The real
//! implementation is [`BrowserDriver`] over an `eoka` page; tests use the
//! scripted [`mock::MockDriver`].

mod browser;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use browser::BrowserDriver;

use crate::locator::Strategy;
use crate::Result;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Handle to a resolved element: a CSS selector unique at resolution time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Element {
    pub selector: String,
    #[serde(default)]
    pub tag: String,
}

impl Element {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            tag: String::new(),
        }
    }

    /// Strategy matching descendants of this element.
    pub fn descendant(&self, css: &str) -> Strategy {
        Strategy::Css(format!("{} {}", self.selector, css))
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tag.is_empty() {
            f.write_str(&self.selector)
        } else {
            write!(f, "<{}> {}", self.tag, self.selector)
        }
    }
}

/// A completed download.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    /// Filename suggested by the server, if any.
    pub filename: Option<String>,
}

/// Operations the engine needs from a browser session.
///
/// `find` is a single non-waiting lookup; waiting is layered on top by
/// [`crate::locator`] and [`crate::readiness`].
#[allow(async_fn_in_trait)]
pub trait Driver {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// All elements currently matching `strategy`, in document order.
    async fn find(&self, strategy: &Strategy) -> Result<Vec<Element>>;

    /// Visible text of an element.
    async fn text_of(&self, element: &Element) -> Result<String>;

    async fn click(&self, element: &Element) -> Result<()>;

    /// Clear and type into an input.
    async fn fill(&self, element: &Element, value: &str) -> Result<()>;

    /// Press a named key (e.g. `Enter`, `ArrowDown`) on the focused element.
    async fn press_key(&self, key: &str) -> Result<()>;

    /// Visible text of the whole page.
    async fn page_text(&self) -> Result<String>;

    /// Full-page PNG.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// PNG clipped to the element's bounding box.
    async fn screenshot_element(&self, element: &Element) -> Result<Vec<u8>>;

    /// Trigger the download behind `link` and wait at most `timeout` for it.
    async fn download(&self, link: &Element, timeout: Duration) -> Result<Download>;
}
