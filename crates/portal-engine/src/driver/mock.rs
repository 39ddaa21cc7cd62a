//! Scripted in-memory [`Driver`] for tests.
//!
//! Elements become visible after a configurable delay measured on the tokio
//! clock, so tests can run with paused time. Every lookup and action is
//! recorded for ordering assertions.

use super::{Download, Driver, Element};
use crate::locator::Strategy;
use crate::{Error, Result};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// One scripted element.
#[derive(Debug, Clone)]
pub struct MockElement {
    selector: String,
    text: String,
    strategies: Vec<Strategy>,
    appears_after: Duration,
    navigates_to: Option<String>,
    download: Option<Vec<u8>>,
}

impl MockElement {
    /// An element matched by `css:<selector>`.
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            text: String::new(),
            strategies: Vec::new(),
            appears_after: Duration::ZERO,
            navigates_to: None,
            download: None,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Also match this strategy.
    pub fn matching(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn appears_after(mut self, delay: Duration) -> Self {
        self.appears_after = delay;
        self
    }

    /// Clicking changes the current URL.
    pub fn navigates_to(mut self, url: impl Into<String>) -> Self {
        self.navigates_to = Some(url.into());
        self
    }

    /// Bytes delivered when this element is downloaded.
    pub fn download(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.download = Some(bytes.into());
        self
    }

    fn matches(&self, strategy: &Strategy) -> bool {
        self.strategies.contains(strategy)
            || matches!(strategy, Strategy::Css(css) if *css == self.selector)
    }
}

#[derive(Debug, Default)]
struct State {
    url: String,
    page_text: String,
    page_text_after: Duration,
    goto_delay: Duration,
    elements: Vec<MockElement>,
    screenshot_fails: bool,
    lookups: Vec<String>,
    actions: Vec<String>,
}

/// Scripted page.
#[derive(Debug)]
pub struct MockDriver {
    state: Mutex<State>,
    started: Instant,
}

impl MockDriver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State {
                url: url.into(),
                ..Default::default()
            }),
            started: Instant::now(),
        }
    }

    pub fn page_text(self, text: impl Into<String>) -> Self {
        self.lock().page_text = text.into();
        self
    }

    /// Page text reads empty until `delay` has passed.
    pub fn page_text_after(self, delay: Duration) -> Self {
        self.lock().page_text_after = delay;
        self
    }

    /// Every `goto` takes this long to return.
    pub fn slow_goto(self, delay: Duration) -> Self {
        self.lock().goto_delay = delay;
        self
    }

    pub fn element(self, element: MockElement) -> Self {
        self.lock().elements.push(element);
        self
    }

    pub fn failing_screenshots(self) -> Self {
        self.lock().screenshot_fails = true;
        self
    }

    /// Every strategy looked up, in order.
    pub fn lookups(&self) -> Vec<String> {
        self.lock().lookups.clone()
    }

    /// Every action performed, in order (`goto <url>`, `click <sel>`, ...).
    pub fn actions(&self) -> Vec<String> {
        self.lock().actions.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn visible(&self, element: &MockElement) -> bool {
        self.started.elapsed() >= element.appears_after
    }

    fn lookup(&self, selector: &str) -> Result<MockElement> {
        let state = self.lock();
        state
            .elements
            .iter()
            .find(|e| e.selector == selector && self.visible(e))
            .cloned()
            .ok_or_else(|| Error::Driver(format!("no element {}", selector)))
    }
}

impl Driver for MockDriver {
    async fn goto(&self, url: &str) -> Result<()> {
        let delay = self.lock().goto_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.lock();
        state.actions.push(format!("goto {}", url));
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.lock().url.clone())
    }

    async fn find(&self, strategy: &Strategy) -> Result<Vec<Element>> {
        let mut state = self.lock();
        state.lookups.push(strategy.to_string());
        Ok(state
            .elements
            .iter()
            .filter(|e| self.visible(e) && e.matches(strategy))
            .map(|e| Element::new(e.selector.clone()))
            .collect())
    }

    async fn text_of(&self, element: &Element) -> Result<String> {
        Ok(self.lookup(&element.selector)?.text)
    }

    async fn click(&self, element: &Element) -> Result<()> {
        let target = self.lookup(&element.selector)?;
        let mut state = self.lock();
        state.actions.push(format!("click {}", element.selector));
        if let Some(url) = target.navigates_to {
            state.url = url;
        }
        Ok(())
    }

    async fn fill(&self, element: &Element, value: &str) -> Result<()> {
        self.lookup(&element.selector)?;
        self.lock()
            .actions
            .push(format!("fill {}={}", element.selector, value));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.lock().actions.push(format!("press {}", key));
        Ok(())
    }

    async fn page_text(&self) -> Result<String> {
        let state = self.lock();
        if self.started.elapsed() >= state.page_text_after {
            Ok(state.page_text.clone())
        } else {
            Ok(String::new())
        }
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.actions.push("screenshot".into());
        if state.screenshot_fails {
            return Err(Error::Driver("screenshot unavailable".into()));
        }
        Ok(b"\x89PNG mock".to_vec())
    }

    async fn screenshot_element(&self, element: &Element) -> Result<Vec<u8>> {
        self.lookup(&element.selector)?;
        let mut state = self.lock();
        state.actions.push(format!("screenshot {}", element.selector));
        if state.screenshot_fails {
            return Err(Error::Driver("screenshot unavailable".into()));
        }
        Ok(b"\x89PNG mock element".to_vec())
    }

    async fn download(&self, link: &Element, _timeout: Duration) -> Result<Download> {
        let target = self.lookup(&link.selector)?;
        self.lock()
            .actions
            .push(format!("download {}", link.selector));
        target
            .download
            .map(|bytes| Download {
                bytes,
                filename: None,
            })
            .ok_or_else(|| Error::DownloadFailure(format!("{} delivered nothing", link)))
    }
}
