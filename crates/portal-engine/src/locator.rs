//! Ranked element location.
//!
//! A [`LocatorStrategy`] names one logical target ("the search input") and
//! lists candidate [`Strategy`] values from most specific to most generic.
//! [`resolve`] tries them strictly in order and returns the first that finds
//! at least one element within its per-attempt window.

use crate::driver::{Driver, Element};
use crate::{Error, Result};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Poll interval inside a single attempt.
const POLL_MS: u64 = 100;

/// How to find an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// `css:form button` - CSS selector
    Css(String),
    /// `text:Submit` - innermost visible element containing the text (case-insensitive)
    Text(String),
    /// `link:All applications` - visible anchor whose text contains the value (case-insensitive)
    Link(String),
    /// `placeholder:Search for an address` - input by placeholder
    Placeholder(String),
    /// `id:submit-btn` - element by ID
    Id(String),
    /// `role:button` - by ARIA role or tag name
    Role(String),
}

impl Strategy {
    pub fn css(s: impl Into<String>) -> Self {
        Strategy::Css(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Strategy::Text(s.into())
    }

    pub fn link(s: impl Into<String>) -> Self {
        Strategy::Link(s.into())
    }

    pub fn placeholder(s: impl Into<String>) -> Self {
        Strategy::Placeholder(s.into())
    }

    /// Parse a `prefix:value` string. Unprefixed strings are CSS.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some(v) = s.strip_prefix("text:") {
            return Strategy::Text(v.into());
        }
        if let Some(v) = s.strip_prefix("link:") {
            return Strategy::Link(v.into());
        }
        if let Some(v) = s.strip_prefix("placeholder:") {
            return Strategy::Placeholder(v.into());
        }
        if let Some(v) = s.strip_prefix("role:") {
            return Strategy::Role(v.into());
        }
        if let Some(v) = s.strip_prefix("css:") {
            return Strategy::Css(v.into());
        }
        if let Some(v) = s.strip_prefix("id:") {
            return Strategy::Id(v.into());
        }
        Strategy::Css(s.into())
    }

    pub(crate) fn as_js_args(&self) -> (&'static str, &str) {
        match self {
            Strategy::Css(v) => ("css", v),
            Strategy::Text(v) => ("text", v),
            Strategy::Link(v) => ("link", v),
            Strategy::Placeholder(v) => ("placeholder", v),
            Strategy::Id(v) => ("id", v),
            Strategy::Role(v) => ("role", v),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (kind, value) = self.as_js_args();
        write!(f, "{}:{}", kind, value)
    }
}

/// Ordered candidates for one logical target.
#[derive(Debug, Clone)]
pub struct LocatorStrategy {
    target: String,
    candidates: Vec<Strategy>,
    fallback: Option<Strategy>,
}

impl LocatorStrategy {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            candidates: Vec::new(),
            fallback: None,
        }
    }

    /// Build from `prefix:value` strings.
    pub fn from_specs<S: AsRef<str>>(target: impl Into<String>, specs: &[S]) -> Self {
        let mut loc = Self::new(target);
        loc.candidates = specs.iter().map(|s| Strategy::parse(s.as_ref())).collect();
        loc
    }

    /// Append a candidate after those already added.
    pub fn candidate(mut self, strategy: Strategy) -> Self {
        self.candidates.push(strategy);
        self
    }

    /// Generic catch-all, always tried after every candidate.
    pub fn fallback(mut self, strategy: Strategy) -> Self {
        self.fallback = Some(strategy);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.fallback.is_none()
    }

    /// Candidates in evaluation order, fallback last.
    pub fn strategies(&self) -> impl Iterator<Item = &Strategy> {
        self.candidates.iter().chain(self.fallback.as_ref())
    }

    fn is_fallback(&self, index: usize) -> bool {
        self.fallback.is_some() && index == self.candidates.len()
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct Located {
    /// Position of the winning strategy in evaluation order.
    pub index: usize,
    pub strategy: Strategy,
    /// Non-empty, in document order.
    pub elements: Vec<Element>,
}

impl Located {
    pub fn first(&self) -> &Element {
        &self.elements[0]
    }
}

/// Poll one strategy until it matches or `window` elapses.
async fn attempt<D: Driver>(
    driver: &D,
    strategy: &Strategy,
    window: Duration,
) -> Option<Vec<Element>> {
    let deadline = Instant::now() + window;
    loop {
        match driver.find(strategy).await {
            Ok(elements) if !elements.is_empty() => return Some(elements),
            Ok(_) => {}
            Err(e) => debug!("lookup {} failed: {}", strategy, e),
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(POLL_MS)).await;
    }
}

/// Resolve the first strategy that matches at least one element.
pub async fn resolve<D: Driver>(
    driver: &D,
    locator: &LocatorStrategy,
    per_attempt: Duration,
) -> Result<Located> {
    let mut tried = Vec::new();
    for (index, strategy) in locator.strategies().enumerate() {
        if let Some(elements) = attempt(driver, strategy, per_attempt).await {
            info!("{}: resolved via {}", locator.target, strategy);
            return Ok(Located {
                index,
                strategy: strategy.clone(),
                elements,
            });
        }
        debug!("{}: {} timed out", locator.target, strategy);
        tried.push(strategy.to_string());
    }
    Err(Error::LocationFailure {
        target: locator.target.clone(),
        tried,
    })
}

/// Resolve and click the first matching element.
pub async fn click<D: Driver>(
    driver: &D,
    locator: &LocatorStrategy,
    per_attempt: Duration,
) -> Result<Element> {
    let located = resolve(driver, locator, per_attempt).await?;
    let element = located.first().clone();
    driver.click(&element).await?;
    Ok(element)
}

/// Resolve and fill the first matching element.
pub async fn fill<D: Driver>(
    driver: &D,
    locator: &LocatorStrategy,
    per_attempt: Duration,
    value: &str,
) -> Result<Element> {
    let located = resolve(driver, locator, per_attempt).await?;
    let element = located.first().clone();
    driver.fill(&element, value).await?;
    Ok(element)
}

/// Resolve candidates in order and return the text of the first one whose
/// text satisfies `accept`. The fallback's text is accepted as-is.
pub async fn read_text<D, F>(
    driver: &D,
    locator: &LocatorStrategy,
    per_attempt: Duration,
    accept: F,
) -> Result<(Strategy, String)>
where
    D: Driver,
    F: Fn(&str) -> bool,
{
    let mut tried = Vec::new();
    for (index, strategy) in locator.strategies().enumerate() {
        tried.push(strategy.to_string());
        let Some(elements) = attempt(driver, strategy, per_attempt).await else {
            continue;
        };
        let text = match driver.text_of(&elements[0]).await {
            Ok(text) => text,
            Err(e) => {
                debug!("{}: reading {} failed: {}", locator.target, strategy, e);
                continue;
            }
        };
        if locator.is_fallback(index) {
            info!("{}: using fallback {}", locator.target, strategy);
            return Ok((strategy.clone(), text));
        }
        if accept(&text) {
            info!("{}: found via {}", locator.target, strategy);
            return Ok((strategy.clone(), text));
        }
        debug!("{}: {} rejected by content check", locator.target, strategy);
    }
    Err(Error::LocationFailure {
        target: locator.target.clone(),
        tried,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockDriver, MockElement};

    #[test]
    fn parse_prefixed() {
        assert_eq!(Strategy::parse("text:Submit"), Strategy::text("Submit"));
        assert_eq!(
            Strategy::parse("link:All applications"),
            Strategy::link("All applications")
        );
        assert_eq!(
            Strategy::parse("placeholder:Search for an address"),
            Strategy::placeholder("Search for an address")
        );
        assert_eq!(Strategy::parse("id:btn"), Strategy::Id("btn".into()));
        assert_eq!(Strategy::parse("role:button"), Strategy::Role("button".into()));
        assert_eq!(Strategy::parse("css:div.x"), Strategy::css("div.x"));
    }

    #[test]
    fn parse_unprefixed_is_css() {
        assert_eq!(
            Strategy::parse("  input[type=\"text\"]  "),
            Strategy::css("input[type=\"text\"]")
        );
    }

    #[test]
    fn display_round_trips_prefix() {
        assert_eq!(Strategy::text("Next").to_string(), "text:Next");
        assert_eq!(Strategy::css("#grid").to_string(), "css:#grid");
    }

    #[test]
    fn fallback_is_always_last() {
        let loc = LocatorStrategy::new("panel")
            .fallback(Strategy::css("body"))
            .candidate(Strategy::css(".a"))
            .candidate(Strategy::css(".b"));
        let order: Vec<String> = loc.strategies().map(|s| s.to_string()).collect();
        assert_eq!(order, vec!["css:.a", "css:.b", "css:body"]);
    }

    #[tokio::test(start_paused = true)]
    async fn tries_strategies_strictly_in_order() {
        let driver = MockDriver::new("https://portal.test/")
            .element(MockElement::new("#c").matching(Strategy::css("#c")));
        let loc = LocatorStrategy::new("thing")
            .candidate(Strategy::css("#a"))
            .candidate(Strategy::css("#b"))
            .candidate(Strategy::css("#c"));

        let found = resolve(&driver, &loc, Duration::from_millis(500)).await.unwrap();
        assert_eq!(found.index, 2);
        assert_eq!(found.first().selector, "#c");

        let lookups = driver.lookups();
        let first_c = lookups.iter().position(|p| p == "css:#c").unwrap();
        assert!(lookups[..first_c].iter().any(|p| p == "css:#a"));
        assert!(lookups[..first_c].iter().any(|p| p == "css:#b"));
        let last_a = lookups.iter().rposition(|p| p == "css:#a").unwrap();
        let first_b = lookups.iter().position(|p| p == "css:#b").unwrap();
        assert!(last_a < first_b, "A is never revisited after B starts");
    }

    #[tokio::test(start_paused = true)]
    async fn waits_within_attempt_window() {
        let driver = MockDriver::new("https://portal.test/").element(
            MockElement::new("#late")
                .matching(Strategy::css("#late"))
                .appears_after(Duration::from_millis(300)),
        );
        let loc = LocatorStrategy::new("late").candidate(Strategy::css("#late"));
        assert!(resolve(&driver, &loc, Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_strategies_fail_with_all_tried() {
        let driver = MockDriver::new("https://portal.test/");
        let loc = LocatorStrategy::from_specs("search input", &["#a", "text:Search"]);
        let err = resolve(&driver, &loc, Duration::from_millis(200))
            .await
            .unwrap_err();
        match err {
            Error::LocationFailure { target, tried } => {
                assert_eq!(target, "search input");
                assert_eq!(tried, vec!["css:#a", "text:Search"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn read_text_skips_candidates_failing_content_check() {
        let driver = MockDriver::new("https://portal.test/")
            .element(MockElement::new(".widget").text("Layers"))
            .element(MockElement::new(".feature").text("Zone: Low density residential"))
            .element(MockElement::new("body").text("everything"));
        let loc = LocatorStrategy::new("panel")
            .candidate(Strategy::css(".widget"))
            .candidate(Strategy::css(".feature"))
            .fallback(Strategy::css("body"));

        let (strategy, text) = read_text(&driver, &loc, Duration::from_millis(100), |t| {
            t.to_lowercase().contains("zone")
        })
        .await
        .unwrap();
        assert_eq!(strategy, Strategy::css(".feature"));
        assert!(text.starts_with("Zone"));
    }

    #[tokio::test(start_paused = true)]
    async fn fill_acts_on_first_resolved_candidate() {
        let driver = MockDriver::new("https://portal.test/").element(
            MockElement::new("#q").matching(Strategy::placeholder("Search for an address")),
        );
        let loc = LocatorStrategy::new("search input")
            .candidate(Strategy::css("input.search"))
            .candidate(Strategy::placeholder("Search for an address"));
        let el = fill(&driver, &loc, Duration::from_millis(100), "12 Example St")
            .await
            .unwrap();
        assert_eq!(el.selector, "#q");
        assert_eq!(driver.actions(), vec!["fill #q=12 Example St"]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_text_accepts_fallback_unconditionally() {
        let driver = MockDriver::new("https://portal.test/")
            .element(MockElement::new("body").text("nothing useful"));
        let loc = LocatorStrategy::new("panel")
            .candidate(Strategy::css(".feature"))
            .fallback(Strategy::css("body"));

        let (strategy, text) = read_text(&driver, &loc, Duration::from_millis(100), |_| false)
            .await
            .unwrap();
        assert_eq!(strategy, Strategy::css("body"));
        assert_eq!(text, "nothing useful");
    }
}
