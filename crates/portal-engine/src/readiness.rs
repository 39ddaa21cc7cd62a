//! Waiting for asynchronously rendered content.
//!
//! There is no reliable structural "loaded" signal across layouts, so a known
//! textual marker (or element) stands in for "the content has rendered".

use crate::driver::Driver;
use crate::locator::Strategy;
use crate::{Error, Result};
use regex::Regex;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What must be observed.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Page text matches the pattern.
    Text(Regex),
    /// At least one element matches the strategy.
    Present(Strategy),
    /// The current URL matches the pattern.
    Url(Regex),
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Text(re) => write!(f, "text /{}/", re.as_str()),
            Condition::Present(s) => write!(f, "element {}", s),
            Condition::Url(re) => write!(f, "url /{}/", re.as_str()),
        }
    }
}

/// Wait bounds.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub timeout: Duration,
    pub poll: Duration,
    /// Extra delay after the condition is observed, for trailing renders.
    pub settle: Option<Duration>,
}

impl Readiness {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll: Duration::from_millis(250),
            settle: None,
        }
    }

    pub fn settle(mut self, delay: Duration) -> Self {
        self.settle = Some(delay);
        self
    }
}

/// Outcome of a wait. Never an error by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ready {
    Observed,
    TimedOut,
}

impl Ready {
    pub fn observed(self) -> bool {
        self == Ready::Observed
    }

    /// Treat a timeout as fatal.
    pub fn require(self, condition: &Condition, bounds: &Readiness) -> Result<()> {
        match self {
            Ready::Observed => Ok(()),
            Ready::TimedOut => Err(Error::ContentTimeout {
                condition: condition.to_string(),
                waited_ms: bounds.timeout.as_millis() as u64,
            }),
        }
    }
}

async fn holds<D: Driver>(driver: &D, condition: &Condition) -> Result<bool> {
    match condition {
        Condition::Text(re) => Ok(re.is_match(&driver.page_text().await?)),
        Condition::Present(strategy) => Ok(!driver.find(strategy).await?.is_empty()),
        Condition::Url(re) => Ok(re.is_match(&driver.current_url().await?)),
    }
}

/// Load `url`, failing with [`Error::ContentTimeout`] if the page does not
/// finish loading within `limit`.
pub async fn navigate<D: Driver>(driver: &D, url: &str, limit: Duration) -> Result<()> {
    match tokio::time::timeout(limit, driver.goto(url)).await {
        Ok(loaded) => loaded,
        Err(_) => Err(Error::ContentTimeout {
            condition: format!("page load of {}", url),
            waited_ms: limit.as_millis() as u64,
        }),
    }
}

/// Block until `condition` holds or `bounds.timeout` elapses.
pub async fn wait_until<D: Driver>(driver: &D, condition: &Condition, bounds: &Readiness) -> Ready {
    let start = Instant::now();
    let deadline = start + bounds.timeout;
    loop {
        match holds(driver, condition).await {
            Ok(true) => {
                info!("ready: {} after {}ms", condition, start.elapsed().as_millis());
                if let Some(settle) = bounds.settle {
                    tokio::time::sleep(settle).await;
                }
                return Ready::Observed;
            }
            Ok(false) => {}
            Err(e) => debug!("readiness check for {} failed: {}", condition, e),
        }
        if Instant::now() >= deadline {
            warn!(
                "gave up waiting for {} after {}ms",
                condition,
                bounds.timeout.as_millis()
            );
            return Ready::TimedOut;
        }
        tokio::time::sleep(bounds.poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockDriver, MockElement};

    fn zone_condition() -> Condition {
        Condition::Text(Regex::new("(?i)medium density residential").unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn observes_text_rendered_later() {
        let driver = MockDriver::new("https://portal.test/")
            .page_text("Zone\nMedium Density Residential")
            .page_text_after(Duration::from_secs(3));
        let start = Instant::now();
        let ready = wait_until(&driver, &zone_condition(), &Readiness::new(Duration::from_secs(10))).await;
        assert_eq!(ready, Ready::Observed);
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_within_bound() {
        let driver = MockDriver::new("https://portal.test/").page_text("nothing here");
        let bounds = Readiness::new(Duration::from_secs(2));
        let start = Instant::now();
        let ready = wait_until(&driver, &zone_condition(), &bounds).await;
        assert_eq!(ready, Ready::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(3));

        let err = ready.require(&zone_condition(), &bounds).unwrap_err();
        assert!(matches!(err, Error::ContentTimeout { waited_ms: 2000, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_applies_after_observation() {
        let driver = MockDriver::new("https://portal.test/")
            .element(MockElement::new("#grid"));
        let bounds = Readiness::new(Duration::from_secs(5)).settle(Duration::from_secs(2));
        let start = Instant::now();
        let ready = wait_until(&driver, &Condition::Present(Strategy::css("#grid")), &bounds).await;
        assert!(ready.observed());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn url_condition_follows_navigation() {
        let driver = MockDriver::new("https://portal.test/search")
            .element(MockElement::new("#go").navigates_to("https://portal.test/EnquiryDetailView.aspx?Id=1"));
        let cond = Condition::Url(Regex::new("EnquirySummaryView|EnquiryDetailView").unwrap());
        let bounds = Readiness::new(Duration::from_secs(1));
        assert_eq!(wait_until(&driver, &cond, &bounds).await, Ready::TimedOut);

        driver.click(&crate::Element::new("#go")).await.unwrap();
        assert!(wait_until(&driver, &cond, &bounds).await.observed());
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_is_bounded() {
        let driver = MockDriver::new("about:blank").slow_goto(Duration::from_secs(60));
        let start = Instant::now();
        let err = navigate(&driver, "https://portal.test/", Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ContentTimeout { waited_ms: 30_000, .. }));
        assert!(start.elapsed() < Duration::from_secs(31));
        assert_eq!(driver.current_url().await.unwrap(), "about:blank");

        let fast = MockDriver::new("about:blank");
        navigate(&fast, "https://portal.test/", Duration::from_secs(30)).await.unwrap();
        assert_eq!(fast.actions(), vec!["goto https://portal.test/"]);
    }

    #[tokio::test(start_paused = true)]
    async fn no_settle_after_timeout() {
        let driver = MockDriver::new("https://portal.test/");
        let bounds = Readiness::new(Duration::from_secs(1)).settle(Duration::from_secs(30));
        let start = Instant::now();
        let ready = wait_until(&driver, &Condition::Present(Strategy::css("#grid")), &bounds).await;
        assert_eq!(ready, Ready::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
