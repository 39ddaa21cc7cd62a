//! # portal-engine
//!
//! Extraction engine for portals that render their content in the browser and
//! expose no API. Navigation is driven through a [`Driver`]; data is read back
//! out of rendered text.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use portal_engine::{locator, Driver, Extractor, FieldRule, LocatorStrategy, Normalizer, Strategy};
//!
//! # async fn demo(driver: &impl Driver) -> portal_engine::Result<()> {
//! let panel = LocatorStrategy::new("side panel")
//!     .candidate(Strategy::css(".esri-feature"))
//!     .fallback(Strategy::css("body"));
//! let found = locator::resolve(driver, &panel, Duration::from_secs(2)).await?;
//! let text = driver.text_of(&found.elements[0]).await?;
//!
//! let extractor = Extractor::new(vec![FieldRule::new(
//!     "area",
//!     r"Plan\s*Area\s*([\d.,]+)\s*m[²2]",
//!     Normalizer::StripThousands,
//! )?]);
//! println!("{:?}", extractor.extract(&text).get("area"));
//! # Ok(())
//! # }
//! ```

pub mod diagnostics;
pub mod driver;
pub mod extract;
pub mod locator;
pub mod readiness;
pub mod rows;
pub mod section;
pub mod sequencer;

pub use diagnostics::Diagnostics;
pub use driver::{BrowserDriver, Download, Driver, Element};
pub use extract::{Extraction, Extractor, Field, FieldRule, Normalizer};
pub use locator::{Located, LocatorStrategy, Strategy};
pub use readiness::{Condition, Readiness, Ready};
pub use rows::{match_row, Row, RowMatch};
pub use section::SectionScanner;
pub use sequencer::{Run, SequenceState, Sequencer, StepEvent, StepOutcome};

#[cfg(any(test, feature = "mock"))]
pub use driver::mock::{MockDriver, MockElement};

use std::path::PathBuf;

/// Result type for portal-engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a navigation step.
///
/// Extraction misses and unmatched rows are not errors; they are reported
/// through [`Field::Absent`] and [`RowMatch::NoMatch`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not locate {target} (tried: {})", .tried.join(", "))]
    LocationFailure { target: String, tried: Vec<String> },

    #[error("timed out after {waited_ms}ms waiting for {condition}")]
    ContentTimeout { condition: String, waited_ms: u64 },

    #[error("download failed: {0}")]
    DownloadFailure(String),

    #[error("{workflow} failed at step '{step}': {source}{}", snapshot_note(.snapshot))]
    StepFailed {
        workflow: String,
        step: String,
        #[source]
        source: Box<Error>,
        /// Failure snapshot, when one could be written.
        snapshot: Option<PathBuf>,
    },

    #[error("{workflow} already failed at step '{step}'")]
    Aborted { workflow: String, step: String },

    #[error("driver error: {0}")]
    Driver(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn snapshot_note(snapshot: &Option<PathBuf>) -> String {
    match snapshot {
        Some(path) => format!(" (snapshot: {})", path.display()),
        None => String::new(),
    }
}

impl Error {
    /// The innermost error, unwrapping any step context.
    pub fn root(&self) -> &Error {
        match self {
            Error::StepFailed { source, .. } => source.root(),
            other => other,
        }
    }
}
