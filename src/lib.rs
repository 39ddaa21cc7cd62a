//! # portal-scrape
//!
//! Reads planning controls from the Gold Coast City Plan map and downloads
//! application documents from PD Online, both driven through a real browser.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use portal_engine::Diagnostics;
//! use portal_scrape::config::{CityplanProfile, Params, Profile};
//! use portal_scrape::{workflow, Session};
//!
//! # #[tokio::main]
//! # async fn main() -> portal_scrape::Result<()> {
//! let profile = CityplanProfile::builtin(&Params::new())?;
//! let session = Session::launch(&profile.site.browser).await?;
//! let run = workflow::cityplan::run(
//!     session.driver(),
//!     &profile,
//!     "12 Example Street, Southport",
//!     Diagnostics::new("."),
//! )
//! .await?;
//! println!("{}", run.value);
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod session;
pub mod workflow;

pub use session::Session;
pub use workflow::cityplan::{PropertyRecord, Zone, ZoneCategory};
pub use workflow::pdonline::{DocumentEntry, DownloadResult, FailureReason};

/// Result type for portal-scrape operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from profile loading or a workflow run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Engine(#[from] portal_engine::Error),
}

impl From<eoka::Error> for Error {
    fn from(e: eoka::Error) -> Self {
        Error::Engine(portal_engine::Error::Browser(e))
    }
}
