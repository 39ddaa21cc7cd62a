use super::{require_locator, Profile, Site};
use super::LocatorDef;
use crate::{Error, Result};
use portal_engine::Condition;
use regex::Regex;
use serde::Deserialize;

fn default_min_cells() -> usize {
    2
}

fn default_summary_marker() -> String {
    "EnquirySummaryView".into()
}

fn default_lands_on() -> String {
    "EnquirySummaryView|EnquiryDetailView".into()
}

fn default_detail_url() -> String {
    "EnquiryDetailView".into()
}

fn default_link() -> String {
    "td:first-child a".into()
}

fn default_marker_ms() -> u64 {
    3_000
}

/// Clicks from the home page to the application search form.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryDef {
    /// Clicked in order; each must resolve.
    pub clicks: Vec<LocatorDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchDef {
    pub input: LocatorDef,
    pub submit: LocatorDef,

    /// URL pattern of any page a submitted search lands on.
    #[serde(default = "default_lands_on")]
    pub lands_on: String,
}

/// Results summary page, reached when a search matches loosely.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultsDef {
    /// URL substring identifying the results page.
    #[serde(default = "default_summary_marker")]
    pub url_contains: String,

    pub table: LocatorDef,

    pub rows: LocatorDef,

    /// URL pattern of the page a result link opens.
    #[serde(default = "default_detail_url")]
    pub detail_url: String,

    /// CSS below a row for its detail link.
    #[serde(default = "default_link")]
    pub link: String,
}

/// Non-fatal detail page checks.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailDef {
    /// Any one present confirms the detail page.
    #[serde(default)]
    pub markers: Vec<String>,

    #[serde(default = "default_marker_ms")]
    pub marker_ms: u64,

    /// Documents heading.
    pub documents: LocatorDef,

    /// Alternative: a table whose header cells include all of these.
    #[serde(default)]
    pub table_headers: Vec<String>,
}

/// Document listing and download.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentsDef {
    pub rows: LocatorDef,

    #[serde(default = "default_min_cells")]
    pub min_cells: usize,

    /// Exact phrase identifying the wanted row.
    pub marker: String,

    /// CSS below the matched row for its download link.
    #[serde(default = "default_link")]
    pub link: String,

    pub out_dir: String,

    /// `${application}` is the application number with `/` replaced by `_`.
    pub file_name: String,
}

/// PD Online (ePathway) application registry profile.
#[derive(Debug, Clone, Deserialize)]
pub struct PdonlineProfile {
    #[serde(flatten)]
    pub site: Site,

    pub entry: EntryDef,

    pub search: SearchDef,

    pub results: ResultsDef,

    pub detail: DetailDef,

    pub documents: DocumentsDef,
}

impl PdonlineProfile {
    /// Holds once the search form has been left for a result page.
    pub fn landing_condition(&self) -> Result<Condition> {
        Ok(Condition::Url(Regex::new(&self.search.lands_on)?))
    }

    /// Holds once a result link has opened the application.
    pub fn detail_condition(&self) -> Result<Condition> {
        Ok(Condition::Url(Regex::new(&self.results.detail_url)?))
    }
}

impl Profile for PdonlineProfile {
    const BUILTIN: &'static str = include_str!("../../profiles/pdonline.yaml");

    fn site(&self) -> &Site {
        &self.site
    }

    fn site_mut(&mut self) -> &mut Site {
        &mut self.site
    }

    fn validate(&self) -> Result<()> {
        for (i, click) in self.entry.clicks.iter().enumerate() {
            require_locator(click, &format!("entry.clicks[{}]", i))?;
        }
        require_locator(&self.search.input, "search.input")?;
        require_locator(&self.search.submit, "search.submit")?;
        require_locator(&self.results.table, "results.table")?;
        require_locator(&self.results.rows, "results.rows")?;
        require_locator(&self.detail.documents, "detail.documents")?;
        require_locator(&self.documents.rows, "documents.rows")?;
        if self.documents.marker.is_empty() {
            return Err(Error::Config("documents.marker is required".into()));
        }
        if self.documents.min_cells < 2 {
            return Err(Error::Config(
                "documents.min_cells must be at least 2 (link and name)".into(),
            ));
        }
        if !self.documents.file_name.contains("${application}") {
            return Err(Error::Config(
                "documents.file_name must contain ${application}".into(),
            ));
        }
        self.landing_condition()?;
        self.detail_condition()?;
        Ok(())
    }
}
