//! Document download from the PD Online application registry.
//!
//! The search form sits behind a terms page. A search either lands directly
//! on the application or on a results summary, from which the first row is
//! opened. The document table is then scanned for an exact name.

use super::{cell_texts, pause};
use crate::config::params::{self, Params};
use crate::config::PdonlineProfile;
use crate::Result;
use portal_engine::readiness::{self, Readiness};
use portal_engine::{
    locator, match_row, Condition, Diagnostics, Driver, Element, LocatorStrategy, Row, RowMatch,
    Run, Sequencer, Strategy,
};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One row of the application's document table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentEntry {
    /// Second cell: the document name.
    pub name: String,
    /// First cell text, usually a document number.
    pub link_label: String,
    /// Cells joined with tabs; what the marker is matched against.
    pub row_text: String,
    /// Download link in the first cell.
    pub link: Option<Element>,
}

impl Row for DocumentEntry {
    fn text(&self) -> &str {
        &self.row_text
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// Why no file was saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// No document row contained the marker phrase.
    NoMatch { marker: String },
    DownloadFailure(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoMatch { marker } => write!(f, "'{}' not found in documents list", marker),
            FailureReason::DownloadFailure(msg) => write!(f, "download failed: {}", msg),
        }
    }
}

/// Outcome of a document download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    Saved {
        application: String,
        path: PathBuf,
        bytes: u64,
    },
    Failed {
        reason: FailureReason,
        /// Documents listed on the page, in row order.
        available: Vec<DocumentEntry>,
    },
}

impl DownloadResult {
    pub fn success(&self) -> bool {
        matches!(self, DownloadResult::Saved { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            DownloadResult::Saved { path, .. } => Some(path),
            DownloadResult::Failed { .. } => None,
        }
    }

    pub fn size_kb(&self) -> Option<f64> {
        match self {
            DownloadResult::Saved { bytes, .. } => Some(*bytes as f64 / 1024.0),
            DownloadResult::Failed { .. } => None,
        }
    }
}

impl fmt::Display for DownloadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadResult::Saved {
                application,
                path,
                bytes,
            } => {
                writeln!(f, "{:<14} {}", "Application:", application)?;
                writeln!(f, "{:<14} {}", "Saved to:", path.display())?;
                write!(f, "{:<14} {:.2} KB", "Size:", *bytes as f64 / 1024.0)
            }
            DownloadResult::Failed { reason, available } => {
                write!(f, "{:<14} {}", "Error:", reason)?;
                if !available.is_empty() {
                    write!(f, "\nDocuments available:")?;
                    for doc in available {
                        write!(f, "\n  - {}", doc.name)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// `MIN/2024/216` -> `MIN_2024_216`.
pub fn file_stem(application: &str) -> String {
    application.replace('/', "_")
}

/// Target file for `application` under the profile's output directory.
pub fn output_path(profile: &PdonlineProfile, application: &str) -> Result<PathBuf> {
    let params = Params::new().set("application", file_stem(application));
    let name = params::substitute(&profile.documents.file_name, &params, &profile.site.params)?;
    Ok(Path::new(&profile.documents.out_dir).join(name))
}

/// Read every table row with enough cells and a non-empty name.
async fn list_documents<D: Driver>(
    driver: &D,
    rows: &LocatorStrategy,
    min_cells: usize,
    link_css: &str,
) -> portal_engine::Result<Vec<DocumentEntry>> {
    let mut entries = Vec::new();
    for strategy in rows.strategies() {
        let found = driver.find(strategy).await?;
        if found.is_empty() {
            continue;
        }
        debug!("scanning {} rows from {}", found.len(), strategy);
        for row in &found {
            let cells = cell_texts(driver, row).await?;
            if cells.len() < min_cells.max(2) || cells[1].is_empty() {
                continue;
            }
            let link = driver.find(&row.descendant(link_css)).await?.into_iter().next();
            entries.push(DocumentEntry {
                name: cells[1].clone(),
                link_label: cells[0].clone(),
                row_text: cells.join("\t"),
                link,
            });
        }
        break;
    }
    Ok(entries)
}

/// True if any table on the page has header cells covering `headers`.
async fn has_table_with_headers<D: Driver>(driver: &D, headers: &[String]) -> bool {
    if headers.is_empty() {
        return false;
    }
    let Ok(tables) = driver.find(&Strategy::css("table")).await else {
        return false;
    };
    for table in &tables {
        let Ok(cells) = driver.find(&table.descendant("th")).await else {
            continue;
        };
        let mut texts = Vec::with_capacity(cells.len());
        for cell in &cells {
            if let Ok(text) = driver.text_of(cell).await {
                texts.push(text.trim().to_string());
            }
        }
        if headers.iter().all(|h| texts.iter().any(|t| t == h)) {
            debug!("documents table {} has headers {:?}", table, texts);
            return true;
        }
    }
    false
}

/// Find `application` and download the document named by the profile marker.
///
/// Navigation problems are errors. A missing document or a failed transfer
/// is a [`DownloadResult::Failed`].
pub async fn run<D: Driver>(
    driver: &D,
    profile: &PdonlineProfile,
    application: &str,
    diagnostics: Diagnostics,
) -> Result<Run<DownloadResult>> {
    let t = &profile.site.timeouts;
    let target = output_path(profile, application)?;
    let stem = file_stem(application);

    let entry: Vec<LocatorStrategy> = profile
        .entry
        .clicks
        .iter()
        .enumerate()
        .map(|(i, def)| def.to_locator(format!("entry link {}", i + 1).as_str()))
        .collect();
    let input = profile.search.input.to_locator("application number input");
    let submit = profile.search.submit.to_locator("search button");
    let results_table = profile.results.table.to_locator("results table");
    let result_rows = profile.results.rows.to_locator("result rows");
    let doc_rows = profile.documents.rows.to_locator("document rows");
    let docs_heading = profile.detail.documents.to_locator("documents section");
    let landed = profile.landing_condition()?;
    let opened = profile.detail_condition()?;

    let mut seq = Sequencer::new(driver, "pdonline", diagnostics);
    let d = driver;
    let (locate, step_pause, settle) = (t.locate(), t.pause(), t.settle());
    let page_load = Readiness::new(t.navigation()).settle(settle);

    let url = profile.site.url.as_str();
    let navigation = t.navigation();
    seq.step("open portal", move || async move {
        readiness::navigate(d, url, navigation).await?;
        pause(step_pause).await;
        Ok(())
    })
    .await?;

    let entry = &entry;
    seq.step("open search form", move || async move {
        for loc in entry {
            locator::click(d, loc, locate).await?;
            pause(step_pause).await;
        }
        Ok(())
    })
    .await?;

    let (input, submit, landed, page_load) = (&input, &submit, &landed, &page_load);
    seq.step("search application", move || async move {
        let field = locator::resolve(d, input, locate).await?;
        info!("application number input via {}", field.strategy);
        d.fill(field.first(), application).await?;
        locator::click(d, submit, locate).await?;
        readiness::wait_until(d, landed, page_load)
            .await
            .require(landed, page_load)?;
        Ok(())
    })
    .await?;

    let results = &profile.results;
    let (results_table, result_rows, opened) = (&results_table, &result_rows, &opened);
    seq.step("open application", move || async move {
        let url = d.current_url().await?;
        if !url.contains(&results.url_contains) {
            debug!("search landed on the application directly");
            return Ok(());
        }
        info!("on results summary, opening first result");
        locator::resolve(d, results_table, locate).await?;
        let rows = locator::resolve(d, result_rows, locate).await?;
        info!("{} result row(s)", rows.elements.len());
        let link = LocatorStrategy::new("result link").candidate(rows.first().descendant(&results.link));
        locator::click(d, &link, locate).await?;
        readiness::wait_until(d, opened, page_load)
            .await
            .require(opened, page_load)?;
        Ok(())
    })
    .await?;

    let detail = &profile.detail;
    let markers_found = seq
        .step("verify detail page", move || async move {
            let bounds = Readiness::new(std::time::Duration::from_millis(detail.marker_ms));
            let mut found = 0;
            for marker in &detail.markers {
                let cond = Condition::Present(Strategy::parse(marker));
                if readiness::wait_until(d, &cond, &bounds).await.observed() {
                    debug!("detail marker present: {}", marker);
                    found += 1;
                } else {
                    debug!("detail marker missing: {}", marker);
                }
            }
            Ok(found)
        })
        .await?;
    if markers_found == 0 && !profile.detail.markers.is_empty() {
        warn!("no detail page markers found");
        seq.diagnostics()
            .snapshot(driver, &format!("debug_detail_page_{}.png", stem))
            .await;
    }

    let docs_heading = &docs_heading;
    let docs_section = seq
        .step("locate documents", move || async move {
            if locator::resolve(d, docs_heading, locate).await.is_ok() {
                return Ok(true);
            }
            Ok(has_table_with_headers(d, &detail.table_headers).await)
        })
        .await?;
    if !docs_section {
        warn!("could not locate documents section");
        seq.diagnostics()
            .snapshot(driver, &format!("debug_no_docs_{}.png", stem))
            .await;
    }

    let docs = &profile.documents;
    let doc_rows = &doc_rows;
    let available = seq
        .step("list documents", move || async move {
            list_documents(d, doc_rows, docs.min_cells, &docs.link).await
        })
        .await?;
    info!("{} document(s) listed", available.len());
    for doc in &available {
        debug!("  {} ({})", doc.name, doc.link_label);
    }

    let matched = match match_row(&available, &docs.marker) {
        RowMatch::Found { row, .. } => {
            info!("found '{}' ({})", docs.marker, row.link_label);
            Some(row.link.clone())
        }
        RowMatch::NoMatch { visited } => {
            warn!("'{}' not among {} documents", docs.marker, visited.len());
            None
        }
    };

    let Some(link) = matched else {
        return Ok(seq.finish(DownloadResult::Failed {
            reason: FailureReason::NoMatch {
                marker: docs.marker.clone(),
            },
            available,
        }));
    };
    let Some(link) = link else {
        return Ok(seq.finish(DownloadResult::Failed {
            reason: FailureReason::DownloadFailure(format!(
                "row '{}' has no link",
                docs.marker
            )),
            available,
        }));
    };

    let result = match driver.download(&link, t.download()).await {
        Ok(download) => save(&target, &download.bytes),
        Err(e) => Err(e.to_string()),
    };
    let outcome = match result {
        Ok(bytes) => {
            info!("saved {} ({} bytes)", target.display(), bytes);
            DownloadResult::Saved {
                application: application.to_string(),
                path: target,
                bytes,
            }
        }
        Err(msg) => {
            warn!("download failed: {}", msg);
            seq.diagnostics().capture(driver, "pdonline_download").await;
            DownloadResult::Failed {
                reason: FailureReason::DownloadFailure(msg),
                available,
            }
        }
    };
    Ok(seq.finish(outcome))
}

fn save(path: &Path, bytes: &[u8]) -> std::result::Result<u64, String> {
    if bytes.is_empty() {
        return Err("empty response".into());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| format!("{}: {}", dir.display(), e))?;
    }
    std::fs::write(path, bytes).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(bytes.len() as u64)
}
