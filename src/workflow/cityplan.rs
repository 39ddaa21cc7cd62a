//! Property lookup on the City Plan map.
//!
//! Search for an address, take the first suggestion, then read the property
//! card and the side panel once the zone text has rendered. Everything after
//! the search is best-effort: a partial record is still a result.

use super::pause;
use crate::config::CityplanProfile;
use crate::Result;
use portal_engine::readiness::{self, Readiness};
use portal_engine::{locator, Diagnostics, Driver, Extraction, Run, Sequencer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The four residential zones the map distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneCategory {
    LowDensityResidential,
    LowMediumDensityResidential,
    MediumDensityResidential,
    HighDensityResidential,
}

impl ZoneCategory {
    /// Classify a zone phrase as printed on the page.
    pub fn from_label(label: &str) -> Option<Self> {
        let words: Vec<String> = label
            .split(|c: char| c.is_whitespace() || c == '-')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        match words.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["low", "density", "residential"] => Some(ZoneCategory::LowDensityResidential),
            ["low", "medium", "density", "residential"] => {
                Some(ZoneCategory::LowMediumDensityResidential)
            }
            ["medium", "density", "residential"] => Some(ZoneCategory::MediumDensityResidential),
            ["high", "density", "residential"] => Some(ZoneCategory::HighDensityResidential),
            _ => None,
        }
    }
}

impl fmt::Display for ZoneCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ZoneCategory::LowDensityResidential => "Low density residential",
            ZoneCategory::LowMediumDensityResidential => "Low-medium density residential",
            ZoneCategory::MediumDensityResidential => "Medium density residential",
            ZoneCategory::HighDensityResidential => "High density residential",
        })
    }
}

/// Zone as found: its category plus the phrase exactly as printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub category: ZoneCategory,
    pub label: String,
}

impl Zone {
    pub fn parse(label: &str) -> Option<Self> {
        ZoneCategory::from_label(label).map(|category| Zone {
            category,
            label: label.to_string(),
        })
    }
}

/// Planning attributes of one property.
///
/// Every optional field starts absent and is set at most once; later values
/// for an already-set field are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyRecord {
    address: String,
    lot_plan: Option<String>,
    zone: Option<Zone>,
    residential_density: Option<String>,
    area_sqm: Option<String>,
    building_height: Option<String>,
    height_snapshot: Option<PathBuf>,
    overlays: Vec<String>,
}

fn set_once(slot: &mut Option<String>, field: &str, value: &str) -> bool {
    if slot.is_some() {
        debug!("{} already set, ignoring {:?}", field, value);
        return false;
    }
    *slot = Some(value.to_string());
    true
}

impl PropertyRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn lot_plan(&self) -> Option<&str> {
        self.lot_plan.as_deref()
    }

    pub fn zone(&self) -> Option<&Zone> {
        self.zone.as_ref()
    }

    pub fn residential_density(&self) -> Option<&str> {
        self.residential_density.as_deref()
    }

    /// Square metres, thousands separators removed.
    pub fn area_sqm(&self) -> Option<&str> {
        self.area_sqm.as_deref()
    }

    pub fn building_height(&self) -> Option<&str> {
        self.building_height.as_deref()
    }

    /// Map snapshot taken with the height layer on.
    pub fn height_snapshot(&self) -> Option<&Path> {
        self.height_snapshot.as_deref()
    }

    pub fn overlays(&self) -> &[String] {
        &self.overlays
    }

    pub fn set_lot_plan(&mut self, value: &str) -> bool {
        set_once(&mut self.lot_plan, "lot_plan", value)
    }

    pub fn set_zone(&mut self, zone: Zone) -> bool {
        if self.zone.is_some() {
            debug!("zone already set, ignoring {:?}", zone.label);
            return false;
        }
        self.zone = Some(zone);
        true
    }

    pub fn set_residential_density(&mut self, value: &str) -> bool {
        set_once(&mut self.residential_density, "residential_density", value)
    }

    pub fn set_area_sqm(&mut self, value: &str) -> bool {
        set_once(&mut self.area_sqm, "area_sqm", value)
    }

    pub fn set_building_height(&mut self, value: &str) -> bool {
        set_once(&mut self.building_height, "building_height", value)
    }

    /// Append an overlay unless already listed.
    pub fn push_overlay(&mut self, overlay: &str) -> bool {
        if self.overlays.iter().any(|o| o == overlay) {
            return false;
        }
        self.overlays.push(overlay.to_string());
        true
    }

    /// Copy every found field of `extraction` into the record.
    pub fn absorb(&mut self, extraction: &Extraction) {
        for (field, value) in extraction.fields() {
            let Some(value) = value.value() else {
                continue;
            };
            let applied = match field {
                "zone" => match Zone::parse(value) {
                    Some(zone) => self.set_zone(zone),
                    None => {
                        warn!("unrecognised zone '{}'", value);
                        false
                    }
                },
                "residential_density" => self.set_residential_density(value),
                "area_sqm" => self.set_area_sqm(value),
                "lot_plan" => self.set_lot_plan(value),
                "building_height" => self.set_building_height(value),
                other => {
                    debug!("no record field for '{}'", other);
                    false
                }
            };
            if applied {
                info!("found {}: {}", field, value);
            }
        }
    }
}

fn or_na(value: Option<&str>) -> &str {
    value.unwrap_or("N/A")
}

impl fmt::Display for PropertyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<25} {}", "Address:", self.address)?;
        writeln!(f, "{:<25} {}", "Lot/Plan:", or_na(self.lot_plan()))?;
        writeln!(
            f,
            "{:<25} {}",
            "Zone:",
            or_na(self.zone.as_ref().map(|z| z.label.as_str()))
        )?;
        writeln!(
            f,
            "{:<25} {}",
            "Residential Density:",
            or_na(self.residential_density())
        )?;
        match self.area_sqm() {
            Some(area) => writeln!(f, "{:<25} {} m²", "Area:", area)?,
            None => writeln!(f, "{:<25} N/A", "Area:")?,
        }
        writeln!(
            f,
            "{:<25} {}",
            "Building Height:",
            or_na(self.building_height())
        )?;
        if let Some(path) = self.height_snapshot() {
            writeln!(f, "{:<25} {}", "Height Snapshot:", path.display())?;
        }
        if self.overlays.is_empty() {
            write!(f, "{:<25} None found", "Overlays:")
        } else {
            write!(f, "Overlays ({}):", self.overlays.len())?;
            for overlay in &self.overlays {
                write!(f, "\n  - {}", overlay)?;
            }
            Ok(())
        }
    }
}

/// Look up `query` and read the property's planning attributes.
///
/// Fails only if the map or the search box cannot be reached. Missing
/// attributes stay absent in the returned record.
pub async fn run<D: Driver>(
    driver: &D,
    profile: &CityplanProfile,
    query: &str,
    diagnostics: Diagnostics,
) -> Result<Run<PropertyRecord>> {
    let t = &profile.site.timeouts;
    let search = profile.search.input.to_locator("search input");
    let panel = profile.panel.locator.to_locator("side panel");
    let ready = profile.ready_condition()?;
    let panel_rules = profile.panel_extractor()?;
    let detail_rules = profile.detail_extractor()?;
    let overlays = profile.overlay_scanner()?;

    let mut record = PropertyRecord::new(query);
    let mut seq = Sequencer::new(driver, "cityplan", diagnostics);
    let d = driver;

    let url = profile.site.url.as_str();
    let (settle, navigation) = (t.settle(), t.navigation());
    seq.step("open map", move || async move {
        readiness::navigate(d, url, navigation).await?;
        pause(settle).await;
        Ok(())
    })
    .await?;

    let (search, keys) = (&search, &profile.search.select_keys);
    let (locate, key_pause) = (t.locate(), t.pause());
    seq.step("search address", move || async move {
        let input = locator::resolve(d, search, locate).await?;
        d.click(input.first()).await?;
        d.fill(input.first(), query).await?;
        pause(key_pause).await;
        for key in keys {
            d.press_key(key).await?;
            pause(key_pause).await;
        }
        Ok(())
    })
    .await?;

    if let (Some(detail), Some(rules)) = (&profile.detail, &detail_rules) {
        let card = detail.card.to_locator("property detail");
        let card = &card;
        let text = seq
            .step("read property detail", move || async move {
                Ok(match locator::resolve(d, card, locate).await {
                    Ok(found) => d.text_of(found.first()).await.ok(),
                    Err(e) => {
                        warn!("{}", e);
                        None
                    }
                })
            })
            .await?;
        if let Some(text) = text {
            record.absorb(&rules.extract(&text));
        }
    }

    let bounds = Readiness::new(t.ready()).settle(settle);
    let (ready, panel, panel_def) = (&ready, &panel, &profile.panel);
    let attempt = Duration::from_millis(panel_def.attempt_ms);
    let panel_text = seq
        .step("read side panel", move || async move {
            if !readiness::wait_until(d, ready, &bounds).await.observed() {
                warn!("panel content did not appear; reading what is there");
            }
            match locator::read_text(d, panel, attempt, |text| panel_def.accepts(text)).await {
                Ok((strategy, text)) => {
                    debug!("panel text from {} ({} chars)", strategy, text.len());
                    Ok(text)
                }
                Err(e) => {
                    warn!("{}; falling back to page text", e);
                    d.page_text().await
                }
            }
        })
        .await?;

    let extraction = panel_rules.extract(&panel_text);
    debug!(
        "{} of {} panel fields found",
        extraction.found(),
        extraction.fields().count()
    );
    record.absorb(&extraction);
    for line in overlays.scan(&panel_text) {
        record.push_overlay(&line);
    }
    info!("found {} overlays", record.overlays().len());

    if let Some(height) = &profile.building_height {
        let layer = height.layer.to_locator("building height layer");
        let map = height.map.to_locator("map view");
        let (layer, map) = (&layer, &map);
        let map_view = seq
            .step("show building height", move || async move {
                if let Err(e) = locator::click(d, layer, locate).await {
                    warn!("could not enable building height: {}", e);
                    return Ok(None);
                }
                pause(key_pause).await;
                match locator::resolve(d, map, locate).await {
                    Ok(found) => Ok(Some(found.first().clone())),
                    Err(e) => {
                        warn!("{}", e);
                        Ok(None)
                    }
                }
            })
            .await?;

        if let Some(view) = map_view {
            let shot = seq
                .diagnostics()
                .snapshot_element(driver, &view, &height.snapshot)
                .await;
            if let Some(path) = shot {
                if record.set_building_height(&height.marker) {
                    info!("building height: {}", height.marker);
                }
                record.height_snapshot = Some(path);
            }
        }
    }

    Ok(seq.finish(record))
}
