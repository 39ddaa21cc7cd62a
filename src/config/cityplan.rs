use super::{build_extractor, build_scanner, require_locator, Profile, Site};
use super::{LocatorDef, RuleDef, SectionDef};
use crate::{Error, Result};
use portal_engine::{Condition, Extractor, SectionScanner};
use regex::RegexBuilder;
use serde::Deserialize;

/// Fields a cityplan rule may fill.
pub const FIELDS: &[&str] = &[
    "zone",
    "residential_density",
    "area_sqm",
    "lot_plan",
    "building_height",
];

fn default_select_keys() -> Vec<String> {
    vec!["ArrowDown".into(), "Enter".into()]
}

fn default_snapshot() -> String {
    "map_height.png".into()
}

fn default_attempt_ms() -> u64 {
    2_000
}

fn default_marker() -> String {
    "(see screenshot)".into()
}

/// Address search box and suggestion pick.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchDef {
    pub input: LocatorDef,

    /// Keys pressed after typing, to take the first suggestion.
    #[serde(default = "default_select_keys")]
    pub select_keys: Vec<String>,
}

/// Property detail card read before the side panel.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailDef {
    pub card: LocatorDef,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

/// Side panel holding zone, density and overlays.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelDef {
    pub locator: LocatorDef,

    /// A candidate's text must contain one of these (case-insensitive).
    /// The fallback is exempt.
    #[serde(default)]
    pub accept: Vec<String>,

    /// Per-candidate window, shorter than the general locate timeout.
    #[serde(default = "default_attempt_ms")]
    pub attempt_ms: u64,
}

impl PanelDef {
    pub fn accepts(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.accept.is_empty()
            || self
                .accept
                .iter()
                .any(|word| lower.contains(&word.to_lowercase()))
    }
}

/// Building height map layer.
#[derive(Debug, Clone, Deserialize)]
pub struct HeightDef {
    /// Layer toggle.
    pub layer: LocatorDef,

    /// Map view; must be present before the snapshot is taken.
    pub map: LocatorDef,

    #[serde(default = "default_snapshot")]
    pub snapshot: String,

    /// Recorded as building_height when no textual height was extracted.
    #[serde(default = "default_marker")]
    pub marker: String,
}

/// Gold Coast City Plan map profile.
#[derive(Debug, Clone, Deserialize)]
pub struct CityplanProfile {
    #[serde(flatten)]
    pub site: Site,

    pub search: SearchDef,

    pub detail: Option<DetailDef>,

    pub panel: PanelDef,

    /// Page text pattern meaning the panel has rendered.
    pub ready: String,

    /// Panel rules, in priority order.
    #[serde(default)]
    pub rules: Vec<RuleDef>,

    pub overlays: SectionDef,

    pub building_height: Option<HeightDef>,
}

impl CityplanProfile {
    pub fn ready_condition(&self) -> Result<Condition> {
        let re = RegexBuilder::new(&self.ready).case_insensitive(true).build()?;
        Ok(Condition::Text(re))
    }

    pub fn panel_extractor(&self) -> Result<Extractor> {
        build_extractor(&self.rules, FIELDS)
    }

    pub fn detail_extractor(&self) -> Result<Option<Extractor>> {
        self.detail
            .as_ref()
            .map(|d| build_extractor(&d.rules, FIELDS))
            .transpose()
    }

    pub fn overlay_scanner(&self) -> Result<SectionScanner> {
        build_scanner(&self.overlays)
    }
}

impl Profile for CityplanProfile {
    const BUILTIN: &'static str = include_str!("../../profiles/cityplan.yaml");

    fn site(&self) -> &Site {
        &self.site
    }

    fn site_mut(&mut self) -> &mut Site {
        &mut self.site
    }

    fn validate(&self) -> Result<()> {
        require_locator(&self.search.input, "search.input")?;
        require_locator(&self.panel.locator, "panel.locator")?;
        if let Some(ref detail) = self.detail {
            require_locator(&detail.card, "detail.card")?;
        }
        if let Some(ref height) = self.building_height {
            require_locator(&height.layer, "building_height.layer")?;
            require_locator(&height.map, "building_height.map")?;
        }
        if self.ready.is_empty() {
            return Err(Error::Config("ready pattern is required".into()));
        }
        self.ready_condition()?;
        self.panel_extractor()?;
        self.detail_extractor()?;
        self.overlay_scanner()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Params;

    #[test]
    fn test_builtin_profile_parses() {
        let profile = CityplanProfile::builtin(&Params::new()).unwrap();
        assert_eq!(profile.site.url, "https://cityplan.goldcoast.qld.gov.au/eplan/");
        assert_eq!(profile.search.select_keys, vec!["ArrowDown", "Enter"]);
        assert_eq!(profile.overlays.ends, vec!["LGIP", "Local Government", "Plan Zone"]);
        assert!(profile.panel.locator.fallback.is_some());
        assert_eq!(profile.site.timeouts.ready_ms, 10_000);
        assert_eq!(profile.site.timeouts.settle_ms, 2_000);
    }

    #[test]
    fn test_builtin_panel_rules_read_zone_and_density() {
        let profile = CityplanProfile::builtin(&Params::new()).unwrap();
        let out = profile
            .panel_extractor()
            .unwrap()
            .extract("Zone\nLow-medium density residential\nResidential density: RD3");
        assert_eq!(out.value("zone"), Some("Low-medium density residential"));
        assert_eq!(out.value("residential_density"), Some("RD3"));
    }

    #[test]
    fn test_builtin_detail_rules_read_area_and_lot() {
        let profile = CityplanProfile::builtin(&Params::new()).unwrap();
        let out = profile
            .detail_extractor()
            .unwrap()
            .unwrap()
            .extract("Lot/Plan 4GTP446\nPlan Area 1,234.5 m²");
        assert_eq!(out.value("area_sqm"), Some("1234.5"));
        assert_eq!(out.value("lot_plan"), Some("4GTP446"));
    }

    #[test]
    fn test_ready_is_case_insensitive() {
        let profile = CityplanProfile::builtin(&Params::new()).unwrap();
        match profile.ready_condition().unwrap() {
            Condition::Text(re) => assert!(re.is_match("HIGH DENSITY RESIDENTIAL")),
            other => panic!("unexpected condition: {other}"),
        }
    }

    #[test]
    fn test_panel_accepts() {
        let panel = PanelDef {
            locator: LocatorDef::default(),
            accept: vec!["zone".into(), "overlay".into()],
            attempt_ms: 100,
        };
        assert!(panel.accepts("Flood OVERLAY"));
        assert!(!panel.accepts("Basemap gallery"));
    }

    #[test]
    fn test_missing_search_locator_rejected() {
        let yaml = r#"
name: "Test"
url: "https://example.com"
search:
  input: []
panel:
  locator: "body"
ready: "zone"
overlays:
  start: "Overlays"
"#;
        let err = CityplanProfile::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("search.input"));
    }

    #[test]
    fn test_missing_url_rejected() {
        let yaml = r#"
name: "Test"
url: ""
search:
  input: "placeholder:Search"
panel:
  locator: "body"
ready: "zone"
overlays:
  start: "Overlays"
"#;
        assert!(CityplanProfile::parse(yaml).is_err());
    }
}
