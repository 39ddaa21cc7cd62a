//! YAML site profiles.
//!
//! A profile names a portal's URL, the locator candidates for every element
//! the workflow touches, text anchors and timeouts. Built-in profiles are
//! embedded; `--profile` swaps in a file with the same shape.

pub mod cityplan;
pub mod params;
pub mod pdonline;
pub mod schema;

pub use cityplan::CityplanProfile;
pub use params::{ParamDef, Params};
pub use pdonline::PdonlineProfile;
pub use schema::{BrowserConfig, LocatorDef, Normalize, RuleDef, SectionDef, Timeouts, Viewport};

use crate::{Error, Result};
use portal_engine::{Extractor, FieldRule, SectionScanner};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Fields shared by every profile.
#[derive(Debug, Clone, Deserialize)]
pub struct Site {
    pub name: String,

    #[serde(default)]
    pub params: HashMap<String, ParamDef>,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub timeouts: Timeouts,

    /// Entry page.
    pub url: String,
}

impl Site {
    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("name is required".into()));
        }
        if self.url.is_empty() {
            return Err(Error::Config("url is required".into()));
        }
        Ok(())
    }
}

/// A deserializable, self-validating site profile.
pub trait Profile: DeserializeOwned {
    /// Embedded YAML for the built-in profile.
    const BUILTIN: &'static str;

    fn site(&self) -> &Site;

    fn site_mut(&mut self) -> &mut Site;

    /// Profile-specific checks, run after the shared ones.
    fn validate(&self) -> Result<()>;

    fn builtin(params: &Params) -> Result<Self> {
        Self::parse_with_params(Self::BUILTIN, params)
    }

    fn load<P: AsRef<Path>>(path: P, params: &Params) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse_with_params(&content, params)
    }

    fn parse(yaml: &str) -> Result<Self> {
        Self::parse_with_params(yaml, &Params::new())
    }

    fn parse_with_params(yaml: &str, params: &Params) -> Result<Self> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(yaml)?;

        let defs: HashMap<String, ParamDef> = value
            .get("params")
            .and_then(|v| serde_yaml::from_value(v.clone()).ok())
            .unwrap_or_default();

        params::substitute_value(&mut value, params, &defs)?;

        let profile: Self = serde_yaml::from_value(value)?;
        profile.site().validate()?;
        profile.validate()?;
        Ok(profile)
    }
}

/// Require a non-empty locator.
pub(crate) fn require_locator(def: &LocatorDef, what: &str) -> Result<()> {
    if def.is_empty() {
        return Err(Error::Config(format!("{} needs at least one locator", what)));
    }
    Ok(())
}

/// Compile rules in order, checking field names against `known`.
pub(crate) fn build_extractor(rules: &[RuleDef], known: &[&str]) -> Result<Extractor> {
    let mut built = Vec::with_capacity(rules.len());
    for rule in rules {
        if !known.contains(&rule.field.as_str()) {
            return Err(Error::Config(format!(
                "unknown field '{}' (expected one of: {})",
                rule.field,
                known.join(", ")
            )));
        }
        let compiled = FieldRule::new(rule.field.as_str(), &rule.pattern, rule.normalize.into())
            .map_err(|e| Error::Config(format!("rule for '{}': {}", rule.field, e)))?;
        built.push(compiled);
    }
    Ok(Extractor::new(built))
}

pub(crate) fn build_scanner(def: &SectionDef) -> Result<SectionScanner> {
    let scanner = SectionScanner::new(&def.start)
        .and_then(|s| s.end_anchors(&def.ends))
        .map_err(|e| Error::Config(format!("section '{}': {}", def.start, e)))?;
    Ok(scanner
        .exclude(&def.exclude)
        .min_line_len(def.min_line_len.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_rule_field_rejected() {
        let rules = vec![RuleDef {
            field: "colour".into(),
            pattern: "red".into(),
            normalize: Normalize::Verbatim,
        }];
        let err = build_extractor(&rules, &["zone"]).unwrap_err();
        assert!(err.to_string().contains("unknown field 'colour'"));
    }

    #[test]
    fn test_bad_pattern_names_field() {
        let rules = vec![RuleDef {
            field: "zone".into(),
            pattern: "(unclosed".into(),
            normalize: Normalize::Verbatim,
        }];
        let err = build_extractor(&rules, &["zone"]).unwrap_err();
        assert!(err.to_string().contains("rule for 'zone'"));
    }

    #[test]
    fn test_locator_def_shapes() {
        let single: LocatorDef = serde_yaml::from_str(r#""text:Next""#).unwrap();
        assert_eq!(single.candidates, vec!["text:Next"]);

        let list: LocatorDef = serde_yaml::from_str(r##"["#a", "css:.b"]"##).unwrap();
        assert_eq!(list.candidates.len(), 2);
        assert!(list.fallback.is_none());

        let map: LocatorDef = serde_yaml::from_str(
            r#"
candidates: [".esri-feature"]
fallback: "css:body"
"#,
        )
        .unwrap();
        let loc = map.to_locator("panel");
        let order: Vec<String> = loc.strategies().map(|s| s.to_string()).collect();
        assert_eq!(order, vec!["css:.esri-feature", "css:body"]);
    }

    #[test]
    fn test_locator_def_rejects_unknown_key() {
        let result: std::result::Result<LocatorDef, _> = serde_yaml::from_str("selector: \"#a\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_timeouts_default_when_omitted() {
        let t: Timeouts = serde_yaml::from_str("locate_ms: 750").unwrap();
        assert_eq!(t.locate_ms, 750);
        assert_eq!(t.ready_ms, 10_000);
        assert_eq!(t.settle_ms, 2_000);
    }
}
