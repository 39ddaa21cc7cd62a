//! Ordered pattern rules over unstructured text.
//!
//! Rules are evaluated in the order given. The first usable match for a field
//! wins and later rules for the same field are ignored, which makes the rule
//! order the tie-break for ambiguous text. Matching is case-insensitive; values
//! keep the casing found in the text.

use crate::Result;
use regex::{Regex, RegexBuilder};
use std::ops::Range;
use tracing::debug;

/// Post-processing applied to a matched value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer {
    /// Keep the matched text exactly.
    Verbatim,
    /// Trim surrounding whitespace.
    Trim,
    /// Drop thousands separators from a number: `1,234.5` -> `1234.5`.
    StripThousands,
}

impl Normalizer {
    pub fn apply(&self, raw: &str) -> String {
        match self {
            Normalizer::Verbatim => raw.to_string(),
            Normalizer::Trim => raw.trim().to_string(),
            Normalizer::StripThousands => raw.trim().replace(',', ""),
        }
    }
}

/// One `(field, pattern, normalizer)` rule. The value is capture group 1 when
/// the pattern has one, otherwise the whole match.
#[derive(Debug, Clone)]
pub struct FieldRule {
    field: String,
    pattern: Regex,
    normalizer: Normalizer,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, pattern: &str, normalizer: Normalizer) -> Result<Self> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            field: field.into(),
            pattern,
            normalizer,
        })
    }
}

/// A field's value, or the fact that no rule matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Found(String),
    Absent,
}

impl Field {
    pub fn value(&self) -> Option<&str> {
        match self {
            Field::Found(v) => Some(v),
            Field::Absent => None,
        }
    }
}

/// Field name to value, in rule order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    fields: Vec<(String, Field)>,
}

impl Extraction {
    /// Value of `field`; unknown fields are absent.
    pub fn get(&self, field: &str) -> Field {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.clone())
            .unwrap_or(Field::Absent)
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, value)| value.value())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn found(&self) -> usize {
        self.fields
            .iter()
            .filter(|(_, v)| matches!(v, Field::Found(_)))
            .count()
    }
}

/// Stateless rule set.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    rules: Vec<FieldRule>,
}

impl Extractor {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn extract(&self, text: &str) -> Extraction {
        let mut fields: Vec<(String, Field)> = Vec::new();
        for rule in &self.rules {
            if !fields.iter().any(|(name, _)| *name == rule.field) {
                fields.push((rule.field.clone(), Field::Absent));
            }
        }

        let mut claimed: Vec<Range<usize>> = Vec::new();
        for rule in &self.rules {
            let Some(slot) = fields.iter_mut().find(|(name, _)| *name == rule.field) else {
                continue;
            };
            if matches!(slot.1, Field::Found(_)) {
                continue;
            }

            for caps in rule.pattern.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                let span = whole.range();
                if claimed.iter().any(|c| c.start < span.end && span.start < c.end) {
                    continue;
                }
                let raw = if rule.pattern.captures_len() > 1 {
                    match caps.get(1) {
                        Some(group) => group.as_str(),
                        None => continue,
                    }
                } else {
                    whole.as_str()
                };
                let value = rule.normalizer.apply(raw);
                if value.is_empty() {
                    continue;
                }
                debug!("{} = {:?} (/{}/)", rule.field, value, rule.pattern.as_str());
                slot.1 = Field::Found(value);
                claimed.push(span);
                break;
            }
        }

        Extraction { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONES: &str = r"(Low density residential|Low-medium density residential|Medium density residential|High density residential)";

    fn property_rules() -> Extractor {
        Extractor::new(vec![
            FieldRule::new("zone", ZONES, Normalizer::Verbatim).unwrap(),
            FieldRule::new("density", r"Residential\s+density[:\s]+(RD\d+)", Normalizer::Verbatim).unwrap(),
            FieldRule::new("area", r"Plan\s*Area\s*([\d.,]+)\s*m[²2]", Normalizer::StripThousands).unwrap(),
            FieldRule::new("area", r"([\d.,]+)\s*m[²2]", Normalizer::StripThousands).unwrap(),
            FieldRule::new("lot_plan", r"Lot/Plan\s+(\w+)", Normalizer::Verbatim).unwrap(),
        ])
    }

    #[test]
    fn zone_keeps_page_casing() {
        let rules = property_rules();
        for (text, expected) in [
            ("Zone\nLow density residential", "Low density residential"),
            ("ZONE: LOW DENSITY RESIDENTIAL", "LOW DENSITY RESIDENTIAL"),
            ("ZONE\nLow-Medium Density Residential\nmore", "Low-Medium Density Residential"),
            ("zone: low-medium density residential", "low-medium density residential"),
            ("Zone Low-medium density RESIDENTIAL (LMR)", "Low-medium density RESIDENTIAL"),
            ("Zone\nMedium density residential", "Medium density residential"),
            ("zone medium Density Residential", "medium Density Residential"),
            ("Zone\nHigh density residential", "High density residential"),
            ("HIGH DENSITY RESIDENTIAL zone", "HIGH DENSITY RESIDENTIAL"),
        ] {
            assert_eq!(rules.extract(text).value("zone"), Some(expected), "{text}");
        }
    }

    #[test]
    fn unmatched_optional_group_is_not_the_whole_match() {
        let rules = Extractor::new(vec![FieldRule::new(
            "height",
            r"Building\s+height(?::\s*(\d+\s*m))?",
            Normalizer::Trim,
        )
        .unwrap()]);
        assert_eq!(rules.extract("Building height").get("height"), Field::Absent);
        assert_eq!(
            rules.extract("Building height\nBuilding height: 12 m").value("height"),
            Some("12 m")
        );
    }

    #[test]
    fn pattern_without_group_yields_whole_match() {
        let rules = Extractor::new(vec![FieldRule::new("density", r"RD\d+", Normalizer::Verbatim).unwrap()]);
        assert_eq!(rules.extract("Residential density RD3").value("density"), Some("RD3"));
    }

    #[test]
    fn area_strips_thousands_separators() {
        let rules = property_rules();
        assert_eq!(rules.extract("Site 1,234.5 m²").value("area"), Some("1234.5"));
        assert_eq!(rules.extract("Plan Area 200 m2").value("area"), Some("200"));
    }

    #[test]
    fn missing_area_is_absent_not_empty() {
        let extraction = property_rules().extract("Zone: High density residential");
        assert_eq!(extraction.get("area"), Field::Absent);
        assert_eq!(extraction.value("area"), None);
        assert_eq!(extraction.get("not_a_rule"), Field::Absent);
    }

    #[test]
    fn earlier_rule_wins_for_same_field() {
        let text = "Frontage 12 m2\nPlan Area 1,050 m2";
        assert_eq!(property_rules().extract(text).value("area"), Some("1050"));
    }

    #[test]
    fn first_match_in_text_wins_within_rule() {
        let rules = Extractor::new(vec![
            FieldRule::new("density", r"Residential\s+density[:\s]+(RD\d+)", Normalizer::Verbatim).unwrap(),
        ]);
        let text = "Residential density: RD3\nResidential density: RD8";
        assert_eq!(rules.extract(text).value("density"), Some("RD3"));
    }

    #[test]
    fn matches_overlapping_another_field_are_skipped() {
        let rules = Extractor::new(vec![
            FieldRule::new("lot_plan", r"Lot/Plan\s+(\w+)", Normalizer::Verbatim).unwrap(),
            FieldRule::new("plan", r"Plan\s+(\w+)", Normalizer::Verbatim).unwrap(),
        ]);
        let extraction = rules.extract("Lot/Plan 4GTP446\nPlan SP1234");
        assert_eq!(extraction.value("lot_plan"), Some("4GTP446"));
        assert_eq!(extraction.value("plan"), Some("SP1234"));
    }

    #[test]
    fn empty_normalized_value_is_not_a_match() {
        let rules = Extractor::new(vec![
            FieldRule::new("area", r"Area\s*([\d,]*)\s*m2", Normalizer::StripThousands).unwrap(),
        ]);
        assert_eq!(rules.extract("Area , m2").get("area"), Field::Absent);
    }

    #[test]
    fn extraction_is_idempotent() {
        let rules = property_rules();
        let text = "Lot/Plan 4GTP446\nPlan Area 607 m2\nMedium density residential\nResidential density RD5";
        let first = rules.extract(text);
        let second = rules.extract(text);
        assert_eq!(first, second);
        assert_eq!(first.found(), 4);
    }

    #[test]
    fn fields_listed_in_rule_order() {
        let extracted = property_rules().extract("");
        let names: Vec<&str> = extracted
            .fields()
            .map(|(n, _)| n)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["zone", "density", "area", "lot_plan"]);
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(FieldRule::new("x", "(unclosed", Normalizer::Verbatim).is_err());
    }
}
