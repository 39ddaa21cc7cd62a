//! Exact-phrase row selection.
//!
//! Registry document names are exact, stable strings, so matching is a
//! verbatim substring test and the scan stops at the first hit.

use tracing::debug;

/// Anything reducible to matchable text and a display name.
pub trait Row {
    /// Text searched for the marker phrase.
    fn text(&self) -> &str;

    /// Name reported back when nothing matches.
    fn display_name(&self) -> &str;
}

impl Row for String {
    fn text(&self) -> &str {
        self
    }

    fn display_name(&self) -> &str {
        self
    }
}

impl Row for &str {
    fn text(&self) -> &str {
        self
    }

    fn display_name(&self) -> &str {
        self
    }
}

#[derive(Debug)]
pub enum RowMatch<'a, R> {
    Found { index: usize, row: &'a R },
    /// Display names of every row scanned, in order.
    NoMatch { visited: Vec<String> },
}

impl<'a, R> RowMatch<'a, R> {
    pub fn found(&self) -> Option<&'a R> {
        match self {
            RowMatch::Found { row, .. } => Some(*row),
            RowMatch::NoMatch { .. } => None,
        }
    }
}

/// First row whose text contains `marker`.
pub fn match_row<'a, R: Row>(rows: &'a [R], marker: &str) -> RowMatch<'a, R> {
    let mut visited = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        if row.text().contains(marker) {
            debug!("'{}' matched row {}: {}", marker, index, row.display_name());
            return RowMatch::Found { index, row };
        }
        visited.push(row.display_name().to_string());
    }
    debug!("'{}' not among {} rows", marker, rows.len());
    RowMatch::NoMatch { visited }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doc {
        name: &'static str,
        text: &'static str,
    }

    impl Row for Doc {
        fn text(&self) -> &str {
            self.text
        }

        fn display_name(&self) -> &str {
            self.name
        }
    }

    #[test]
    fn first_hit_terminates_scan() {
        let rows = ["Plan Form", "Signed Decision Notice", "Signed Decision Notice (draft)"];
        match match_row(&rows, "Signed Decision Notice") {
            RowMatch::Found { index, row } => {
                assert_eq!(index, 1);
                assert_eq!(*row, "Signed Decision Notice");
            }
            RowMatch::NoMatch { .. } => panic!("expected a match"),
        }
    }

    #[test]
    fn no_match_reports_every_row_in_order() {
        let rows = vec![
            Doc { name: "Plan Form", text: "1\tPlan Form\tPDF" },
            Doc { name: "Referral Letter", text: "2\tReferral Letter\tPDF" },
        ];
        match match_row(&rows, "Signed Decision Notice") {
            RowMatch::NoMatch { visited } => {
                assert_eq!(visited, vec!["Plan Form", "Referral Letter"]);
            }
            RowMatch::Found { .. } => panic!("unexpected match"),
        }
    }

    #[test]
    fn match_is_case_sensitive_substring() {
        let rows = ["signed decision notice", "Decision Notice - Signed"];
        assert!(match_row(&rows, "Signed Decision Notice").found().is_none());
    }

    #[test]
    fn matches_on_text_not_display_name() {
        let rows = vec![Doc { name: "D-17", text: "D-17\tSigned Decision Notice" }];
        assert_eq!(
            match_row(&rows, "Signed Decision Notice").found().map(|d| d.name),
            Some("D-17")
        );
    }

    #[test]
    fn empty_rows_no_match() {
        let rows: Vec<String> = Vec::new();
        assert!(matches!(
            match_row(&rows, "x"),
            RowMatch::NoMatch { visited } if visited.is_empty()
        ));
    }
}
