//! XLOOKUP resolution: single-key approximate-match join.
//!
//! The whole target table is searched in three ordered tiers before giving
//! up:
//!
//! 1. exact value equality
//! 2. equality of the trimmed text forms
//! 3. case-insensitive equality of the trimmed text forms
//!
//! Tier 1 is exhausted over every row before tier 2 starts, so an exact match
//! late in the table beats a fuzzy match near the top. The first qualifying
//! row wins and its return column is copied verbatim.
//!
//! Both the transform engine and the missing-value auditor go through
//! [`find_match`], so execution and audit cannot disagree.

use serde::Serialize;

use crate::models::{AuxiliaryDataset, Cell, Row, Transformation, MAIN_TABLE_ID};

/// Prefix of the value written when a key does not resolve.
pub const SENTINEL_PREFIX: &str = "Not found: \"";

/// Diagnostic value written into the output field on a miss.
pub fn sentinel(key: &str) -> Cell {
    Cell::Text(format!("{}{}\"", SENTINEL_PREFIX, key))
}

/// Whether a cell holds a lookup-miss diagnostic.
pub fn is_sentinel(cell: &Cell) -> bool {
    cell.as_str().is_some_and(|s| s.starts_with(SENTINEL_PREFIX) && s.ends_with('"'))
}

/// Tables a lookup can target during one run.
///
/// `main` is the filtered table as it was before any transformation of the
/// current run; it does not change while transformations are applied.
#[derive(Debug, Clone, Copy)]
pub struct LookupTables<'a> {
    pub main: &'a [Row],
    pub datasets: &'a [AuxiliaryDataset],
}

/// A resolved lookup target.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub name: &'a str,
    pub last_modified: Option<&'a str>,
    pub rows: &'a [Row],
}

impl<'a> LookupTables<'a> {
    pub fn new(main: &'a [Row], datasets: &'a [AuxiliaryDataset]) -> Self {
        Self { main, datasets }
    }

    /// Resolve a target id; `None` when the dataset no longer exists.
    pub fn target(&self, id: &str) -> Option<Target<'a>> {
        if id == MAIN_TABLE_ID {
            return Some(Target {
                name: "Main table",
                last_modified: None,
                rows: self.main,
            });
        }
        self.datasets.iter().find(|d| d.id == id).map(|d| Target {
            name: d.name.as_str(),
            last_modified: d.last_modified.as_deref(),
            rows: &d.rows,
        })
    }
}

/// The parameters of a well-formed xlookup step.
#[derive(Debug, Clone, Copy)]
pub struct LookupParams<'a> {
    pub key_column: &'a str,
    pub target_id: &'a str,
    pub lookup_column: &'a str,
    pub return_column: &'a str,
}

impl<'a> LookupParams<'a> {
    /// `None` when any of key column, target, lookup or return column is
    /// missing; such a step is a no-op.
    pub fn from_transformation(t: &'a Transformation) -> Option<Self> {
        let key_column = t.source_columns.first().filter(|c| !c.is_empty())?;
        let target_id = t.lookup_target_id.as_deref().filter(|s| !s.is_empty())?;
        let lookup_column = t.lookup_column.as_deref().filter(|s| !s.is_empty())?;
        let return_column = t.return_column.as_deref().filter(|s| !s.is_empty())?;
        Some(Self {
            key_column,
            target_id,
            lookup_column,
            return_column,
        })
    }
}

/// Find the first row of `rows` whose `lookup_column` matches `key`.
pub fn find_match<'r>(rows: &'r [Row], lookup_column: &str, key: &Cell) -> Option<&'r Row> {
    if let Some(row) = rows.iter().find(|r| r.get(lookup_column) == Some(key)) {
        return Some(row);
    }

    let key_text = key.to_string();
    let trimmed = key_text.trim();
    if let Some(row) = rows.iter().find(|r| {
        r.get(lookup_column)
            .is_some_and(|v| v.to_string().trim() == trimmed)
    }) {
        return Some(row);
    }

    let folded = trimmed.to_lowercase();
    rows.iter().find(|r| {
        r.get(lookup_column)
            .is_some_and(|v| v.to_string().trim().to_lowercase() == folded)
    })
}

/// Why a lookup did not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MissReason {
    NoMatch,
    /// The row has no value in the key column.
    MissingKey,
    /// The target dataset was deleted.
    TargetMissing,
}

/// Details of one unresolved lookup, kept for user-facing diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupMiss {
    pub key: String,
    pub reason: MissReason,
    pub target_id: String,
    pub target_name: Option<String>,
    pub target_last_modified: Option<String>,
}

/// Resolve one row's lookup.
///
/// On success returns the matched row's return column (null when that row
/// lacks it); on failure returns the miss details. The caller writes the
/// sentinel.
pub fn resolve(params: &LookupParams<'_>, tables: &LookupTables<'_>, row: &Row) -> Result<Cell, LookupMiss> {
    let key = row.get(params.key_column);
    let target = tables.target(params.target_id);

    let miss = |reason: MissReason| LookupMiss {
        key: key.map(Cell::to_string).unwrap_or_default(),
        reason,
        target_id: params.target_id.to_string(),
        target_name: target.map(|t| t.name.to_string()),
        target_last_modified: target.and_then(|t| t.last_modified.map(str::to_string)),
    };

    let Some(target) = target else {
        return Err(miss(MissReason::TargetMissing));
    };
    let Some(key) = key else {
        return Err(miss(MissReason::MissingKey));
    };

    match find_match(target.rows, params.lookup_column, key) {
        Some(found) => Ok(found.get(params.return_column).cloned().unwrap_or(Cell::Null)),
        None => Err(miss(MissReason::NoMatch)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> Vec<Row> {
        vec![
            Row::new().with("Sku", " a ").with("Price", "1"),
            Row::new().with("Sku", "A").with("Price", "2"),
            Row::new().with("Sku", "b").with("Price", Cell::Number(3.0)),
            Row::new().with("Sku", "a").with("Price", "4"),
        ]
    }

    #[test]
    fn test_exact_match_beats_earlier_fuzzy_match() {
        let rows = prices();
        let found = find_match(&rows, "Sku", &Cell::text("a")).unwrap();
        assert_eq!(found.get("Price"), Some(&Cell::text("4")));
    }

    #[test]
    fn test_trimmed_tier_before_case_tier() {
        let rows = vec![
            Row::new().with("Sku", "X").with("Price", "case"),
            Row::new().with("Sku", " x ").with("Price", "trim"),
        ];
        let found = find_match(&rows, "Sku", &Cell::text("x")).unwrap();
        assert_eq!(found.get("Price"), Some(&Cell::text("trim")));
    }

    #[test]
    fn test_case_insensitive_fallback() {
        let rows = vec![Row::new().with("Sku", "a").with("Price", "1")];
        let found = find_match(&rows, "Sku", &Cell::text(" A ")).unwrap();
        assert_eq!(found.get("Price"), Some(&Cell::text("1")));
    }

    #[test]
    fn test_number_key_matches_text_via_string_form() {
        let rows = vec![Row::new().with("Id", "7").with("Name", "seven")];
        let found = find_match(&rows, "Id", &Cell::Number(7.0)).unwrap();
        assert_eq!(found.get("Name"), Some(&Cell::text("seven")));
    }

    #[test]
    fn test_resolve_copies_verbatim() {
        let main = prices();
        let tables = LookupTables::new(&main, &[]);
        let t = Transformation::xlookup("P", "Sku", MAIN_TABLE_ID, "Sku", "Price");
        let params = LookupParams::from_transformation(&t).unwrap();

        let row = Row::new().with("Sku", "b");
        assert_eq!(resolve(&params, &tables, &row), Ok(Cell::Number(3.0)));
    }

    #[test]
    fn test_resolve_miss_details() {
        let dataset = AuxiliaryDataset::new("rates", "Rates", vec![Row::new().with("Code", "EUR")]);
        let datasets = vec![dataset];
        let tables = LookupTables::new(&[], &datasets);
        let t = Transformation::xlookup("R", "Cur", "rates", "Code", "Rate");
        let params = LookupParams::from_transformation(&t).unwrap();

        let miss = resolve(&params, &tables, &Row::new().with("Cur", "USD")).unwrap_err();
        assert_eq!(miss.reason, MissReason::NoMatch);
        assert_eq!(miss.key, "USD");
        assert_eq!(miss.target_name.as_deref(), Some("Rates"));
        assert!(miss.target_last_modified.is_some());
    }

    #[test]
    fn test_deleted_target_is_a_miss() {
        let tables = LookupTables::new(&[], &[]);
        let t = Transformation::xlookup("R", "Cur", "gone", "Code", "Rate");
        let params = LookupParams::from_transformation(&t).unwrap();
        let miss = resolve(&params, &tables, &Row::new().with("Cur", "USD")).unwrap_err();
        assert_eq!(miss.reason, MissReason::TargetMissing);
        assert!(miss.target_name.is_none());
    }

    #[test]
    fn test_incomplete_params_is_none() {
        let mut t = Transformation::xlookup("R", "Cur", "main", "Code", "Rate");
        t.return_column = None;
        assert!(LookupParams::from_transformation(&t).is_none());

        let mut t = Transformation::xlookup("R", "Cur", "main", "Code", "Rate");
        t.source_columns.clear();
        assert!(LookupParams::from_transformation(&t).is_none());
    }

    #[test]
    fn test_sentinel_format() {
        let cell = sentinel("X-1");
        assert_eq!(cell, Cell::text("Not found: \"X-1\""));
        assert!(is_sentinel(&cell));
        assert!(!is_sentinel(&Cell::text("Not found")));
    }
}
