//! Filter engine: boolean AND of per-column predicates.
//!
//! Filters run on assembled records before any transformation, so they only
//! see source columns. A row passes when it satisfies every filter; an empty
//! filter list keeps everything. Row order is preserved.

use crate::models::{Filter, FilterOperator, Row};

/// Whether `row` satisfies a single filter.
///
/// A field the row does not have never matches.
pub fn matches(row: &Row, filter: &Filter) -> bool {
    let Some(value) = row.get(&filter.column) else {
        return false;
    };

    match filter.operator {
        FilterOperator::Equals => *value == filter.value,
        FilterOperator::Contains => {
            let haystack = value.to_string();
            let needle = filter.value.to_string();
            if filter.case_sensitive {
                haystack.contains(&needle)
            } else {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
        }
        // NaN on either side compares false, which excludes the row.
        FilterOperator::GreaterThan => value.as_number() > filter.value.as_number(),
        FilterOperator::LessThan => value.as_number() < filter.value.as_number(),
    }
}

/// Whether `row` satisfies every filter.
pub fn passes(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(row, f))
}

/// Keep the rows that satisfy every filter, in their original order.
pub fn apply_filters(rows: &[Row], filters: &[Filter]) -> Vec<Row> {
    rows.iter().filter(|row| passes(row, filters)).cloned().collect()
}
