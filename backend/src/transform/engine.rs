//! Transform engine: ordered derived-column steps applied to every row.
//!
//! Each row is folded through the transformation list left to right. A step
//! reads the row as left by the earlier steps and returns a new row with its
//! `newColumnName` written (overwriting any field of that name). Lookups
//! against the main table read the filtered snapshot passed in
//! [`LookupTables`], never the rows being built.
//!
//! Malformed steps (wrong arity, missing lookup parameters, empty output
//! name) leave rows untouched. Formula failures write `"Error"` and are
//! counted in [`RunDiagnostics`]; they never stop the run.

use serde::Serialize;

use super::formula;
use super::lookup::{self, LookupMiss, LookupParams, LookupTables};
use crate::models::{AuxiliaryDataset, Cell, Row, TransformKind, Transformation};

/// Value written when a custom formula fails on a row.
pub const FORMULA_ERROR_VALUE: &str = "Error";

/// How many individual lookup misses are kept per run.
const MAX_RECORDED_MISSES: usize = 200;

/// Per-row faults collected during one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    pub formula_errors: usize,
    pub last_formula_error: Option<String>,
    /// Total unresolved lookups, including those not kept below.
    pub lookup_miss_count: usize,
    pub lookup_misses: Vec<RecordedMiss>,
}

/// A lookup miss tagged with the step that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedMiss {
    pub transformation_id: String,
    pub column: String,
    #[serde(flatten)]
    pub miss: LookupMiss,
}

impl RunDiagnostics {
    fn record_formula_error(&mut self, transformation: &Transformation, message: String) {
        self.formula_errors += 1;
        self.last_formula_error = Some(format!("{}: {}", transformation.new_column_name, message));
    }

    fn record_miss(&mut self, transformation: &Transformation, miss: LookupMiss) {
        self.lookup_miss_count += 1;
        if self.lookup_misses.len() < MAX_RECORDED_MISSES {
            self.lookup_misses.push(RecordedMiss {
                transformation_id: transformation.id.clone(),
                column: transformation.new_column_name.clone(),
                miss,
            });
        }
    }

    pub fn is_clean(&self) -> bool {
        self.formula_errors == 0 && self.lookup_miss_count == 0
    }
}

/// Transformed rows plus the faults collected while producing them.
#[derive(Debug, Clone, Default)]
pub struct TransformOutput {
    pub rows: Vec<Row>,
    pub diagnostics: RunDiagnostics,
}

/// Apply one step to one row.
pub fn apply_step(
    mut row: Row,
    transformation: &Transformation,
    tables: &LookupTables<'_>,
    diagnostics: &mut RunDiagnostics,
) -> Row {
    let target = transformation.new_column_name.as_str();
    if target.is_empty() {
        return row;
    }

    let value = match transformation.kind {
        TransformKind::Multiply
        | TransformKind::Add
        | TransformKind::Subtract
        | TransformKind::Divide => match arithmetic(transformation, &row) {
            Some(value) => value,
            None => return row,
        },
        TransformKind::Concat => Cell::Text(
            transformation
                .source_columns
                .iter()
                .map(|c| row.get(c).map(Cell::to_string).unwrap_or_default())
                .collect(),
        ),
        TransformKind::Xlookup => {
            let Some(params) = LookupParams::from_transformation(transformation) else {
                return row;
            };
            match lookup::resolve(&params, tables, &row) {
                Ok(value) => value,
                Err(miss) => {
                    let value = lookup::sentinel(&miss.key);
                    diagnostics.record_miss(transformation, miss);
                    value
                }
            }
        }
        TransformKind::Custom => {
            let Some(expression) = transformation.formula.as_deref().filter(|f| !f.trim().is_empty())
            else {
                return row;
            };
            match formula::evaluate(expression, &row) {
                Ok(value) => value,
                Err(err) => {
                    diagnostics.record_formula_error(transformation, err.to_string());
                    Cell::text(FORMULA_ERROR_VALUE)
                }
            }
        }
    };

    row.set(target, value);
    row
}

/// Binary arithmetic over exactly two source columns.
fn arithmetic(transformation: &Transformation, row: &Row) -> Option<Cell> {
    let [left, right] = transformation.source_columns.as_slice() else {
        return None;
    };
    let a = row.get(left).map(Cell::as_number).unwrap_or(f64::NAN);
    let b = row.get(right).map(Cell::as_number).unwrap_or(f64::NAN);

    let result = match transformation.kind {
        TransformKind::Multiply => a * b,
        TransformKind::Add => a + b,
        TransformKind::Subtract => a - b,
        TransformKind::Divide => a / b,
        _ => return None,
    };
    Some(Cell::Number(result))
}

/// Fold one row through every step.
pub fn transform_row(
    row: &Row,
    transformations: &[Transformation],
    tables: &LookupTables<'_>,
    diagnostics: &mut RunDiagnostics,
) -> Row {
    transformations
        .iter()
        .fold(row.clone(), |acc, t| apply_step(acc, t, tables, diagnostics))
}

/// Apply `transformations` to every filtered row.
///
/// `filtered` doubles as the main lookup table for the whole pass.
pub fn apply_transformations(
    filtered: &[Row],
    transformations: &[Transformation],
    datasets: &[AuxiliaryDataset],
) -> TransformOutput {
    let tables = LookupTables::new(filtered, datasets);
    let mut diagnostics = RunDiagnostics::default();

    let rows = filtered
        .iter()
        .map(|row| transform_row(row, transformations, &tables, &mut diagnostics))
        .collect();

    TransformOutput { rows, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MAIN_TABLE_ID;

    fn run(rows: &[Row], ts: &[Transformation]) -> TransformOutput {
        apply_transformations(rows, ts, &[])
    }

    #[test]
    fn test_arithmetic() {
        let rows = vec![Row::new().with("a", "6").with("b", "3")];
        let ts = vec![
            Transformation::arithmetic(TransformKind::Multiply, "m", "a", "b"),
            Transformation::arithmetic(TransformKind::Add, "s", "a", "b"),
            Transformation::arithmetic(TransformKind::Subtract, "d", "a", "b"),
            Transformation::arithmetic(TransformKind::Divide, "q", "a", "b"),
        ];
        let out = run(&rows, &ts);
        let row = &out.rows[0];
        assert_eq!(row.get("m"), Some(&Cell::Number(18.0)));
        assert_eq!(row.get("s"), Some(&Cell::Number(9.0)));
        assert_eq!(row.get("d"), Some(&Cell::Number(3.0)));
        assert_eq!(row.get("q"), Some(&Cell::Number(2.0)));
    }

    #[test]
    fn test_arithmetic_wrong_arity_is_noop() {
        let rows = vec![Row::new().with("a", "1")];
        let mut t = Transformation::arithmetic(TransformKind::Add, "s", "a", "a");
        t.source_columns.push("a".into());
        let out = run(&rows, &[t]);
        assert!(!out.rows[0].contains("s"));
    }

    #[test]
    fn test_non_numeric_yields_nan() {
        let rows = vec![Row::new().with("a", "x").with("b", "1")];
        let t = Transformation::arithmetic(TransformKind::Add, "s", "a", "b");
        let out = run(&rows, &[t]);
        assert!(out.rows[0].get("s").unwrap().as_number().is_nan());
    }

    #[test]
    fn test_concat_without_separator() {
        let rows = vec![Row::new().with("a", "x").with("b", Cell::Number(2.0))];
        let ts = vec![
            Transformation::concat("ab", &["a", "b", "missing"]),
            Transformation::concat("none", &[]),
        ];
        let out = run(&rows, &ts);
        assert_eq!(out.rows[0].get("ab"), Some(&Cell::text("x2")));
        assert_eq!(out.rows[0].get("none"), Some(&Cell::text("")));
    }

    #[test]
    fn test_later_steps_see_earlier_outputs() {
        let rows = vec![Row::new().with("a", "2")];
        let ts = vec![
            Transformation::arithmetic(TransformKind::Add, "b", "a", "a"),
            Transformation::arithmetic(TransformKind::Multiply, "c", "b", "b"),
        ];
        let out = run(&rows, &ts);
        assert_eq!(out.rows[0].get("c"), Some(&Cell::Number(16.0)));
    }

    #[test]
    fn test_forward_reference_is_absent() {
        let rows = vec![Row::new().with("a", "2")];
        let ts = vec![
            Transformation::arithmetic(TransformKind::Add, "c", "b", "a"),
            Transformation::concat("b", &["a"]),
        ];
        let out = run(&rows, &ts);
        assert!(out.rows[0].get("c").unwrap().as_number().is_nan());
        assert_eq!(out.rows[0].get("b"), Some(&Cell::text("2")));
    }

    #[test]
    fn test_overwrite_existing_field() {
        let rows = vec![Row::new().with("a", "2").with("b", "keep")];
        let ts = vec![Transformation::arithmetic(TransformKind::Add, "a", "a", "a")];
        let out = run(&rows, &ts);
        assert_eq!(out.rows[0].keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(out.rows[0].get("a"), Some(&Cell::Number(4.0)));
    }

    #[test]
    fn test_main_lookup_uses_pre_transform_snapshot() {
        let rows = vec![
            Row::new().with("id", "1").with("parent", "2"),
            Row::new().with("id", "2").with("parent", "1"),
        ];
        let ts = vec![
            Transformation::concat("label", &["id", "id"]),
            Transformation::xlookup("parentLabel", "parent", MAIN_TABLE_ID, "id", "label"),
        ];
        let out = run(&rows, &ts);
        // `label` does not exist in the frozen main table.
        assert_eq!(out.rows[0].get("parentLabel"), Some(&Cell::Null));
        assert_eq!(out.rows[0].get("label"), Some(&Cell::text("11")));
    }

    #[test]
    fn test_lookup_miss_writes_sentinel() {
        let rows = vec![Row::new().with("id", "1").with("ref", "9")];
        let t = Transformation::xlookup("x", "ref", MAIN_TABLE_ID, "id", "id").with_id("t1");
        let out = run(&rows, &[t]);
        assert_eq!(out.rows[0].get("x"), Some(&Cell::text("Not found: \"9\"")));
        assert_eq!(out.diagnostics.lookup_miss_count, 1);
        assert_eq!(out.diagnostics.lookup_misses[0].transformation_id, "t1");
    }

    #[test]
    fn test_formula_error_is_isolated() {
        let rows = vec![
            Row::new().with("Price", "10").with("Quantity", "3"),
            Row::new().with("Price", "4"),
        ];
        let ts = vec![
            Transformation::custom("Total", "Price * Quantity"),
            Transformation::concat("After", &["Price"]),
        ];
        let out = run(&rows, &ts);
        assert_eq!(out.rows[0].get("Total"), Some(&Cell::Number(30.0)));
        assert_eq!(out.rows[1].get("Total"), Some(&Cell::text("Error")));
        assert_eq!(out.rows[1].get("After"), Some(&Cell::text("4")));
        assert_eq!(out.diagnostics.formula_errors, 1);
        assert!(out
            .diagnostics
            .last_formula_error
            .as_deref()
            .is_some_and(|m| m.contains("Quantity")));
    }

    #[test]
    fn test_deeply_nested_formula_is_an_error_cell() {
        let rows = vec![Row::new().with("a", "1")];
        let deep = format!("{}a{}", "(".repeat(5_000), ")".repeat(5_000));
        let out = run(&rows, &[Transformation::custom("b", &deep)]);
        assert_eq!(out.rows[0].get("b"), Some(&Cell::text(FORMULA_ERROR_VALUE)));
        assert_eq!(out.diagnostics.formula_errors, 1);
        assert!(out
            .diagnostics
            .last_formula_error
            .as_deref()
            .is_some_and(|m| m.contains("nested too deeply")));
    }

    #[test]
    fn test_empty_formula_is_noop() {
        let rows = vec![Row::new().with("a", "1")];
        let mut t = Transformation::custom("b", " ");
        let out = run(&rows, &[t.clone()]);
        assert!(!out.rows[0].contains("b"));

        t.formula = None;
        let out = run(&rows, &[t]);
        assert!(!out.rows[0].contains("b"));
        assert!(out.diagnostics.is_clean());
    }

    #[test]
    fn test_input_rows_untouched() {
        let rows = vec![Row::new().with("a", "1")];
        let _ = run(&rows, &[Transformation::concat("b", &["a"])]);
        assert_eq!(rows[0].len(), 1);
    }
}
