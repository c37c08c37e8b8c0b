//! Missing-value auditor for xlookup steps.
//!
//! For the xlookup at position `i`, the steps `[0, i)` are replayed over the
//! filtered rows exactly as the transform engine runs them (same frozen main
//! table). The distinct non-empty keys found in the key column are then
//! matched against the step's target with the engine's own
//! [`find_match`], so the audit can never disagree with execution.

use serde::Serialize;
use std::collections::HashSet;

use crate::error::{PipelineError, PipelineResult};
use crate::models::{AuxiliaryDataset, Cell, Preset, Row, TransformKind, Transformation};
use crate::transform::engine::apply_transformations;
use crate::transform::lookup::{find_match, is_sentinel, LookupParams, LookupTables};
use crate::transform::pipeline::filtered_rows;

/// A key with no match, and one row that carries it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingValue {
    pub key: Cell,
    pub representative: Row,
}

/// Audit result for one xlookup step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingValueReport {
    pub transformation_id: String,
    pub column: String,
    pub target_id: String,
    pub target_name: Option<String>,
    pub target_last_modified: Option<String>,
    /// The target dataset no longer exists; every key is reported.
    pub target_missing: bool,
    /// Number of distinct keys checked.
    pub checked_keys: usize,
    pub missing: Vec<MissingValue>,
}

impl MissingValueReport {
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }
}

/// Identity of a key for de-duplication; mirrors [`Cell`] strict equality,
/// except that every NaN is one key (execution still looks each one up).
#[derive(Hash, PartialEq, Eq)]
enum KeyId {
    Null,
    Text(String),
    Number(u64),
}

fn key_id(cell: &Cell) -> KeyId {
    match cell {
        Cell::Null => KeyId::Null,
        Cell::Text(s) => KeyId::Text(s.clone()),
        Cell::Number(n) if n.is_nan() => KeyId::Number(f64::NAN.to_bits()),
        Cell::Number(n) => KeyId::Number((n + 0.0).to_bits()),
    }
}

/// Audit the xlookup at `index` of `transformations`.
///
/// Returns `None` when that step does not exist, is not an xlookup, or lacks
/// a key column, target, lookup column or return column.
pub fn audit_lookup(
    filtered: &[Row],
    transformations: &[Transformation],
    index: usize,
    datasets: &[AuxiliaryDataset],
) -> Option<MissingValueReport> {
    let step = transformations.get(index)?;
    if step.kind != TransformKind::Xlookup {
        return None;
    }
    let params = LookupParams::from_transformation(step)?;

    let replayed = apply_transformations(filtered, &transformations[..index], datasets).rows;
    let tables = LookupTables::new(filtered, datasets);
    let target = tables.target(params.target_id);

    let mut seen = HashSet::new();
    let mut checked_keys = 0;
    let mut missing = Vec::new();

    for row in &replayed {
        let Some(key) = row.get(params.key_column) else {
            continue;
        };
        if key.is_blank() || is_sentinel(key) {
            continue;
        }
        if !seen.insert(key_id(key)) {
            continue;
        }
        checked_keys += 1;

        let found = target.is_some_and(|t| find_match(t.rows, params.lookup_column, key).is_some());
        if !found {
            missing.push(MissingValue {
                key: key.clone(),
                representative: row.clone(),
            });
        }
    }

    Some(MissingValueReport {
        transformation_id: step.id.clone(),
        column: step.new_column_name.clone(),
        target_id: params.target_id.to_string(),
        target_name: target.map(|t| t.name.to_string()),
        target_last_modified: target.and_then(|t| t.last_modified.map(str::to_string)),
        target_missing: target.is_none(),
        checked_keys,
        missing,
    })
}

/// Audit a preset's xlookup step by id, starting from configured records.
pub fn audit_transformation(
    configured: &[Row],
    preset: &Preset,
    datasets: &[AuxiliaryDataset],
    transformation_id: &str,
) -> PipelineResult<MissingValueReport> {
    let index = preset
        .transformations
        .iter()
        .position(|t| t.id == transformation_id)
        .ok_or_else(|| PipelineError::UnknownLookup(transformation_id.to_string()))?;

    let filtered = filtered_rows(configured, preset);
    audit_lookup(&filtered, &preset.transformations, index, datasets)
        .ok_or_else(|| PipelineError::UnknownLookup(transformation_id.to_string()))
}

/// Audit every well-formed xlookup step of a preset.
pub fn audit_all(configured: &[Row], preset: &Preset, datasets: &[AuxiliaryDataset]) -> Vec<MissingValueReport> {
    let filtered = filtered_rows(configured, preset);
    (0..preset.transformations.len())
        .filter_map(|i| audit_lookup(&filtered, &preset.transformations, i, datasets))
        .collect()
}
