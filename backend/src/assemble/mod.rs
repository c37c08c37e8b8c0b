//! Dataset assembly: raw row matrices plus header configuration into records.
//!
//! ```text
//! source A ──┐
//!            ├─▶ validate_sources ─▶ headers (first source wins) ─▶ Vec<Row>
//! source B ──┘
//! ```
//!
//! Sources are concatenated in input order. Each record carries the source
//! identifier first (when enabled), then the selected data fields in header
//! order. A data row shorter than the header simply lacks the trailing
//! fields.

use serde::Serialize;

use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{AuxiliaryDataset, Cell, Dataset, HeaderSelector, Row, SOURCE_FIELD};
use crate::parser::RawSource;

/// Options controlling how sources become records.
#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub header: HeaderSelector,
    /// Header indices to keep; empty keeps every column.
    pub selected_columns: Vec<usize>,
    pub include_source_field: bool,
}

impl Default for AssemblyOptions {
    fn default() -> Self {
        Self {
            header: HeaderSelector::Row(0),
            selected_columns: Vec::new(),
            include_source_field: false,
        }
    }
}

/// Outcome of validating the sources against each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReport {
    /// Authoritative header names, taken from the first source.
    pub headers: Vec<String>,
    pub column_count: usize,
    /// Non-blocking notices such as differing column names.
    pub warnings: Vec<String>,
}

/// Header names for one source.
///
/// Blank header cells are given their placeholder name.
pub fn source_headers(source: &RawSource, header: HeaderSelector) -> AssemblyResult<Vec<String>> {
    match header {
        HeaderSelector::Row(index) => {
            let row = source
                .rows
                .get(index)
                .ok_or_else(|| AssemblyError::HeaderRowOutOfRange {
                    source_name: source.name.clone(),
                    index,
                })?;
            Ok(row
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let name = name.trim();
                    if name.is_empty() {
                        placeholder_name(i)
                    } else {
                        name.to_string()
                    }
                })
                .collect())
        }
        HeaderSelector::Placeholder => Ok((0..source.width()).map(placeholder_name).collect()),
    }
}

fn placeholder_name(index: usize) -> String {
    format!("Column {}", index + 1)
}

/// Check that all sources share the same column count.
///
/// Differing counts block the pipeline; differing names with matching counts
/// only produce a warning, the first source's names being authoritative.
pub fn validate_sources(sources: &[RawSource], header: HeaderSelector) -> AssemblyResult<SourceReport> {
    let Some(first) = sources.first() else {
        return Ok(SourceReport::default());
    };

    let headers = source_headers(first, header)?;
    let mut warnings = Vec::new();

    for source in &sources[1..] {
        let other = source_headers(source, header)?;
        if other.len() != headers.len() {
            return Err(AssemblyError::StructuralMismatch {
                expected_source: first.name.clone(),
                expected: headers.len(),
                source_name: source.name.clone(),
                found: other.len(),
            });
        }
        if other != headers {
            warnings.push(format!(
                "Column names in '{}' differ from '{}'; using the names from '{}'",
                source.name, first.name, first.name
            ));
        }
    }

    Ok(SourceReport {
        column_count: headers.len(),
        headers,
        warnings,
    })
}

/// Header positions kept by a column selection, in header order.
pub fn selected_positions(headers: &[String], selected: &[usize]) -> Vec<usize> {
    if selected.is_empty() {
        return (0..headers.len()).collect();
    }
    (0..headers.len()).filter(|i| selected.contains(i)).collect()
}

/// Assemble every source into one flat record sequence.
pub fn assemble(sources: &[RawSource], options: &AssemblyOptions) -> AssemblyResult<(Dataset, SourceReport)> {
    let report = validate_sources(sources, options.header)?;
    let positions = selected_positions(&report.headers, &options.selected_columns);

    let skip = match options.header {
        HeaderSelector::Row(index) => index + 1,
        HeaderSelector::Placeholder => 0,
    };

    let mut rows = Vec::new();
    for source in sources {
        for cells in source.rows.iter().skip(skip) {
            let mut row = Row::with_capacity(positions.len() + 1);
            if options.include_source_field {
                row.set(SOURCE_FIELD, Cell::text(source.name.as_str()));
            }
            for &pos in &positions {
                if let Some(value) = cells.get(pos) {
                    row.set(report.headers[pos].as_str(), Cell::text(value.as_str()));
                }
            }
            rows.push(row);
        }
    }

    Ok((rows, report))
}

/// Turn one uploaded source into a lookup dataset (first row is the header).
pub fn dataset_from_source(id: &str, name: &str, source: &RawSource) -> AssemblyResult<AuxiliaryDataset> {
    let (rows, report) = assemble(std::slice::from_ref(source), &AssemblyOptions::default())?;
    let mut dataset = AuxiliaryDataset::new(id, name, rows);
    dataset.columns = report.headers;
    Ok(dataset)
}
