//! Export of stage outputs and lookup diagnostics.
//!
//! Cells are written in their literal text form (`30`, `NaN`, the lookup
//! sentinel). Rows lacking a field get an empty cell in that column.

use std::io::Write;

use crate::audit::MissingValueReport;
use crate::error::ExportResult;
use crate::models::{column_names, Row};

/// Header of the key column in missing-value exports.
pub const MISSING_KEY_HEADER: &str = "Missing Key";

fn write_record<W: Write>(writer: &mut csv::Writer<W>, header: &[String], row: &Row) -> csv::Result<()> {
    writer.write_record(
        header
            .iter()
            .map(|name| row.get(name).map(|c| c.to_string()).unwrap_or_default()),
    )
}

/// Write rows as comma-delimited text.
///
/// The header is the union of field names in first-seen order.
pub fn export_csv<W: Write>(rows: &[Row], writer: W) -> ExportResult<()> {
    let header = column_names(rows);
    let mut writer = csv::Writer::from_writer(writer);

    writer.write_record(&header)?;
    for row in rows {
        write_record(&mut writer, &header, row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Rows as a pretty JSON array of objects, field order preserved.
pub fn export_json(rows: &[Row]) -> ExportResult<String> {
    Ok(serde_json::to_string_pretty(rows)?)
}

/// Write a missing-value report: one line per unmatched key, followed by the
/// fields of the row that carried it.
pub fn export_missing_values<W: Write>(report: &MissingValueReport, writer: W) -> ExportResult<()> {
    let representatives: Vec<Row> = report.missing.iter().map(|m| m.representative.clone()).collect();
    let fields: Vec<String> = column_names(&representatives)
        .into_iter()
        .filter(|name| name != MISSING_KEY_HEADER)
        .collect();

    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(std::iter::once(MISSING_KEY_HEADER).chain(fields.iter().map(String::as_str)))?;

    for missing in &report.missing {
        let key = missing.key.to_string();
        let values = fields
            .iter()
            .map(|name| missing.representative.get(name).map(|c| c.to_string()).unwrap_or_default());
        writer.write_record(std::iter::once(key).chain(values))?;
    }
    writer.flush()?;
    Ok(())
}
