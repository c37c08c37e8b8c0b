//! High-level pipeline API.
//!
//! One run executes every stage in order and returns fresh datasets for each
//! of them:
//!
//! ```text
//! sources ─▶ assemble + select ─▶ configured
//!                                    │ filter
//!                                    ▼
//!                            filtered (main lookup table)
//!                                    │ transformations
//!                                    ▼
//!                                processed ─▶ template mapping ─▶ template
//! ```
//!
//! Nothing is recomputed incrementally: any configuration change re-runs
//! the whole pipeline. Only a structural mismatch between sources stops a
//! run.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabflow::{run_pipeline, PipelineInput, Preset, RawSource};
//!
//! let sources = vec![RawSource::from_strs("a.csv", &[&["Name", "Amount"], &["A", "10"]])];
//! let preset = Preset::new("demo");
//! let output = run_pipeline(&PipelineInput::new(&sources, &preset))?;
//! println!("{} processed rows", output.processed.len());
//! ```

use serde::Serialize;

use super::engine::{apply_transformations, RunDiagnostics};
use crate::api::logs::{log_info, log_info_indent, log_success, log_warning};
use crate::assemble::{assemble, AssemblyOptions, SourceReport};
use crate::error::AssemblyResult;
use crate::filter::apply_filters;
use crate::models::{AuxiliaryDataset, Dataset, Preset, Row, TemplateSchema};
use crate::parser::RawSource;
use crate::template::{map_to_template, unmapped_columns};

/// Everything one run reads. Nothing here is mutated by the run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInput<'a> {
    pub sources: &'a [RawSource],
    pub preset: &'a Preset,
    pub datasets: &'a [AuxiliaryDataset],
    pub template: Option<&'a TemplateSchema>,
}

impl<'a> PipelineInput<'a> {
    pub fn new(sources: &'a [RawSource], preset: &'a Preset) -> Self {
        Self {
            sources,
            preset,
            datasets: &[],
            template: None,
        }
    }

    pub fn with_datasets(mut self, datasets: &'a [AuxiliaryDataset]) -> Self {
        self.datasets = datasets;
        self
    }

    pub fn with_template(mut self, template: &'a TemplateSchema) -> Self {
        self.template = Some(template);
        self
    }
}

/// Stage snapshots of one run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub source_report: SourceReport,
    /// Assembled records restricted to the selected columns.
    pub configured: Dataset,
    /// Filtered and transformed records.
    pub processed: Dataset,
    /// Records mapped onto the template, when one is active.
    pub template: Option<Dataset>,
    /// Template columns with neither a constant nor a mapping.
    pub unmapped_columns: Vec<String>,
    pub diagnostics: RunDiagnostics,
}

/// Assembly options described by a preset.
pub fn assembly_options(preset: &Preset) -> AssemblyOptions {
    AssemblyOptions {
        header: preset.header(),
        selected_columns: preset.selected_columns.clone(),
        include_source_field: preset.include_source_file_column,
    }
}

/// Configured records that pass the preset's filters.
///
/// This is both the transform input and the main lookup table.
pub fn filtered_rows(configured: &[Row], preset: &Preset) -> Vec<Row> {
    apply_filters(configured, &preset.filters)
}

/// Run the whole pipeline once.
pub fn run_pipeline(input: &PipelineInput<'_>) -> AssemblyResult<PipelineOutput> {
    let preset = input.preset;

    let (configured, source_report) = assemble(input.sources, &assembly_options(preset))?;
    log_info(format!(
        "Assembled {} rows from {} source(s), {} columns",
        configured.len(),
        input.sources.len(),
        source_report.column_count
    ));
    for warning in &source_report.warnings {
        log_warning(warning.as_str());
    }

    let filtered = filtered_rows(&configured, preset);
    if !preset.filters.is_empty() {
        log_info_indent(
            format!("{} of {} rows pass {} filter(s)", filtered.len(), configured.len(), preset.filters.len()),
            1,
        );
    }

    let transformed = apply_transformations(&filtered, &preset.transformations, input.datasets);
    let diagnostics = transformed.diagnostics;
    if diagnostics.formula_errors > 0 {
        log_warning(format!(
            "{} formula error(s); last: {}",
            diagnostics.formula_errors,
            diagnostics.last_formula_error.as_deref().unwrap_or("")
        ));
    }
    if diagnostics.lookup_miss_count > 0 {
        log_warning(format!("{} lookup value(s) not found", diagnostics.lookup_miss_count));
    }

    let mapping = &preset.template_mapping;
    let mut unmapped = Vec::new();
    let template = input.template.map(|schema| {
        if let Some(mapped_for) = mapping.template_id.as_deref().filter(|id| *id != schema.id) {
            log_warning(format!(
                "Template mapping was made for '{}', applying it to '{}'",
                mapped_for, schema.id
            ));
        }
        unmapped = unmapped_columns(schema, mapping)
            .into_iter()
            .map(str::to_string)
            .collect();
        if !unmapped.is_empty() {
            log_warning(format!("Template column(s) left empty: {}", unmapped.join(", ")));
        }
        map_to_template(&transformed.rows, schema, mapping)
    });

    log_success(format!(
        "Processed {} rows through {} transformation(s)",
        transformed.rows.len(),
        preset.transformations.len()
    ));

    Ok(PipelineOutput {
        source_report,
        configured,
        processed: transformed.rows,
        template,
        unmapped_columns: unmapped,
        diagnostics,
    })
}
