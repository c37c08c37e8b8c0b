//! # Tabflow - configurable spreadsheet pipeline
//!
//! Tabflow assembles tabular records from one or more delimited sources and
//! runs them through a user-configured pipeline before mapping the result
//! onto a fixed output template.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌────────────┐   ┌──────────┐
//! │ Sources  │──▶│ Assemble │──▶│  Filter  │──▶│ Transform  │──▶│ Template │
//! │ (CSV...) │   │ + select │   │          │   │ (lookup,   │   │  mapping │
//! └──────────┘   └──────────┘   └──────────┘   │  formula)  │   └──────────┘
//!                                              └────────────┘
//! ```
//!
//! Every configuration change re-runs the whole pipeline; the
//! [`audit`] module replays a prefix of the transformations to explain
//! lookup misses.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tabflow::{parse_file_auto, run_pipeline, PipelineInput, Preset, Transformation, TransformKind};
//!
//! let source = parse_file_auto("orders.csv")?.source;
//! let mut preset = Preset::new("orders");
//! preset.transformations.push(Transformation::arithmetic(
//!     TransformKind::Multiply, "Total", "Price", "Quantity",
//! ));
//! let output = run_pipeline(&PipelineInput::new(&[source], &preset))?;
//! println!("{} rows processed", output.processed.len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Cells, rows, filters, transformations, presets, templates
//! - [`parser`] - Delimited text parsing with auto-detection
//! - [`assemble`] - Sources into records, column selection
//! - [`filter`] - Row filtering
//! - [`transform`] - Transform engine, lookups, formulas and the pipeline
//! - [`audit`] - Missing lookup value reports
//! - [`template`] - Template mapping
//! - [`preset`] - Preset interchange
//! - [`validation`] - Interchange schema validation
//! - [`store`] - On-disk documents
//! - [`export`] - CSV/JSON export
//! - [`session`] - Live session and re-run scheduling
//! - [`config`] - Environment configuration
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Pipeline stages
pub mod assemble;
pub mod filter;
pub mod transform;
pub mod template;

// Diagnostics
pub mod audit;

// Interchange and persistence
pub mod preset;
pub mod validation;
pub mod store;
pub mod export;

// Runtime
pub mod session;
pub mod config;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    AssemblyError,
    ExportError,
    FormulaError,
    PipelineError,
    PresetError,
    ServerError,
    SourceError,
    StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AuxiliaryDataset,
    Cell,
    ColumnMapping,
    Dataset,
    Filter,
    FilterOperator,
    HeaderSelector,
    Preset,
    Row,
    TemplateColumn,
    TemplateMapping,
    TemplateSchema,
    TransformKind,
    Transformation,
    MAIN_TABLE_ID,
    SOURCE_FIELD,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content,
    detect_delimiter,
    detect_encoding,
    parse_bytes_auto,
    parse_file_auto,
    parse_matrix,
    ParseResult,
    RawSource,
};

// =============================================================================
// Re-exports - Pipeline stages
// =============================================================================

pub use assemble::{assemble, dataset_from_source, validate_sources, AssemblyOptions, SourceReport};
pub use filter::apply_filters;
pub use template::{map_to_template, template_from_matrix};

pub use transform::{
    apply_transformations,
    run_pipeline,
    PipelineInput,
    PipelineOutput,
    RunDiagnostics,
    TransformOutput,
};
pub use transform::formula::evaluate;

// =============================================================================
// Re-exports - Diagnostics
// =============================================================================

pub use audit::{audit_all, audit_lookup, audit_transformation, MissingValue, MissingValueReport};

// =============================================================================
// Re-exports - Interchange, store, export
// =============================================================================

pub use preset::{export_presets, import_presets};
pub use store::{Collection, Document, Store};
pub use export::{export_csv, export_json, export_missing_values};

// =============================================================================
// Re-exports - Runtime
// =============================================================================

pub use config::Config;
pub use session::{Outcome, RerunScheduler, Session, SessionState, Snapshot};
