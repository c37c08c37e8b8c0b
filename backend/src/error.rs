//! Error types for the tabflow pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`SourceError`] - Raw source decoding/parsing errors
//! - [`AssemblyError`] - Blocking structural problems across sources
//! - [`FormulaError`] - Failure of one custom formula on one row
//! - [`PresetError`] - Preset interchange import/export errors
//! - [`StoreError`] - Persistence errors
//! - [`ExportError`] - Export artifact errors
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Per-row formula failures and lookup misses are not surfaced through these
//! types during a run; they are collected into
//! [`crate::transform::RunDiagnostics`].

use thiserror::Error;

// =============================================================================
// Source Errors
// =============================================================================

/// Errors while turning raw bytes into a row matrix.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode bytes.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Invalid delimited-text content.
    #[error("Invalid delimited content at line {line}: {message}")]
    ParseError { line: usize, message: String },
}

// =============================================================================
// Assembly Errors
// =============================================================================

/// Structural problems that stop the pipeline until the user fixes them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AssemblyError {
    /// Sources disagree on their number of columns.
    #[error("Source '{source_name}' has {found} columns but '{expected_source}' has {expected}")]
    StructuralMismatch {
        expected_source: String,
        expected: usize,
        source_name: String,
        found: usize,
    },

    /// A source has no row at the configured header index.
    #[error("Source '{source_name}' has no row {index} to use as header")]
    HeaderRowOutOfRange { source_name: String, index: usize },
}

// =============================================================================
// Formula Errors
// =============================================================================

/// Failure of one custom formula on one row.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FormulaError {
    /// The expression could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The expression referenced a field the row does not have.
    #[error("Undefined reference: {0}")]
    UndefinedReference(String),
}

// =============================================================================
// Preset Errors
// =============================================================================

/// Errors importing or exporting the preset interchange document.
#[derive(Debug, Error)]
pub enum PresetError {
    /// The document is not valid JSON.
    #[error("Invalid preset document: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The document does not have the interchange shape.
    #[error("Preset document failed validation: {errors:?}")]
    SchemaError { errors: Vec<String> },

    /// One entry could not be read.
    #[error("Preset #{index} is invalid: {message}")]
    InvalidEntry { index: usize, message: String },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the persistence store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// IO error.
    #[error("Store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors writing export artifacts.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV write error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Export IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Export JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level orchestration errors.
///
/// Only [`AssemblyError`] can stop a run; the other variants come from the
/// collaborators wrapped around the pipeline (files, store, export).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Preset error: {0}")]
    Preset(#[from] PresetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// Referenced transformation does not exist or is not a lookup.
    #[error("Transformation '{0}' is not an xlookup step of the active preset")]
    UnknownLookup(String),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

pub type SourceResult<T> = Result<T, SourceError>;

pub type AssemblyResult<T> = Result<T, AssemblyError>;

pub type FormulaResult<T> = Result<T, FormulaError>;

pub type PresetResult<T> = Result<T, PresetError>;

pub type StoreResult<T> = Result<T, StoreError>;

pub type ExportResult<T> = Result<T, ExportError>;

pub type PipelineResult<T> = Result<T, PipelineError>;

pub type ServerResult<T> = Result<T, ServerError>;
