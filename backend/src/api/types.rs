//! REST API response types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{PipelineError, ServerError, StoreError};
use crate::models::{AuxiliaryDataset, TemplateSchema};
use crate::parser::ParseResult;
use crate::session::{Outcome, Snapshot};
use crate::transform::RunDiagnostics;

/// Parsing details of one uploaded file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfo {
    pub name: String,
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
}

impl From<&ParseResult> for SourceInfo {
    fn from(result: &ParseResult) -> Self {
        Self {
            name: result.source.name.clone(),
            encoding: result.encoding.clone(),
            delimiter: match result.delimiter {
                '\t' => "\\t".to_string(),
                c => c.to_string(),
            },
            row_count: result.source.rows.len(),
        }
    }
}

/// Row counts and diagnostics of a snapshot, without the data.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub generation: u64,
    /// `ready` or `blocked`
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub configured_rows: usize,
    pub processed_rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_rows: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmapped_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<RunDiagnostics>,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        match &snapshot.outcome {
            Outcome::Ready { output } => Self {
                generation: snapshot.generation,
                status: "ready".to_string(),
                error: None,
                configured_rows: output.configured.len(),
                processed_rows: output.processed.len(),
                template_rows: output.template.as_ref().map(|t| t.len()),
                unmapped_columns: output.unmapped_columns.clone(),
                diagnostics: Some(output.diagnostics.clone()),
            },
            Outcome::Blocked { error } => Self {
                generation: snapshot.generation,
                status: "blocked".to_string(),
                error: Some(error.clone()),
                configured_rows: 0,
                processed_rows: 0,
                template_rows: None,
                unmapped_columns: Vec::new(),
                diagnostics: None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesResponse {
    pub sources: Vec<SourceInfo>,
    pub snapshot: SnapshotSummary,
}

/// A stored dataset without its rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub last_modified: Option<String>,
}

impl From<&AuxiliaryDataset> for DatasetInfo {
    fn from(dataset: &AuxiliaryDataset) -> Self {
        Self {
            id: dataset.id.clone(),
            name: dataset.name.clone(),
            columns: dataset.columns.clone(),
            row_count: dataset.rows.len(),
            last_modified: dataset.last_modified.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResponse {
    pub dataset: DatasetInfo,
    pub snapshot: SnapshotSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateResponse {
    pub template: TemplateSchema,
    pub snapshot: SnapshotSummary,
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Pipeline(e) => match e {
                PipelineError::Store(StoreError::NotFound { .. }) | PipelineError::UnknownLookup(_) => {
                    StatusCode::NOT_FOUND
                }
                PipelineError::Assembly(_) => StatusCode::CONFLICT,
                PipelineError::Source(_) | PipelineError::Preset(_) => StatusCode::BAD_REQUEST,
                PipelineError::Store(_) | PipelineError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(error_response(&self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AssemblyError;

    #[test]
    fn test_status_codes() {
        let missing = ServerError::from(PipelineError::UnknownLookup("x".into()));
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);

        let blocked = ServerError::from(PipelineError::from(AssemblyError::HeaderRowOutOfRange {
            source_name: "a.csv".into(),
            index: 2,
        }));
        assert_eq!(blocked.status_code(), StatusCode::CONFLICT);

        assert_eq!(ServerError::BadRequest("no file".into()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_blocked_summary() {
        let snapshot = Snapshot {
            generation: 4,
            produced_at: String::new(),
            outcome: Outcome::Blocked { error: "mismatch".into() },
        };
        let summary = SnapshotSummary::from(&snapshot);
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["status"], "blocked");
        assert_eq!(value["error"], "mismatch");
        assert!(value.get("diagnostics").is_none());
        assert!(value.get("unmappedColumns").is_none());
    }

    #[test]
    fn test_ready_summary_lists_unmapped_columns() {
        let output = crate::transform::PipelineOutput {
            unmapped_columns: vec!["Notes".into()],
            ..Default::default()
        };
        let snapshot = Snapshot {
            generation: 2,
            produced_at: String::new(),
            outcome: Outcome::Ready { output },
        };
        let value = serde_json::to_value(SnapshotSummary::from(&snapshot)).unwrap();
        assert_eq!(value["status"], "ready");
        assert_eq!(value["unmappedColumns"], serde_json::json!(["Notes"]));
    }
}
