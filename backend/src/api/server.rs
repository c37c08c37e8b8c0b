//! HTTP server for the tabflow API.
//!
//! # API Endpoints
//!
//! | Method | Path                               | Description                              |
//! |--------|------------------------------------|------------------------------------------|
//! | GET    | `/health`                          | Health check                             |
//! | POST   | `/api/sources`                     | Upload source files (multipart `file`)   |
//! | PUT    | `/api/preset`                      | Replace and save the active preset       |
//! | POST   | `/api/datasets`                    | Upload a lookup dataset (`name`, `file`) |
//! | PUT    | `/api/template`                    | Replace and save the active template     |
//! | GET    | `/api/output`                      | Latest snapshot with all stage data      |
//! | GET    | `/api/audit/{transformation_id}`   | Missing-value report for an xlookup      |
//! | GET    | `/api/logs`                        | SSE stream for real-time logs            |
//!
//! Every edit re-runs the pipeline and restarts the periodic re-run timer.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method},
    response::{sse::Event, Json, Sse},
    routing::{get, post, put},
    Router,
};
use futures::stream::{self, Stream};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard};
use std::{convert::Infallible, net::SocketAddr, time::Duration};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;

use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{DatasetInfo, DatasetResponse, SnapshotSummary, SourceInfo, SourcesResponse, TemplateResponse};
use crate::assemble::dataset_from_source;
use crate::audit::MissingValueReport;
use crate::config::Config;
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::models::{Preset, TemplateSchema};
use crate::parser::{parse_bytes_auto, ParseResult};
use crate::session::{RerunScheduler, Session, SessionState};
use crate::store::Store;

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    pub scheduler: Arc<RerunScheduler>,
    pub store: Arc<Mutex<Store>>,
    pub rerun_interval: Duration,
}

impl AppState {
    /// Open the store and start a session over its datasets.
    pub fn new(store: Store, rerun_interval: Duration) -> Self {
        let state = SessionState {
            datasets: store.all_datasets(),
            ..Default::default()
        };
        Self {
            session: Arc::new(Session::new(state)),
            scheduler: Arc::new(RerunScheduler::new()),
            store: Arc::new(Mutex::new(store)),
            rerun_interval,
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Restart the periodic timer after an edit.
    fn touch_timer(&self) {
        if !self.rerun_interval.is_zero() {
            self.scheduler.reschedule(self.session.clone(), self.rerun_interval);
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/sources", post(upload_sources))
        .route("/api/preset", put(put_preset))
        .route("/api/datasets", post(upload_dataset))
        .route("/api/template", put(put_template))
        .route("/api/output", get(output))
        .route("/api/audit/{transformation_id}", get(audit))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(Store::open(&config.store_dir), config.rerun_interval);
    state.touch_timer();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    println!("Tabflow server running on http://localhost:{}", config.port);
    println!("   Store:   {}", config.store_dir.display());
    println!("   Re-run:  every {}s", config.rerun_interval.as_secs());
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "tabflow",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// SSE endpoint: backlog first, then live entries.
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();
    let backlog = stream::iter(LOG_BROADCASTER.recent().into_iter().map(Ok));

    let stream = backlog
        .chain(BroadcastStream::new(rx))
        .filter_map(|result| {
            let entry = result.ok()?;
            let json = serde_json::to_string(&entry).ok()?;
            Some(Ok(Event::default().data(json)))
        });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

/// Collected multipart upload: text fields and files.
#[derive(Default)]
struct Upload {
    name: Option<String>,
    files: Vec<(String, Vec<u8>)>,
}

async fn read_upload(mut multipart: Multipart) -> ServerResult<Upload> {
    let mut upload = Upload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "file" | "files" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                upload.files.push((file_name, bytes.to_vec()));
            }
            "name" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::BadRequest(format!("Read error: {}", e)))?;
                upload.name = Some(text);
            }
            _ => {}
        }
    }

    if upload.files.is_empty() {
        return Err(ServerError::BadRequest("No file provided".to_string()));
    }
    Ok(upload)
}

fn parse_files(files: &[(String, Vec<u8>)]) -> ServerResult<Vec<ParseResult>> {
    files
        .iter()
        .map(|(name, bytes)| parse_bytes_auto(name, bytes).map_err(|e| PipelineError::from(e).into()))
        .collect()
}

/// Replace the loaded sources.
async fn upload_sources(State(state): State<AppState>, multipart: Multipart) -> ServerResult<Json<SourcesResponse>> {
    let upload = read_upload(multipart).await?;
    let parsed = parse_files(&upload.files)?;

    let infos: Vec<SourceInfo> = parsed.iter().map(SourceInfo::from).collect();
    let sources = parsed.into_iter().map(|p| p.source).collect();
    let snapshot = state.session.set_sources(sources);
    state.touch_timer();

    Ok(Json(SourcesResponse {
        sources: infos,
        snapshot: SnapshotSummary::from(snapshot.as_ref()),
    }))
}

async fn put_preset(State(state): State<AppState>, Json(preset): Json<Preset>) -> ServerResult<Json<Value>> {
    let saved = state
        .store()
        .presets
        .save(preset)
        .map_err(PipelineError::from)?;
    let snapshot = state.session.set_preset(saved.clone());
    state.touch_timer();

    Ok(Json(json!({
        "preset": saved,
        "snapshot": SnapshotSummary::from(snapshot.as_ref()),
    })))
}

/// Add a lookup dataset from an uploaded file.
async fn upload_dataset(State(state): State<AppState>, multipart: Multipart) -> ServerResult<Json<DatasetResponse>> {
    let upload = read_upload(multipart).await?;
    let parsed = parse_files(&upload.files[..1])?;
    let source = &parsed[0].source;
    let name = upload
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| source.name.clone());

    let dataset = dataset_from_source("", &name, source).map_err(PipelineError::from)?;
    let saved = state
        .store()
        .datasets
        .save(dataset)
        .map_err(PipelineError::from)?;
    log_info(format!("Dataset '{}' saved as {}", saved.name, saved.id));

    let info = DatasetInfo::from(&saved);
    let snapshot = state.session.upsert_dataset(saved);
    state.touch_timer();

    Ok(Json(DatasetResponse {
        dataset: info,
        snapshot: SnapshotSummary::from(snapshot.as_ref()),
    }))
}

async fn put_template(
    State(state): State<AppState>,
    Json(template): Json<TemplateSchema>,
) -> ServerResult<Json<TemplateResponse>> {
    let saved = state
        .store()
        .templates
        .save(template)
        .map_err(PipelineError::from)?;
    let snapshot = state.session.set_template(Some(saved.clone()));
    state.touch_timer();

    Ok(Json(TemplateResponse {
        template: saved,
        snapshot: SnapshotSummary::from(snapshot.as_ref()),
    }))
}

async fn output(State(state): State<AppState>) -> ServerResult<Json<Value>> {
    let snapshot = state.session.latest();
    let value = serde_json::to_value(snapshot.as_ref()).map_err(|e| ServerError::Internal(e.to_string()))?;
    Ok(Json(value))
}

async fn audit(
    State(state): State<AppState>,
    Path(transformation_id): Path<String>,
) -> ServerResult<Json<MissingValueReport>> {
    Ok(Json(state.session.audit(&transformation_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Transformation, MAIN_TABLE_ID};
    use crate::parser::RawSource;
    use tempfile::tempdir;

    fn state(dir: &std::path::Path) -> AppState {
        AppState::new(Store::open(dir), Duration::ZERO)
    }

    #[tokio::test]
    async fn test_preset_edit_reruns_and_saves() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        state
            .session
            .set_sources(vec![RawSource::from_strs("a.csv", &[&["Id", "Ref"], &["1", "2"], &["2", "9"]])]);

        let mut preset = Preset::new("Orders");
        preset
            .transformations
            .push(Transformation::xlookup("Parent", "Ref", MAIN_TABLE_ID, "Id", "Id").with_id("lk"));

        let Json(body) = put_preset(State(state.clone()), Json(preset.clone())).await.unwrap();
        assert_eq!(body["snapshot"]["status"], "ready");
        assert_eq!(body["snapshot"]["diagnostics"]["lookupMissCount"], 1);
        assert!(state.store().presets.get(&preset.id).is_ok());

        let Json(report) = audit(State(state.clone()), Path("lk".to_string())).await.unwrap();
        assert_eq!(report.missing_count(), 1);

        let err = audit(State(state), Path("nope".to_string())).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_output_reports_blocked_run() {
        let dir = tempdir().unwrap();
        let state = state(dir.path());
        state.session.set_sources(vec![
            RawSource::from_strs("a.csv", &[&["x"], &["1"]]),
            RawSource::from_strs("b.csv", &[&["x", "y"], &["1", "2"]]),
        ]);

        let Json(value) = output(State(state)).await.unwrap();
        assert_eq!(value["status"], "blocked");
    }
}
