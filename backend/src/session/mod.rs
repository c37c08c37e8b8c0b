//! Live editing session.
//!
//! A [`Session`] owns the loaded sources, the active preset, the auxiliary
//! datasets and the active template. Every edit re-runs the whole pipeline
//! and publishes the result as one [`Snapshot`] through a `watch` channel, so
//! readers always see a complete run. Runs happen while the state lock is
//! held, which keeps edits out of a running pipeline.
//!
//! [`RerunScheduler`] drives the periodic re-run. It owns at most one timer
//! task; rescheduling aborts the pending one first.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::api::logs::{log_error, log_info};
use crate::audit::{audit_transformation, MissingValueReport};
use crate::error::{AssemblyError, PipelineError, PipelineResult};
use crate::models::{AuxiliaryDataset, Preset, TemplateSchema};
use crate::parser::RawSource;
use crate::transform::pipeline::{run_pipeline, PipelineInput, PipelineOutput};

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    Ready { output: PipelineOutput },
    /// Sources are structurally inconsistent; no data was produced.
    Blocked { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Increases by one per run.
    pub generation: u64,
    pub produced_at: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Snapshot {
    pub fn output(&self) -> Option<&PipelineOutput> {
        match &self.outcome {
            Outcome::Ready { output } => Some(output),
            Outcome::Blocked { .. } => None,
        }
    }
}

/// Mutable inputs of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub sources: Vec<RawSource>,
    pub preset: Preset,
    pub datasets: Vec<AuxiliaryDataset>,
    pub template: Option<TemplateSchema>,
}

impl SessionState {
    fn run(&self) -> Result<PipelineOutput, AssemblyError> {
        let mut input = PipelineInput::new(&self.sources, &self.preset).with_datasets(&self.datasets);
        if let Some(template) = &self.template {
            input = input.with_template(template);
        }
        run_pipeline(&input)
    }
}

pub struct Session {
    state: Mutex<SessionState>,
    generation: AtomicU64,
    sender: watch::Sender<Arc<Snapshot>>,
    /// Keeps the channel open with no outside subscribers.
    _receiver: watch::Receiver<Arc<Snapshot>>,
}

impl Session {
    /// Start a session and publish its first run.
    pub fn new(state: SessionState) -> Self {
        let empty = Snapshot {
            generation: 0,
            produced_at: chrono::Utc::now().to_rfc3339(),
            outcome: Outcome::Ready {
                output: PipelineOutput::default(),
            },
        };
        let (sender, receiver) = watch::channel(Arc::new(empty));
        let session = Self {
            state: Mutex::new(state),
            generation: AtomicU64::new(0),
            sender,
            _receiver: receiver,
        };
        session.rerun();
        session
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // A panicking run leaves the inputs intact.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run_locked(&self, state: &SessionState) -> Arc<Snapshot> {
        let outcome = match state.run() {
            Ok(output) => Outcome::Ready { output },
            Err(e) => {
                log_error(format!("Pipeline blocked: {}", e));
                Outcome::Blocked { error: e.to_string() }
            }
        };
        let snapshot = Arc::new(Snapshot {
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
            produced_at: chrono::Utc::now().to_rfc3339(),
            outcome,
        });
        self.sender.send_replace(snapshot.clone());
        snapshot
    }

    /// Apply an edit, then re-run and publish.
    pub fn edit<F: FnOnce(&mut SessionState)>(&self, edit: F) -> Arc<Snapshot> {
        let mut state = self.lock();
        edit(&mut state);
        self.run_locked(&state)
    }

    pub fn rerun(&self) -> Arc<Snapshot> {
        let state = self.lock();
        self.run_locked(&state)
    }

    pub fn latest(&self) -> Arc<Snapshot> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.sender.subscribe()
    }

    pub fn set_sources(&self, sources: Vec<RawSource>) -> Arc<Snapshot> {
        log_info(format!("Loaded {} source(s)", sources.len()));
        self.edit(|s| s.sources = sources)
    }

    pub fn set_preset(&self, preset: Preset) -> Arc<Snapshot> {
        log_info(format!("Active preset: {}", preset.name));
        self.edit(|s| s.preset = preset)
    }

    /// Add a dataset, replacing any with the same id.
    pub fn upsert_dataset(&self, dataset: AuxiliaryDataset) -> Arc<Snapshot> {
        self.edit(|s| {
            s.datasets.retain(|d| d.id != dataset.id);
            s.datasets.push(dataset);
        })
    }

    pub fn remove_dataset(&self, id: &str) -> Arc<Snapshot> {
        self.edit(|s| s.datasets.retain(|d| d.id != id))
    }

    /// Activate a template; the preset's mapping is marked as made for it.
    pub fn set_template(&self, template: Option<TemplateSchema>) -> Arc<Snapshot> {
        self.edit(|s| {
            if let Some(t) = &template {
                s.preset.template_mapping.template_id = Some(t.id.clone());
            }
            s.template = template;
        })
    }

    pub fn preset(&self) -> Preset {
        self.lock().preset.clone()
    }

    /// Missing-value report for one xlookup step of the active preset.
    pub fn audit(&self, transformation_id: &str) -> PipelineResult<MissingValueReport> {
        let state = self.lock();
        let output = state.run().map_err(PipelineError::from)?;
        audit_transformation(&output.configured, &state.preset, &state.datasets, transformation_id)
    }
}

/// Periodic re-run timer with at most one pending task.
#[derive(Default)]
pub struct RerunScheduler {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl RerunScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pending timer and start a new one that re-runs `session`
    /// every `interval`. Must be called inside a tokio runtime.
    pub fn reschedule(&self, session: Arc<Session>, interval: Duration) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        *pending = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                session.rerun();
            }
        }));
    }

    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending
            .lock()
            .map(|p| p.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for RerunScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
