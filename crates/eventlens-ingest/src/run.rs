use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use eventlens_core::error::{ErrorReport, IngestError};
use eventlens_core::event::Event;

use crate::pipeline::Upload;

/// Pipeline states. `Idle`, `Completed` and `Failed` are stable; the rest are
/// transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Uploading,
    Extracting,
    Enriching,
    Persisting,
    Completed,
    Failed,
}

impl Stage {
    /// The only forward transition out of each non-terminal state.
    /// Any state may also fall to `Failed`.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Idle => Some(Stage::Uploading),
            Stage::Uploading => Some(Stage::Extracting),
            Stage::Extracting => Some(Stage::Enriching),
            Stage::Enriching => Some(Stage::Persisting),
            Stage::Persisting => Some(Stage::Completed),
            Stage::Completed | Stage::Failed => None,
        }
    }

    /// Fixed quartile progress on entering a stage, independent of event count.
    fn progress(self) -> Option<u8> {
        match self {
            Stage::Idle => Some(0),
            Stage::Uploading => Some(25),
            Stage::Extracting => Some(50),
            Stage::Enriching => Some(75),
            Stage::Persisting | Stage::Completed => Some(100),
            Stage::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

/// Observable view of a run, republished on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSnapshot {
    pub stage: Stage,
    pub progress_percent: u8,
    pub file_name: Option<String>,
    pub source_name: Option<String>,
    pub file_url: Option<String>,
    pub total_events: Option<usize>,
    pub enriched_events: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl RunSnapshot {
    fn idle() -> Self {
        Self {
            stage: Stage::Idle,
            progress_percent: 0,
            file_name: None,
            source_name: None,
            file_url: None,
            total_events: None,
            enriched_events: None,
            data_source_id: None,
            error: None,
        }
    }
}

/// Pipeline-side end of a run: publishes snapshots, observes cancellation.
pub struct RunControl {
    progress: watch::Sender<RunSnapshot>,
    cancel: watch::Receiver<bool>,
}

/// Caller-side end of a run: observes snapshots, requests cancellation.
#[derive(Debug)]
pub struct RunHandle {
    snapshot: watch::Receiver<RunSnapshot>,
    cancel: watch::Sender<bool>,
}

pub fn run_channel() -> (RunControl, RunHandle) {
    let (progress_tx, progress_rx) = watch::channel(RunSnapshot::idle());
    let (cancel_tx, cancel_rx) = watch::channel(false);
    (
        RunControl {
            progress: progress_tx,
            cancel: cancel_rx,
        },
        RunHandle {
            snapshot: progress_rx,
            cancel: cancel_tx,
        },
    )
}

impl RunControl {
    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

impl RunHandle {
    pub fn snapshot(&self) -> RunSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.clone()
    }

    /// Ask the run to stop. Takes effect at the next stage boundary; a batch
    /// write already under way finishes first.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Wait until the run reaches `Completed` or `Failed`.
    pub async fn wait(&mut self) -> RunSnapshot {
        loop {
            let current = self.snapshot.borrow_and_update().clone();
            if current.stage.is_terminal() {
                return current;
            }
            if self.snapshot.changed().await.is_err() {
                return self.snapshot.borrow().clone();
            }
        }
    }
}

/// State of one execution, owned by the orchestrator for its duration.
pub(crate) struct PipelineRun {
    stage: Stage,
    progress_percent: u8,
    pub(crate) events: Vec<Event>,
    error: Option<IngestError>,
    snapshot: RunSnapshot,
    control: RunControl,
}

impl PipelineRun {
    pub(crate) fn for_upload(control: RunControl, upload: &Upload) -> Self {
        let mut snapshot = RunSnapshot::idle();
        snapshot.file_name = Some(upload.file_name.clone());
        snapshot.source_name = Some(upload.resolved_source_name());
        let run = Self {
            stage: Stage::Idle,
            progress_percent: 0,
            events: Vec::new(),
            error: None,
            snapshot,
            control,
        };
        run.publish();
        run
    }

    /// Move to the next stage, unless cancellation was requested in the meantime.
    pub(crate) fn advance(&mut self, next: Stage) -> Result<(), IngestError> {
        if self.control.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        debug_assert_eq!(self.stage.next(), Some(next), "illegal pipeline transition");
        self.stage = next;
        if let Some(progress) = next.progress() {
            self.progress_percent = self.progress_percent.max(progress);
        }
        info!(stage = ?next, progress = self.progress_percent, "Pipeline stage");
        self.publish();
        Ok(())
    }

    pub(crate) fn record_file_url(&mut self, file_url: &str) {
        self.snapshot.file_url = Some(file_url.to_string());
        self.publish();
    }

    pub(crate) fn record_counts(&mut self) {
        self.snapshot.total_events = Some(self.events.len());
        if matches!(self.stage, Stage::Enriching | Stage::Persisting) {
            self.snapshot.enriched_events = Some(self.events.iter().filter(|e| e.is_enriched).count());
        }
        self.publish();
    }

    pub(crate) fn complete(&mut self, data_source_id: &str) {
        self.snapshot.data_source_id = Some(data_source_id.to_string());
        // Completion cannot be cancelled: every write has already happened.
        self.stage = Stage::Completed;
        self.progress_percent = 100;
        info!(data_source_id, "Pipeline run completed");
        self.publish();
    }

    pub(crate) fn fail(&mut self, error: IngestError) {
        warn!(stage = ?self.stage, error = %error, "Pipeline run failed");
        self.stage = Stage::Failed;
        self.error = Some(error);
        self.publish();
    }

    fn publish(&self) {
        let mut snapshot = self.snapshot.clone();
        snapshot.stage = self.stage;
        snapshot.progress_percent = self.progress_percent;
        snapshot.error = self.error.as_ref().map(IngestError::report);
        self.control.progress.send_replace(snapshot);
    }
}
