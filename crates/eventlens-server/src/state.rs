use std::sync::Arc;

use tokio::sync::RwLock;

use eventlens_core::config::Config;
use eventlens_core::error::IngestError;
use eventlens_core::services::{Enricher, Extractor, FileStore};
use eventlens_duckdb::DuckDbBackend;
use eventlens_ingest::{Collaborators, Pipeline, PipelineConfig, RunHandle, RunSnapshot, Upload};

use crate::enrich;
use crate::extract::FileExtractor;
use crate::storage::LocalFileStore;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
pub struct AppState {
    /// The DuckDB backend, also the pipeline's event store.
    pub db: Arc<DuckDbBackend>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    pipeline: Arc<Pipeline>,

    /// Handle of the most recent upload run, finished or not.
    current_run: RwLock<Option<RunHandle>>,
}

impl AppState {
    /// Wire the pipeline to local file storage, the file extractor and the
    /// configured enricher.
    pub fn new(db: DuckDbBackend, config: Config) -> Self {
        let storage = Arc::new(LocalFileStore::new(&config.data_dir));
        let enricher = enrich::from_config(&config);
        Self::with_collaborators(db, config, storage, Arc::new(FileExtractor), enricher)
    }

    pub fn with_collaborators(
        db: DuckDbBackend,
        config: Config,
        storage: Arc<dyn FileStore>,
        extractor: Arc<dyn Extractor>,
        enricher: Arc<dyn Enricher>,
    ) -> Self {
        let db = Arc::new(db);
        let pipeline = Pipeline::new(
            Collaborators {
                storage,
                extractor,
                enricher,
                store: db.clone(),
            },
            PipelineConfig::from(&config),
        );
        Self {
            db,
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            current_run: RwLock::new(None),
        }
    }

    /// Start a background run for `upload`. Fails with
    /// [`IngestError::Busy`] while another run is active.
    pub async fn start_upload(&self, upload: Upload) -> Result<RunSnapshot, IngestError> {
        let mut current = self.current_run.write().await;
        let handle = self.pipeline.start(upload)?;
        let snapshot = handle.snapshot();
        *current = Some(handle);
        Ok(snapshot)
    }

    pub async fn current_run(&self) -> Option<RunSnapshot> {
        self.current_run.read().await.as_ref().map(RunHandle::snapshot)
    }

    /// Request cancellation of the latest run. A run that already finished
    /// is left as is.
    pub async fn cancel_current_run(&self) -> Option<RunSnapshot> {
        let current = self.current_run.read().await;
        let handle = current.as_ref()?;
        if !handle.snapshot().stage.is_terminal() {
            handle.cancel();
            tracing::info!("Upload run cancellation requested");
        }
        Some(handle.snapshot())
    }
}
