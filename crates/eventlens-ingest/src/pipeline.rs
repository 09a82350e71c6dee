use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;

use eventlens_core::error::IngestError;
use eventlens_core::event::{default_source_name, DataSourceRecord, Event};
use eventlens_core::extraction;
use eventlens_core::services::{Enricher, Extractor, FileStore};
use eventlens_core::store::EventStore;

use crate::config::PipelineConfig;
use crate::enrichment::EnrichmentEngine;
use crate::persist::BatchWriter;
use crate::run::{run_channel, PipelineRun, RunControl, RunHandle, Stage};

/// The external services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn FileStore>,
    pub extractor: Arc<dyn Extractor>,
    pub enricher: Arc<dyn Enricher>,
    pub store: Arc<dyn EventStore>,
}

/// A raw file handed to the pipeline.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Display name for the resulting data source. Blank or absent means
    /// "derive it from the file name".
    pub source_name: Option<String>,
}

impl Upload {
    pub fn resolved_source_name(&self) -> String {
        match self.source_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => default_source_name(&self.file_name),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub data_source: DataSourceRecord,
    pub processed_events: usize,
    pub enriched_events: usize,
}

/// Orchestrates upload → extract → enrich → persist, one run at a time.
///
/// A second run requested while one is active is rejected with
/// [`IngestError::Busy`]; nothing is queued.
pub struct Pipeline {
    storage: Arc<dyn FileStore>,
    extractor: Arc<dyn Extractor>,
    enrichment: EnrichmentEngine,
    writer: BatchWriter,
    config: PipelineConfig,
    active: Arc<Mutex<()>>,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Self {
        Self {
            storage: collaborators.storage,
            extractor: collaborators.extractor,
            enrichment: EnrichmentEngine::new(
                collaborators.enricher,
                config.enrich_concurrency,
                config.enrich_timeout,
            ),
            writer: BatchWriter::new(collaborators.store, config.batch_size),
            config,
            active: Arc::new(Mutex::new(())),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.try_lock().is_err()
    }

    /// Start a run on the tokio runtime and return a handle to observe or
    /// cancel it. The handle's first snapshot already names the file.
    pub fn start(self: &Arc<Self>, upload: Upload) -> Result<RunHandle, IngestError> {
        let guard = Arc::clone(&self.active)
            .try_lock_owned()
            .map_err(|_| IngestError::Busy)?;
        let (control, handle) = run_channel();
        let run = PipelineRun::for_upload(control, &upload);
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            // The outcome is published through the run handle.
            let _ = pipeline.execute(run, upload).await;
        });
        Ok(handle)
    }

    /// Run to completion on the current task.
    pub async fn run(
        &self,
        upload: Upload,
        control: RunControl,
    ) -> Result<RunOutcome, IngestError> {
        let _guard = self.active.try_lock().map_err(|_| IngestError::Busy)?;
        let run = PipelineRun::for_upload(control, &upload);
        self.execute(run, upload).await
    }

    async fn execute(
        &self,
        mut run: PipelineRun,
        upload: Upload,
    ) -> Result<RunOutcome, IngestError> {
        let source_name = upload.resolved_source_name();
        info!(file_name = %upload.file_name, bytes = upload.bytes.len(), "Pipeline run started");

        match self.drive(&mut run, upload, &source_name).await {
            Ok(outcome) => {
                run.complete(&outcome.data_source.id);
                Ok(outcome)
            }
            Err(err) => {
                run.fail(err.clone());
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        upload: Upload,
        source_name: &str,
    ) -> Result<RunOutcome, IngestError> {
        let file_url = self.upload_stage(run, upload).await?;
        self.extract_stage(run, &file_url).await?;
        self.enrich_stage(run).await?;
        self.persist_stage(run, &file_url, source_name).await
    }

    async fn upload_stage(
        &self,
        run: &mut PipelineRun,
        upload: Upload,
    ) -> Result<String, IngestError> {
        run.advance(Stage::Uploading)?;
        let file_url = tokio::time::timeout(
            self.config.storage_timeout,
            self.storage.store(&upload.file_name, &upload.bytes),
        )
        .await
        .map_err(|_| {
            IngestError::Storage(format!(
                "storage timed out after {}ms",
                self.config.storage_timeout.as_millis()
            ))
        })?
        .map_err(|e| IngestError::Storage(e.to_string()))?;
        run.record_file_url(&file_url);
        Ok(file_url)
    }

    async fn extract_stage(&self, run: &mut PipelineRun, file_url: &str) -> Result<(), IngestError> {
        run.advance(Stage::Extracting)?;
        let schema = Event::extraction_schema();
        let response = tokio::time::timeout(
            self.config.extraction_timeout,
            self.extractor.extract(file_url, &schema),
        )
        .await
        .map_err(|_| {
            IngestError::extraction(format!(
                "extraction timed out after {}ms",
                self.config.extraction_timeout.as_millis()
            ))
        })?
        .map_err(|e| IngestError::extraction(e.to_string()))?;

        run.events = extraction::normalize(response)?;
        info!(count = run.events.len(), "Events extracted");
        run.record_counts();
        Ok(())
    }

    async fn enrich_stage(&self, run: &mut PipelineRun) -> Result<(), IngestError> {
        run.advance(Stage::Enriching)?;
        let extracted = std::mem::take(&mut run.events);
        run.events = self.enrichment.enrich(extracted).await;
        run.record_counts();
        Ok(())
    }

    async fn persist_stage(
        &self,
        run: &mut PipelineRun,
        file_url: &str,
        source_name: &str,
    ) -> Result<RunOutcome, IngestError> {
        run.advance(Stage::Persisting)?;
        let data_source = self
            .writer
            .persist(&run.events, file_url, source_name)
            .await?;
        Ok(RunOutcome {
            processed_events: data_source.source.processed_events as usize,
            enriched_events: data_source.source.enriched_events as usize,
            data_source,
        })
    }
}
