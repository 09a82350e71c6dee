//! In-process fakes for the pipeline collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::sync::Notify;

use eventlens_core::event::{DataSource, DataSourceRecord, Event, Properties};
use eventlens_core::services::{
    Enricher, EnrichmentResponse, ExtractionResponse, Extractor, FileStore,
};
use eventlens_core::store::{EventStore, SortSpec};
use eventlens_ingest::{Collaborators, Pipeline, PipelineConfig, Upload};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// An extraction record `minutes` after [`base_time`].
pub fn record(event_id: &str, minutes: i64, ip: Option<&str>) -> Value {
    let mut value = json!({
        "event_id": event_id,
        "timestamp": (base_time() + ChronoDuration::minutes(minutes)).to_rfc3339(),
        "user_id": format!("user-{event_id}"),
        "event_type": "page_view",
        "event_properties": { "path": "/pricing" }
    });
    if let Some(ip) = ip {
        value["ip_address"] = json!(ip);
    }
    value
}

pub fn event(event_id: &str, minutes: i64, ip: Option<&str>) -> Event {
    Event {
        event_id: event_id.to_string(),
        timestamp: base_time() + ChronoDuration::minutes(minutes),
        user_id: None,
        device_id: None,
        event_type: "page_view".to_string(),
        ip_address: ip.map(str::to_string),
        country: None,
        city: None,
        region: None,
        organization: None,
        is_enriched: false,
        enrichment_confidence: 0.0,
        event_properties: Properties::new(),
        user_properties: Properties::new(),
    }
}

pub fn located(confidence: Option<f64>) -> EnrichmentResponse {
    EnrichmentResponse {
        country: Some("PL".to_string()),
        city: Some("Krakow".to_string()),
        region: Some("Lesser Poland".to_string()),
        organization: Some("Example Telecom".to_string()),
        confidence,
    }
}

pub fn upload(file_name: &str) -> Upload {
    Upload {
        file_name: file_name.to_string(),
        bytes: b"raw export".to_vec(),
        source_name: None,
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeFileStore {
    pub fail: bool,
    /// When set, `store` parks until the gate is notified.
    pub gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl FileStore for FakeFileStore {
    async fn store(&self, file_name: &str, _bytes: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            bail!("bucket unavailable");
        }
        Ok(format!("memory://uploads/{file_name}"))
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

pub struct FakeExtractor {
    pub response: ExtractionResponse,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn returning(output: Value) -> Self {
        Self {
            response: ExtractionResponse::success(output),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(details: &str) -> Self {
        Self {
            response: ExtractionResponse::error(details),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn extract(&self, _file_url: &str, schema: &Value) -> Result<ExtractionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(schema["required"], json!(["timestamp", "event_type"]));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.response.clone())
    }
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

/// Scripted per-IP behaviour.
#[derive(Clone)]
pub enum Reply {
    Ok(EnrichmentResponse),
    Fail,
    Hang,
    /// Answer after a delay.
    Slow(Duration, EnrichmentResponse),
}

#[derive(Default)]
pub struct FakeEnricher {
    pub replies: HashMap<String, Reply>,
    pub calls: Mutex<HashMap<String, usize>>,
}

impl FakeEnricher {
    pub fn with(replies: &[(&str, Reply)]) -> Self {
        Self {
            replies: replies
                .iter()
                .map(|(ip, reply)| (ip.to_string(), reply.clone()))
                .collect(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn calls_for(&self, ip: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .get(ip)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().expect("calls lock").values().sum()
    }
}

#[async_trait]
impl Enricher for FakeEnricher {
    async fn enrich(&self, ip: &str) -> Result<EnrichmentResponse> {
        *self
            .calls
            .lock()
            .expect("calls lock")
            .entry(ip.to_string())
            .or_default() += 1;
        match self.replies.get(ip).cloned() {
            Some(Reply::Ok(response)) => Ok(response),
            Some(Reply::Slow(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            Some(Reply::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(Reply::Fail) | None => Err(anyhow!("enrichment service exploded for {ip}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    pub events: Mutex<Vec<Event>>,
    pub sources: Mutex<Vec<DataSourceRecord>>,
    pub batch_sizes: Mutex<Vec<usize>>,
    /// Bulk writes succeed this many times, then fail.
    pub fail_after_batches: Option<usize>,
}

impl MemoryStore {
    pub fn failing_after(batches: usize) -> Self {
        Self {
            fail_after_batches: Some(batches),
            ..Default::default()
        }
    }

    pub fn stored_events(&self) -> Vec<Event> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn stored_sources(&self) -> Vec<DataSourceRecord> {
        self.sources.lock().expect("sources lock").clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn create_data_source(&self, source: &DataSource) -> Result<DataSourceRecord> {
        let mut sources = self.sources.lock().expect("sources lock");
        let record = DataSourceRecord {
            id: format!("ds-{}", sources.len() + 1),
            created_date: Utc::now(),
            source: source.clone(),
        };
        sources.push(record.clone());
        Ok(record)
    }

    async fn bulk_create_events(&self, events: &[Event]) -> Result<usize> {
        let mut sizes = self.batch_sizes.lock().expect("batch lock");
        if let Some(limit) = self.fail_after_batches {
            if sizes.len() >= limit {
                bail!("connection reset while writing batch");
            }
        }
        sizes.push(events.len());
        self.events
            .lock()
            .expect("events lock")
            .extend_from_slice(events);
        Ok(events.len())
    }

    async fn list_events(&self, _sort: SortSpec, limit: usize) -> Result<Vec<Event>> {
        Ok(self.stored_events().into_iter().take(limit).collect())
    }

    async fn list_data_sources(
        &self,
        _sort: SortSpec,
        limit: usize,
    ) -> Result<Vec<DataSourceRecord>> {
        Ok(self.stored_sources().into_iter().take(limit).collect())
    }
}

pub struct Harness {
    pub storage: Arc<FakeFileStore>,
    pub extractor: Arc<FakeExtractor>,
    pub enricher: Arc<FakeEnricher>,
    pub store: Arc<MemoryStore>,
    pub pipeline: Arc<Pipeline>,
}

impl Harness {
    pub fn new(
        storage: FakeFileStore,
        extractor: FakeExtractor,
        enricher: FakeEnricher,
        store: MemoryStore,
        config: PipelineConfig,
    ) -> Self {
        let storage = Arc::new(storage);
        let extractor = Arc::new(extractor);
        let enricher = Arc::new(enricher);
        let store = Arc::new(store);
        let pipeline = Arc::new(Pipeline::new(
            Collaborators {
                storage: storage.clone(),
                extractor: extractor.clone(),
                enricher: enricher.clone(),
                store: store.clone(),
            },
            config,
        ));
        Self {
            storage,
            extractor,
            enricher,
            store,
            pipeline,
        }
    }

    pub fn simple(extractor: FakeExtractor, enricher: FakeEnricher) -> Self {
        Self::new(
            FakeFileStore::default(),
            extractor,
            enricher,
            MemoryStore::default(),
            PipelineConfig::default(),
        )
    }
}
