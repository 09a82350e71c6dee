use std::time::Duration;

use eventlens_core::config::{Config, DEFAULT_BATCH_SIZE, DEFAULT_ENRICH_CONCURRENCY};

/// Tunables for one [`crate::Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Events per bulk write. Throughput/memory trade-off only.
    pub batch_size: usize,
    /// Upper bound on enrichment calls in flight.
    pub enrich_concurrency: usize,
    pub storage_timeout: Duration,
    pub extraction_timeout: Duration,
    /// Applied to each enrichment call separately.
    pub enrich_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            enrich_concurrency: DEFAULT_ENRICH_CONCURRENCY,
            storage_timeout: Duration::from_secs(30),
            extraction_timeout: Duration::from_secs(120),
            enrich_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            enrich_concurrency: config.enrich_concurrency.max(1),
            storage_timeout: config.storage_timeout(),
            extraction_timeout: config.extraction_timeout(),
            enrich_timeout: config.enrich_timeout(),
        }
    }
}
