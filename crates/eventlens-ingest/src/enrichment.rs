use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use eventlens_core::event::Event;
use eventlens_core::services::{Enricher, Enrichment};

/// Why a single event could not be enriched. Only ever logged; the event
/// is stored unenriched and the run carries on.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnrichmentFailure {
    #[error("enrichment timed out")]
    Timeout,
    #[error("enrichment service error: {0}")]
    Service(String),
    #[error("enrichment response missing {0}")]
    Incomplete(&'static str),
    #[error("enrichment task aborted")]
    Aborted,
}

/// Enriches events with location/organization data through an [`Enricher`].
///
/// Calls run on a bounded pool of `concurrency` tasks. Each call is isolated:
/// its outcome is captured per input index and merged back in input order, so
/// no event's result depends on another's and the output order always equals
/// the input order.
pub struct EnrichmentEngine {
    enricher: Arc<dyn Enricher>,
    concurrency: usize,
    timeout: Duration,
}

impl EnrichmentEngine {
    pub fn new(enricher: Arc<dyn Enricher>, concurrency: usize, timeout: Duration) -> Self {
        Self {
            enricher,
            concurrency: concurrency.max(1),
            timeout,
        }
    }

    /// Enrich every event that carries an IP address, exactly once each.
    ///
    /// Never fails as a whole: events without an IP, and events whose lookup
    /// fails, come back with `is_enriched = false` and confidence 0.
    pub async fn enrich(&self, mut events: Vec<Event>) -> Vec<Event> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut pending = Vec::new();

        for (idx, event) in events.iter_mut().enumerate() {
            let Some(ip) = event.enrichable_ip().map(str::to_string) else {
                event.mark_unenriched();
                continue;
            };
            let enricher = Arc::clone(&self.enricher);
            let semaphore = Arc::clone(&semaphore);
            let timeout = self.timeout;
            let task = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| EnrichmentFailure::Aborted)?;
                lookup(enricher.as_ref(), &ip, timeout).await
            });
            pending.push((idx, task));
        }

        let attempted = pending.len();
        let mut failed = 0usize;
        for (idx, task) in pending {
            let outcome = task.await.unwrap_or(Err(EnrichmentFailure::Aborted));
            let event = &mut events[idx];
            match outcome {
                Ok(enrichment) => event.apply_enrichment(enrichment),
                Err(failure) => {
                    failed += 1;
                    debug!(index = idx, event_id = %event.event_id, reason = %failure, "Enrichment fell back to unenriched");
                    event.mark_unenriched();
                }
            }
        }

        if failed > 0 {
            warn!(attempted, failed, "Some events could not be enriched");
        }
        info!(
            total = events.len(),
            attempted,
            enriched = attempted - failed,
            "Enrichment finished"
        );
        events
    }
}

async fn lookup(
    enricher: &dyn Enricher,
    ip: &str,
    timeout: Duration,
) -> Result<Enrichment, EnrichmentFailure> {
    let response = tokio::time::timeout(timeout, enricher.enrich(ip))
        .await
        .map_err(|_| EnrichmentFailure::Timeout)?
        .map_err(|e| EnrichmentFailure::Service(e.to_string()))?;
    response
        .into_enrichment()
        .map_err(EnrichmentFailure::Incomplete)
}
