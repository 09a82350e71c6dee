use std::sync::Arc;

use tracing::{debug, error, info, warn};

use eventlens_core::error::IngestError;
use eventlens_core::event::{is_chronological, DataSource, DataSourceRecord, Event};
use eventlens_core::store::EventStore;

/// Writes an enriched event set and its run summary.
///
/// Batches go out sequentially, one in flight at a time. A failed batch stops
/// the write without retry or rollback: earlier batches stay committed and the
/// error reports how many events they hold. The [`DataSource`] summary is
/// created only after every batch has committed, so a failed write never
/// leaves a summary behind.
pub struct BatchWriter {
    store: Arc<dyn EventStore>,
    batch_size: usize,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn EventStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn persist(
        &self,
        events: &[Event],
        file_url: &str,
        source_name: &str,
    ) -> Result<DataSourceRecord, IngestError> {
        if !is_chronological(events) {
            warn!(
                count = events.len(),
                "Extracted events are not in timestamp order; date range uses min/max timestamps"
            );
        }
        let summary = DataSource::summarize(source_name, file_url, events);

        let mut written = 0usize;
        for (batch_no, batch) in events.chunks(self.batch_size).enumerate() {
            match self.store.bulk_create_events(batch).await {
                Ok(count) => {
                    written += count;
                    debug!(batch = batch_no, count, written, "Event batch committed");
                }
                Err(e) => {
                    error!(batch = batch_no, written, error = %e, "Event batch write failed");
                    return Err(IngestError::Persistence {
                        written,
                        message: e.to_string(),
                    });
                }
            }
        }

        let record = self
            .store
            .create_data_source(&summary)
            .await
            .map_err(|e| {
                error!(written, error = %e, "Data source write failed");
                IngestError::Persistence {
                    written,
                    message: e.to_string(),
                }
            })?;

        info!(
            data_source_id = %record.id,
            total = summary.total_events,
            enriched = summary.enriched_events,
            "Run persisted"
        );
        Ok(record)
    }
}
