use async_trait::async_trait;

use eventlens_core::event::{DataSource, DataSourceRecord, Event};
use eventlens_core::store::{EventStore, SortSpec};

use crate::DuckDbBackend;

#[async_trait]
impl EventStore for DuckDbBackend {
    async fn create_data_source(&self, source: &DataSource) -> anyhow::Result<DataSourceRecord> {
        DuckDbBackend::insert_data_source(self, source).await
    }

    async fn bulk_create_events(&self, events: &[Event]) -> anyhow::Result<usize> {
        DuckDbBackend::insert_events(self, events).await
    }

    async fn list_events(&self, sort: SortSpec, limit: usize) -> anyhow::Result<Vec<Event>> {
        DuckDbBackend::list_events(self, sort, limit).await
    }

    async fn list_data_sources(
        &self,
        sort: SortSpec,
        limit: usize,
    ) -> anyhow::Result<Vec<DataSourceRecord>> {
        DuckDbBackend::list_data_sources(self, sort, limit).await
    }
}
