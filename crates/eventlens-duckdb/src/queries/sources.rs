use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};

use eventlens_core::event::{parse_timestamp, DataSource, DataSourceRecord, ProcessingStatus};
use eventlens_core::store::{SortField, SortSpec};

use crate::queries::order_by;
use crate::DuckDbBackend;

struct SourceRow {
    id: String,
    name: String,
    source_type: String,
    file_url: String,
    total_events: i64,
    processed_events: i64,
    enriched_events: i64,
    processing_status: String,
    date_range_start: Option<String>,
    date_range_end: Option<String>,
    created_date: String,
}

fn read_ts(raw: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(raw).ok_or_else(|| anyhow!("unreadable timestamp {raw:?}"))
}

impl SourceRow {
    fn into_record(self) -> Result<DataSourceRecord> {
        let processing_status = ProcessingStatus::parse(&self.processing_status)
            .ok_or_else(|| anyhow!("unknown processing status {:?}", self.processing_status))?;
        Ok(DataSourceRecord {
            id: self.id,
            created_date: read_ts(&self.created_date)?,
            source: DataSource {
                name: self.name,
                source_type: self.source_type,
                file_url: self.file_url,
                total_events: self.total_events.max(0) as u64,
                processed_events: self.processed_events.max(0) as u64,
                enriched_events: self.enriched_events.max(0) as u64,
                processing_status,
                date_range_start: self.date_range_start.as_deref().map(read_ts).transpose()?,
                date_range_end: self.date_range_end.as_deref().map(read_ts).transpose()?,
            },
        })
    }
}

fn sort_column(field: SortField) -> Result<&'static str> {
    match field {
        SortField::CreatedDate => Ok("created_date"),
        SortField::Name => Ok("name"),
        SortField::Timestamp | SortField::EventType => {
            bail!("data sources can only be sorted by created_date or name")
        }
    }
}

impl DuckDbBackend {
    /// Up to `limit` run summaries in `sort` order.
    pub async fn list_data_sources(
        &self,
        sort: SortSpec,
        limit: usize,
    ) -> Result<Vec<DataSourceRecord>> {
        let sql = format!(
            "SELECT id, name, source_type, file_url, \
                    total_events, processed_events, enriched_events, processing_status, \
                    CAST(date_range_start AS VARCHAR), CAST(date_range_end AS VARCHAR), \
                    CAST(created_date AS VARCHAR) \
             FROM data_sources \
             {} \
             LIMIT ?1",
            order_by(sort_column(sort.field)?, sort)
        );

        let rows = {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(duckdb::params![limit as i64], |row| {
                Ok(SourceRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    source_type: row.get(2)?,
                    file_url: row.get(3)?,
                    total_events: row.get(4)?,
                    processed_events: row.get(5)?,
                    enriched_events: row.get(6)?,
                    processing_status: row.get(7)?,
                    date_range_start: row.get(8)?,
                    date_range_end: row.get(9)?,
                    created_date: row.get(10)?,
                })
            })?;
            let rows: Vec<_> = mapped.collect::<Result<_, _>>()?;
            rows
        };

        rows.into_iter().map(SourceRow::into_record).collect()
    }
}
