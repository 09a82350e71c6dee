use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use eventlens_core::event::{DataSource, DataSourceRecord, Event};

use crate::schema::init_sql;

/// Format accepted by DuckDB for `TIMESTAMP` parameters and produced by
/// `CAST(ts AS VARCHAR)`.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub(crate) fn ts_param(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// The DuckDB event store.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. The connection sits behind `Arc<Mutex<_>>` so writes are
/// serialised while the struct is still shared across Axum handlers and the
/// ingest pipeline.
///
/// Memory and thread limits are enforced by [`init_sql`] at open time.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** database. Data is discarded on drop.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Insert a batch of events in a single transaction.
    ///
    /// Either every row of the batch commits or none does. Returns the number
    /// of rows written; an empty batch is a no-op.
    pub async fn insert_events(&self, events: &[Event]) -> Result<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        for event in events {
            tx.execute(
                r#"INSERT INTO events (
                    id, event_id, "timestamp", user_id, device_id,
                    event_type, ip_address,
                    country, city, region, organization,
                    is_enriched, enrichment_confidence,
                    event_properties, user_properties
                ) VALUES (
                    ?1,  ?2,  ?3,  ?4,  ?5,
                    ?6,  ?7,
                    ?8,  ?9,  ?10, ?11,
                    ?12, ?13,
                    ?14, ?15
                )"#,
                duckdb::params![
                    uuid::Uuid::new_v4().to_string(),
                    event.event_id,
                    ts_param(event.timestamp),
                    event.user_id,
                    event.device_id,
                    event.event_type,
                    event.ip_address,
                    event.country,
                    event.city,
                    event.region,
                    event.organization,
                    event.is_enriched,
                    event.enrichment_confidence,
                    serde_json::to_string(&event.event_properties)?,
                    serde_json::to_string(&event.user_properties)?,
                ],
            )?;
        }

        tx.commit()?;
        tracing::debug!("Inserted {} events into DuckDB", events.len());
        Ok(events.len())
    }

    /// Insert a run summary and return it with its assigned id and creation time.
    pub async fn insert_data_source(&self, source: &DataSource) -> Result<DataSourceRecord> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_date = Utc::now();

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO data_sources (
                id, name, source_type, file_url,
                total_events, processed_events, enriched_events,
                processing_status, date_range_start, date_range_end, created_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            duckdb::params![
                id,
                source.name,
                source.source_type,
                source.file_url,
                source.total_events as i64,
                source.processed_events as i64,
                source.enriched_events as i64,
                source.processing_status.as_str(),
                source.date_range_start.map(ts_param),
                source.date_range_end.map(ts_param),
                ts_param(created_date),
            ],
        )?;

        Ok(DataSourceRecord {
            id,
            created_date,
            source: source.clone(),
        })
    }

    /// Execute `SELECT 1` as a lightweight liveness check for `/health`.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }
}
