use anyhow::{anyhow, bail, Result};

use eventlens_core::event::{parse_timestamp, Event, Properties};
use eventlens_core::store::{SortField, SortSpec};

use crate::queries::order_by;
use crate::DuckDbBackend;

/// Raw column values, converted to an [`Event`] once the row lock is released.
struct EventRow {
    event_id: String,
    ts: String,
    user_id: Option<String>,
    device_id: Option<String>,
    event_type: String,
    ip_address: Option<String>,
    country: Option<String>,
    city: Option<String>,
    region: Option<String>,
    organization: Option<String>,
    is_enriched: bool,
    enrichment_confidence: f64,
    event_properties: String,
    user_properties: String,
}

impl EventRow {
    fn into_event(self) -> Result<Event> {
        let timestamp = parse_timestamp(&self.ts)
            .ok_or_else(|| anyhow!("unreadable event timestamp {:?}", self.ts))?;
        Ok(Event {
            event_id: self.event_id,
            timestamp,
            user_id: self.user_id,
            device_id: self.device_id,
            event_type: self.event_type,
            ip_address: self.ip_address,
            country: self.country,
            city: self.city,
            region: self.region,
            organization: self.organization,
            is_enriched: self.is_enriched,
            enrichment_confidence: self.enrichment_confidence,
            event_properties: parse_properties(&self.event_properties)?,
            user_properties: parse_properties(&self.user_properties)?,
        })
    }
}

fn parse_properties(raw: &str) -> Result<Properties> {
    if raw.trim().is_empty() {
        return Ok(Properties::new());
    }
    Ok(serde_json::from_str(raw)?)
}

fn sort_column(field: SortField) -> Result<&'static str> {
    match field {
        SortField::Timestamp => Ok(r#""timestamp""#),
        SortField::CreatedDate => Ok("created_date"),
        SortField::EventType => Ok("event_type"),
        SortField::Name => bail!("events cannot be sorted by name"),
    }
}

impl DuckDbBackend {
    /// Up to `limit` events in `sort` order.
    pub async fn list_events(&self, sort: SortSpec, limit: usize) -> Result<Vec<Event>> {
        let sql = format!(
            r#"SELECT event_id, CAST("timestamp" AS VARCHAR), user_id, device_id,
                      event_type, ip_address, country, city, region, organization,
                      is_enriched, enrichment_confidence, event_properties, user_properties
               FROM events
               {}
               LIMIT ?1"#,
            order_by(sort_column(sort.field)?, sort)
        );

        let rows = {
            let conn = self.conn.lock().await;
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(duckdb::params![limit as i64], |row| {
                Ok(EventRow {
                    event_id: row.get(0)?,
                    ts: row.get(1)?,
                    user_id: row.get(2)?,
                    device_id: row.get(3)?,
                    event_type: row.get(4)?,
                    ip_address: row.get(5)?,
                    country: row.get(6)?,
                    city: row.get(7)?,
                    region: row.get(8)?,
                    organization: row.get(9)?,
                    is_enriched: row.get(10)?,
                    enrichment_confidence: row.get(11)?,
                    event_properties: row.get(12)?,
                    user_properties: row.get(13)?,
                })
            })?;
            let rows: Vec<_> = mapped.collect::<Result<_, _>>()?;
            rows
        };

        rows.into_iter().map(EventRow::into_event).collect()
    }
}
