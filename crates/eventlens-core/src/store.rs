//! Persistence/query abstraction over the two record kinds.

use std::str::FromStr;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::event::{DataSource, DataSourceRecord, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Timestamp,
    CreatedDate,
    EventType,
    Name,
}

/// Parsed form of a sort key such as `-timestamp` (leading `-` = descending).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub descending: bool,
}

impl SortSpec {
    pub const NEWEST_EVENTS: SortSpec = SortSpec {
        field: SortField::Timestamp,
        descending: true,
    };

    pub const NEWEST_SOURCES: SortSpec = SortSpec {
        field: SortField::CreatedDate,
        descending: true,
    };
}

impl FromStr for SortSpec {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (descending, name) = match raw.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let field = match name {
            "timestamp" => SortField::Timestamp,
            "created_date" => SortField::CreatedDate,
            "event_type" => SortField::EventType,
            "name" => SortField::Name,
            other => return Err(anyhow!("unsupported sort field: {other:?}")),
        };
        Ok(Self { field, descending })
    }
}

/// Storage interface used by the batch writer and the read-side pages.
///
/// Self-hosted mode uses the DuckDB implementation; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    async fn create_data_source(&self, source: &DataSource) -> Result<DataSourceRecord>;

    /// Write one batch of events atomically and return how many were written.
    async fn bulk_create_events(&self, events: &[Event]) -> Result<usize>;

    async fn list_events(&self, sort: SortSpec, limit: usize) -> Result<Vec<Event>>;

    async fn list_data_sources(&self, sort: SortSpec, limit: usize)
        -> Result<Vec<DataSourceRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sort_keys() {
        assert_eq!(
            "-timestamp".parse::<SortSpec>().expect("parse"),
            SortSpec::NEWEST_EVENTS
        );
        assert_eq!(
            "-created_date".parse::<SortSpec>().expect("parse"),
            SortSpec::NEWEST_SOURCES
        );
        let by_name: SortSpec = "name".parse().expect("parse");
        assert_eq!(by_name.field, SortField::Name);
        assert!(!by_name.descending);
        assert!("-ip_address".parse::<SortSpec>().is_err());
    }
}
