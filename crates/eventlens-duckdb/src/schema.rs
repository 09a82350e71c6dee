/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// Every statement uses `IF NOT EXISTS`, so it is safe to re-run on each
/// startup.
///
/// `memory_limit` comes from `Config.duckdb_memory_limit`
/// (env `EVENTLENS_DUCKDB_MEMORY`, default `"1GB"`). Always set it
/// explicitly: the DuckDB default of 80% of system RAM is not acceptable
/// for a server process.
///
/// Timestamps are stored as naive UTC `TIMESTAMP` values and read back with
/// `CAST(... AS VARCHAR)`. Property bags are stored as JSON text.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- EVENTS
-- ===========================================
-- `seq` preserves insertion (extraction) order for tie-breaking sorts.
CREATE SEQUENCE IF NOT EXISTS events_seq;
CREATE TABLE IF NOT EXISTS events (
    id                      VARCHAR PRIMARY KEY,       -- UUID v4
    seq                     BIGINT NOT NULL DEFAULT nextval('events_seq'),
    event_id                VARCHAR NOT NULL,          -- as found in the export; may be ''
    "timestamp"             TIMESTAMP NOT NULL,
    user_id                 VARCHAR,
    device_id               VARCHAR,
    event_type              VARCHAR NOT NULL,
    ip_address              VARCHAR,
    country                 VARCHAR,                   -- NULL unless is_enriched
    city                    VARCHAR,
    region                  VARCHAR,
    organization            VARCHAR,
    is_enriched             BOOLEAN NOT NULL DEFAULT FALSE,
    enrichment_confidence   DOUBLE NOT NULL DEFAULT 0,
    event_properties        VARCHAR NOT NULL DEFAULT '{{}}',
    user_properties         VARCHAR NOT NULL DEFAULT '{{}}',
    created_date            TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_events_timestamp  ON events("timestamp");
CREATE INDEX IF NOT EXISTS idx_events_event_type ON events(event_type);

-- ===========================================
-- DATA SOURCES (one row per completed run)
-- ===========================================
CREATE SEQUENCE IF NOT EXISTS data_sources_seq;
CREATE TABLE IF NOT EXISTS data_sources (
    id                  VARCHAR PRIMARY KEY,           -- UUID v4
    seq                 BIGINT NOT NULL DEFAULT nextval('data_sources_seq'),
    name                VARCHAR NOT NULL,
    source_type         VARCHAR NOT NULL,
    file_url            VARCHAR NOT NULL,
    total_events        BIGINT NOT NULL,
    processed_events    BIGINT NOT NULL,
    enriched_events     BIGINT NOT NULL,
    processing_status   VARCHAR NOT NULL,              -- pending | processing | completed | failed
    date_range_start    TIMESTAMP,                     -- NULL for an empty run
    date_range_end      TIMESTAMP,
    created_date        TIMESTAMP NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_data_sources_created ON data_sources(created_date);
"#
    )
}
