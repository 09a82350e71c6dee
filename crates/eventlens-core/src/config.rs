use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: String,
    pub duckdb_memory_limit: String,
    pub geoip_path: String,
    pub asn_path: String,
    pub enricher: EnricherMode,
    pub cors_origins: Vec<String>,
    pub batch_size: usize,
    pub enrich_concurrency: usize,
    pub storage_timeout_ms: u64,
    pub extraction_timeout_ms: u64,
    pub enrich_timeout_ms: u64,
    /// How many of the most recent events the dashboard aggregates.
    pub dashboard_event_limit: usize,
    pub explorer_event_limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnricherMode {
    /// Local MaxMind databases.
    GeoIp,
    /// Remote enrichment service; holds the endpoint URL from `EVENTLENS_ENRICHER_URL`.
    Http(String),
}

pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_ENRICH_CONCURRENCY: usize = 8;

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Ok(Self {
            port: std::env::var("EVENTLENS_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|e| format!("invalid port: {e}"))?,
            data_dir: std::env::var("EVENTLENS_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
            duckdb_memory_limit: std::env::var("EVENTLENS_DUCKDB_MEMORY")
                .unwrap_or_else(|_| "1GB".to_string()),
            geoip_path: std::env::var("EVENTLENS_GEOIP_PATH")
                .unwrap_or_else(|_| "./GeoLite2-City.mmdb".to_string()),
            asn_path: std::env::var("EVENTLENS_ASN_PATH")
                .unwrap_or_else(|_| "./GeoLite2-ASN.mmdb".to_string()),
            enricher: {
                let raw =
                    std::env::var("EVENTLENS_ENRICHER").unwrap_or_else(|_| "geoip".to_string());
                match raw.as_str() {
                    "http" => {
                        let url = std::env::var("EVENTLENS_ENRICHER_URL").map_err(|_| {
                            "EVENTLENS_ENRICHER_URL required when ENRICHER=http".to_string()
                        })?;
                        EnricherMode::Http(url)
                    }
                    _ => EnricherMode::GeoIp,
                }
            },
            cors_origins: std::env::var("EVENTLENS_CORS_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            batch_size: env_parse("EVENTLENS_BATCH_SIZE", DEFAULT_BATCH_SIZE).max(1),
            enrich_concurrency: env_parse("EVENTLENS_ENRICH_CONCURRENCY", DEFAULT_ENRICH_CONCURRENCY)
                .max(1),
            storage_timeout_ms: env_parse("EVENTLENS_STORAGE_TIMEOUT_MS", 30_000),
            extraction_timeout_ms: env_parse("EVENTLENS_EXTRACTION_TIMEOUT_MS", 120_000),
            enrich_timeout_ms: env_parse("EVENTLENS_ENRICH_TIMEOUT_MS", 10_000),
            dashboard_event_limit: env_parse("EVENTLENS_DASHBOARD_EVENT_LIMIT", 1000),
            explorer_event_limit: env_parse("EVENTLENS_EXPLORER_EVENT_LIMIT", 500),
        })
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn enrich_timeout(&self) -> Duration {
        Duration::from_millis(self.enrich_timeout_ms)
    }
}

/// Parse an optional numeric variable, keeping `default` when it is unset or invalid.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
