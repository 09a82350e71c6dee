use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use crate::services::Enrichment;

/// Opaque key/value payload carried by an event. Never interpreted.
pub type Properties = Map<String, Value>;

/// Tag stored on every [`DataSource`] produced by the upload pipeline.
pub const SOURCE_TYPE: &str = "amplitude_export";

/// One record as it comes out of extraction, before enrichment.
///
/// Export files are loosely typed: identifiers may arrive as numbers, the
/// timestamp may be called `event_time`, and property bags may be JSON text
/// (CSV exports). Deserialization absorbs those differences so [`Event`] can
/// stay strict.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    #[serde(default, deserialize_with = "lenient_string")]
    pub event_id: Option<String>,
    #[serde(alias = "event_time", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: Option<String>,
    #[serde(deserialize_with = "required_string")]
    pub event_type: String,
    #[serde(default, alias = "ip", deserialize_with = "lenient_string")]
    pub ip_address: Option<String>,
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub event_properties: Properties,
    #[serde(default, deserialize_with = "deserialize_properties")]
    pub user_properties: Properties,
}

/// The ingested event. Mirrors the `events` table columns exactly.
///
/// Enrichment outputs are only populated when `is_enriched` is true, and
/// `enrichment_confidence` is exactly 0 otherwise. Use [`Event::apply_enrichment`]
/// and [`Event::mark_unenriched`] rather than writing the fields directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<String>,
    pub device_id: Option<String>,
    pub event_type: String,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub organization: Option<String>,
    pub is_enriched: bool,
    pub enrichment_confidence: f64,
    pub event_properties: Properties,
    pub user_properties: Properties,
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        Self {
            event_id: raw.event_id.unwrap_or_default(),
            timestamp: raw.timestamp,
            user_id: raw.user_id,
            device_id: raw.device_id,
            event_type: raw.event_type,
            ip_address: raw.ip_address,
            country: None,
            city: None,
            region: None,
            organization: None,
            is_enriched: false,
            enrichment_confidence: 0.0,
            event_properties: raw.event_properties,
            user_properties: raw.user_properties,
        }
    }
}

impl Event {
    /// The IP address to enrich, if the event carries a non-blank one.
    pub fn enrichable_ip(&self) -> Option<&str> {
        self.ip_address
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    }

    pub fn apply_enrichment(&mut self, enrichment: Enrichment) {
        self.country = Some(enrichment.country);
        self.city = Some(enrichment.city);
        self.region = Some(enrichment.region);
        self.organization = Some(enrichment.organization);
        self.is_enriched = true;
        self.enrichment_confidence = enrichment.confidence;
    }

    pub fn mark_unenriched(&mut self) {
        self.country = None;
        self.city = None;
        self.region = None;
        self.organization = None;
        self.is_enriched = false;
        self.enrichment_confidence = 0.0;
    }

    /// JSON schema handed to the extraction service. Only source-provided
    /// fields are listed; enrichment outputs are never read from a file.
    pub fn extraction_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_id": { "type": "string" },
                "timestamp": { "type": "string", "format": "date-time" },
                "user_id": { "type": "string" },
                "device_id": { "type": "string" },
                "event_type": { "type": "string" },
                "ip_address": { "type": "string" },
                "event_properties": { "type": "object" },
                "user_properties": { "type": "object" }
            },
            "required": ["timestamp", "event_type"]
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Summary of one ingest run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSource {
    pub name: String,
    pub source_type: String,
    pub file_url: String,
    pub total_events: u64,
    pub processed_events: u64,
    pub enriched_events: u64,
    pub processing_status: ProcessingStatus,
    pub date_range_start: Option<DateTime<Utc>>,
    pub date_range_end: Option<DateTime<Utc>>,
}

impl DataSource {
    /// Build the completed-run summary for `events`.
    ///
    /// The date range is the earliest and latest timestamp over the whole
    /// batch, so it does not depend on the order extraction produced.
    pub fn summarize(name: &str, file_url: &str, events: &[Event]) -> Self {
        let total = events.len() as u64;
        let enriched = events.iter().filter(|e| e.is_enriched).count() as u64;
        Self {
            name: name.to_string(),
            source_type: SOURCE_TYPE.to_string(),
            file_url: file_url.to_string(),
            total_events: total,
            processed_events: total,
            enriched_events: enriched,
            processing_status: ProcessingStatus::Completed,
            date_range_start: events.iter().map(|e| e.timestamp).min(),
            date_range_end: events.iter().map(|e| e.timestamp).max(),
        }
    }
}

/// A persisted [`DataSource`] with its store-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSourceRecord {
    pub id: String,
    pub created_date: DateTime<Utc>,
    #[serde(flatten)]
    pub source: DataSource,
}

/// `true` when timestamps never decrease along the sequence.
pub fn is_chronological(events: &[Event]) -> bool {
    events
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp)
}

/// Display name for an upload: the file name without its last extension.
pub fn default_source_name(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name)
        .trim();
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem.to_string()
    }
}

/// Parse the timestamp spellings found in analytics exports.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (read as UTC, the shape both
/// Amplitude exports and DuckDB `CAST(ts AS VARCHAR)` produce), and integer
/// epoch milliseconds.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    raw.parse::<i64>().ok().and_then(from_epoch_millis)
}

fn from_epoch_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match &value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n.as_i64().and_then(from_epoch_millis),
        _ => None,
    };
    parsed.ok_or_else(|| de::Error::custom(format!("unrecognised timestamp: {value}")))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a scalar value, found {other}"
        ))),
    }
}

fn required_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_string(deserializer)?.ok_or_else(|| de::Error::custom("value must not be null"))
}

fn deserialize_properties<'de, D>(deserializer: D) -> Result<Properties, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(Properties::new()),
        Some(Value::Object(map)) => Ok(map),
        // CSV exports carry property bags as JSON text.
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Properties::new()),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(de::Error::custom("properties must be a JSON object")),
        },
        Some(_) => Err(de::Error::custom("properties must be a JSON object")),
    }
}
