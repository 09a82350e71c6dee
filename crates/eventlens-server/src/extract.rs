//! Local extractor for analytics export files.

use std::path::Path;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use eventlens_core::services::{ExtractionResponse, Extractor};

/// Columns whose CSV cells hold JSON-encoded property bags.
const JSON_COLUMNS: [&str; 2] = ["event_properties", "user_properties"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    JsonLines,
    Csv,
    /// Unknown extension: sniff the content.
    Unknown,
}

impl Format {
    fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Format::Json,
            Some("jsonl") | Some("ndjson") => Format::JsonLines,
            Some("csv") => Format::Csv,
            _ => Format::Unknown,
        }
    }
}

/// Reads `file://` URLs produced by [`crate::storage::LocalFileStore`] and
/// turns JSON, JSON Lines or CSV exports into records.
///
/// I/O problems are returned as `Err`; content problems (bad JSON, a record
/// missing a required field) come back as an `error` status with details.
#[derive(Debug, Default, Clone)]
pub struct FileExtractor;

#[async_trait]
impl Extractor for FileExtractor {
    async fn extract(&self, file_url: &str, schema: &Value) -> Result<ExtractionResponse> {
        let url = Url::parse(file_url)?;
        if url.scheme() != "file" {
            return Err(anyhow!("unsupported file URL scheme: {}", url.scheme()));
        }
        let path = url
            .to_file_path()
            .map_err(|_| anyhow!("not a local file URL: {file_url}"))?;
        let bytes = tokio::fs::read(&path).await?;

        let format = Format::of(&path);
        debug!(path = %path.display(), ?format, bytes = bytes.len(), "Extracting file");
        Ok(extract_bytes(format, &bytes, schema))
    }
}

fn extract_bytes(format: Format, bytes: &[u8], schema: &Value) -> ExtractionResponse {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.trim_start_matches('\u{feff}'),
        Err(e) => return ExtractionResponse::error(format!("file is not valid UTF-8: {e}")),
    };

    let parsed = match format {
        Format::Json => parse_json(text),
        Format::JsonLines => parse_json_lines(text),
        Format::Csv => parse_csv(text),
        Format::Unknown => match text.trim_start().chars().next() {
            Some('[') => parse_json(text),
            Some('{') => parse_json(text).or_else(|_| parse_json_lines(text)),
            _ => parse_json_lines(text),
        },
    };

    let output = match parsed {
        Ok(output) => output,
        Err(details) => return ExtractionResponse::error(details),
    };
    match check_required(&output, schema) {
        Ok(()) => ExtractionResponse::success(output),
        Err(details) => ExtractionResponse::error(details),
    }
}

fn parse_json(text: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ (Value::Array(_) | Value::Object(_))) => Ok(value),
        Ok(_) => Err("JSON file must contain an object or an array of objects".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}

fn parse_json_lines(text: &str) -> Result<Value, String> {
    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = serde_json::from_str::<Value>(line)
            .map_err(|e| format!("line {}: invalid JSON: {e}", idx + 1))?;
        records.push(record);
    }
    Ok(Value::Array(records))
}

fn parse_csv(text: &str) -> Result<Value, String> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader
        .headers()
        .map_err(|e| format!("invalid CSV header: {e}"))?
        .clone();

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row.map_err(|e| format!("CSV row {}: {e}", idx + 2))?;
        let mut record = Map::new();
        for (header, cell) in headers.iter().zip(row.iter()) {
            if header.is_empty() || cell.is_empty() {
                continue;
            }
            let value = if JSON_COLUMNS.contains(&header) {
                serde_json::from_str::<Value>(cell)
                    .ok()
                    .filter(Value::is_object)
                    .unwrap_or_else(|| Value::String(cell.to_string()))
            } else {
                Value::String(cell.to_string())
            };
            record.insert(header.to_string(), value);
        }
        records.push(Value::Object(record));
    }
    Ok(Value::Array(records))
}

/// Reject records missing a field listed in the schema's `required` array.
/// `event_time` satisfies `timestamp`.
fn check_required(output: &Value, schema: &Value) -> Result<(), String> {
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if required.is_empty() {
        return Ok(());
    }

    let records: Vec<&Value> = match output {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for (idx, record) in records.into_iter().enumerate() {
        let Some(fields) = record.as_object() else {
            return Err(format!("record {idx}: not an object"));
        };
        for field in &required {
            let present = |name: &str| fields.get(name).is_some_and(|v| !v.is_null());
            let found = present(field) || (*field == "timestamp" && present("event_time"));
            if !found {
                return Err(format!("record {idx}: missing required field {field:?}"));
            }
        }
    }
    Ok(())
}
