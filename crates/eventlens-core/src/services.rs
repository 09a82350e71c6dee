//! Contracts of the external collaborators the ingest pipeline drives.
//!
//! Implementations live outside this crate (the server ships a local file
//! store, a file extractor and two enrichers). Every call is bounded by a
//! timeout at the call site, so implementations need not enforce their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Confidence recorded when the enrichment service does not report one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Durable storage for raw uploaded files.
#[async_trait]
pub trait FileStore: Send + Sync + 'static {
    /// Persist `bytes` and return a URL the extractor can read back.
    async fn store(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Success,
    Error,
}

/// Result envelope of an extraction call. `output` may hold one record or
/// an array of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub status: ExtractionStatus,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ExtractionResponse {
    pub fn success(output: Value) -> Self {
        Self {
            status: ExtractionStatus::Success,
            output: Some(output),
            details: None,
        }
    }

    pub fn error(details: impl Into<String>) -> Self {
        Self {
            status: ExtractionStatus::Error,
            output: None,
            details: Some(details.into()),
        }
    }
}

/// Turns a stored file into event-shaped records against a schema.
#[async_trait]
pub trait Extractor: Send + Sync + 'static {
    async fn extract(&self, file_url: &str, schema: &Value) -> anyhow::Result<ExtractionResponse>;
}

/// What an enrichment service returns for one IP address. Every field is
/// optional on the wire; [`EnrichmentResponse::into_enrichment`] decides
/// whether the answer is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentResponse {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A complete enrichment ready to merge into an event.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub country: String,
    pub city: String,
    pub region: String,
    pub organization: String,
    pub confidence: f64,
}

impl EnrichmentResponse {
    /// Validate the response. Returns the name of the first missing output
    /// when the answer is incomplete.
    ///
    /// A confidence that is absent, zero or not finite becomes
    /// [`DEFAULT_CONFIDENCE`]; anything above 1 is clamped.
    pub fn into_enrichment(self) -> Result<Enrichment, &'static str> {
        let country = non_blank(self.country).ok_or("country")?;
        let city = non_blank(self.city).ok_or("city")?;
        let region = non_blank(self.region).ok_or("region")?;
        let organization = non_blank(self.organization).ok_or("organization")?;
        let confidence = match self.confidence {
            Some(c) if c.is_finite() && c > 0.0 => c.min(1.0),
            _ => DEFAULT_CONFIDENCE,
        };
        Ok(Enrichment {
            country,
            city,
            region,
            organization,
            confidence,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Location/organization lookup for a single IP address.
#[async_trait]
pub trait Enricher: Send + Sync + 'static {
    async fn enrich(&self, ip: &str) -> anyhow::Result<EnrichmentResponse>;
}
