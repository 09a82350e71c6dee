use serde::Serialize;
use thiserror::Error;

const DEFAULT_EXTRACTION_MESSAGE: &str = "Failed to extract data";

/// Terminal failures of an ingest run.
///
/// Enrichment problems are deliberately absent: they are recovered per event
/// and never reach the run as a whole.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Storage(String),

    /// Carries the extraction service's own detail message verbatim when
    /// one was provided.
    #[error("{}", .details.as_deref().unwrap_or(DEFAULT_EXTRACTION_MESSAGE))]
    Extraction { details: Option<String> },

    /// `written` is the number of events already durably committed.
    #[error("persistence error after {written} events written: {message}")]
    Persistence { written: usize, message: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("a pipeline run is already active")]
    Busy,
}

impl IngestError {
    pub fn extraction(details: impl Into<String>) -> Self {
        Self::Extraction {
            details: Some(details.into()),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Storage(_) => "storage_error",
            Self::Extraction { .. } => "extraction_error",
            Self::Persistence { .. } => "persistence_error",
            Self::Cancelled => "cancelled",
            Self::Busy => "run_active",
        }
    }

    pub fn events_written(&self) -> Option<usize> {
        match self {
            Self::Persistence { written, .. } => Some(*written),
            _ => None,
        }
    }

    /// The user-facing view of this error.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.code(),
            message: self.to_string(),
            events_written: self.events_written(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events_written: Option<usize>,
}
