//! Normalization of extraction output into the ordered raw event sequence.

use serde_json::Value;

use crate::error::IngestError;
use crate::event::{Event, RawEvent};
use crate::services::{ExtractionResponse, ExtractionStatus};

/// Accepts either a single record or an array of records, mirroring the
/// two shapes the extraction service may return.
enum OneOrMany {
    One(Value),
    Many(Vec<Value>),
}

/// Convert an extraction response into events in extraction order.
///
/// A non-success status becomes [`IngestError::Extraction`] with the
/// service's detail message; so does output that is missing, not a
/// record/array, or contains a record that does not match the event schema.
pub fn normalize(response: ExtractionResponse) -> Result<Vec<Event>, IngestError> {
    if response.status != ExtractionStatus::Success {
        return Err(IngestError::Extraction {
            details: response.details,
        });
    }

    let records = match response.output {
        Some(Value::Array(items)) => OneOrMany::Many(items),
        Some(record @ Value::Object(_)) => OneOrMany::One(record),
        Some(Value::Null) | None => {
            return Err(IngestError::extraction("extraction returned no output"))
        }
        Some(other) => {
            return Err(IngestError::extraction(format!(
                "extraction output must be a record or an array of records, got {}",
                kind_of(&other)
            )))
        }
    };

    match records {
        OneOrMany::One(record) => Ok(vec![to_event(0, record)?]),
        OneOrMany::Many(items) => items
            .into_iter()
            .enumerate()
            .map(|(idx, record)| to_event(idx, record))
            .collect(),
    }
}

fn to_event(idx: usize, record: Value) -> Result<Event, IngestError> {
    serde_json::from_value::<RawEvent>(record)
        .map(Event::from)
        .map_err(|e| IngestError::extraction(format!("record {idx}: {e}")))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
