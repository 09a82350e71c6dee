//! Upload → extract → enrich → persist pipeline.
//!
//! ```text
//! [FileStore] → [Extractor] → [EnrichmentEngine] → [BatchWriter] → [EventStore]
//!     URL        raw events     enriched events      batches of N
//! ```
//!
//! [`Pipeline`] drives the stages as an explicit state machine and publishes
//! a [`RunSnapshot`] after every transition. Storage, extraction and
//! persistence failures end the run; enrichment failures are absorbed per
//! event.

pub mod config;
pub mod enrichment;
pub mod persist;
pub mod pipeline;
pub mod run;

pub use config::PipelineConfig;
pub use enrichment::{EnrichmentEngine, EnrichmentFailure};
pub use persist::BatchWriter;
pub use pipeline::{Collaborators, Pipeline, RunOutcome, Upload};
pub use run::{run_channel, RunControl, RunHandle, RunSnapshot, Stage};
