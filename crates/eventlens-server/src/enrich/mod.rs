//! Concrete [`Enricher`] implementations selected by `EVENTLENS_ENRICHER`.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use eventlens_core::config::{Config, EnricherMode};
use eventlens_core::services::{Enricher, EnrichmentResponse};

pub mod geoip;
pub mod http;

pub use geoip::GeoIpEnricher;
pub use http::HttpEnricher;

/// Build the enricher named by the configuration.
///
/// Startup never fails here: when the configured backend cannot be loaded
/// every lookup fails and events are stored unenriched.
pub fn from_config(config: &Config) -> Arc<dyn Enricher> {
    match &config.enricher {
        EnricherMode::Http(url) => match HttpEnricher::new(url) {
            Ok(enricher) => {
                info!(url = %url, "Using HTTP enrichment service");
                Arc::new(enricher)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Invalid EVENTLENS_ENRICHER_URL. Events will be stored unenriched.");
                Arc::new(Unavailable)
            }
        },
        EnricherMode::GeoIp => match GeoIpEnricher::open(&config.geoip_path, &config.asn_path) {
            Ok(enricher) => {
                info!(geoip_path = %config.geoip_path, "GeoIP enrichment ready");
                Arc::new(enricher)
            }
            Err(e) => {
                warn!(
                    geoip_path = %config.geoip_path,
                    error = %e,
                    "GeoIP database not loaded. Events will be stored unenriched. \
                     Set EVENTLENS_GEOIP_PATH and EVENTLENS_ASN_PATH to MaxMind databases."
                );
                Arc::new(Unavailable)
            }
        },
    }
}

/// Stand-in used when no enrichment backend could be loaded.
pub struct Unavailable;

#[async_trait]
impl Enricher for Unavailable {
    async fn enrich(&self, _ip: &str) -> Result<EnrichmentResponse> {
        Err(anyhow!("no enrichment backend loaded"))
    }
}
