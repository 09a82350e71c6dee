use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use maxminddb::{geoip2, Reader};

use eventlens_core::services::{Enricher, EnrichmentResponse};

/// Local MaxMind lookup: country, region and city from the City database,
/// organization from the ASN database.
///
/// No confidence is reported; the enrichment engine applies its default.
pub struct GeoIpEnricher {
    city: Reader<Vec<u8>>,
    asn: Option<Reader<Vec<u8>>>,
}

impl GeoIpEnricher {
    /// Load both databases into memory. The ASN database is optional; without
    /// it every lookup lacks an organization and so counts as incomplete.
    pub fn open(city_path: &str, asn_path: &str) -> Result<Self> {
        let city = Reader::open_readfile(city_path)
            .with_context(|| format!("opening GeoIP city database {city_path}"))?;
        let asn = if Path::new(asn_path).exists() {
            Some(
                Reader::open_readfile(asn_path)
                    .with_context(|| format!("opening GeoIP ASN database {asn_path}"))?,
            )
        } else {
            tracing::warn!(asn_path, "ASN database not found; organizations unavailable");
            None
        };
        Ok(Self { city, asn })
    }

    fn lookup(&self, ip: IpAddr) -> Result<EnrichmentResponse> {
        let record: geoip2::City = self.city.lookup(ip)?;

        let country = record
            .country
            .as_ref()
            .and_then(|c| c.iso_code)
            .map(str::to_string);
        let region = record
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.first())
            .and_then(|sub| sub.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());
        let city = record
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en"))
            .map(|s| s.to_string());

        let organization = match &self.asn {
            Some(reader) => reader
                .lookup::<geoip2::Asn>(ip)
                .ok()
                .and_then(|asn| asn.autonomous_system_organization)
                .map(str::to_string),
            None => None,
        };

        Ok(EnrichmentResponse {
            country,
            city,
            region,
            organization,
            confidence: None,
        })
    }
}

#[async_trait]
impl Enricher for GeoIpEnricher {
    async fn enrich(&self, ip: &str) -> Result<EnrichmentResponse> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .with_context(|| format!("invalid IP address {ip:?}"))?;
        self.lookup(addr)
    }
}
