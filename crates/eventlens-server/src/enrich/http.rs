use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use eventlens_core::services::{Enricher, EnrichmentResponse};

/// Remote enrichment service.
///
/// Each call POSTs `{ "ip", "response_json_schema" }` and expects
/// `{ country, city, region, organization, confidence? }` back.
pub struct HttpEnricher {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl HttpEnricher {
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::new(),
            url: reqwest::Url::parse(url)?,
        })
    }
}

fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "country": { "type": "string" },
            "city": { "type": "string" },
            "region": { "type": "string" },
            "organization": { "type": "string" },
            "confidence": { "type": "number" }
        }
    })
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn enrich(&self, ip: &str) -> Result<EnrichmentResponse> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "ip": ip,
                "response_json_schema": response_schema(),
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<EnrichmentResponse>().await?)
    }
}
