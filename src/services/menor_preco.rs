use std::time::Duration;

use reqwest::{StatusCode, Url};

use crate::{
    config::PricingConfig,
    error::ApiError,
    schema::{LookupResponse, QueryUnit},
};

use super::adapter::{PriceLookup, PricingApi};

/// Menor Preço (Nota Paraná) pricing lookup over HTTP.
///
/// API:
/// GET {url}?gtin=<product>&local=<geohash>&raio=<km>
///
/// - 200 → `{ "produtos": [...] }`, possibly empty
/// - 204 → no data for this pair
/// - anything else → `ApiError::Status`, classified by the engine
pub struct MenorPrecoClient {
    http: reqwest::Client,
    endpoint: String,
    radius: String,
}

impl MenorPrecoClient {
    pub fn new(cfg: &PricingConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;

        // Fail at start-up rather than on every request
        Url::parse(&cfg.url)?;

        Ok(Self {
            http,
            endpoint: cfg.url.clone(),
            radius: cfg.radius_km.to_string(),
        })
    }

    fn lookup_url(&self, unit: &QueryUnit) -> Result<Url, ApiError> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("gtin", unit.product_key.as_str()),
                ("local", unit.location_key.as_str()),
                ("raio", self.radius.as_str()),
            ],
        )
        .map_err(|e| ApiError::Transport(e.to_string()))
    }
}

#[async_trait::async_trait]
impl PricingApi for MenorPrecoClient {

    fn name(&self) -> &'static str {
        "menorpreco"
    }

    async fn lookup(&self, unit: &QueryUnit) -> Result<PriceLookup, ApiError> {
        let url = self.lookup_url(unit)?;
        let response = self.http.get(url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body: LookupResponse = response
                    .json()
                    .await
                    .map_err(|e| ApiError::Decode(e.to_string()))?;
                Ok(PriceLookup::Found(body.products))
            }
            StatusCode::NO_CONTENT => Ok(PriceLookup::NoContent),
            other => Err(ApiError::Status(other.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_url_carries_the_query_pair() {
        let client = MenorPrecoClient::new(&PricingConfig::default()).unwrap();
        let unit = QueryUnit {
            sequence_index: 3,
            product_key: "7894900011517".into(),
            location_key: "6gge7u6cc".into(),
        };

        let url = client.lookup_url(&unit).unwrap();
        assert_eq!(
            url.query(),
            Some("gtin=7894900011517&local=6gge7u6cc&raio=20")
        );
    }

    #[test]
    fn invalid_endpoint_is_rejected_up_front() {
        let cfg = PricingConfig {
            url: "not a url".into(),
            ..PricingConfig::default()
        };
        assert!(MenorPrecoClient::new(&cfg).is_err());
    }
}
