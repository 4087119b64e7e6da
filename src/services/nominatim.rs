use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::{config::GeocodingConfig, schema::Coordinates};

use super::adapter::Geocoder;

/// Public OpenStreetMap geocoder.
///
/// API:
/// GET {url}?q=<address>&format=jsonv2&addressdetails=1&limit=1
/// with a mandatory `User-Agent`.
///
/// Only the first result's `lat` / `lon` (strings) are used.
pub struct NominatimGeocoder {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl NominatimGeocoder {
    pub fn new(cfg: &GeocodingConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()?;

        Url::parse(&cfg.url)?;

        Ok(Self {
            http,
            endpoint: cfg.url.clone(),
        })
    }

    async fn search(&self, address: &str) -> anyhow::Result<Option<Coordinates>> {
        let url = Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", address),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ],
        )?;

        let response = self.http.get(url).send().await?.error_for_status()?;
        let places: Vec<Place> = response.json().await?;

        Ok(places.first().and_then(parse_place))
    }
}

fn parse_place(place: &Place) -> Option<Coordinates> {
    Some(Coordinates {
        latitude: place.lat.trim().parse().ok()?,
        longitude: place.lon.trim().parse().ok()?,
    })
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    async fn locate(&self, address: &str) -> Option<Coordinates> {
        match self.search(address).await {
            Ok(found) => found,
            Err(e) => {
                log::warn!("[GEO] lookup failed for '{}': {}", address, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_result_is_parsed_from_strings() {
        let places: Vec<Place> = serde_json::from_str(
            r#"[{"lat":"-25.4284","lon":"-49.2733","display_name":"Curitiba"}]"#,
        )
        .unwrap();

        let c = places.first().and_then(parse_place).unwrap();
        assert_eq!(c.latitude, -25.4284);
        assert_eq!(c.longitude, -49.2733);
    }

    #[test]
    fn unparseable_coordinates_are_a_miss() {
        let place = Place {
            lat: "n/a".into(),
            lon: "-49.2".into(),
        };
        assert!(parse_place(&place).is_none());
    }
}
