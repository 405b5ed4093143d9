use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use timelapse_core::config::SolarConfig;
use timelapse_scheduler::{Location, ProviderError, SolarTimes, SolarTimesProvider};
use tracing::{debug, warn};

use crate::unavailable;

/// Client for the sunrise-sunset.org JSON API.
pub struct SunriseSunsetClient {
    client: reqwest::Client,
    base_url: String,
}

impl SunriseSunsetClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SolarConfig) -> Result<Self, ProviderError> {
        Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl SolarTimesProvider for SunriseSunsetClient {
    fn name(&self) -> &str {
        "sunrise-sunset.org"
    }

    async fn solar_times(
        &self,
        location: Location,
        date: NaiveDate,
    ) -> Result<SolarTimes, ProviderError> {
        let url = format!("{}/json", self.base_url);
        debug!(lat = location.latitude, lng = location.longitude, %date, "requesting solar times");

        let resp = self
            .client
            .get(&url)
            .query(&[
                ("lat", location.latitude.to_string()),
                ("lng", location.longitude.to_string()),
                ("date", date.format("%Y-%m-%d").to_string()),
                ("formatted", "0".to_string()),
            ])
            .send()
            .await
            .map_err(unavailable)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "sunrise-sunset API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        parse_response(api_resp, status)
    }
}

// formatted=0 gives ISO 8601 instants in UTC.
#[derive(Deserialize)]
struct ApiResponse {
    status: String,
    results: Option<ApiResults>,
}

#[derive(Deserialize)]
struct ApiResults {
    sunrise: Option<String>,
    solar_noon: Option<String>,
    sunset: Option<String>,
}

fn parse_response(resp: ApiResponse, http_status: u16) -> Result<SolarTimes, ProviderError> {
    if resp.status != "OK" {
        return Err(ProviderError::Api {
            status: http_status,
            message: format!("status {}", resp.status),
        });
    }
    let results = resp
        .results
        .ok_or_else(|| ProviderError::Parse("response has no results".to_string()))?;
    Ok(SolarTimes {
        sunrise: instant("sunrise", results.sunrise)?,
        solar_noon: instant("solar_noon", results.solar_noon)?,
        sunset: instant("sunset", results.sunset)?,
    })
}

fn instant(field: &str, value: Option<String>) -> Result<DateTime<Utc>, ProviderError> {
    let raw = value.ok_or_else(|| ProviderError::Parse(format!("missing {field}")))?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| ProviderError::Parse(format!("bad {field} {raw:?}: {e}")))
}
