use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use timelapse_core::config::TimezoneConfig;
use timelapse_scheduler::{Location, ProviderError, TimezoneResolver};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::unavailable;

/// TimeZoneDB `get-time-zone` lookups by position.
///
/// The free tier allows one request per second. All lookups through one
/// client are serialised and spaced by `min_interval`, so start-up with many
/// cameras staggers itself. "Too many requests" answers are retried after a
/// fixed delay.
pub struct TimeZoneDbClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    min_interval: Duration,
    retry_delay: Duration,
    max_attempts: u32,
    /// When the previous request went out; held across the request itself.
    last_request: Mutex<Option<Instant>>,
}

impl TimeZoneDbClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(unavailable)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            min_interval: Duration::from_secs(1),
            retry_delay: Duration::from_secs(2),
            max_attempts: 5,
            last_request: Mutex::new(None),
        })
    }

    pub fn from_config(config: &TimezoneConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.as_deref().ok_or_else(|| {
            ProviderError::Unavailable("timezone.api_key is not configured".to_string())
        })?;
        let client = Self::new(
            &config.base_url,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(client.with_limits(
            Duration::from_millis(config.min_interval_ms),
            Duration::from_millis(config.retry_delay_ms),
            config.max_attempts,
        ))
    }

    pub fn with_limits(
        mut self,
        min_interval: Duration,
        retry_delay: Duration,
        max_attempts: u32,
    ) -> Self {
        self.min_interval = min_interval;
        self.retry_delay = retry_delay;
        self.max_attempts = max_attempts.max(1);
        self
    }

    async fn send_spaced(&self, location: Location) -> Result<reqwest::Response, ProviderError> {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let wait = self.min_interval.saturating_sub(previous.elapsed());
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "spacing timezone lookup");
                tokio::time::sleep(wait).await;
            }
        }
        let result = self
            .client
            .get(format!("{}/v2.1/get-time-zone", self.base_url))
            .query(&[
                ("key", self.api_key.clone()),
                ("format", "json".to_string()),
                ("by", "position".to_string()),
                ("lat", location.latitude.to_string()),
                ("lng", location.longitude.to_string()),
            ])
            .send()
            .await;
        *last = Some(Instant::now());
        result.map_err(unavailable)
    }
}

#[async_trait]
impl TimezoneResolver for TimeZoneDbClient {
    fn name(&self) -> &str {
        "timezonedb"
    }

    async fn timezone(&self, location: Location) -> Result<String, ProviderError> {
        for attempt in 1..=self.max_attempts {
            let resp = self.send_spaced(location).await?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!(
                    attempt,
                    max_attempts = self.max_attempts,
                    retry_in_ms = self.retry_delay.as_millis() as u64,
                    "timezone lookup rate limited"
                );
                if attempt < self.max_attempts {
                    tokio::time::sleep(self.retry_delay).await;
                }
                continue;
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                warn!(status = status.as_u16(), body = %text, "TimeZoneDB API error");
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message: text,
                });
            }

            let api_resp: ApiResponse = resp
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;
            if api_resp.status != "OK" {
                return Err(ProviderError::Api {
                    status: status.as_u16(),
                    message: api_resp.message,
                });
            }
            return match api_resp.zone_name {
                Some(zone) if !zone.is_empty() => {
                    debug!(lat = location.latitude, lng = location.longitude, %zone, "timezone resolved");
                    Ok(zone)
                }
                _ => Err(ProviderError::Parse("response has no zoneName".to_string())),
            };
        }
        Err(ProviderError::RateLimited {
            attempts: self.max_attempts,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    zone_name: Option<String>,
}
