//! HTTP implementations of the scheduler's collaborator traits.
//!
//! - [`SunriseSunsetClient`] — solar times from sunrise-sunset.org
//! - [`TimeZoneDbClient`] — position → IANA zone via TimeZoneDB, rate limited
//! - [`FixedZoneResolver`] — one configured zone for every camera
//! - [`HttpImageCapture`] — streaming image download

use std::sync::Arc;

use timelapse_core::config::TimezoneConfig;
use timelapse_scheduler::{ProviderError, TimezoneResolver};

pub mod fixed_zone;
pub mod http_capture;
pub mod sunrise_sunset;
pub mod timezonedb;

pub use fixed_zone::FixedZoneResolver;
pub use http_capture::HttpImageCapture;
pub use sunrise_sunset::SunriseSunsetClient;
pub use timezonedb::TimeZoneDbClient;

/// Pick the timezone source from config: `fixed_zone` wins, otherwise
/// TimeZoneDB with the configured key.
pub fn timezone_resolver(
    config: &TimezoneConfig,
) -> Result<Arc<dyn TimezoneResolver>, ProviderError> {
    let fixed = config.fixed_zone.as_deref().map(str::trim).filter(|z| !z.is_empty());
    if let Some(zone) = fixed {
        return Ok(Arc::new(FixedZoneResolver::new(zone)?));
    }
    Ok(Arc::new(TimeZoneDbClient::from_config(config)?))
}

/// Connection refused, DNS failure, timeout, unreadable body.
pub(crate) fn unavailable(e: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_zone_takes_precedence() {
        let config = TimezoneConfig {
            api_key: Some("key".to_string()),
            fixed_zone: Some("Pacific/Honolulu".to_string()),
            ..TimezoneConfig::default()
        };
        let resolver = timezone_resolver(&config).unwrap();
        assert_eq!(resolver.name(), "fixed");
    }

    #[test]
    fn blank_fixed_zone_falls_back_to_timezonedb() {
        let config = TimezoneConfig {
            api_key: Some("key".to_string()),
            fixed_zone: Some("  ".to_string()),
            ..TimezoneConfig::default()
        };
        assert!(config.fixed_zone.is_some());
        assert_eq!(timezone_resolver(&config).unwrap().name(), "timezonedb");
    }

    #[test]
    fn api_key_selects_timezonedb() {
        let config = TimezoneConfig {
            api_key: Some("key".to_string()),
            ..TimezoneConfig::default()
        };
        assert_eq!(timezone_resolver(&config).unwrap().name(), "timezonedb");
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(timezone_resolver(&TimezoneConfig::default()).is_err());
    }
}
