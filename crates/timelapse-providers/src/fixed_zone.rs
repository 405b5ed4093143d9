use async_trait::async_trait;
use chrono_tz::Tz;
use timelapse_scheduler::{Location, ProviderError, TimezoneResolver};

/// Answers every lookup with the same zone, for deployments where all
/// cameras share one timezone or no TimeZoneDB key is available.
pub struct FixedZoneResolver {
    zone: String,
}

impl FixedZoneResolver {
    /// Fails when `zone` is not a known IANA name.
    pub fn new(zone: &str) -> Result<Self, ProviderError> {
        let tz: Tz = zone
            .parse()
            .map_err(|e| ProviderError::Parse(format!("unknown timezone {zone:?}: {e}")))?;
        Ok(Self {
            zone: tz.name().to_string(),
        })
    }
}

#[async_trait]
impl TimezoneResolver for FixedZoneResolver {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn timezone(&self, _location: Location) -> Result<String, ProviderError> {
        Ok(self.zone.clone())
    }
}
