use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::{CaptureError, ProviderError};
use crate::types::{Location, SolarTimes};

/// Source of sunrise, solar noon and sunset for a place and day.
///
/// Must answer for the requested calendar date. Retrying is the caller's
/// business; implementations report the first failure.
#[async_trait]
pub trait SolarTimesProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn solar_times(
        &self,
        location: Location,
        date: NaiveDate,
    ) -> Result<SolarTimes, ProviderError>;
}

/// Maps a position to an IANA timezone name (e.g. `"America/Los_Angeles"`).
#[async_trait]
pub trait TimezoneResolver: Send + Sync {
    fn name(&self) -> &str;

    async fn timezone(&self, location: Location) -> Result<String, ProviderError>;
}

/// Downloads one webcam image to `destination`, returning the bytes written.
#[async_trait]
pub trait ImageCapture: Send + Sync {
    async fn capture(&self, url: &str, destination: &Path) -> Result<u64, CaptureError>;
}

/// Wall-clock source for the driver loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
