use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::{
    error::{ProviderError, Result, SchedulerError},
    provider::{SolarTimesProvider, TimezoneResolver},
    schedule::compute_daily_schedule,
    types::{CameraDefinition, SolarTimes},
};

/// Everything resolved for one camera-day: zone, sun events, capture times.
#[derive(Debug, Clone)]
pub struct DayPlan {
    pub timezone: Tz,
    pub date: NaiveDate,
    pub solar: SolarTimes,
    pub capture_times: Vec<DateTime<Tz>>,
}

/// Builds [`DayPlan`]s by querying the timezone and solar collaborators.
///
/// The timezone is looked up again for every day so a zone change (or a
/// corrected lookup) is picked up at the next rollover.
#[derive(Clone)]
pub struct DayPlanner {
    solar: Arc<dyn SolarTimesProvider>,
    timezone: Arc<dyn TimezoneResolver>,
}

impl DayPlanner {
    pub fn new(solar: Arc<dyn SolarTimesProvider>, timezone: Arc<dyn TimezoneResolver>) -> Self {
        Self { solar, timezone }
    }

    /// Plan the webcam-local calendar day containing `instant`.
    pub async fn plan_around(
        &self,
        camera: &CameraDefinition,
        instant: DateTime<Utc>,
    ) -> Result<DayPlan> {
        let tz = self.resolve_zone(camera).await?;
        let date = instant.with_timezone(&tz).date_naive();
        self.plan_date(camera, tz, date).await
    }

    /// Plan the day after `previous`, or the webcam's current local date when
    /// that is later (the loop fell behind by more than a day).
    pub async fn plan_after(
        &self,
        camera: &CameraDefinition,
        previous: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<DayPlan> {
        let tz = self.resolve_zone(camera).await?;
        let following = previous.succ_opt().ok_or_else(|| {
            SchedulerError::ScheduleInvariant(format!("no calendar day after {previous}"))
        })?;
        let date = following.max(now.with_timezone(&tz).date_naive());
        self.plan_date(camera, tz, date).await
    }

    async fn resolve_zone(&self, camera: &CameraDefinition) -> Result<Tz> {
        let zone = self
            .timezone
            .timezone(camera.location)
            .await
            .map_err(SchedulerError::TimezoneProvider)?;
        debug!(camera = %camera.name, resolver = self.timezone.name(), %zone, "timezone resolved");
        zone.parse::<Tz>().map_err(|e| {
            SchedulerError::TimezoneProvider(ProviderError::Parse(format!(
                "unknown timezone {zone:?}: {e}"
            )))
        })
    }

    async fn plan_date(
        &self,
        camera: &CameraDefinition,
        tz: Tz,
        date: NaiveDate,
    ) -> Result<DayPlan> {
        let solar = self
            .solar
            .solar_times(camera.location, date)
            .await
            .map_err(SchedulerError::SolarProvider)?;
        debug!(
            camera = %camera.name,
            provider = self.solar.name(),
            %date,
            sunrise = %solar.sunrise,
            solar_noon = %solar.solar_noon,
            sunset = %solar.sunset,
            "solar times fetched"
        );
        let capture_times = compute_daily_schedule(camera, &solar, date, tz)?;
        Ok(DayPlan {
            timezone: tz,
            date,
            solar,
            capture_times,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{camera, los_angeles_date, planner, FakeSolar, FakeTimezone};
    use chrono::TimeZone;
    use chrono_tz::America::Los_Angeles;

    #[tokio::test]
    async fn plan_around_uses_webcam_local_date() {
        let (planner, _, _) = planner();
        // 2020-05-28 02:00 UTC is still the evening of May 27 in California.
        let instant = Utc.with_ymd_and_hms(2020, 5, 28, 2, 0, 0).unwrap();
        let plan = planner.plan_around(&camera(), instant).await.unwrap();
        assert_eq!(plan.date, los_angeles_date(27));
        assert_eq!(plan.timezone, Los_Angeles);
        assert_eq!(plan.capture_times.len(), 3);
    }

    #[tokio::test]
    async fn plan_after_moves_to_following_day() {
        let (planner, solar, zone) = planner();
        let now = Los_Angeles
            .with_ymd_and_hms(2020, 5, 27, 21, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let plan = planner
            .plan_after(&camera(), los_angeles_date(27), now)
            .await
            .unwrap();
        assert_eq!(plan.date, los_angeles_date(28));
        assert_eq!(
            plan.capture_times[0],
            Los_Angeles.with_ymd_and_hms(2020, 5, 28, 5, 39, 9).unwrap()
        );
        assert_eq!(solar.calls(), 1);
        assert_eq!(zone.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_zone_name_is_a_timezone_error() {
        let planner = DayPlanner::new(
            Arc::new(FakeSolar::new()),
            Arc::new(FakeTimezone::new("Mars/Olympus_Mons")),
        );
        let err = planner
            .plan_around(&camera(), Utc.with_ymd_and_hms(2020, 5, 27, 20, 0, 0).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TimezoneProvider(_)));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn solar_failure_is_transient() {
        let (planner, _, _) = planner();
        let err = planner
            .plan_around(&camera(), Utc.with_ymd_and_hms(2021, 1, 1, 20, 0, 0).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::SolarProvider(_)));
        assert!(err.is_transient());
    }
}
