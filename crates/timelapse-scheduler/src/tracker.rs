use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::{
    backoff::Backoff,
    error::Result,
    planner::{DayPlan, DayPlanner},
    types::{CameraDefinition, SolarTimes},
};

/// Live schedule of one camera: today's capture times, which one is next,
/// and the capture retry delay.
///
/// Owned by exactly one driver loop; nothing here is shared.
#[derive(Debug, Clone)]
pub struct CameraSchedule {
    camera: CameraDefinition,
    timezone: Tz,
    date: NaiveDate,
    solar: SolarTimes,
    capture_times: Vec<DateTime<Tz>>,
    /// Entries before this index are at or before the last observed "now".
    /// Equal to `capture_times.len()` when the day is used up.
    next_index: usize,
    backoff: Backoff,
}

impl CameraSchedule {
    /// Start tracking `plan` from its first entry.
    pub fn new(camera: CameraDefinition, plan: DayPlan, backoff: Backoff) -> Self {
        Self {
            camera,
            timezone: plan.timezone,
            date: plan.date,
            solar: plan.solar,
            capture_times: plan.capture_times,
            next_index: 0,
            backoff,
        }
    }

    pub fn camera(&self) -> &CameraDefinition {
        &self.camera
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn solar(&self) -> &SolarTimes {
        &self.solar
    }

    pub fn capture_times(&self) -> &[DateTime<Tz>] {
        &self.capture_times
    }

    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// The capture waiting to fire, `None` once the day is used up.
    pub fn next_capture(&self) -> Option<DateTime<Tz>> {
        self.capture_times.get(self.next_index).copied()
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.capture_times.len()
    }

    /// True once `now` is strictly past the next capture time.
    ///
    /// Never true on an exhausted schedule: [`advance_to_next`] rolls the day
    /// over before that state is observable by the driver loop.
    ///
    /// [`advance_to_next`]: CameraSchedule::advance_to_next
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_capture().is_some_and(|at| now > at.with_timezone(&Utc))
    }

    /// Point `next_index` at the first entry strictly after `now`, and when
    /// none remain plan the following day and start over.
    ///
    /// Calling it again with the same `now` changes nothing. Returns `true`
    /// when a new day was installed. If planning fails the schedule stays
    /// exhausted and the call can simply be repeated later.
    pub async fn advance_to_next(
        &mut self,
        now: DateTime<Utc>,
        planner: &DayPlanner,
    ) -> Result<bool> {
        self.sync_index(now);
        if !self.is_exhausted() {
            return Ok(false);
        }
        let plan = planner.plan_after(&self.camera, self.date, now).await?;
        self.install(plan, now);
        Ok(true)
    }

    /// Replace the whole day at once; the index restarts from `now`.
    pub fn install(&mut self, plan: DayPlan, now: DateTime<Utc>) {
        self.timezone = plan.timezone;
        self.date = plan.date;
        self.solar = plan.solar;
        self.capture_times = plan.capture_times;
        self.next_index = 0;
        self.sync_index(now);
    }

    fn sync_index(&mut self, now: DateTime<Utc>) {
        // Stale persisted or hand-built data may arrive unsorted.
        if !self.capture_times.is_sorted() {
            self.capture_times.sort();
        }
        self.next_index = self.capture_times.partition_point(|at| at.with_timezone(&Utc) <= now);
    }

    pub fn backoff_delay(&self) -> Duration {
        self.backoff.current()
    }

    /// Lengthen the delay applied before the next capture attempt.
    pub fn on_capture_failure(&mut self) -> Duration {
        self.backoff.on_failure()
    }

    pub fn on_capture_success(&mut self) {
        self.backoff.on_success();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{camera, day_one, los_angeles_date, planner};
    use chrono::{Duration as TimeDelta, TimeZone};
    use chrono_tz::America::Los_Angeles;

    fn la(h: u32, m: u32, s: u32) -> DateTime<Tz> {
        Los_Angeles.with_ymd_and_hms(2020, 5, 27, h, m, s).unwrap()
    }

    fn at(local: DateTime<Tz>) -> DateTime<Utc> {
        local.with_timezone(&Utc)
    }

    fn schedule_with(times: Vec<DateTime<Tz>>) -> CameraSchedule {
        let plan = DayPlan {
            timezone: Los_Angeles,
            date: los_angeles_date(27),
            solar: day_one(),
            capture_times: times,
        };
        CameraSchedule::new(camera(), plan, Backoff::default())
    }

    fn base() -> CameraSchedule {
        schedule_with(vec![la(5, 39, 41), la(13, 3, 28), la(20, 27, 15)])
    }

    #[tokio::test]
    async fn index_counts_entries_at_or_before_now() {
        let (planner, _, _) = planner();
        let cases = [
            (la(0, 0, 0), 0),
            (la(5, 39, 41), 1),
            (la(6, 9, 41), 1),
            (la(19, 27, 15), 2),
        ];
        for (now, want) in cases {
            let mut schedule = base();
            let rolled = schedule.advance_to_next(at(now), &planner).await.unwrap();
            assert!(!rolled);
            assert_eq!(schedule.next_index(), want, "now = {now}");
        }
    }

    #[tokio::test]
    async fn between_second_and_third_of_five_is_index_two() {
        let (planner, _, _) = planner();
        let mut schedule = schedule_with(vec![
            la(5, 39, 41),
            la(9, 21, 34),
            la(13, 3, 28),
            la(16, 45, 21),
            la(20, 27, 15),
        ]);
        schedule
            .advance_to_next(at(la(10, 0, 0)), &planner)
            .await
            .unwrap();
        assert_eq!(schedule.next_index(), 2);
        assert_eq!(schedule.next_capture(), Some(la(13, 3, 28)));
    }

    #[tokio::test]
    async fn unsorted_times_are_sorted_first() {
        let (planner, _, _) = planner();
        let sunrise = la(5, 39, 41);
        let sunset = la(20, 27, 15);
        let mut schedule = schedule_with(vec![
            sunset,
            sunset - TimeDelta::minutes(30),
            sunrise + TimeDelta::minutes(60),
            sunrise,
            la(13, 3, 28),
        ]);
        schedule
            .advance_to_next(at(la(12, 0, 1)), &planner)
            .await
            .unwrap();
        assert_eq!(schedule.next_index(), 2);
        assert!(schedule.capture_times().windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn advance_is_idempotent_for_same_now() {
        let (planner, _, _) = planner();
        let mut schedule = base();
        let now = at(la(14, 0, 0));
        schedule.advance_to_next(now, &planner).await.unwrap();
        let first = schedule.next_index();
        schedule.advance_to_next(now, &planner).await.unwrap();
        assert_eq!(schedule.next_index(), first);
    }

    #[tokio::test]
    async fn exhausted_day_rolls_over_to_next_date() {
        let (planner, solar, zone) = planner();
        let mut schedule = base();
        let rolled = schedule
            .advance_to_next(at(la(20, 57, 15)), &planner)
            .await
            .unwrap();

        assert!(rolled);
        assert_eq!(schedule.next_index(), 0);
        assert_eq!(schedule.date(), los_angeles_date(28));
        assert_eq!(schedule.capture_times().len(), 3);
        assert_eq!(
            schedule.capture_times()[0],
            Los_Angeles.with_ymd_and_hms(2020, 5, 28, 5, 39, 9).unwrap()
        );
        assert_eq!(solar.calls(), 1);
        assert_eq!(zone.calls(), 1);
    }

    #[tokio::test]
    async fn failed_rollover_leaves_schedule_exhausted() {
        let (planner, _, _) = planner();
        // The fake provider only knows May 27 and 28.
        let plan = DayPlan {
            timezone: Los_Angeles,
            date: los_angeles_date(28),
            solar: day_one(),
            capture_times: vec![Los_Angeles.with_ymd_and_hms(2020, 5, 28, 6, 0, 0).unwrap()],
        };
        let mut schedule = CameraSchedule::new(camera(), plan, Backoff::default());
        let now = at(Los_Angeles.with_ymd_and_hms(2020, 5, 28, 22, 0, 0).unwrap());

        assert!(schedule.advance_to_next(now, &planner).await.is_err());
        assert!(schedule.is_exhausted());
        assert!(!schedule.is_due(now));
        assert_eq!(schedule.date(), los_angeles_date(28));
    }

    #[test]
    fn due_only_strictly_after_next_capture() {
        let schedule = base();
        assert!(!schedule.is_due(at(la(5, 39, 40))));
        assert!(!schedule.is_due(at(la(5, 39, 41))));
        assert!(schedule.is_due(at(la(5, 39, 42))));
    }

    #[test]
    fn capture_outcomes_drive_backoff() {
        let mut schedule = base();
        assert_eq!(schedule.backoff_delay(), std::time::Duration::ZERO);
        schedule.on_capture_failure();
        schedule.on_capture_failure();
        assert_eq!(schedule.backoff_delay(), std::time::Duration::from_secs(10));
        schedule.on_capture_success();
        assert_eq!(schedule.backoff_delay(), std::time::Duration::ZERO);
    }
}
