use chrono::{DateTime, Duration, NaiveDate, SubsecRound, TimeZone};
use chrono_tz::Tz;

use crate::error::{Result, SchedulerError};
use crate::types::{CameraDefinition, FirstAnchor, LastAnchor, SolarTimes};

/// Compute the capture instants for one calendar day, in the webcam's zone.
///
/// The result is `[first] + additional + [last]`, strictly ascending, with
/// `camera.additional + 2` entries. Interior points depend on the count:
///
/// | additional | interior points                                             |
/// |------------|-------------------------------------------------------------|
/// | 0          | none                                                        |
/// | 1          | solar noon                                                  |
/// | even N     | N points splitting `(first, last)` evenly                   |
/// | odd N > 1  | (N-1)/2 evenly in `(first, noon)`, noon, (N-1)/2 in `(noon, last)` |
///
/// Windows that cannot yield a strictly ascending day (last not after first,
/// solar noon outside the window for an odd count, fewer seconds than points)
/// are rejected with [`SchedulerError::InvalidWindow`].
pub fn compute_daily_schedule(
    camera: &CameraDefinition,
    solar: &SolarTimes,
    date: NaiveDate,
    tz: Tz,
) -> Result<Vec<DateTime<Tz>>> {
    let first = resolve_first(&camera.first, solar, date, tz)?;
    let last = resolve_last(&camera.last, solar, date, tz)?;
    let noon = truncate_to_second(solar.solar_noon.with_timezone(&tz));

    if first >= last {
        return Err(SchedulerError::InvalidWindow(format!(
            "first capture {first} is not before last capture {last}"
        )));
    }

    let additional = camera.additional as usize;
    let mut times = Vec::with_capacity(additional + 2);
    times.push(first);

    match additional {
        0 => {}
        1 => {
            require_inside_window(noon, first, last)?;
            times.push(noon);
        }
        n if n % 2 == 0 => {
            require_room(first, last, n)?;
            times.extend(split_interval(first, last, n));
        }
        n => {
            require_inside_window(noon, first, last)?;
            let half = (n - 1) / 2;
            require_room(first, noon, half)?;
            require_room(noon, last, half)?;
            times.extend(split_interval(first, noon, half));
            times.push(noon);
            times.extend(split_interval(noon, last, half));
        }
    }

    times.push(last);
    times.sort();

    if let Some(pair) = times.windows(2).find(|w| w[0] >= w[1]) {
        return Err(SchedulerError::ScheduleInvariant(format!(
            "capture times not strictly increasing: {} then {}",
            pair[0], pair[1]
        )));
    }

    Ok(times)
}

/// Split the open interval `(start, end)` into `n + 1` equal parts and return
/// the `n` interior boundaries. The step is whole seconds, truncated, so the
/// last point may fall a few seconds short of an exact split.
pub fn split_interval(start: DateTime<Tz>, end: DateTime<Tz>, n: usize) -> Vec<DateTime<Tz>> {
    if n == 0 {
        return Vec::new();
    }
    let step = (end - start).num_seconds() / (n as i64 + 1);
    (1..=n as i64)
        .map(|i| truncate_to_second(start + Duration::seconds(step * i)))
        .collect()
}

/// Drop sub-second precision so repeated duration arithmetic cannot drift.
pub fn truncate_to_second(t: DateTime<Tz>) -> DateTime<Tz> {
    t.trunc_subsecs(0)
}

fn resolve_first(
    anchor: &FirstAnchor,
    solar: &SolarTimes,
    date: NaiveDate,
    tz: Tz,
) -> Result<DateTime<Tz>> {
    let sunrise = solar.sunrise.with_timezone(&tz);
    let at = match anchor {
        FirstAnchor::FixedTime { at } => local_wall_clock(date, *at, tz)?,
        FirstAnchor::Sunrise => sunrise,
        FirstAnchor::SunrisePlus30m => sunrise + Duration::minutes(30),
        FirstAnchor::SunrisePlus60m => sunrise + Duration::minutes(60),
    };
    Ok(truncate_to_second(at))
}

fn resolve_last(
    anchor: &LastAnchor,
    solar: &SolarTimes,
    date: NaiveDate,
    tz: Tz,
) -> Result<DateTime<Tz>> {
    let sunset = solar.sunset.with_timezone(&tz);
    let at = match anchor {
        LastAnchor::FixedTime { at } => local_wall_clock(date, *at, tz)?,
        LastAnchor::Sunset => sunset,
        LastAnchor::SunsetMinus30m => sunset - Duration::minutes(30),
        LastAnchor::SunsetMinus60m => sunset - Duration::minutes(60),
    };
    Ok(truncate_to_second(at))
}

/// A wall-clock time on `date` in `tz`. On a DST fold the earlier instant
/// wins; a time skipped by a DST gap does not exist and is rejected.
fn local_wall_clock(date: NaiveDate, at: chrono::NaiveTime, tz: Tz) -> Result<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_time(at))
        .earliest()
        .ok_or_else(|| {
            SchedulerError::InvalidWindow(format!("{at} does not exist on {date} in {tz}"))
        })
}

fn require_inside_window(noon: DateTime<Tz>, first: DateTime<Tz>, last: DateTime<Tz>) -> Result<()> {
    if first < noon && noon < last {
        Ok(())
    } else {
        Err(SchedulerError::InvalidWindow(format!(
            "solar noon {noon} is outside the capture window {first} .. {last}"
        )))
    }
}

fn require_room(start: DateTime<Tz>, end: DateTime<Tz>, n: usize) -> Result<()> {
    if n == 0 || (end - start).num_seconds() > n as i64 {
        Ok(())
    } else {
        Err(SchedulerError::InvalidWindow(format!(
            "{start} .. {end} is too short for {n} evenly spaced captures"
        )))
    }
}

/// The part of window validation that needs no solar data: with both
/// anchors at fixed wall-clock times, first must precede last and the
/// window must hold more seconds than there are additional captures.
pub fn check_fixed_window(camera: &CameraDefinition) -> Result<()> {
    let (FirstAnchor::FixedTime { at: first }, LastAnchor::FixedTime { at: last }) =
        (&camera.first, &camera.last)
    else {
        return Ok(());
    };
    if first >= last {
        return Err(SchedulerError::InvalidWindow(format!(
            "first capture {first} is not before last capture {last}"
        )));
    }
    let seconds = (*last - *first).num_seconds();
    if camera.additional > 0 && seconds <= i64::from(camera.additional) {
        return Err(SchedulerError::InvalidWindow(format!(
            "{first} .. {last} is too short for {} additional captures",
            camera.additional
        )));
    }
    Ok(())
}
