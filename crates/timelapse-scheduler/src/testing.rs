//! In-crate fakes for the collaborator traits.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tokio::time::Instant;

use crate::error::{CaptureError, ProviderError};
use crate::planner::DayPlanner;
use crate::provider::{Clock, ImageCapture, SolarTimesProvider, TimezoneResolver};
use crate::types::{CameraDefinition, FirstAnchor, LastAnchor, Location, SolarTimes};

pub fn camera() -> CameraDefinition {
    CameraDefinition {
        name: "Kohm Yah-man-yeh".to_string(),
        url: "https://www.nps.gov/webcams-lavo/kyvc_webcam1.jpg".to_string(),
        location: Location {
            latitude: 40.437787,
            longitude: -121.5360307,
        },
        first: FirstAnchor::Sunrise,
        last: LastAnchor::Sunset,
        additional: 1,
        folder_path: PathBuf::from("/srv/timelapse/lavo"),
    }
}

pub fn los_angeles_date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 5, day).unwrap()
}

fn utc(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 5, d, h, m, s).unwrap()
}

/// Lassen Volcanic, 2020-05-27: 05:39:41 / 13:03:28 / 20:27:15 PDT.
pub fn day_one() -> SolarTimes {
    SolarTimes {
        sunrise: utc(27, 12, 39, 41),
        solar_noon: utc(27, 20, 3, 28),
        sunset: utc(28, 3, 27, 15),
    }
}

/// Lassen Volcanic, 2020-05-28: 05:39:09 / 13:03:36 / 20:28:02 PDT.
pub fn day_two() -> SolarTimes {
    SolarTimes {
        sunrise: utc(28, 12, 39, 9),
        solar_noon: utc(28, 20, 3, 36),
        sunset: utc(29, 3, 28, 2),
    }
}

/// Knows May 27 and 28 2020; any other date is "unavailable".
#[derive(Default)]
pub struct FakeSolar {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl FakeSolar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` lookups before answering again.
    pub fn failing(n: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(n),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SolarTimesProvider for FakeSolar {
    fn name(&self) -> &str {
        "fake-solar"
    }

    async fn solar_times(
        &self,
        _location: Location,
        date: NaiveDate,
    ) -> Result<SolarTimes, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ProviderError::Unavailable("injected failure".to_string()));
        }
        if date == los_angeles_date(27) {
            Ok(day_one())
        } else if date == los_angeles_date(28) {
            Ok(day_two())
        } else {
            Err(ProviderError::Unavailable(format!("no data for {date}")))
        }
    }
}

pub struct FakeTimezone {
    zone: String,
    calls: AtomicUsize,
}

impl FakeTimezone {
    pub fn new(zone: &str) -> Self {
        Self {
            zone: zone.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TimezoneResolver for FakeTimezone {
    fn name(&self) -> &str {
        "fake-timezone"
    }

    async fn timezone(&self, _location: Location) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.zone.clone())
    }
}

pub fn planner() -> (DayPlanner, Arc<FakeSolar>, Arc<FakeTimezone>) {
    let solar = Arc::new(FakeSolar::new());
    let zone = Arc::new(FakeTimezone::new("America/Los_Angeles"));
    (DayPlanner::new(solar.clone(), zone.clone()), solar, zone)
}

/// Clock the test moves by hand.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Records every capture request and when it started; fails them while
/// `fail` is set.
#[derive(Default)]
pub struct RecordingCapture {
    pub fail: AtomicBool,
    destinations: Mutex<Vec<PathBuf>>,
    started: Mutex<Vec<Instant>>,
}

impl RecordingCapture {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn destinations(&self) -> Vec<PathBuf> {
        self.destinations.lock().unwrap().clone()
    }

    /// Tokio instants at which each attempt began.
    pub fn started(&self) -> Vec<Instant> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageCapture for RecordingCapture {
    async fn capture(&self, _url: &str, destination: &Path) -> Result<u64, CaptureError> {
        self.started.lock().unwrap().push(Instant::now());
        self.destinations
            .lock()
            .unwrap()
            .push(destination.to_path_buf());
        if self.fail.load(Ordering::SeqCst) {
            Err(CaptureError::Status { status: 503 })
        } else {
            Ok(1024)
        }
    }
}
