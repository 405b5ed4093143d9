use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use timelapse_core::config::CaptureConfig;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::{
    backoff::{Backoff, BACKOFF_INITIAL, BACKOFF_MAX},
    error::{Result, SchedulerError},
    planner::DayPlanner,
    provider::{Clock, ImageCapture},
    tracker::CameraSchedule,
    types::CameraDefinition,
};

/// Timing knobs of one driver loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    pub poll_interval: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl DriverSettings {
    fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_initial, self.backoff_max)
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            backoff_initial: BACKOFF_INITIAL,
            backoff_max: BACKOFF_MAX,
        }
    }
}

impl From<&CaptureConfig> for DriverSettings {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            backoff_initial: Duration::from_secs(config.backoff_initial_secs),
            backoff_max: Duration::from_secs(config.backoff_max_secs),
        }
    }
}

/// What a driver loop reports to whoever is watching it.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// A day's schedule is in place (start-up or rollover).
    Scheduled {
        camera: String,
        date: NaiveDate,
        timezone: String,
        capture_times: Vec<DateTime<Utc>>,
        next_capture: Option<DateTime<Utc>>,
    },
    Captured {
        camera: String,
        scheduled_for: DateTime<Utc>,
        path: PathBuf,
        bytes: u64,
        next_capture: Option<DateTime<Utc>>,
    },
    CaptureFailed {
        camera: String,
        scheduled_for: DateTime<Utc>,
        error: String,
        retry_in: Duration,
        next_capture: Option<DateTime<Utc>>,
    },
    Stopped {
        camera: String,
    },
}

impl DriverEvent {
    pub fn camera(&self) -> &str {
        match self {
            DriverEvent::Scheduled { camera, .. }
            | DriverEvent::Captured { camera, .. }
            | DriverEvent::CaptureFailed { camera, .. }
            | DriverEvent::Stopped { camera } => camera,
        }
    }
}

/// Polling loop for a single camera. Owns its [`CameraSchedule`] outright.
pub struct CameraDriver {
    camera: CameraDefinition,
    planner: DayPlanner,
    capture: Arc<dyn ImageCapture>,
    clock: Arc<dyn Clock>,
    settings: DriverSettings,
    /// If set, every state change is reported here (non-blocking).
    events: Option<mpsc::Sender<DriverEvent>>,
}

impl CameraDriver {
    pub fn new(
        camera: CameraDefinition,
        planner: DayPlanner,
        capture: Arc<dyn ImageCapture>,
        clock: Arc<dyn Clock>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            camera,
            planner,
            capture,
            clock,
            settings,
            events: None,
        }
    }

    pub fn with_events(mut self, events: mpsc::Sender<DriverEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Drive the camera until `shutdown` broadcasts `true`.
    ///
    /// Capture failures and provider outages are retried forever. Only a
    /// camera whose definition cannot produce a schedule ends with `Err`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(camera = %self.camera.name, url = %self.camera.url, "camera driver started");
        let result = self.drive(&mut shutdown).await;
        match &result {
            Ok(()) => info!(camera = %self.camera.name, "camera driver stopped"),
            Err(e) => error!(camera = %self.camera.name, error = %e, "camera driver aborted"),
        }
        self.emit(DriverEvent::Stopped {
            camera: self.camera.name.clone(),
        });
        result
    }

    async fn drive(&self, shutdown: &mut watch::Receiver<bool>) -> Result<()> {
        let mut planning = self.settings.backoff();
        let Some(mut schedule) = self.establish(&mut planning, shutdown).await? else {
            return Ok(());
        };

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            if schedule.is_exhausted() {
                // Only reachable after a failed rollover.
                if planning.is_pending() && sleep_or_shutdown(planning.current(), shutdown).await
                {
                    return Ok(());
                }
                if self.advance(&mut schedule, &mut planning).await? {
                    self.emit(self.scheduled(&schedule));
                }
            } else if schedule.is_due(self.clock.now())
                && !self.capture_due(&mut schedule, &mut planning, shutdown).await?
            {
                return Ok(());
            }

            if sleep_or_shutdown(self.settings.poll_interval, shutdown).await {
                return Ok(());
            }
        }
    }

    /// Plan today, retrying provider outages. `None` when shut down first.
    async fn establish(
        &self,
        planning: &mut Backoff,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<CameraSchedule>> {
        loop {
            if *shutdown.borrow() {
                return Ok(None);
            }
            let now = self.clock.now();
            match self.planner.plan_around(&self.camera, now).await {
                Ok(plan) => {
                    planning.on_success();
                    let mut schedule =
                        CameraSchedule::new(self.camera.clone(), plan, self.settings.backoff());
                    // Started after today's last capture: move on to tomorrow.
                    self.advance(&mut schedule, planning).await?;
                    info!(
                        camera = %self.camera.name,
                        date = %schedule.date(),
                        timezone = %schedule.timezone(),
                        captures = schedule.capture_times().len(),
                        next_index = schedule.next_index(),
                        "schedule established"
                    );
                    self.emit(self.scheduled(&schedule));
                    return Ok(Some(schedule));
                }
                Err(e) if e.is_transient() => {
                    let retry_in = planning.on_failure();
                    warn!(
                        camera = %self.camera.name,
                        error = %e,
                        retry_in_ms = retry_in.as_millis() as u64,
                        "initial planning failed"
                    );
                    if sleep_or_shutdown(retry_in, shutdown).await {
                        return Ok(None);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Take the due capture. Returns `false` when shutdown arrived during
    /// the backoff sleep and nothing was attempted.
    async fn capture_due(
        &self,
        schedule: &mut CameraSchedule,
        planning: &mut Backoff,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<bool> {
        let delay = schedule.backoff_delay();
        if !delay.is_zero() && sleep_or_shutdown(delay, shutdown).await {
            return Ok(false);
        }
        let Some(scheduled_for) = schedule.next_capture() else {
            return Err(SchedulerError::ScheduleInvariant(
                "due check passed on an exhausted schedule".to_string(),
            ));
        };
        let scheduled_for = scheduled_for.with_timezone(&Utc);

        let taken_at = self.clock.now().with_timezone(&schedule.timezone());
        let path = self.camera.capture_path(&taken_at);
        let outcome = self.capture.capture(&self.camera.url, &path).await;

        let event = match outcome {
            Ok(bytes) => {
                schedule.on_capture_success();
                info!(camera = %self.camera.name, path = %path.display(), bytes, "image captured");
                DriverEvent::Captured {
                    camera: self.camera.name.clone(),
                    scheduled_for,
                    path,
                    bytes,
                    next_capture: None,
                }
            }
            Err(e) => {
                let retry_in = schedule.on_capture_failure();
                warn!(
                    camera = %self.camera.name,
                    error = %e,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "capture failed"
                );
                DriverEvent::CaptureFailed {
                    camera: self.camera.name.clone(),
                    scheduled_for,
                    error: e.to_string(),
                    retry_in,
                    next_capture: None,
                }
            }
        };

        let rolled = self.advance(schedule, planning).await?;
        self.emit(with_next_capture(event, schedule));
        if rolled {
            self.emit(self.scheduled(schedule));
        }
        Ok(true)
    }

    /// Move past everything at or before now, rolling the day over when
    /// needed. Transient planning failures are absorbed into `planning`.
    async fn advance(&self, schedule: &mut CameraSchedule, planning: &mut Backoff) -> Result<bool> {
        match schedule.advance_to_next(self.clock.now(), &self.planner).await {
            Ok(rolled) => {
                if rolled {
                    planning.on_success();
                    info!(
                        camera = %self.camera.name,
                        date = %schedule.date(),
                        timezone = %schedule.timezone(),
                        captures = schedule.capture_times().len(),
                        "new day planned"
                    );
                }
                Ok(rolled)
            }
            Err(e) if e.is_transient() => {
                let retry_in = planning.on_failure();
                warn!(
                    camera = %self.camera.name,
                    error = %e,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "day rollover failed"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn scheduled(&self, schedule: &CameraSchedule) -> DriverEvent {
        DriverEvent::Scheduled {
            camera: self.camera.name.clone(),
            date: schedule.date(),
            timezone: schedule.timezone().name().to_string(),
            capture_times: schedule
                .capture_times()
                .iter()
                .map(|at| at.with_timezone(&Utc))
                .collect(),
            next_capture: schedule.next_capture().map(|at| at.with_timezone(&Utc)),
        }
    }

    fn emit(&self, event: DriverEvent) {
        if let Some(ref tx) = self.events {
            // try_send never stalls the loop; a slow consumer loses events.
            if tx.try_send(event).is_err() {
                warn!(camera = %self.camera.name, "driver event channel full or closed, event dropped");
            }
        }
    }
}

fn with_next_capture(mut event: DriverEvent, schedule: &CameraSchedule) -> DriverEvent {
    let next = schedule.next_capture().map(|at| at.with_timezone(&Utc));
    match &mut event {
        DriverEvent::Captured { next_capture, .. }
        | DriverEvent::CaptureFailed { next_capture, .. } => *next_capture = next,
        _ => {}
    }
    event
}

/// Sleep for `delay`. Returns `true` when shutdown was signalled instead;
/// a dropped sender counts as shutdown.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}
