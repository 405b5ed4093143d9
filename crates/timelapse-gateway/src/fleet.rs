//! One driver task per camera, plus the live status fed by their events.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::Serialize;
use timelapse_scheduler::{
    CameraDefinition, CameraDriver, Clock, DayPlanner, DriverEvent, DriverSettings, ImageCapture,
};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Lifecycle of a camera's driver task as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Starting,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastCapture {
    pub scheduled_for: DateTime<Utc>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Live view of one camera, updated from its [`DriverEvent`]s.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraStatus {
    pub state: DriverState,
    pub date: Option<NaiveDate>,
    pub timezone: Option<String>,
    pub capture_times: Vec<DateTime<Utc>>,
    pub next_capture: Option<DateTime<Utc>>,
    pub last_capture: Option<LastCapture>,
    pub retry_in_ms: u64,
}

impl Default for CameraStatus {
    fn default() -> Self {
        Self {
            state: DriverState::Starting,
            date: None,
            timezone: None,
            capture_times: Vec::new(),
            next_capture: None,
            last_capture: None,
            retry_in_ms: 0,
        }
    }
}

impl CameraStatus {
    pub fn apply(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Scheduled {
                date,
                timezone,
                capture_times,
                next_capture,
                ..
            } => {
                self.state = DriverState::Running;
                self.date = Some(date);
                self.timezone = Some(timezone);
                self.capture_times = capture_times;
                self.next_capture = next_capture;
            }
            DriverEvent::Captured {
                scheduled_for,
                path,
                bytes,
                next_capture,
                ..
            } => {
                self.next_capture = next_capture;
                self.retry_in_ms = 0;
                self.last_capture = Some(LastCapture {
                    scheduled_for,
                    ok: true,
                    path: Some(path),
                    bytes: Some(bytes),
                    error: None,
                });
            }
            DriverEvent::CaptureFailed {
                scheduled_for,
                error,
                retry_in,
                next_capture,
                ..
            } => {
                self.next_capture = next_capture;
                self.retry_in_ms = retry_in.as_millis() as u64;
                self.last_capture = Some(LastCapture {
                    scheduled_for,
                    ok: false,
                    path: None,
                    bytes: None,
                    error: Some(error),
                });
            }
            DriverEvent::Stopped { .. } => {
                self.state = DriverState::Stopped;
                self.next_capture = None;
            }
        }
    }
}

/// Shared collaborators plus the set of running driver tasks.
pub struct Fleet {
    planner: DayPlanner,
    capture: Arc<dyn ImageCapture>,
    clock: Arc<dyn Clock>,
    settings: DriverSettings,
    events: mpsc::Sender<DriverEvent>,
    shutdown: watch::Receiver<bool>,
    status: Arc<DashMap<String, CameraStatus>>,
    tasks: Mutex<JoinSet<()>>,
}

impl Fleet {
    /// Build the fleet and spawn the task folding driver events into
    /// `status`.
    pub fn new(
        planner: DayPlanner,
        capture: Arc<dyn ImageCapture>,
        clock: Arc<dyn Clock>,
        settings: DriverSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let status = Arc::new(DashMap::new());
        let (events, rx) = mpsc::channel(256);
        tokio::spawn(track_events(rx, Arc::clone(&status)));
        Self {
            planner,
            capture,
            clock,
            settings,
            events,
            shutdown,
            status,
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn status(&self, name: &str) -> Option<CameraStatus> {
        self.status.get(name).map(|entry| entry.value().clone())
    }

    /// Start a driver for `camera`. Its status reads `starting` until the
    /// first day is planned.
    pub async fn launch(&self, camera: CameraDefinition) {
        let name = camera.name.clone();
        self.status.insert(name.clone(), CameraStatus::default());

        let driver = CameraDriver::new(
            camera,
            self.planner.clone(),
            Arc::clone(&self.capture),
            Arc::clone(&self.clock),
            self.settings,
        )
        .with_events(self.events.clone());
        let shutdown = self.shutdown.clone();

        self.tasks.lock().await.spawn(async move {
            // The driver already logged why it stopped.
            let _ = driver.run(shutdown).await;
        });
        info!(camera = %name, "driver launched");
    }

    /// Wait for every driver task to finish. Call after shutdown is signalled.
    pub async fn join_all(&self) {
        let mut tasks = self.tasks.lock().await;
        let total = tasks.len();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "driver task panicked or was cancelled");
            }
        }
        info!(drivers = total, "all camera drivers stopped");
    }
}

async fn track_events(
    mut rx: mpsc::Receiver<DriverEvent>,
    status: Arc<DashMap<String, CameraStatus>>,
) {
    while let Some(event) = rx.recv().await {
        let name = event.camera().to_string();
        status.entry(name).or_default().apply(event);
    }
}
