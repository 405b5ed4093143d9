//! `timelapse-scheduler` — daily capture planning and per-camera driver loops.
//!
//! # Overview
//!
//! For every camera a [`planner::DayPlanner`] resolves the webcam's timezone
//! and the day's sun events, and [`schedule::compute_daily_schedule`] turns
//! them into a strictly ascending list of capture instants. A
//! [`tracker::CameraSchedule`] follows which entry is next and rolls over to
//! the following day once the list is used up. [`engine::CameraDriver`] polls
//! the tracker, takes captures through an [`provider::ImageCapture`] and
//! backs off on failure.
//!
//! # Capture layout
//!
//! | Additional | Interior points                                    |
//! |------------|----------------------------------------------------|
//! | 0          | none                                               |
//! | 1          | solar noon                                         |
//! | even N     | N points evenly between first and last             |
//! | odd N      | (N-1)/2 before noon, noon, (N-1)/2 after noon      |

pub mod backoff;
pub mod engine;
pub mod error;
pub mod planner;
pub mod provider;
pub mod schedule;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod testing;

pub use engine::{CameraDriver, DriverEvent, DriverSettings};
pub use error::{CaptureError, ProviderError, Result, SchedulerError};
pub use planner::{DayPlan, DayPlanner};
pub use provider::{Clock, ImageCapture, SolarTimesProvider, SystemClock, TimezoneResolver};
pub use tracker::CameraSchedule;
pub use types::{CameraDefinition, FirstAnchor, LastAnchor, Location, SolarTimes};
