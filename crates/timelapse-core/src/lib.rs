//! `timelapse-core` — configuration and shared error types.

pub mod config;
pub mod error;

pub use config::TimelapseConfig;
pub use error::{Result, TimelapseError};
