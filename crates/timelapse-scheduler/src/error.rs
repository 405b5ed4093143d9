use thiserror::Error;

/// Failure reported by a remote lookup (solar times or timezone).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection refused, DNS failure, timeout.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with a non-success status.
    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Still answering "too many requests" after every retry.
    #[error("Provider rate limit exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// The response body could not be understood.
    #[error("Malformed provider response: {0}")]
    Parse(String),
}

/// Failure to download or store one webcam image.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Image request failed: {0}")]
    Request(String),

    #[error("Webcam returned HTTP {status}")]
    Status { status: u16 },

    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while planning or tracking a camera's schedule.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Zero or several anchor options selected, or a fixed time without a time.
    #[error("Invalid {anchor} anchor selection: {reason}")]
    InvalidAnchorSelection { anchor: &'static str, reason: String },

    /// The anchors for a day cannot produce a strictly ascending schedule.
    #[error("Invalid capture window: {0}")]
    InvalidWindow(String),

    #[error("Solar times unavailable: {0}")]
    SolarProvider(#[source] ProviderError),

    #[error("Timezone unavailable: {0}")]
    TimezoneProvider(#[source] ProviderError),

    /// A computed schedule broke its own ordering guarantee. Never expected.
    #[error("Schedule invariant violated: {0}")]
    ScheduleInvariant(String),
}

impl SchedulerError {
    /// True for failures of remote dependencies that a later poll cycle may
    /// recover from. Everything else is a configuration or logic fault.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedulerError::SolarProvider(_) | SchedulerError::TimezoneProvider(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
