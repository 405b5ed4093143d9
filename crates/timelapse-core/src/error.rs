use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimelapseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Camera already exists: {name}")]
    CameraExists { name: String },

    #[error("Camera not found: {name}")]
    CameraNotFound { name: String },

    #[error("Invalid camera definition: {0}")]
    InvalidCamera(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimelapseError {
    /// Short error code string returned to HTTP clients.
    pub fn code(&self) -> &'static str {
        match self {
            TimelapseError::Config(_) => "CONFIG_ERROR",
            TimelapseError::CameraExists { .. } => "CAMERA_EXISTS",
            TimelapseError::CameraNotFound { .. } => "CAMERA_NOT_FOUND",
            TimelapseError::InvalidCamera(_) => "INVALID_CAMERA",
            TimelapseError::Serialization(_) => "SERIALIZATION_ERROR",
            TimelapseError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, TimelapseError>;
