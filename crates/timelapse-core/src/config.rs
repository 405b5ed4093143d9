use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 1;
pub const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BACKOFF_INITIAL_SECS: u64 = 5;
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 600; // 10 minutes
pub const DEFAULT_SOLAR_BASE_URL: &str = "https://api.sunrise-sunset.org";
pub const DEFAULT_TIMEZONE_BASE_URL: &str = "http://api.timezonedb.com";
pub const TIMEZONE_MIN_INTERVAL_MS: u64 = 1_000; // remote limit: 1 request per second

/// Top-level config (timelapse.toml + TIMELAPSE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelapseConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub solar: SolarConfig,
    #[serde(default)]
    pub timezone: TimezoneConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

/// Where camera definitions are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Driver loop cadence and capture retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Seconds between due-checks in every camera loop.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// HTTP timeout for a single image download.
    #[serde(default = "default_capture_timeout_secs")]
    pub timeout_secs: u64,
    /// First retry delay after a failure; doubled on each further failure.
    #[serde(default = "default_backoff_initial_secs")]
    pub backoff_initial_secs: u64,
    /// Ceiling for the retry delay.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            timeout_secs: DEFAULT_CAPTURE_TIMEOUT_SECS,
            backoff_initial_secs: DEFAULT_BACKOFF_INITIAL_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

/// sunrise-sunset.org endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarConfig {
    #[serde(default = "default_solar_base_url")]
    pub base_url: String,
    #[serde(default = "default_capture_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SolarConfig {
    fn default() -> Self {
        Self {
            base_url: default_solar_base_url(),
            timeout_secs: DEFAULT_CAPTURE_TIMEOUT_SECS,
        }
    }
}

/// Timezone lookup: either a fixed IANA zone or the TimeZoneDB API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimezoneConfig {
    #[serde(default = "default_timezone_base_url")]
    pub base_url: String,
    /// TimeZoneDB API key. Required unless `fixed_zone` is set.
    pub api_key: Option<String>,
    /// When set, every camera uses this zone and no remote lookup is made.
    pub fixed_zone: Option<String>,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// Fixed wait after an HTTP 429 before retrying.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_capture_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            base_url: default_timezone_base_url(),
            api_key: None,
            fixed_zone: None,
            min_interval_ms: TIMEZONE_MIN_INTERVAL_MS,
            retry_delay_ms: default_retry_delay_ms(),
            max_attempts: default_max_attempts(),
            timeout_secs: DEFAULT_CAPTURE_TIMEOUT_SECS,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_store_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.timelapse/cameras.json", home)
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_capture_timeout_secs() -> u64 {
    DEFAULT_CAPTURE_TIMEOUT_SECS
}
fn default_backoff_initial_secs() -> u64 {
    DEFAULT_BACKOFF_INITIAL_SECS
}
fn default_backoff_max_secs() -> u64 {
    DEFAULT_BACKOFF_MAX_SECS
}
fn default_solar_base_url() -> String {
    DEFAULT_SOLAR_BASE_URL.to_string()
}
fn default_timezone_base_url() -> String {
    DEFAULT_TIMEZONE_BASE_URL.to_string()
}
fn default_min_interval_ms() -> u64 {
    TIMEZONE_MIN_INTERVAL_MS
}
fn default_retry_delay_ms() -> u64 {
    2_000
}
fn default_max_attempts() -> u32 {
    5
}

impl TimelapseConfig {
    /// Load config from a TOML file with TIMELAPSE_* env var overrides.
    ///
    /// Nested keys use a double underscore, e.g. `TIMELAPSE_TIMEZONE__API_KEY`.
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TimelapseConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TIMELAPSE_").split("__"))
            .extract()
            .map_err(|e| crate::error::TimelapseError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Reject settings no camera loop could run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let tz = &self.timezone;
        let has_zone = tz.fixed_zone.as_deref().is_some_and(|z| !z.trim().is_empty());
        let has_key = tz.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        if !has_zone && !has_key {
            return Err(crate::error::TimelapseError::Config(
                "set timezone.api_key (TimeZoneDB) or timezone.fixed_zone".to_string(),
            ));
        }
        if self.capture.poll_interval_secs == 0 {
            return Err(crate::error::TimelapseError::Config(
                "capture.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.capture.backoff_initial_secs == 0
            || self.capture.backoff_initial_secs > self.capture.backoff_max_secs
        {
            return Err(crate::error::TimelapseError::Config(
                "capture.backoff_initial_secs must be in 1..=backoff_max_secs".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.timelapse/timelapse.toml", home)
}
