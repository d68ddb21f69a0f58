use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Environment variable consulted for the forecast service key
pub const SERVICE_KEY_ENV: &str = "GRIDCAST_SERVICE_KEY";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Forecast service settings
    #[serde(default)]
    pub forecast: ForecastConfig,

    /// Refresh gating settings
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Position and place-name settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Durable state settings
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Ultra-short-term forecast endpoint
    #[serde(default = "default_forecast_url")]
    pub base_url: String,

    /// Service key issued by the data portal (can be set via environment)
    #[serde(default = "default_service_key")]
    pub service_key: Option<String>,

    /// Result-count cap sent as `numOfRows`
    #[serde(default = "default_num_of_rows")]
    pub num_of_rows: u32,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Offset of the provider's local clock from UTC, in hours
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

fn default_forecast_url() -> String {
    "https://apis.data.go.kr/1360000/VilageFcstInfoService_2.0/getUltraSrtFcst".to_string()
}

fn default_service_key() -> Option<String> {
    std::env::var(SERVICE_KEY_ENV).ok().filter(|k| !k.is_empty())
}

fn default_num_of_rows() -> u32 {
    100
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_utc_offset_hours() -> i32 {
    9
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            base_url: default_forecast_url(),
            service_key: default_service_key(),
            num_of_rows: default_num_of_rows(),
            timeout_secs: default_timeout_secs(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Minimum minutes between two accepted periodic cycles
    #[serde(default = "default_min_interval_minutes")]
    pub min_interval_minutes: u32,

    /// How often the periodic entry point is evaluated, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Upper bound on a work-tracker query before failing open
    #[serde(default = "default_tracker_timeout_secs")]
    pub tracker_timeout_secs: u64,

    /// Report a failed fetch as retryable instead of succeeding with placeholders
    #[serde(default)]
    pub retry_on_fetch_error: bool,
}

fn default_min_interval_minutes() -> u32 {
    30
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_tracker_timeout_secs() -> u64 {
    5
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            min_interval_minutes: default_min_interval_minutes(),
            poll_interval_secs: default_poll_interval_secs(),
            tracker_timeout_secs: default_tracker_timeout_secs(),
            retry_on_fetch_error: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Fixed latitude reported as the last known position
    pub latitude: Option<f64>,

    /// Fixed longitude reported as the last known position
    pub longitude: Option<f64>,

    /// Reverse geocoding endpoint (Nominatim compatible)
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,

    /// Grid column used before any location has been resolved
    #[serde(default = "default_fallback_nx")]
    pub fallback_nx: i32,

    /// Grid row used before any location has been resolved
    #[serde(default = "default_fallback_ny")]
    pub fallback_ny: i32,
}

fn default_geocoder_url() -> String {
    "https://nominatim.openstreetmap.org/reverse".to_string()
}

fn default_fallback_nx() -> i32 {
    62
}

fn default_fallback_ny() -> i32 {
    125
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            geocoder_url: default_geocoder_url(),
            fallback_nx: default_fallback_nx(),
            fallback_ny: default_fallback_ny(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file (relative paths resolve against the config directory)
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
}

fn default_database_file() -> PathBuf {
    PathBuf::from("state.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gridcast");

        Self {
            config_dir,
            forecast: ForecastConfig::default(),
            refresh: RefreshConfig::default(),
            location: LocationConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file, creating a default one if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let mut config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        // An empty key in the file should not mask the environment
        if config.forecast.service_key.as_deref().map_or(true, str::is_empty) {
            config.forecast.service_key = default_service_key();
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns an error if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        Self::load_validated_from(&Self::config_path()?)
    }

    /// [`Config::load_validated`] for an explicit file
    pub fn load_validated_from(config_path: &Path) -> Result<(Self, ValidationResult)> {
        let config = Self::load_from(config_path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_url(&self.forecast.base_url, "forecast.base_url", &mut result);
        Self::validate_url(
            &self.location.geocoder_url,
            "location.geocoder_url",
            &mut result,
        );

        if self.forecast.service_key.is_none() {
            result.add_warning(
                "forecast.service_key",
                format!(
                    "No service key configured (set {}); forecast requests will be rejected",
                    SERVICE_KEY_ENV
                ),
            );
        }

        if self.forecast.num_of_rows == 0 {
            result.add_error("forecast.num_of_rows", "numOfRows must be greater than 0");
        }

        if self.forecast.timeout_secs == 0 {
            result.add_error("forecast.timeout_secs", "Timeout must be greater than 0");
        }

        if !(-12..=14).contains(&self.forecast.utc_offset_hours) {
            result.add_error(
                "forecast.utc_offset_hours",
                "UTC offset must be between -12 and 14 hours",
            );
        }

        if self.refresh.min_interval_minutes == 0 {
            result.add_warning(
                "refresh.min_interval_minutes",
                "Refresh throttling disabled (0 minutes)",
            );
        } else if self.refresh.min_interval_minutes > 1440 {
            result.add_warning(
                "refresh.min_interval_minutes",
                "Refresh interval is more than 24 hours",
            );
        }

        if self.refresh.poll_interval_secs == 0 {
            result.add_error(
                "refresh.poll_interval_secs",
                "Poll interval must be greater than 0",
            );
        }

        if self.refresh.tracker_timeout_secs == 0 {
            result.add_warning(
                "refresh.tracker_timeout_secs",
                "Tracker timeout of 0 seconds makes every query fail open",
            );
        }

        match (self.location.latitude, self.location.longitude) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) {
                    result.add_error("location.latitude", "Latitude must be within [-90, 90]");
                }
                if !(-180.0..=180.0).contains(&lon) {
                    result.add_error(
                        "location.longitude",
                        "Longitude must be within [-180, 180]",
                    );
                }
            }
            (None, None) => {
                result.add_warning(
                    "location",
                    "No position configured - the fallback grid will be used",
                );
            }
            _ => {
                result.add_error(
                    "location",
                    "Latitude and longitude must be configured together",
                );
            }
        }

        result
    }

    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Absolute path of the durable state database
    pub fn database_path(&self) -> PathBuf {
        if self.storage.database_file.is_absolute() {
            self.storage.database_file.clone()
        } else {
            self.config_dir.join(&self.storage.database_file)
        }
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        // Keys read from the environment stay out of the file
        let mut persisted = self.clone();
        if persisted.forecast.service_key == default_service_key() {
            persisted.forecast.service_key = None;
        }

        let contents = toml::to_string_pretty(&persisted).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("gridcast");

        Ok(config_dir.join("config.toml"))
    }
}
