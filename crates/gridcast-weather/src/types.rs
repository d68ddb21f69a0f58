//! Domain types shared across the engine: positions, grid cells, forecasts and views.

use gridcast_core::error::ReqwestErrorExt;
use gridcast_core::{AppError, WeatherError};
use serde::{Deserialize, Serialize};

/// Placeholder shown when reverse geocoding yields nothing usable
pub const UNKNOWN_PLACE: &str = "unknown location";
/// Placeholder shown when no location has ever been resolved
pub const NO_LOCATION: &str = "no location";
/// Sky placeholder when no matching observation exists
pub const SKY_PLACEHOLDER: &str = "--";
/// Temperature placeholder when no matching observation exists
pub const TEMPERATURE_PLACEHOLDER: &str = "--°C";
/// Sky text shown while a cycle is pending
pub const LOADING: &str = "loading...";

/// Geographic position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeodeticPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Cell of the forecast provider's fixed grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub nx: i32,
    pub ny: i32,
}

impl GridCell {
    pub fn new(nx: i32, ny: i32) -> Self {
        Self { nx, ny }
    }
}

impl std::fmt::Display for GridCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.nx, self.ny)
    }
}

/// The persisted "known location"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub grid: GridCell,
    pub place_name: String,
}

/// Forecast categories of the ultra-short-term product
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ForecastCategory {
    /// T1H, air temperature in °C
    Temperature,
    /// RN1, one-hour precipitation
    Precipitation,
    /// SKY, sky condition code
    SkyCondition,
    /// UUU
    EastWind,
    /// VVV
    NorthWind,
    /// REH, relative humidity in %
    Humidity,
    /// PTY, precipitation type code
    PrecipitationType,
    /// LGT
    Lightning,
    /// VEC, wind direction in degrees
    WindDirection,
    /// WSD, wind speed in m/s
    WindSpeed,
    Other(String),
}

impl ForecastCategory {
    /// Map a provider category code to a category
    pub fn from_code(code: &str) -> Self {
        match code {
            "T1H" => Self::Temperature,
            "RN1" => Self::Precipitation,
            "SKY" => Self::SkyCondition,
            "UUU" => Self::EastWind,
            "VVV" => Self::NorthWind,
            "REH" => Self::Humidity,
            "PTY" => Self::PrecipitationType,
            "LGT" => Self::Lightning,
            "VEC" => Self::WindDirection,
            "WSD" => Self::WindSpeed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Provider category code
    pub fn code(&self) -> &str {
        match self {
            Self::Temperature => "T1H",
            Self::Precipitation => "RN1",
            Self::SkyCondition => "SKY",
            Self::EastWind => "UUU",
            Self::NorthWind => "VVV",
            Self::Humidity => "REH",
            Self::PrecipitationType => "PTY",
            Self::Lightning => "LGT",
            Self::WindDirection => "VEC",
            Self::WindSpeed => "WSD",
            Self::Other(code) => code,
        }
    }
}

/// One forecast line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastObservation {
    pub category: ForecastCategory,
    /// Forecast hour as "HHMM"
    pub time_bucket: String,
    pub value: String,
}

/// Display-ready outcome of a refresh cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub sky_condition: String,
    pub temperature_c: String,
}

impl Default for ForecastResult {
    fn default() -> Self {
        Self {
            sky_condition: SKY_PLACEHOLDER.to_string(),
            temperature_c: TEMPERATURE_PLACEHOLDER.to_string(),
        }
    }
}

/// Everything the rendering surface needs for one update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetView {
    pub sky_condition: String,
    pub temperature: String,
    pub place_name: String,
}

impl WidgetView {
    pub fn new(result: ForecastResult, place_name: impl Into<String>) -> Self {
        Self {
            sky_condition: result.sky_condition,
            temperature: result.temperature_c,
            place_name: place_name.into(),
        }
    }

    /// View shown while a refresh is pending
    pub fn loading(place_name: impl Into<String>) -> Self {
        Self {
            sky_condition: LOADING.to_string(),
            temperature: TEMPERATURE_PLACEHOLDER.to_string(),
            place_name: place_name.into(),
        }
    }
}

/// Forecast retrieval errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Forecast service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Forecast service error {code}: {message}")]
    Service { code: String, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No service key configured")]
    MissingServiceKey,
}

/// Reverse geocoding errors
#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("Geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Geocoder returned status {0}")]
    Status(u16),
    #[error("No address found for coordinates")]
    NoMatch,
}

/// Work-tracking collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Work tracker query timed out")]
    Timeout,
    #[error("Work tracker unavailable: {0}")]
    Unavailable(String),
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Network(e) => AppError::Network(e.into_network_error()),
            FetchError::Status { status, .. } if status == 401 || status == 403 => {
                AppError::Weather(WeatherError::InvalidServiceKey)
            }
            FetchError::Status { status, .. } if status >= 500 => {
                AppError::Weather(WeatherError::ServiceUnavailable)
            }
            FetchError::MissingServiceKey => AppError::Weather(WeatherError::InvalidServiceKey),
            other => AppError::Weather(WeatherError::ApiError(other.to_string())),
        }
    }
}

impl From<TrackerError> for AppError {
    fn from(e: TrackerError) -> Self {
        AppError::Weather(WeatherError::Tracker(e.to_string()))
    }
}
