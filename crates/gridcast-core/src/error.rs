//! Centralized error types for Gridcast.
//!
//! Engine components keep their own narrow error enums; anything that has to
//! cross into the binary or be shown on the widget is converted into
//! [`AppError`], which knows how to describe itself to a user.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a message suitable for the widget surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),
}

impl AppError {
    /// Returns a short, non-technical message for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Storage(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
            NetworkError::Timeout => "The request timed out. Please try again.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The forecast service is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { .. } => "The request failed. Please try again.",
            NetworkError::InvalidResponse(_) => {
                "Received an unexpected response. Please try again."
            }
        }
    }
}

/// Durable settings store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Stored value for {key} has the wrong type")]
    TypeMismatch { key: String },
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::Unavailable(_) => "Unable to access saved settings.",
            StorageError::QueryFailed(_) => "A settings operation failed. Please try again.",
            StorageError::TypeMismatch { .. } => {
                "Saved settings look damaged. Refresh to rebuild them."
            }
        }
    }
}

/// Weather engine errors as seen from the application.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Forecast API error: {0}")]
    ApiError(String),

    #[error("Invalid service key")]
    InvalidServiceKey,

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Work queue error: {0}")]
    Tracker(String),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::ApiError(_) => "Forecast service error. Please try again.",
            WeatherError::InvalidServiceKey => "Forecast service key is invalid. Check settings.",
            WeatherError::ServiceUnavailable => {
                "Forecast service unavailable. Please try again later."
            }
            WeatherError::Tracker(_) => "Background refresh could not be scheduled.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_decode() {
            NetworkError::InvalidResponse(self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_storage_error(self) -> StorageError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_storage_error(self) -> StorageError {
        match &self {
            rusqlite::Error::SqliteFailure(_, _) => StorageError::Unavailable(self.to_string()),
            _ => StorageError::QueryFailed(self.to_string()),
        }
    }
}
