//! Error types for metadata access

use thiserror::Error;

/// Result type alias for metadata operations
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Errors that can occur while loading or querying metadata
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Metadata could not be loaded at all
    #[error("metadata unavailable: {0}")]
    Unavailable(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Remote returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// A metadata file is not valid JSON of the expected shape
    #[error("failed to parse {file}: {source}")]
    ParseError {
        file: String,
        source: serde_json::Error,
    },

    /// No record exists for the sensor
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),

    /// The sensor's record exists but is inconsistent
    #[error("malformed record for sensor {sensor_id}: {reason}")]
    MalformedRecord { sensor_id: String, reason: String },
}

impl MetadataError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error concerns a single sensor record only
    ///
    /// Such errors skip one sensor; every other error aborts queue generation.
    pub fn is_record_error(&self) -> bool {
        matches!(self, Self::UnknownSensor(_) | Self::MalformedRecord { .. })
    }
}
