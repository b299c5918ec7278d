//! Error types for the licensing module.

use thiserror::Error;

/// Licensing-specific errors.
///
/// Server rejections and unreachable servers are not errors: the transport
/// reports them as outcomes. These variants cover bad user input and
/// failures of the local machinery.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// The license key is empty or malformed.
    #[error("invalid license key: {0}")]
    InvalidKey(String),

    /// The licensing API base URL is empty or malformed.
    #[error("invalid API base URL: {0}")]
    InvalidApiBase(String),

    /// No license has been activated on this device.
    #[error("license not activated")]
    NotActivated,

    /// A newer operation started before this one finished.
    #[error("operation superseded by a newer request")]
    Superseded,

    /// HTTP client could not be constructed.
    #[error("network error: {0}")]
    Network(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LicenseError {
    /// Returns true if the error stems from user input and was raised before
    /// any network or storage access.
    #[must_use]
    pub fn is_user_input(&self) -> bool {
        matches!(self, Self::InvalidKey(_) | Self::InvalidApiBase(_))
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
