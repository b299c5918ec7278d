//! License key and API base parsing.
//!
//! Keys are opaque to the client (the server owns their format, e.g.
//! `NEXUS-AAAA-BBBB-CCCC`). Parsing only trims, uppercases, and rejects input
//! that can never be a key, so bad input fails before any network call.

use crate::error::{LicenseError, LicenseResult};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-supplied license key, normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Parses and normalizes a license key.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidKey`] if the key is empty after trimming
    /// or contains whitespace or control characters.
    pub fn parse(raw: &str) -> LicenseResult<Self> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(LicenseError::InvalidKey("license key is empty".to_string()));
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(LicenseError::InvalidKey(
                "license key must not contain whitespace".to_string(),
            ));
        }
        Ok(Self(key.to_uppercase()))
    }

    /// Returns the normalized key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the key with everything but the last dash-separated group
    /// hidden, for logs and status output.
    #[must_use]
    pub fn masked(&self) -> String {
        match self.0.rsplit_once('-') {
            Some((head, tail)) => {
                let hidden: String = head
                    .chars()
                    .map(|c| if c == '-' { '-' } else { '*' })
                    .collect();
                format!("{hidden}-{tail}")
            }
            None => {
                let visible = self.0.chars().count().saturating_sub(4);
                let tail: String = self.0.chars().skip(visible).collect();
                format!("{}{tail}", "*".repeat(visible))
            }
        }
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base URL of the licensing API, without a trailing slash.
///
/// Endpoint paths are appended directly, so a server mounted under `/api`
/// is addressed as `https://host/api`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiBase(String);

impl ApiBase {
    /// Parses an http(s) base URL.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidApiBase`] for empty input, unparseable
    /// URLs, or schemes other than http and https.
    pub fn parse(raw: &str) -> LicenseResult<Self> {
        let trimmed = raw.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(LicenseError::InvalidApiBase("API base URL is empty".to_string()));
        }
        let url = Url::parse(trimmed)
            .map_err(|e| LicenseError::InvalidApiBase(format!("{trimmed}: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(Self(trimmed.to_string())),
            other => Err(LicenseError::InvalidApiBase(format!(
                "unsupported scheme `{other}`"
            ))),
        }
    }

    /// Returns the base URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Joins an endpoint path (e.g. `/license/validate`) onto the base.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for ApiBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
