//! Remote license validation and activation.
//!
//! The transport never fails for an ordinary outcome. Each call returns a
//! tagged result that separates an explicit server rejection, which is
//! destructive for the local record, from an unreachable server, which is
//! not.

mod http;
pub mod mock;

pub use http::HttpTransport;

use crate::device::DeviceIdentity;
use crate::key::{ApiBase, LicenseKey};
use crate::record::parse_timestamp;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Path of the validation endpoint, relative to the API base.
pub const VALIDATE_PATH: &str = "/license/validate";
/// Path of the activation endpoint, relative to the API base.
pub const ACTIVATE_PATH: &str = "/license/activate";

/// Remote licensing API.
#[async_trait]
pub trait LicenseTransport: Send + Sync {
    /// Asks the server whether `key` is still valid for `device`.
    async fn validate(
        &self,
        api_base: &ApiBase,
        key: &LicenseKey,
        device: &DeviceIdentity,
    ) -> ValidateOutcome;

    /// Binds `key` to `device` on the server.
    async fn activate(
        &self,
        api_base: &ApiBase,
        key: &LicenseKey,
        device: &DeviceIdentity,
        device_name: &str,
    ) -> ActivateOutcome;
}

// ── Outcomes ─────────────────────────────────────────────────────

/// Result of a validation round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateOutcome {
    /// The key is valid for this device.
    Valid(LicenseGrant),
    /// The server explicitly refused the key.
    Rejected(Rejection),
    /// The server could not be reached or did not answer sensibly.
    Unreachable(String),
}

/// Result of an activation round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivateOutcome {
    /// The key is now bound to this device.
    Activated(ActivationGrant),
    /// The server explicitly refused the activation.
    Rejected(Rejection),
    /// The server could not be reached or did not answer sensibly.
    Unreachable(String),
}

/// License details confirmed by a successful validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseGrant {
    pub dealer_id: Option<String>,
    pub dealer_name: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// License details returned by a successful activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationGrant {
    pub dealer_id: Option<String>,
    pub dealer_name: Option<String>,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// An explicit refusal from the licensing server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: RejectionCode,
    pub message: String,
}

impl Rejection {
    /// Builds a rejection from the wire `error` code and `message`.
    #[must_use]
    pub fn from_wire(error: Option<&str>, message: Option<String>) -> Self {
        let code = RejectionCode::from_wire(error);
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| code.description().to_string());
        Self { code, message }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code.to_wire())
    }
}

/// Machine-readable rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RejectionCode {
    /// `LICENSE_NOT_FOUND`
    NotFound,
    /// `LICENSE_DEACTIVATED`
    Deactivated,
    /// `LICENSE_EXPIRED`
    Expired,
    /// `MAC_MISMATCH`: the key is bound to another device.
    DeviceMismatch,
    /// `MAX_ACTIVATIONS_REACHED`: the key's device quota is used up.
    MaxActivations,
    /// A client-error HTTP status without a readable body.
    Http(u16),
    /// Any other code the server sent.
    Other(String),
    /// The server sent no code.
    Unspecified,
}

impl RejectionCode {
    /// Parses a wire code.
    #[must_use]
    pub fn from_wire(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            None | Some("") => Self::Unspecified,
            Some("LICENSE_NOT_FOUND") => Self::NotFound,
            Some("LICENSE_DEACTIVATED") => Self::Deactivated,
            Some("LICENSE_EXPIRED") => Self::Expired,
            Some("MAC_MISMATCH") => Self::DeviceMismatch,
            Some("MAX_ACTIVATIONS_REACHED") => Self::MaxActivations,
            Some(other) => match other.strip_prefix("HTTP_").and_then(|s| s.parse().ok()) {
                Some(status) => Self::Http(status),
                None => Self::Other(other.to_string()),
            },
        }
    }

    /// Returns the wire code.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::NotFound => "LICENSE_NOT_FOUND".to_string(),
            Self::Deactivated => "LICENSE_DEACTIVATED".to_string(),
            Self::Expired => "LICENSE_EXPIRED".to_string(),
            Self::DeviceMismatch => "MAC_MISMATCH".to_string(),
            Self::MaxActivations => "MAX_ACTIVATIONS_REACHED".to_string(),
            Self::Http(status) => format!("HTTP_{status}"),
            Self::Other(code) => code.clone(),
            Self::Unspecified => "UNSPECIFIED".to_string(),
        }
    }

    /// Fallback message when the server sent none.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "license key not found",
            Self::Deactivated => "license has been deactivated",
            Self::Expired => "license has expired",
            Self::DeviceMismatch => "license is registered to another device",
            Self::MaxActivations => "maximum number of activations reached",
            Self::Http(_) => "licensing server refused the request",
            Self::Other(_) | Self::Unspecified => "license rejected by server",
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────

/// `POST /license/validate` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub license_key: String,
    /// Device identity token; named for compatibility.
    pub mac_address: String,
}

/// `POST /license/validate` response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default)]
    pub dealer_id: Option<String>,
    #[serde(default)]
    pub dealer_name: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ValidateResponse {
    /// Converts the loosely typed body into a tagged outcome.
    #[must_use]
    pub fn into_outcome(self) -> ValidateOutcome {
        if self.valid {
            ValidateOutcome::Valid(LicenseGrant {
                dealer_id: self.dealer_id,
                dealer_name: self.dealer_name,
                expires_at: parse_expiry(self.expires_at.as_deref()),
            })
        } else {
            ValidateOutcome::Rejected(Rejection::from_wire(self.error.as_deref(), self.message))
        }
    }
}

/// `POST /license/activate` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateRequest {
    pub license_key: String,
    /// Device identity token; named for compatibility.
    pub mac_address: String,
    #[serde(default)]
    pub device_name: Option<String>,
}

/// `POST /license/activate` response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivateResponse {
    pub success: bool,
    #[serde(default)]
    pub dealer_id: Option<String>,
    #[serde(default)]
    pub dealer_name: Option<String>,
    #[serde(default)]
    pub activated_at: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ActivateResponse {
    /// Converts the loosely typed body into a tagged outcome.
    #[must_use]
    pub fn into_outcome(self) -> ActivateOutcome {
        if self.success {
            ActivateOutcome::Activated(ActivationGrant {
                dealer_id: self.dealer_id,
                dealer_name: self.dealer_name,
                activated_at: self.activated_at.as_deref().and_then(parse_timestamp),
                expires_at: parse_expiry(self.expires_at.as_deref()),
            })
        } else {
            ActivateOutcome::Rejected(Rejection::from_wire(self.error.as_deref(), self.message))
        }
    }
}

fn parse_expiry(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|s| !s.trim().is_empty())?;
    let parsed = parse_timestamp(raw);
    if parsed.is_none() {
        warn!("Ignoring unparseable expiry timestamp {:?}", raw);
    }
    parsed
}

// ── HTTP classification ──────────────────────────────────────────

/// How an HTTP exchange should be interpreted.
#[derive(Debug)]
pub(crate) enum Exchange<T> {
    /// A readable response body, whatever the status.
    Reply(T),
    /// A client error without a readable body.
    Refused(u16),
    /// The server is down, overloaded, or answered with garbage.
    Unreachable(String),
}

/// Classifies a completed exchange by status code and body.
///
/// 5xx, 408 and 429 count as unreachable even with a body, so server-side
/// trouble is never mistaken for a rejection of the key.
pub(crate) fn classify<T: serde::de::DeserializeOwned>(status: u16, body: &str) -> Exchange<T> {
    if status >= 500 || status == 408 || status == 429 {
        return Exchange::Unreachable(format!("licensing server returned HTTP {status}"));
    }
    match serde_json::from_str::<T>(body) {
        Ok(parsed) => Exchange::Reply(parsed),
        Err(_) if (200..300).contains(&status) => Exchange::Unreachable(format!(
            "licensing server sent an unreadable response (HTTP {status})"
        )),
        Err(_) if status >= 400 => Exchange::Refused(status),
        Err(_) => Exchange::Unreachable(format!("unexpected HTTP status {status}")),
    }
}
