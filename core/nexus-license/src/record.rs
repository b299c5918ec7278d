//! The locally persisted license record and the derived license status.

use crate::device::DeviceIdentity;
use crate::key::{ApiBase, LicenseKey};
use crate::transport::LicenseGrant;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds in one day.
pub const SECS_PER_DAY: i64 = 24 * 60 * 60;

const MILLIS_PER_DAY: i64 = SECS_PER_DAY * 1000;

/// The current status of the license on this device.
///
/// Derived from record presence, local expiry and the latest check result.
/// Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    /// No license record on this device.
    Unlicensed,
    /// A network operation is in flight.
    Checking,
    /// Record present, last check did not reject it, not locally expired.
    Licensed,
    /// Record present and past its expiry.
    Expired,
    /// The server explicitly rejected the key; the record was removed.
    Invalid,
}

impl LicenseStatus {
    /// Returns the lowercase name used in status output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unlicensed => "unlicensed",
            Self::Checking => "checking",
            Self::Licensed => "licensed",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
        }
    }
}

/// Proof of a successful activation, bound to one device.
///
/// Exists locally if and only if an activation succeeded and has not since
/// been cleared by deactivation or an explicit server rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Normalized license key.
    pub key: LicenseKey,
    /// Issuing dealer identifier.
    pub dealer_id: String,
    /// Issuing dealer display name.
    pub dealer_name: String,
    /// Device the license was activated on.
    pub device_identity: DeviceIdentity,
    /// Licensing API the key was activated against; used for revalidation.
    pub api_base: ApiBase,
    /// When the activation succeeded.
    pub activated_at: DateTime<Utc>,
    /// Expiry, or None for a non-expiring license.
    pub expires_at: Option<DateTime<Utc>>,
    /// Server-confirmed activation flag.
    pub is_active: bool,
    /// Most recent successful revalidation.
    pub last_validated: Option<DateTime<Utc>>,
}

impl LicenseRecord {
    /// Returns true if the record is past its expiry at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    /// Whole days until expiry at `now`, rounded up. None if non-expiring.
    #[must_use]
    pub fn days_until_expiry_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_at.map(|exp| days_until_expiry(exp, now))
    }

    /// Returns true if the last successful revalidation is older than
    /// `interval_secs`, or has never happened.
    #[must_use]
    pub fn needs_revalidation_at(&self, now: DateTime<Utc>, interval_secs: u64) -> bool {
        match self.last_validated {
            Some(last) => {
                let elapsed = now.signed_duration_since(last).num_seconds();
                elapsed >= i64::try_from(interval_secs).unwrap_or(i64::MAX)
            }
            None => true,
        }
    }

    /// Updates the record in place from a successful validation.
    ///
    /// Dealer fields are only replaced when the server sent them.
    pub fn refresh(&mut self, grant: &LicenseGrant, now: DateTime<Utc>) {
        if let Some(dealer_id) = &grant.dealer_id {
            self.dealer_id.clone_from(dealer_id);
        }
        if let Some(dealer_name) = &grant.dealer_name {
            self.dealer_name.clone_from(dealer_name);
        }
        self.expires_at = grant.expires_at;
        self.is_active = true;
        self.last_validated = Some(now);
    }
}

/// `ceil((expires_at - now) / 1 day)`, negative once expired.
#[must_use]
pub fn days_until_expiry(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = expires_at.signed_duration_since(now).num_milliseconds();
    -(-millis).div_euclid(MILLIS_PER_DAY)
}

/// Parses a server timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` (UTC) and
/// a bare `YYYY-MM-DD` (midnight UTC).
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn ceiling_counts_partial_days() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(days_until_expiry(now + Duration::hours(1), now), 1);
        assert_eq!(days_until_expiry(now + Duration::days(10), now), 10);
        assert_eq!(days_until_expiry(now + Duration::days(10) - Duration::seconds(1), now), 10);
        assert_eq!(days_until_expiry(now + Duration::days(10) + Duration::seconds(1), now), 11);
    }

    #[test]
    fn ceiling_after_expiry() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(days_until_expiry(now, now), 0);
        assert_eq!(days_until_expiry(now - Duration::hours(1), now), 0);
        assert_eq!(days_until_expiry(now - Duration::days(2), now), -2);
    }

    #[test]
    fn parses_date_only() {
        let ts = parse_timestamp("2030-01-01").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_sqlite_style() {
        let ts = parse_timestamp("2026-12-31 23:59:59").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap());
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let ts = parse_timestamp("2026-12-31T23:59:59+03:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2026, 12, 31, 20, 59, 59).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("next tuesday").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
