//! Human-readable rendering of a license snapshot.

use chrono::{DateTime, Utc};
use nexus_license::{LicenseSnapshot, LicenseStatus};
use std::fmt::Write;

fn status_label(status: LicenseStatus) -> &'static str {
    match status {
        LicenseStatus::Unlicensed => "Not activated",
        LicenseStatus::Checking => "Checking...",
        LicenseStatus::Licensed => "Licensed",
        LicenseStatus::Expired => "Expired",
        LicenseStatus::Invalid => "Invalid",
    }
}

fn date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

/// Renders `snapshot` as aligned `label: value` lines.
pub fn render(snapshot: &LicenseSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status:         {}", status_label(snapshot.status));

    if let Some(record) = &snapshot.record {
        let _ = writeln!(out, "Key:            {}", record.key.masked());
        if !record.dealer_name.is_empty() {
            let _ = writeln!(out, "Dealer:         {}", record.dealer_name);
        }
        let _ = writeln!(out, "Server:         {}", record.api_base);
        let _ = writeln!(out, "Activated:      {}", date(record.activated_at));

        match (record.expires_at, snapshot.days_until_expiry) {
            (Some(exp), Some(days)) if days > 0 => {
                let _ = writeln!(out, "Expires:        {} ({} days left)", date(exp), days);
            }
            (Some(exp), _) => {
                let _ = writeln!(out, "Expires:        {} (expired)", date(exp));
            }
            (None, _) => {
                let _ = writeln!(out, "Expires:        never");
            }
        }
        if let Some(validated) = record.last_validated {
            let _ = writeln!(
                out,
                "Last validated: {}",
                validated.format("%Y-%m-%d %H:%M UTC")
            );
        }
    }

    if snapshot.expiry_warning && !snapshot.is_expired {
        let _ = writeln!(out, "Warning:        license expires soon, contact your dealer");
    }
    if snapshot.offline {
        let _ = writeln!(out, "Offline:        licensing server unreachable, using cached license");
    }
    if let Some(error) = &snapshot.error {
        let _ = writeln!(out, "Error:          {}", error);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_license::{ApiBase, DeviceIdentity, LicenseKey, LicenseRecord};
    use pretty_assertions::assert_eq;

    fn snapshot(record: Option<LicenseRecord>) -> LicenseSnapshot {
        LicenseSnapshot {
            status: LicenseStatus::Licensed,
            is_licensed: true,
            is_expired: false,
            days_until_expiry: None,
            expiry_warning: false,
            offline: false,
            error: None,
            dealer_name: record.as_ref().map(|r| r.dealer_name.clone()),
            record,
        }
    }

    fn record() -> LicenseRecord {
        let activated = nexus_license::parse_timestamp("2025-03-01").unwrap();
        LicenseRecord {
            key: LicenseKey::parse("NEXUS-AAAA-BBBB-CCCC").unwrap(),
            dealer_id: "d-1".to_string(),
            dealer_name: "Acme".to_string(),
            device_identity: DeviceIdentity::from_string("dev-1"),
            api_base: ApiBase::parse("https://licensing.example.com/api").unwrap(),
            activated_at: activated,
            expires_at: None,
            is_active: true,
            last_validated: Some(activated),
        }
    }

    #[test]
    fn unlicensed_shows_only_status() {
        let mut snap = snapshot(None);
        snap.status = LicenseStatus::Unlicensed;
        snap.is_licensed = false;
        assert_eq!(render(&snap), "Status:         Not activated\n");
    }

    #[test]
    fn licensed_without_expiry() {
        let text = render(&snapshot(Some(record())));
        assert!(text.contains("Key:            *****-****-****-CCCC\n"));
        assert!(text.contains("Dealer:         Acme\n"));
        assert!(text.contains("Expires:        never\n"));
        assert!(text.contains("Last validated: 2025-03-01 00:00 UTC\n"));
        assert!(!text.contains("NEXUS-AAAA"));
    }

    #[test]
    fn warning_and_offline_lines() {
        let mut rec = record();
        rec.expires_at = nexus_license::parse_timestamp("2030-01-01");
        let mut snap = snapshot(Some(rec));
        snap.days_until_expiry = Some(5);
        snap.expiry_warning = true;
        snap.offline = true;
        snap.error = Some("licensing server unreachable: connection refused".to_string());

        let text = render(&snap);
        assert!(text.contains("Expires:        2030-01-01 (5 days left)\n"));
        assert!(text.contains("Warning:"));
        assert!(text.contains("Offline:"));
        assert!(text.contains("Error:          licensing server unreachable"));
    }

    #[test]
    fn expired_record() {
        let mut rec = record();
        rec.expires_at = nexus_license::parse_timestamp("2024-01-01");
        let mut snap = snapshot(Some(rec));
        snap.status = LicenseStatus::Expired;
        snap.is_expired = true;
        snap.days_until_expiry = Some(-400);

        let text = render(&snap);
        assert!(text.starts_with("Status:         Expired\n"));
        assert!(text.contains("Expires:        2024-01-01 (expired)\n"));
    }
}
