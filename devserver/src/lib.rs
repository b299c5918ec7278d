//! In-memory licensing API for local development and end-to-end tests.
//!
//! Implements the two client-facing endpoints with the same rules the
//! production server enforces (activity, expiry, device binding, activation
//! quota), plus a health check and a debug listing.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use nexus_license::transport::{
    ActivateRequest, ActivateResponse, RejectionCode, ValidateRequest, ValidateResponse,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

/// A license as the server sees it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DevLicense {
    pub license_key: String,
    pub dealer_id: String,
    pub dealer_name: String,
    /// Device the key is bound to, once activated.
    pub mac_address: Option<String>,
    pub activated_at: Option<String>,
    pub expires_at: Option<String>,
    pub is_active: bool,
    pub max_activations: u32,
    pub current_activations: u32,
}

impl DevLicense {
    /// An active, unbound license.
    pub fn new(key: &str, dealer_id: &str, dealer_name: &str) -> Self {
        Self {
            license_key: key.to_uppercase(),
            dealer_id: dealer_id.to_string(),
            dealer_name: dealer_name.to_string(),
            mac_address: None,
            activated_at: None,
            expires_at: None,
            is_active: true,
            max_activations: 1,
            current_activations: 0,
        }
    }

    #[must_use]
    pub fn expiring(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at.to_rfc3339());
        self
    }

    #[must_use]
    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    #[must_use]
    pub fn max_activations(mut self, max: u32) -> Self {
        self.max_activations = max;
        self
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .as_deref()
            .and_then(nexus_license::parse_timestamp)
            .is_some_and(|exp| exp < Utc::now())
    }
}

/// Why a request was refused.
struct Refusal {
    status: StatusCode,
    code: RejectionCode,
    message: String,
    expires_at: Option<String>,
}

impl Refusal {
    fn new(status: StatusCode, code: RejectionCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            expires_at: None,
        }
    }
}

/// In-memory license table.
#[derive(Debug, Default)]
pub struct LicenseRegistry {
    licenses: Mutex<BTreeMap<String, DevLicense>>,
}

impl LicenseRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard test licenses.
    pub fn seeded() -> Self {
        let registry = Self::new();
        let lapsed = nexus_license::parse_timestamp("2024-01-01")
            .unwrap_or_else(|| Utc::now() - Duration::days(1));

        registry.insert(
            DevLicense::new("NEXUS-TEST-1234-5678", "dealer-001", "Test Dealer Inc.")
                .max_activations(3),
        );
        registry.insert(
            DevLicense::new("NEXUS-DEMO-ABCD-EFGH", "dealer-002", "Demo Trading Ltd.")
                .expiring(Utc::now() + Duration::days(365)),
        );
        registry.insert(
            DevLicense::new("NEXUS-EXPR-1111-2222", "dealer-003", "Lapsed Retail Co.")
                .expiring(lapsed),
        );
        registry.insert(
            DevLicense::new("NEXUS-DEAD-0000-0000", "dealer-004", "Revoked Stores LLC")
                .deactivated(),
        );
        registry
    }

    /// Adds or replaces a license.
    pub fn insert(&self, license: DevLicense) {
        self.table().insert(license.license_key.clone(), license);
    }

    /// Returns a copy of the license for `key`.
    pub fn get(&self, key: &str) -> Option<DevLicense> {
        self.table().get(&key.to_uppercase()).cloned()
    }

    /// All licenses, ordered by key.
    pub fn list(&self) -> Vec<DevLicense> {
        self.table().values().cloned().collect()
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<String, DevLicense>> {
        self.licenses
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_usable(license: &DevLicense) -> Result<(), Refusal> {
        if !license.is_active {
            return Err(Refusal::new(
                StatusCode::FORBIDDEN,
                RejectionCode::Deactivated,
                "This license has been deactivated",
            ));
        }
        if license.is_expired() {
            let mut refusal = Refusal::new(
                StatusCode::FORBIDDEN,
                RejectionCode::Expired,
                "This license has expired",
            );
            refusal.expires_at = license.expires_at.clone();
            return Err(refusal);
        }
        Ok(())
    }

    fn not_found() -> Refusal {
        Refusal::new(
            StatusCode::NOT_FOUND,
            RejectionCode::NotFound,
            "License key not found",
        )
    }

    /// Applies the validation rules.
    pub fn validate(&self, req: &ValidateRequest) -> (StatusCode, ValidateResponse) {
        let table = self.table();
        let result = match table.get(&req.license_key.to_uppercase()) {
            None => Err(Self::not_found()),
            Some(license) => Self::check_usable(license).and_then(|()| {
                match &license.mac_address {
                    Some(bound) if bound != &req.mac_address => Err(Refusal::new(
                        StatusCode::FORBIDDEN,
                        RejectionCode::DeviceMismatch,
                        "This license is registered to another device",
                    )),
                    _ => Ok(license),
                }
            }),
        };

        match result {
            Ok(license) => (
                StatusCode::OK,
                ValidateResponse {
                    valid: true,
                    dealer_id: Some(license.dealer_id.clone()),
                    dealer_name: Some(license.dealer_name.clone()),
                    expires_at: license.expires_at.clone(),
                    error: None,
                    message: Some("License is valid".to_string()),
                },
            ),
            Err(refusal) => (
                refusal.status,
                ValidateResponse {
                    valid: false,
                    expires_at: refusal.expires_at,
                    error: Some(refusal.code.to_wire()),
                    message: Some(refusal.message),
                    ..Default::default()
                },
            ),
        }
    }

    /// Applies the activation rules and binds the device on success.
    pub fn activate(&self, req: &ActivateRequest) -> (StatusCode, ActivateResponse) {
        let mut table = self.table();
        let result = match table.get_mut(&req.license_key.to_uppercase()) {
            None => Err(Self::not_found()),
            Some(license) => Self::check_usable(license).and_then(|()| {
                let other_device = license
                    .mac_address
                    .as_ref()
                    .is_some_and(|bound| bound != &req.mac_address);
                if other_device && license.current_activations >= license.max_activations {
                    return Err(Refusal::new(
                        StatusCode::FORBIDDEN,
                        RejectionCode::MaxActivations,
                        format!(
                            "Maximum activations reached ({}/{})",
                            license.current_activations, license.max_activations
                        ),
                    ));
                }
                license.mac_address = Some(req.mac_address.clone());
                license.activated_at = Some(Utc::now().to_rfc3339());
                license.current_activations += 1;
                info!(
                    "License {} activated for device {} ({:?})",
                    license.license_key, req.mac_address, req.device_name
                );
                Ok(license.clone())
            }),
        };

        match result {
            Ok(license) => (
                StatusCode::OK,
                ActivateResponse {
                    success: true,
                    dealer_id: Some(license.dealer_id),
                    dealer_name: Some(license.dealer_name),
                    activated_at: license.activated_at,
                    expires_at: license.expires_at,
                    error: None,
                    message: Some("License activated".to_string()),
                },
            ),
            Err(refusal) => (
                refusal.status,
                ActivateResponse {
                    success: false,
                    expires_at: refusal.expires_at,
                    error: Some(refusal.code.to_wire()),
                    message: Some(refusal.message),
                    ..Default::default()
                },
            ),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn validate_handler(
    State(registry): State<Arc<LicenseRegistry>>,
    Json(req): Json<ValidateRequest>,
) -> (StatusCode, Json<ValidateResponse>) {
    info!("License validation request for {}", req.license_key);
    let (status, body) = registry.validate(&req);
    (status, Json(body))
}

async fn activate_handler(
    State(registry): State<Arc<LicenseRegistry>>,
    Json(req): Json<ActivateRequest>,
) -> (StatusCode, Json<ActivateResponse>) {
    info!("License activation request for {}", req.license_key);
    let (status, body) = registry.activate(&req);
    (status, Json(body))
}

async fn list_handler(State(registry): State<Arc<LicenseRegistry>>) -> Json<Vec<DevLicense>> {
    Json(registry.list())
}

/// Build the HTTP API router over the given registry.
pub fn build_router(registry: Arc<LicenseRegistry>) -> Router {
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/license/validate", post(validate_handler))
        .route("/api/license/activate", post(activate_handler))
        .route("/api/licenses", get(list_handler))
        .with_state(registry)
}
