mod common;

use common::{spawn_seeded_server, spawn_server};
use nexus_license::transport::{ActivateResponse, ValidateResponse};
use nexus_license_devserver::{DevLicense, HealthResponse, LicenseRegistry};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

async fn post_validate(base: &str, key: &str, device: &str) -> (u16, ValidateResponse) {
    let resp = reqwest::Client::new()
        .post(format!("{}/license/validate", base))
        .json(&json!({ "license_key": key, "mac_address": device }))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn post_activate(base: &str, key: &str, device: &str) -> (u16, ActivateResponse) {
    let resp = reqwest::Client::new()
        .post(format!("{}/license/activate", base))
        .json(&json!({
            "license_key": key,
            "mac_address": device,
            "device_name": "Front Counter",
        }))
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let base = spawn_seeded_server().await;
    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();

    assert_eq!(resp.status(), 200);
    let body: HealthResponse = resp.json().await.unwrap();
    assert_eq!(body.status, "ok");
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let base = spawn_seeded_server().await;
    let resp = reqwest::get(format!("{}/license/nonexistent", base))
        .await
        .unwrap();

    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn licenses_endpoint_lists_seeded_keys() {
    let base = spawn_seeded_server().await;
    let licenses: Vec<DevLicense> = reqwest::get(format!("{}/licenses", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let keys: Vec<&str> = licenses.iter().map(|l| l.license_key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "NEXUS-DEAD-0000-0000",
            "NEXUS-DEMO-ABCD-EFGH",
            "NEXUS-EXPR-1111-2222",
            "NEXUS-TEST-1234-5678",
        ]
    );
}

#[tokio::test]
async fn unknown_key_is_not_found() {
    let base = spawn_seeded_server().await;
    let (status, body) = post_validate(&base, "NEXUS-NOPE-0000-0000", "dev-1").await;

    assert_eq!(status, 404);
    assert!(!body.valid);
    assert_eq!(body.error.as_deref(), Some("LICENSE_NOT_FOUND"));
}

#[tokio::test]
async fn deactivated_key_is_forbidden() {
    let base = spawn_seeded_server().await;
    let (status, body) = post_validate(&base, "NEXUS-DEAD-0000-0000", "dev-1").await;

    assert_eq!(status, 403);
    assert_eq!(body.error.as_deref(), Some("LICENSE_DEACTIVATED"));
}

#[tokio::test]
async fn expired_key_reports_its_expiry() {
    let base = spawn_seeded_server().await;
    let (status, body) = post_activate(&base, "NEXUS-EXPR-1111-2222", "dev-1").await;

    assert_eq!(status, 403);
    assert!(!body.success);
    assert_eq!(body.error.as_deref(), Some("LICENSE_EXPIRED"));
    assert!(body.expires_at.unwrap().starts_with("2024-01-01"));
}

#[tokio::test]
async fn unbound_key_validates_for_any_device() {
    let base = spawn_seeded_server().await;
    let (status, body) = post_validate(&base, "NEXUS-TEST-1234-5678", "dev-1").await;

    assert_eq!(status, 200);
    assert!(body.valid);
    assert_eq!(body.dealer_name.as_deref(), Some("Test Dealer Inc."));
    assert_eq!(body.expires_at, None);
}

#[tokio::test]
async fn keys_are_matched_case_insensitively() {
    let base = spawn_seeded_server().await;
    let (status, body) = post_validate(&base, "nexus-test-1234-5678", "dev-1").await;

    assert_eq!(status, 200);
    assert!(body.valid);
}

#[tokio::test]
async fn activation_binds_the_device() {
    let registry = Arc::new(LicenseRegistry::seeded());
    let base = spawn_server(Arc::clone(&registry)).await;

    let (status, body) = post_activate(&base, "NEXUS-DEMO-ABCD-EFGH", "dev-1").await;
    assert_eq!(status, 200);
    assert!(body.success);
    assert_eq!(body.dealer_id.as_deref(), Some("dealer-002"));
    assert!(body.activated_at.is_some());
    assert!(body.expires_at.is_some());

    let stored = registry.get("NEXUS-DEMO-ABCD-EFGH").unwrap();
    assert_eq!(stored.mac_address.as_deref(), Some("dev-1"));
    assert_eq!(stored.current_activations, 1);

    let (status, body) = post_validate(&base, "NEXUS-DEMO-ABCD-EFGH", "dev-2").await;
    assert_eq!(status, 403);
    assert_eq!(body.error.as_deref(), Some("MAC_MISMATCH"));
}

#[tokio::test]
async fn second_device_hits_activation_quota() {
    let base = spawn_seeded_server().await;
    let (status, _) = post_activate(&base, "NEXUS-DEMO-ABCD-EFGH", "dev-1").await;
    assert_eq!(status, 200);

    let (status, body) = post_activate(&base, "NEXUS-DEMO-ABCD-EFGH", "dev-2").await;
    assert_eq!(status, 403);
    assert_eq!(body.error.as_deref(), Some("MAX_ACTIVATIONS_REACHED"));
    assert_eq!(body.message.as_deref(), Some("Maximum activations reached (1/1)"));
}

#[tokio::test]
async fn same_device_can_reactivate() {
    let base = spawn_seeded_server().await;
    post_activate(&base, "NEXUS-DEMO-ABCD-EFGH", "dev-1").await;
    let (status, body) = post_activate(&base, "NEXUS-DEMO-ABCD-EFGH", "dev-1").await;

    assert_eq!(status, 200);
    assert!(body.success);
}

#[tokio::test]
async fn registry_accepts_custom_licenses() {
    let registry = Arc::new(LicenseRegistry::new());
    registry.insert(DevLicense::new("acme-0001", "dealer-9", "Acme Corp"));
    let base = spawn_server(registry).await;

    let (status, body) = post_validate(&base, "ACME-0001", "dev-1").await;
    assert_eq!(status, 200);
    assert_eq!(body.dealer_name.as_deref(), Some("Acme Corp"));
}
