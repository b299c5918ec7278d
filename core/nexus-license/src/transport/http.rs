//! reqwest-backed licensing API client.

use super::{
    classify, ActivateOutcome, ActivateRequest, ActivateResponse, Exchange, LicenseTransport,
    Rejection, RejectionCode, ValidateOutcome, ValidateRequest, ValidateResponse, ACTIVATE_PATH,
    VALIDATE_PATH,
};
use crate::device::DeviceIdentity;
use crate::error::{LicenseError, LicenseResult};
use crate::key::{ApiBase, LicenseKey};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// HTTP/JSON licensing API client. One round-trip per call, no retries.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Creates a transport with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Network`] if the TLS backend cannot be
    /// initialized.
    pub fn new(timeout: Duration) -> LicenseResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nexus-license/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LicenseError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn post<Req, Resp>(&self, url: &str, body: &Req) -> Exchange<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = match self.client.post(url).json(body).send().await {
            Ok(response) => response,
            Err(e) => {
                return Exchange::Unreachable(format!("licensing server unreachable: {e}"));
            }
        };
        let status = response.status().as_u16();
        match response.text().await {
            Ok(text) => classify(status, &text),
            Err(e) => Exchange::Unreachable(format!("failed to read licensing response: {e}")),
        }
    }
}

#[async_trait]
impl LicenseTransport for HttpTransport {
    async fn validate(
        &self,
        api_base: &ApiBase,
        key: &LicenseKey,
        device: &DeviceIdentity,
    ) -> ValidateOutcome {
        let url = api_base.endpoint(VALIDATE_PATH);
        let request = ValidateRequest {
            license_key: key.as_str().to_string(),
            mac_address: device.as_str().to_string(),
        };
        debug!("Validating {} against {}", key.masked(), url);

        let outcome = match self.post::<_, ValidateResponse>(&url, &request).await {
            Exchange::Reply(body) => body.into_outcome(),
            Exchange::Refused(status) => ValidateOutcome::Rejected(refused(status)),
            Exchange::Unreachable(detail) => ValidateOutcome::Unreachable(detail),
        };
        match &outcome {
            ValidateOutcome::Valid(_) => debug!("License {} is valid", key.masked()),
            ValidateOutcome::Rejected(r) => info!("License {} rejected: {}", key.masked(), r),
            ValidateOutcome::Unreachable(d) => warn!("Validation skipped: {}", d),
        }
        outcome
    }

    async fn activate(
        &self,
        api_base: &ApiBase,
        key: &LicenseKey,
        device: &DeviceIdentity,
        device_name: &str,
    ) -> ActivateOutcome {
        let url = api_base.endpoint(ACTIVATE_PATH);
        let request = ActivateRequest {
            license_key: key.as_str().to_string(),
            mac_address: device.as_str().to_string(),
            device_name: Some(device_name.to_string()),
        };
        debug!("Activating {} against {}", key.masked(), url);

        let outcome = match self.post::<_, ActivateResponse>(&url, &request).await {
            Exchange::Reply(body) => body.into_outcome(),
            Exchange::Refused(status) => ActivateOutcome::Rejected(refused(status)),
            Exchange::Unreachable(detail) => ActivateOutcome::Unreachable(detail),
        };
        match &outcome {
            ActivateOutcome::Activated(_) => info!("License {} activated", key.masked()),
            ActivateOutcome::Rejected(r) => info!("Activation of {} rejected: {}", key.masked(), r),
            ActivateOutcome::Unreachable(d) => warn!("Activation failed: {}", d),
        }
        outcome
    }
}

fn refused(status: u16) -> Rejection {
    Rejection {
        code: RejectionCode::Http(status),
        message: format!("licensing server refused the request (HTTP {status})"),
    }
}
