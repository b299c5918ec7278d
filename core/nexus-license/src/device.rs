//! Device identity for license binding.
//!
//! The identity is a random, time-ordered token generated on first use and
//! persisted for the lifetime of the installation. It is never rotated.

use crate::error::{LicenseError, LicenseResult};
use crate::store::KeyValueStore;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Key under which the identity is persisted.
pub(crate) const DEVICE_IDENTITY_KEY: &str = "device.identity";

/// Opaque token identifying this installation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Generates a fresh identity (UUID v7: timestamp plus random bits).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing token.
    #[must_use]
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces the persisted device identity, creating it on first call.
///
/// Concurrent callers on one provider always observe the same value. Two
/// providers sharing a backing store without coordination resolve a
/// first-run race by last write wins; the token only needs to be stable
/// after that, not globally first.
pub struct DeviceIdentityProvider {
    kv: Arc<dyn KeyValueStore>,
    cached: Mutex<Option<DeviceIdentity>>,
}

impl DeviceIdentityProvider {
    /// Creates a provider over the given store.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            cached: Mutex::new(None),
        }
    }

    /// Returns the device identity, generating and persisting it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backing store fails.
    pub fn get(&self) -> LicenseResult<DeviceIdentity> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|_| LicenseError::Storage("device identity lock poisoned".to_string()))?;

        if let Some(identity) = cached.as_ref() {
            return Ok(identity.clone());
        }

        let identity = match self.kv.get(DEVICE_IDENTITY_KEY)? {
            Some(token) if !token.trim().is_empty() => {
                debug!("Loaded persisted device identity");
                DeviceIdentity::from_string(token.trim())
            }
            _ => {
                let identity = DeviceIdentity::generate();
                self.kv.set(DEVICE_IDENTITY_KEY, identity.as_str())?;
                info!("Generated new device identity {}", identity);
                identity
            }
        };

        *cached = Some(identity.clone());
        Ok(identity)
    }
}

/// Information about the current device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Operating system name.
    pub os_name: String,
    /// CPU architecture.
    pub arch: String,
    /// Hostname.
    pub hostname: String,
}

impl DeviceInfo {
    /// Collects information about the current device.
    #[must_use]
    pub fn collect() -> Self {
        Self {
            os_name: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            hostname: get_hostname(),
        }
    }

    /// Name reported to the licensing server on activation.
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.hostname.is_empty() {
            "Unknown".to_string()
        } else {
            self.hostname.clone()
        }
    }
}

fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "Unknown".to_string())
}
