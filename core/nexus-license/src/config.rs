//! Client configuration.
//!
//! Values come from, in increasing priority: built-in defaults, an optional
//! JSON file, and `NEXUS_LICENSE_*` environment variables.

use crate::error::{LicenseError, LicenseResult};
use crate::record::SECS_PER_DAY;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name under the platform data directory.
pub const APP_DIR_NAME: &str = "nexus-pos";

/// Which local persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// A JSON file (`license.json`).
    #[default]
    File,
    /// A SQLite database (`license.db`).
    Sqlite,
}

impl StorageBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Some(Self::File),
            "sqlite" | "db" => Some(Self::Sqlite),
            _ => None,
        }
    }

    /// File name of the backing store inside the data directory.
    #[must_use]
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::File => "license.json",
            Self::Sqlite => "license.db",
        }
    }
}

/// Licensing client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Licensing API base URL used when activating without an explicit one.
    pub api_base_url: String,
    /// Directory holding the local store. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Local persistence backend.
    pub storage: StorageBackend,
    /// Per-request network timeout.
    pub request_timeout_secs: u64,
    /// Age after which a stored license is revalidated with the server.
    pub revalidation_interval_secs: u64,
    /// How often the background task checks whether revalidation is due.
    pub poll_interval_secs: u64,
    /// Days before expiry at which the UI shows an advisory banner.
    pub expiry_warning_days: i64,
    /// Device name reported on activation. Defaults to the hostname.
    pub device_name: Option<String>,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000/api".to_string(),
            data_dir: None,
            storage: StorageBackend::File,
            request_timeout_secs: 30,
            revalidation_interval_secs: 7 * SECS_PER_DAY as u64,
            poll_interval_secs: 60 * 60,
            expiry_warning_days: 14,
            device_name: None,
        }
    }
}

impl LicenseConfig {
    /// Loads configuration from a JSON file. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(path: impl AsRef<Path>) -> LicenseResult<Self> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(LicenseError::Config(format!("failed to read {path:?}: {e}")));
            }
        };
        serde_json::from_str(&content)
            .map_err(|e| LicenseError::Config(format!("invalid config {path:?}: {e}")))
    }

    /// Applies `NEXUS_LICENSE_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// Recognized names: `NEXUS_LICENSE_API_BASE`, `NEXUS_LICENSE_DATA_DIR`,
    /// `NEXUS_LICENSE_DEVICE_NAME`, `NEXUS_LICENSE_STORAGE`. Empty values
    /// and unknown storage names are ignored.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(api_base) = get("NEXUS_LICENSE_API_BASE") {
            self.api_base_url = api_base;
        }
        if let Some(dir) = get("NEXUS_LICENSE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(name) = get("NEXUS_LICENSE_DEVICE_NAME") {
            self.device_name = Some(name);
        }
        if let Some(storage) = get("NEXUS_LICENSE_STORAGE").and_then(|s| StorageBackend::parse(&s))
        {
            self.storage = storage;
        }
        self
    }

    /// Resolves the data directory, falling back to the platform default.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Config`] if no directory is configured and the
    /// platform has none.
    pub fn resolved_data_dir(&self) -> LicenseResult<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .ok_or_else(|| LicenseError::Config("no local data directory available".to_string()))
    }

    /// Path of the backing store file.
    pub fn store_path(&self) -> LicenseResult<PathBuf> {
        Ok(self.resolved_data_dir()?.join(self.storage.file_name()))
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Interval between revalidation-due checks.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}
