//! The license lifecycle state machine.
//!
//! ```text
//! Unlicensed ──activate──▶ Checking ──ok──▶ Licensed ──now > expiry──▶ Expired
//!      ▲                      │                 │
//!      │                 rejected/           check
//!      │                 unreachable            │
//!      │                 (prior state)          ▼
//!      └──── deactivate ◀──────────────── Checking ──rejected──▶ Invalid
//!                                               │
//!                                          unreachable: stays Licensed (offline)
//! ```
//!
//! Every network operation takes a ticket when it starts. A result whose
//! ticket is no longer the newest is discarded, so the most recently started
//! request wins regardless of completion order. A check that finds another
//! operation in flight does not take a ticket.

use crate::config::{LicenseConfig, StorageBackend};
use crate::device::{DeviceIdentity, DeviceIdentityProvider, DeviceInfo};
use crate::error::{LicenseError, LicenseResult};
use crate::key::{ApiBase, LicenseKey};
use crate::record::{LicenseRecord, LicenseStatus};
use crate::revalidation::{self, RevalidationHandle};
use crate::store::{FileStore, KeyValueStore, KvLicenseStore, LicenseStore, SqliteStore};
use crate::transport::{ActivateOutcome, HttpTransport, LicenseTransport, ValidateOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// What the UI renders: derived on every read, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseSnapshot {
    pub status: LicenseStatus,
    /// The application may be used.
    pub is_licensed: bool,
    /// A record exists and is past its expiry.
    pub is_expired: bool,
    /// Whole days until expiry, rounded up; None if non-expiring or absent.
    pub days_until_expiry: Option<i64>,
    /// Expiry is within the advisory window.
    pub expiry_warning: bool,
    /// The last network operation could not reach the server.
    pub offline: bool,
    /// Message from the last failed operation.
    pub error: Option<String>,
    pub dealer_name: Option<String>,
    pub record: Option<LicenseRecord>,
}

#[derive(Debug, Clone)]
struct SessionState {
    phase: LicenseStatus,
    record: Option<LicenseRecord>,
    error: Option<String>,
    offline: bool,
}

impl SessionState {
    /// The phase to fall back to when an in-flight operation fails.
    fn settled_phase(&self) -> LicenseStatus {
        match self.phase {
            LicenseStatus::Checking if self.record.is_some() => LicenseStatus::Licensed,
            LicenseStatus::Checking => LicenseStatus::Unlicensed,
            phase => phase,
        }
    }
}

/// Owns the license status for one installation.
pub struct LicenseManager {
    store: Arc<dyn LicenseStore>,
    transport: Arc<dyn LicenseTransport>,
    device: Arc<DeviceIdentityProvider>,
    device_name: String,
    expiry_warning_days: i64,
    revalidation_interval_secs: u64,
    poll_interval: Duration,
    state: RwLock<SessionState>,
    generation: AtomicU64,
    revalidation: Mutex<Option<RevalidationHandle>>,
}

impl LicenseManager {
    /// Creates a manager with default settings. Call [`start`](Self::start)
    /// to load the persisted record.
    pub fn new(
        store: Arc<dyn LicenseStore>,
        transport: Arc<dyn LicenseTransport>,
        device: Arc<DeviceIdentityProvider>,
    ) -> Self {
        let defaults = LicenseConfig::default();
        Self {
            store,
            transport,
            device,
            device_name: DeviceInfo::collect().display_name(),
            expiry_warning_days: defaults.expiry_warning_days,
            revalidation_interval_secs: defaults.revalidation_interval_secs,
            poll_interval: defaults.poll_interval(),
            state: RwLock::new(SessionState {
                phase: LicenseStatus::Unlicensed,
                record: None,
                error: None,
                offline: false,
            }),
            generation: AtomicU64::new(0),
            revalidation: Mutex::new(None),
        }
    }

    /// Builds a manager with local storage and the HTTP transport described
    /// by `config`.
    pub fn from_config(config: &LicenseConfig) -> LicenseResult<Self> {
        let path = config.store_path()?;
        let kv: Arc<dyn KeyValueStore> = match config.storage {
            StorageBackend::File => Arc::new(FileStore::open(&path)?),
            StorageBackend::Sqlite => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Arc::new(SqliteStore::open(&path)?)
            }
        };
        debug!("Using {:?} license store at {:?}", config.storage, path);

        let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
        let store = Arc::new(KvLicenseStore::new(Arc::clone(&kv)));
        let device = Arc::new(DeviceIdentityProvider::new(kv));
        Ok(Self::new(store, transport, device).with_config(config))
    }

    /// Applies the tunables from `config`.
    #[must_use]
    pub fn with_config(mut self, config: &LicenseConfig) -> Self {
        if let Some(name) = config.device_name.as_ref().filter(|n| !n.trim().is_empty()) {
            self.device_name = name.clone();
        }
        self.expiry_warning_days = config.expiry_warning_days;
        self.revalidation_interval_secs = config.revalidation_interval_secs;
        self.poll_interval = config.poll_interval();
        self
    }

    /// Overrides the device name sent on activation.
    #[must_use]
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Returns this installation's device identity.
    pub fn device_identity(&self) -> LicenseResult<DeviceIdentity> {
        self.device.get()
    }

    /// Device name sent on activation.
    #[must_use]
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    // ── Operations ───────────────────────────────────────────────

    /// Loads the persisted record without contacting the server.
    pub async fn restore(&self) -> LicenseResult<LicenseSnapshot> {
        let record = self.store.load()?;
        {
            let mut state = self.state.write().await;
            self.begin();
            state.phase = if record.is_some() {
                LicenseStatus::Licensed
            } else {
                LicenseStatus::Unlicensed
            };
            state.record = record;
            state.error = None;
            state.offline = false;
        }
        Ok(self.snapshot().await)
    }

    /// Loads the persisted record and, if one exists, validates it.
    ///
    /// A superseded validation is not an error here: a newer operation
    /// already owns the state.
    pub async fn start(&self) -> LicenseResult<LicenseSnapshot> {
        let has_record = self.restore().await?.record.is_some();

        if has_record {
            match self.check_license().await {
                Ok(_) | Err(LicenseError::Superseded) => {}
                Err(e) => return Err(e),
            }
        } else {
            info!("No license on this device");
        }
        Ok(self.snapshot().await)
    }

    /// Activates `key` against the server at `api_base`.
    ///
    /// Returns `Ok(true)` once the license is stored and usable,
    /// `Ok(false)` if the server refused or could not be reached (the
    /// message is in [`LicenseSnapshot::error`] and the store is untouched).
    ///
    /// # Errors
    ///
    /// - [`LicenseError::InvalidKey`] / [`LicenseError::InvalidApiBase`] for
    ///   bad input, before any network call.
    /// - [`LicenseError::Superseded`] if another operation started meanwhile.
    /// - Storage errors while persisting the new record.
    pub async fn activate(&self, api_base: &str, key: &str) -> LicenseResult<bool> {
        let parsed = LicenseKey::parse(key).and_then(|key| Ok((ApiBase::parse(api_base)?, key)));
        let (api_base, key) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                self.state.write().await.error = Some(e.to_string());
                return Err(e);
            }
        };
        let device = self.device.get()?;

        let (ticket, prior) = {
            let mut state = self.state.write().await;
            let prior = state.settled_phase();
            let ticket = self.begin();
            state.phase = LicenseStatus::Checking;
            state.error = None;
            (ticket, prior)
        };
        info!("Activating license {} on {}", key.masked(), api_base);

        let outcome = self
            .transport
            .activate(&api_base, &key, &device, &self.device_name)
            .await;

        let mut state = self.state.write().await;
        if !self.is_current(ticket) {
            debug!("Discarding superseded activation of {}", key.masked());
            return Err(LicenseError::Superseded);
        }

        match outcome {
            ActivateOutcome::Activated(grant) => {
                let now = Utc::now();
                let record = LicenseRecord {
                    key,
                    dealer_id: grant.dealer_id.unwrap_or_default(),
                    dealer_name: grant.dealer_name.unwrap_or_default(),
                    device_identity: device,
                    api_base,
                    activated_at: grant.activated_at.unwrap_or(now),
                    expires_at: grant.expires_at,
                    is_active: true,
                    last_validated: Some(now),
                };
                if let Err(e) = self.store.save(&record) {
                    warn!("Failed to persist activated license: {}", e);
                    state.phase = prior;
                    state.error = Some(e.to_string());
                    return Err(e);
                }
                let usable = !record.is_expired_at(now);
                info!(
                    "License {} activated for dealer {:?}",
                    record.key.masked(),
                    record.dealer_name
                );
                state.phase = LicenseStatus::Licensed;
                state.record = Some(record);
                state.error = None;
                state.offline = false;
                Ok(usable)
            }
            ActivateOutcome::Rejected(rejection) => {
                state.phase = prior;
                state.error = Some(rejection.message);
                state.offline = false;
                Ok(false)
            }
            ActivateOutcome::Unreachable(detail) => {
                state.phase = prior;
                state.error = Some(detail);
                state.offline = true;
                Ok(false)
            }
        }
    }

    /// Revalidates the stored license with the server.
    ///
    /// - No record: `Ok(false)` without a network call.
    /// - Locally expired record: `Ok(false)`, state `Expired`, no network
    ///   call; the record is kept so the UI can show what expired.
    /// - Valid: record refreshed, `Ok(true)`.
    /// - Rejected: record deleted, state `Invalid`, `Ok(false)`.
    /// - Unreachable: record kept, session stays licensed in offline mode.
    /// - Another operation in flight: the current state is reported without
    ///   a network call and the in-flight operation is left to finish.
    pub async fn check_license(&self) -> LicenseResult<bool> {
        let (ticket, record) = {
            let mut state = self.state.write().await;
            let now = Utc::now();
            if state.phase == LicenseStatus::Checking {
                debug!("Check requested while another operation is in flight");
                return Ok(state
                    .record
                    .as_ref()
                    .is_some_and(|r| r.is_active && !r.is_expired_at(now)));
            }
            let loaded = match self.store.load() {
                Ok(loaded) => loaded,
                Err(e) => {
                    state.error = Some(e.to_string());
                    return Err(e);
                }
            };
            match loaded {
                None => {
                    debug!("No stored license to check");
                    state.phase = LicenseStatus::Unlicensed;
                    state.record = None;
                    state.offline = false;
                    return Ok(false);
                }
                Some(record) if record.is_expired_at(now) => {
                    info!("License {} expired locally", record.key.masked());
                    state.phase = LicenseStatus::Expired;
                    state.error = record
                        .expires_at
                        .map(|exp| format!("license expired on {}", exp.format("%Y-%m-%d")));
                    state.record = Some(record);
                    state.offline = false;
                    return Ok(false);
                }
                Some(record) => {
                    let ticket = self.begin();
                    state.phase = LicenseStatus::Checking;
                    state.record = Some(record.clone());
                    (ticket, record)
                }
            }
        };

        let outcome = self
            .transport
            .validate(&record.api_base, &record.key, &record.device_identity)
            .await;

        let mut state = self.state.write().await;
        if !self.is_current(ticket) {
            debug!("Discarding superseded validation of {}", record.key.masked());
            return Err(LicenseError::Superseded);
        }
        let now = Utc::now();

        match outcome {
            ValidateOutcome::Valid(grant) => {
                let mut refreshed = record;
                refreshed.refresh(&grant, now);
                if let Err(e) = self.store.save(&refreshed) {
                    warn!("Failed to persist revalidated license: {}", e);
                    state.phase = state.settled_phase();
                    state.error = Some(e.to_string());
                    return Err(e);
                }
                let usable = !refreshed.is_expired_at(now);
                state.phase = if usable {
                    LicenseStatus::Licensed
                } else {
                    LicenseStatus::Expired
                };
                state.record = Some(refreshed);
                state.error = None;
                state.offline = false;
                Ok(usable)
            }
            ValidateOutcome::Rejected(rejection) => {
                warn!(
                    "License {} rejected by server, removing it: {}",
                    record.key.masked(),
                    rejection
                );
                if let Err(e) = self.store.clear() {
                    warn!("Failed to remove rejected license: {}", e);
                    state.phase = state.settled_phase();
                    state.error = Some(e.to_string());
                    return Err(e);
                }
                state.phase = LicenseStatus::Invalid;
                state.record = None;
                state.error = Some(rejection.message);
                state.offline = false;
                Ok(false)
            }
            ValidateOutcome::Unreachable(detail) => {
                let usable = record.is_active && !record.is_expired_at(now);
                info!("Licensing server unreachable, continuing offline: {}", detail);
                state.phase = LicenseStatus::Licensed;
                state.error = Some(detail);
                state.offline = true;
                Ok(usable)
            }
        }
    }

    /// Removes the local license and stops background revalidation.
    ///
    /// Local only: the server-side device slot is not released. Any
    /// operation still in flight is superseded.
    pub async fn deactivate(&self) -> LicenseResult<()> {
        self.stop_revalidation();
        let mut state = self.state.write().await;
        self.begin();
        let cleared = self.store.clear();
        state.phase = LicenseStatus::Unlicensed;
        state.record = None;
        state.offline = false;
        state.error = cleared.as_ref().err().map(ToString::to_string);
        info!("License deactivated on this device");
        cleared
    }

    /// Revalidates if the stored license has not been confirmed within the
    /// revalidation interval. Returns `None` when nothing was due.
    pub async fn revalidate_if_due(&self) -> LicenseResult<Option<bool>> {
        let due = {
            let state = self.state.read().await;
            match (&state.record, state.phase) {
                (_, LicenseStatus::Checking) => false,
                (Some(record), _) => {
                    record.needs_revalidation_at(Utc::now(), self.revalidation_interval_secs)
                }
                (None, _) => false,
            }
        };
        if !due {
            return Ok(None);
        }
        self.check_license().await.map(Some)
    }

    // ── Background revalidation ──────────────────────────────────

    /// Spawns the periodic revalidation task, replacing any running one.
    /// Requires a tokio runtime.
    pub fn start_revalidation(self: &Arc<Self>) {
        let handle = revalidation::spawn(Arc::downgrade(self), self.poll_interval);
        let previous = self.revalidation_slot().replace(handle);
        if previous.is_some() {
            debug!("Replaced running revalidation task");
        }
    }

    /// Cancels the periodic revalidation task, if running.
    pub fn stop_revalidation(&self) {
        if let Some(handle) = self.revalidation_slot().take() {
            handle.cancel();
        }
    }

    /// Returns true if a revalidation task is scheduled.
    pub fn is_revalidating(&self) -> bool {
        self.revalidation_slot()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn revalidation_slot(&self) -> std::sync::MutexGuard<'_, Option<RevalidationHandle>> {
        self.revalidation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Derived state ────────────────────────────────────────────

    /// Current status.
    pub async fn status(&self) -> LicenseStatus {
        self.snapshot().await.status
    }

    /// Derives the UI view at the current time.
    pub async fn snapshot(&self) -> LicenseSnapshot {
        self.snapshot_at(Utc::now()).await
    }

    /// Derives the UI view at `now`.
    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> LicenseSnapshot {
        let state = self.state.read().await;
        derive_snapshot(&state, now, self.expiry_warning_days)
    }
}

impl Drop for LicenseManager {
    fn drop(&mut self) {
        self.stop_revalidation();
    }
}

fn derive_snapshot(state: &SessionState, now: DateTime<Utc>, warning_days: i64) -> LicenseSnapshot {
    let record = state.record.as_ref();
    let is_expired = record.is_some_and(|r| r.is_expired_at(now));
    let status = match state.phase {
        LicenseStatus::Checking => LicenseStatus::Checking,
        _ if is_expired => LicenseStatus::Expired,
        phase => phase,
    };
    let is_licensed = record.is_some_and(|r| r.is_active)
        && !is_expired
        && matches!(status, LicenseStatus::Licensed | LicenseStatus::Checking);
    let days_until_expiry = record.and_then(|r| r.days_until_expiry_at(now));

    LicenseSnapshot {
        status,
        is_licensed,
        is_expired,
        days_until_expiry,
        expiry_warning: days_until_expiry.is_some_and(|d| d <= warning_days),
        offline: state.offline,
        error: state.error.clone(),
        dealer_name: record.map(|r| r.dealer_name.clone()),
        record: record.cloned(),
    }
}
