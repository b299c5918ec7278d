//! Shared test helpers for license client tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use nexus_license::transport::mock::MockTransport;
use nexus_license::{
    ActivationGrant, ApiBase, DeviceIdentity, DeviceIdentityProvider, KeyValueStore,
    KvLicenseStore, LicenseConfig, LicenseError, LicenseGrant, LicenseKey, LicenseManager,
    LicenseRecord, LicenseResult, LicenseStore, LicenseTransport, MemoryStore, Rejection,
    RejectionCode,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const API_BASE: &str = "https://licensing.example.com/api";
pub const KEY: &str = "NEXUS-AAAA-BBBB-CCCC";

/// A manager over in-memory storage and a scripted transport.
pub struct Harness {
    pub kv: Arc<MemoryStore>,
    pub store: Arc<KvLicenseStore>,
    pub transport: Arc<MockTransport>,
    pub manager: Arc<LicenseManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&LicenseConfig::default())
    }

    pub fn with_config(config: &LicenseConfig) -> Self {
        let kv = Arc::new(MemoryStore::new());
        let shared: Arc<dyn KeyValueStore> = Arc::clone(&kv) as Arc<dyn KeyValueStore>;
        let store = Arc::new(KvLicenseStore::new(Arc::clone(&shared)));
        let transport = Arc::new(MockTransport::new());
        let device = Arc::new(DeviceIdentityProvider::new(shared));
        let license_store: Arc<dyn LicenseStore> = Arc::clone(&store) as Arc<dyn LicenseStore>;
        let remote: Arc<dyn LicenseTransport> = Arc::clone(&transport) as Arc<dyn LicenseTransport>;
        let manager = LicenseManager::new(license_store, remote, device)
            .with_config(config)
            .with_device_name("Front Counter");
        Self {
            kv,
            store,
            transport,
            manager: Arc::new(manager),
        }
    }
}

/// In-memory store that refuses writes once made read-only.
#[derive(Default)]
pub struct ReadOnlyStore {
    inner: MemoryStore,
    read_only: AtomicBool,
}

impl ReadOnlyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn make_read_only(&self) {
        self.read_only.store(true, Ordering::SeqCst);
    }

    fn check_writable(&self) -> LicenseResult<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(LicenseError::Storage("store is read-only".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for ReadOnlyStore {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> LicenseResult<()> {
        self.check_writable()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> LicenseResult<()> {
        self.check_writable()?;
        self.inner.remove(key)
    }
}

/// A manager over `kv` and the given scripted transport.
pub fn manager_over(
    kv: Arc<dyn KeyValueStore>,
    transport: &Arc<MockTransport>,
) -> Arc<LicenseManager> {
    let store: Arc<dyn LicenseStore> = Arc::new(KvLicenseStore::new(Arc::clone(&kv)));
    let remote: Arc<dyn LicenseTransport> = Arc::clone(transport) as Arc<dyn LicenseTransport>;
    let device = Arc::new(DeviceIdentityProvider::new(kv));
    Arc::new(LicenseManager::new(store, remote, device).with_device_name("Front Counter"))
}

/// A record activated a day ago, validated `validated_ago` ago.
pub fn record(expires_at: Option<DateTime<Utc>>, validated_ago: Duration) -> LicenseRecord {
    let now = Utc::now();
    LicenseRecord {
        key: LicenseKey::parse(KEY).unwrap(),
        dealer_id: "dealer-1".to_string(),
        dealer_name: "Acme".to_string(),
        device_identity: DeviceIdentity::from_string("device-1"),
        api_base: ApiBase::parse(API_BASE).unwrap(),
        activated_at: now - Duration::days(1),
        expires_at,
        is_active: true,
        last_validated: Some(now - validated_ago),
    }
}

/// A non-expiring record validated just now.
pub fn fresh_record() -> LicenseRecord {
    record(None, Duration::zero())
}

pub fn grant(dealer_name: &str, expires_at: Option<DateTime<Utc>>) -> LicenseGrant {
    LicenseGrant {
        dealer_id: Some("dealer-1".to_string()),
        dealer_name: Some(dealer_name.to_string()),
        expires_at,
    }
}

pub fn activation(dealer_name: &str, expires_at: Option<DateTime<Utc>>) -> ActivationGrant {
    ActivationGrant {
        dealer_id: Some("dealer-1".to_string()),
        dealer_name: Some(dealer_name.to_string()),
        activated_at: Some(Utc::now()),
        expires_at,
    }
}

pub fn rejection(code: RejectionCode, message: &str) -> Rejection {
    Rejection {
        code,
        message: message.to_string(),
    }
}

/// Yields until `cond` holds; panics after a bounded number of attempts.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
