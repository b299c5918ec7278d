use super::KeyValueStore;
use crate::error::LicenseResult;
use crate::record::LicenseRecord;
use std::sync::Arc;
use tracing::{debug, warn};

/// Key under which the license record is persisted.
pub const LICENSE_RECORD_KEY: &str = "license.record";

/// Persistence of the single active license record.
pub trait LicenseStore: Send + Sync {
    /// Loads the record. Unreadable contents are dropped and reported as
    /// `None` rather than as an error.
    fn load(&self) -> LicenseResult<Option<LicenseRecord>>;

    /// Saves the record, unconditionally replacing any existing one.
    fn save(&self, record: &LicenseRecord) -> LicenseResult<()>;

    /// Removes the record. Clearing an empty store is a no-op.
    fn clear(&self) -> LicenseResult<()>;
}

/// [`LicenseStore`] persisting the record as JSON in a [`KeyValueStore`].
#[derive(Clone)]
pub struct KvLicenseStore {
    kv: Arc<dyn KeyValueStore>,
}

impl KvLicenseStore {
    /// Creates a license store over the given key-value store.
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }
}

impl LicenseStore for KvLicenseStore {
    fn load(&self) -> LicenseResult<Option<LicenseRecord>> {
        let Some(raw) = self.kv.get(LICENSE_RECORD_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<LicenseRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Dropping corrupt license record: {}", e);
                if let Err(e) = self.kv.remove(LICENSE_RECORD_KEY) {
                    warn!("Failed to remove corrupt license record: {}", e);
                }
                Ok(None)
            }
        }
    }

    fn save(&self, record: &LicenseRecord) -> LicenseResult<()> {
        let json = serde_json::to_string(record)?;
        self.kv.set(LICENSE_RECORD_KEY, &json)?;
        debug!("Saved license record for {}", record.key.masked());
        Ok(())
    }

    fn clear(&self) -> LicenseResult<()> {
        self.kv.remove(LICENSE_RECORD_KEY)
    }
}
