//! Local persistence.
//!
//! A small [`KeyValueStore`] abstraction scoped to one installation holds the
//! device identity and the license record. [`LicenseStore`] is the typed view
//! the state machine uses for the record.

mod file;
mod license;
mod memory;
mod sqlite;

pub use file::FileStore;
pub use license::{KvLicenseStore, LicenseStore, LICENSE_RECORD_KEY};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::LicenseResult;

/// String key-value persistence.
///
/// Implementations must make each `set` durable before returning and must
/// treat `remove` of a missing key as a no-op.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value for `key`, if any.
    fn get(&self, key: &str) -> LicenseResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> LicenseResult<()>;

    /// Removes `key`.
    fn remove(&self, key: &str) -> LicenseResult<()>;
}
