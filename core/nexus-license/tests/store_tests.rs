mod common;

use common::{fresh_record, ReadOnlyStore};
use nexus_license::{
    FileStore, KeyValueStore, KvLicenseStore, LicenseStore, MemoryStore, SqliteStore,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn exercise_kv(store: &dyn KeyValueStore) {
    assert_eq!(store.get("a").unwrap(), None);
    store.set("a", "1").unwrap();
    store.set("b", "2").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

    store.set("a", "3").unwrap();
    assert_eq!(store.get("a").unwrap().as_deref(), Some("3"));

    store.remove("a").unwrap();
    store.remove("a").unwrap();
    assert_eq!(store.get("a").unwrap(), None);
    assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
}

// ── Key-value backends ──────────────────────────────────────────

#[test]
fn memory_store_basics() {
    let store = MemoryStore::new();
    assert!(store.is_empty());
    exercise_kv(&store);
    assert_eq!(store.len(), 1);
}

#[test]
fn file_store_basics() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path().join("nested/license.json")).unwrap();
    exercise_kv(&store);
    assert!(store.path().exists());
}

#[test]
fn sqlite_store_basics() {
    let store = SqliteStore::open_in_memory().unwrap();
    exercise_kv(&store);
}

#[test]
fn file_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("license.json");
    FileStore::open(&path).unwrap().set("k", "v").unwrap();

    let reopened = FileStore::open(&path).unwrap();
    assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("license.db");
    SqliteStore::open(&path).unwrap().set("k", "v").unwrap();

    let reopened = SqliteStore::open(&path).unwrap();
    assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
}

#[test]
fn file_store_recovers_from_garbage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("license.json");
    std::fs::write(&path, "\u{0}\u{0}truncated").unwrap();

    let store = FileStore::open(&path).unwrap();
    assert_eq!(store.get("k").unwrap(), None);
    store.set("k", "v").unwrap();
    assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
}

// ── License record store ────────────────────────────────────────

fn license_stores(dir: &TempDir) -> Vec<(&'static str, Arc<dyn KeyValueStore>)> {
    let memory: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let file: Arc<dyn KeyValueStore> =
        Arc::new(FileStore::open(dir.path().join("license.json")).unwrap());
    let sqlite: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    vec![("memory", memory), ("file", file), ("sqlite", sqlite)]
}

#[test]
fn record_save_load_clear() {
    let dir = TempDir::new().unwrap();
    for (name, kv) in license_stores(&dir) {
        let store = KvLicenseStore::new(kv);
        assert_eq!(store.load().unwrap(), None, "{name}");

        let record = fresh_record();
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), Some(record.clone()), "{name}");

        store.clear().unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None, "{name}");
    }
}

#[test]
fn save_replaces_existing_record() {
    let store = KvLicenseStore::new(Arc::new(MemoryStore::new()));
    store.save(&fresh_record()).unwrap();

    let mut newer = fresh_record();
    newer.dealer_name = "Other Dealer".to_string();
    store.save(&newer).unwrap();

    assert_eq!(store.load().unwrap().unwrap().dealer_name, "Other Dealer");
}

#[test]
fn corrupt_record_is_dropped() {
    let dir = TempDir::new().unwrap();
    for (name, kv) in license_stores(&dir) {
        kv.set("license.record", r#"{"key":"NEXUS-"#).unwrap();
        let store = KvLicenseStore::new(Arc::clone(&kv));

        assert_eq!(store.load().unwrap(), None, "{name}");
        assert_eq!(kv.get("license.record").unwrap(), None, "{name}");
    }
}

#[test]
fn corrupt_record_on_read_only_store_still_loads_as_none() {
    let kv = Arc::new(ReadOnlyStore::new());
    kv.set("license.record", "{not json").unwrap();
    kv.make_read_only();
    let store = KvLicenseStore::new(Arc::clone(&kv) as Arc<dyn KeyValueStore>);

    assert_eq!(store.load().unwrap(), None);
    assert!(store.clear().is_err());
}

#[test]
fn record_and_device_identity_share_a_store() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let device = nexus_license::DeviceIdentityProvider::new(Arc::clone(&kv));
    let identity = device.get().unwrap();

    let store = KvLicenseStore::new(Arc::clone(&kv));
    store.save(&fresh_record()).unwrap();
    store.clear().unwrap();

    assert_eq!(
        kv.get("device.identity").unwrap().as_deref(),
        Some(identity.as_str())
    );
}
