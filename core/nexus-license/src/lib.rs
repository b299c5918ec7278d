//! License activation and revalidation for Nexus POS.
//!
//! This crate handles:
//! - A stable per-installation device identity used to bind licenses
//! - Online activation and validation against the licensing API
//! - Local persistence of the activated license record
//! - The client-side license lifecycle (unlicensed, checking, licensed,
//!   expired, invalid) with periodic revalidation
//!
//! # Design Principles
//!
//! - **Injectable seams**: storage and transport are traits, constructed once
//!   and handed to [`LicenseManager`], so tests run against in-memory fakes.
//! - **Availability over enforcement**: a network failure never locks out a
//!   licensed installation. Only an explicit server rejection clears the
//!   local record.
//! - **Last request wins**: a newer operation supersedes any still in flight.
//!
//! # Wire Contract
//!
//! - `POST {api_base}/license/validate` with `{license_key, mac_address}`
//! - `POST {api_base}/license/activate` with `{license_key, mac_address, device_name}`
//!
//! `mac_address` carries the [`DeviceIdentity`] token; the field name is kept
//! for compatibility with deployed servers.

mod config;
mod device;
mod error;
mod key;
mod manager;
mod record;
mod revalidation;
pub mod store;
pub mod transport;

pub use config::{LicenseConfig, StorageBackend};
pub use device::{DeviceIdentity, DeviceIdentityProvider, DeviceInfo};
pub use error::{LicenseError, LicenseResult};
pub use key::{ApiBase, LicenseKey};
pub use manager::{LicenseManager, LicenseSnapshot};
pub use record::{
    days_until_expiry, parse_timestamp, LicenseRecord, LicenseStatus, SECS_PER_DAY,
};
pub use revalidation::RevalidationHandle;
pub use store::{FileStore, KeyValueStore, KvLicenseStore, LicenseStore, MemoryStore, SqliteStore};
pub use transport::{
    ActivateOutcome, ActivationGrant, HttpTransport, LicenseGrant, LicenseTransport, Rejection,
    RejectionCode, ValidateOutcome,
};
