//! # Tierlock
//!
//! Hardened license validation and feature gating for tiered products.
//!
//! Tierlock decodes signed license keys, verifies them with Ed25519
//! against an embedded public key, checks expiry against network-trusted
//! time, defends against clock tampering, throttles validation attempts,
//! and gates feature flags by license tier. When no paid license is
//! active, the engine runs on a built-in community license so the host
//! application never hard-fails.
//!
//! ## Quick start
//!
//! ```no_run
//! use tierlock::{LicenseManager, RequestContext, TierlockConfig};
//!
//! let manager = LicenseManager::new(TierlockConfig {
//!     public_key_hex: "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a",
//!     ..TierlockConfig::default()
//! })?;
//!
//! let ctx = RequestContext::from_peer_addr("203.0.113.7:52114");
//! let outcome = manager.validate_license("tierlock_eyJpZCI6...", &ctx);
//! if outcome.valid {
//!     println!("activated: {}", manager.current_status().tier);
//! }
//!
//! if manager.is_feature_enabled("multi_user") {
//!     // unlock collaborative editing
//! }
//! # Ok::<(), tierlock::TierlockError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`manager::LicenseManager`]: validation pipeline and active license
//! - [`license`]: key codec, Ed25519 verification, license model
//! - [`gate`]: feature flag registry and tier gating
//! - [`time`]: trusted time, clock anomaly detection
//! - [`ratelimit`]: sliding-window throttle for validation endpoints
//! - [`remote`]: optional server-side confirmation
//! - [`store`]: persisted license key
//!
//! All components are dependency-injected; there is no global state.
//! Construct one `LicenseManager` per process and share it behind an
//! `Arc`.

#![deny(warnings)]
#![deny(missing_docs)]

pub mod clock;
pub mod config;
pub mod errors;
pub mod gate;
pub mod license;
pub mod manager;
pub mod ratelimit;
pub mod remote;
pub mod store;
pub mod time;

pub use clock::{Clock, SystemClock};
pub use config::TierlockConfig;
pub use errors::TierlockError;
pub use gate::{Feature, FeatureAccess, FeatureGate};
pub use license::model::{License, LicenseStatus, LicenseTier};
pub use manager::{LicenseManager, RequestContext, UserCounter, ValidationOutcome};
pub use ratelimit::{RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use remote::{RemoteConfirmation, RemotePolicy, RemoteVerifier};
pub use store::{FileStore, LicenseStore, MemoryStore};
pub use time::protection::{TimeIntegrityReport, TimeProtectionService};
pub use time::trusted::{TimeSyncStatus, TrustedTimeService};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
