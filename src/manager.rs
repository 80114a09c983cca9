//! License Manager - the main public API for Tierlock.
//!
//! The `LicenseManager` owns the active license and composes the other
//! services into the validation pipeline:
//! 1. Rate-limit check (throttled callers never touch state)
//! 2. Key decode (prefix, base64, JSON)
//! 3. Ed25519 signature verification
//! 4. Time integrity check (reject rather than trust a rolled-back clock)
//! 5. Expiry check against trusted time
//! 6. Optional remote confirmation with graceful fallback
//! 7. Atomic swap of the active license + fire-and-forget persistence
//!
//! Any failure leaves the previous active license untouched; the engine
//! always holds *some* valid license (the community sentinel), so the
//! host platform never hard-fails due to licensing.

use crate::clock::{Clock, SystemClock};
use crate::config::TierlockConfig;
use crate::errors::TierlockError;
use crate::gate::{community_flags, FeatureAccess, FeatureGate};
use crate::license::key::{decode_key, verify_signature};
use crate::license::model::{License, LicenseStatus};
use crate::ratelimit::{client_identifier, RateLimitDecision, RateLimiter};
use crate::remote::{HttpRemoteVerifier, RemotePolicy, RemoteVerifier};
use crate::store::{FileStore, LicenseStore};
use crate::time::protection::{TimeIntegrityReport, TimeProtectionService};
use crate::time::sample::TimeSample;
use crate::time::trusted::{HttpTimeSource, NetworkTimeSource, TrustedTimeService};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Rate-limit action name for the validation endpoint.
const VALIDATE_ACTION: &str = "validate_license";

/// Per-request context supplied by the HTTP collaborator.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Opaque client identifier used for rate limiting.
    pub client_id: String,
}

impl RequestContext {
    /// Build a context from an already-opaque client identifier.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    /// Build a context from a peer address, hashing it into an opaque id.
    pub fn from_peer_addr(peer_addr: &str) -> Self {
        Self {
            client_id: client_identifier(peer_addr),
        }
    }
}

/// Supplies the number of seats currently in use.
///
/// User storage is a host-application concern; the engine only surfaces
/// the count in status snapshots. The default counter reports a single
/// seat.
pub trait UserCounter: Send + Sync {
    /// Seats currently in use.
    fn current_users(&self) -> i64;
}

/// Default counter for single-seat deployments.
struct SingleSeat;

impl UserCounter for SingleSeat {
    fn current_users(&self) -> i64 {
        1
    }
}

/// Structured result of a validation call.
///
/// Failures are values, not panics or bubbled errors: route handlers turn
/// this directly into a `{success, data|error}` JSON response.
#[derive(Debug)]
pub struct ValidationOutcome {
    /// Whether the key validated and is now the active license.
    pub valid: bool,

    /// The validated license (None on failure).
    pub license: Option<License>,

    /// The failure, when `valid` is false.
    pub error: Option<TierlockError>,
}

impl ValidationOutcome {
    fn success(license: License) -> Self {
        Self {
            valid: true,
            license: Some(license),
            error: None,
        }
    }

    fn failure(error: TierlockError) -> Self {
        Self {
            valid: false,
            license: None,
            error: Some(error),
        }
    }

    /// Seconds the caller should wait before retrying, for throttled calls.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self.error {
            Some(TierlockError::RateLimited { retry_after_secs }) => Some(retry_after_secs),
            _ => None,
        }
    }

    /// Client-facing error message, when the validation failed.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// Dependency-injected licensing engine.
///
/// Construct one per process with [`LicenseManager::new`] and share it
/// behind an `Arc` through the request-handling context. Tests inject
/// fakes via [`LicenseManager::builder`].
pub struct LicenseManager {
    config: TierlockConfig,
    active: RwLock<License>,
    rate_limiter: RateLimiter,
    trusted_time: Arc<TrustedTimeService>,
    protection: Arc<TimeProtectionService>,
    gate: FeatureGate,
    remote: Option<Box<dyn RemoteVerifier>>,
    store: Box<dyn LicenseStore>,
    user_counter: Box<dyn UserCounter>,
}

impl LicenseManager {
    /// Create a manager with production wiring from config.
    ///
    /// Restores a previously persisted license key if one validates
    /// locally; otherwise starts on the community sentinel.
    ///
    /// # Errors
    /// Returns an error if configuration validation fails, the store
    /// directory cannot be created, or an HTTP client cannot be built.
    pub fn new(config: TierlockConfig) -> Result<Self, TierlockError> {
        config.validate()?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let mut sources: Vec<Box<dyn NetworkTimeSource>> = Vec::new();
        for endpoint in config.time_endpoints {
            sources.push(Box::new(HttpTimeSource::new(
                endpoint,
                config.network_timeout,
            )?));
        }

        let remote: Option<Box<dyn RemoteVerifier>> = match config.remote_policy {
            RemotePolicy::Disabled => None,
            _ => {
                let url = config.license_server_url.ok_or_else(|| {
                    TierlockError::ConfigError("license server URL is required".to_string())
                })?;
                Some(Box::new(HttpRemoteVerifier::new(
                    url,
                    config.public_key_hex,
                    config.network_timeout,
                )?))
            }
        };

        let store = Box::new(FileStore::new(config.store_namespace)?);

        Self::assemble(config, clock, sources, remote, store, Box::new(SingleSeat))
    }

    /// Builder for tests and embedders that need to inject components.
    pub fn builder(config: TierlockConfig) -> LicenseManagerBuilder {
        LicenseManagerBuilder {
            config,
            clock: None,
            sources: Vec::new(),
            remote: None,
            store: None,
            user_counter: None,
        }
    }

    fn assemble(
        config: TierlockConfig,
        clock: Arc<dyn Clock>,
        sources: Vec<Box<dyn NetworkTimeSource>>,
        remote: Option<Box<dyn RemoteVerifier>>,
        store: Box<dyn LicenseStore>,
        user_counter: Box<dyn UserCounter>,
    ) -> Result<Self, TierlockError> {
        let trusted_time = Arc::new(TrustedTimeService::new(
            clock.clone(),
            sources,
            config.resync_interval,
        ));
        let protection = Arc::new(TimeProtectionService::new(clock.clone()));
        let manager = Self {
            rate_limiter: RateLimiter::new(config.rate_limit, clock),
            trusted_time,
            protection,
            gate: FeatureGate::new(config.upgrade_url),
            active: RwLock::new(License::community()),
            remote,
            store,
            user_counter,
            config,
        };
        manager.restore_from_store();
        Ok(manager)
    }

    /// Validate a license key and, on success, make it the active license.
    pub fn validate_license(&self, key: &str, ctx: &RequestContext) -> ValidationOutcome {
        match self.validate_inner(key, ctx) {
            Ok(license) => ValidationOutcome::success(license),
            Err(error) => {
                debug!(error = %error, "license validation failed");
                ValidationOutcome::failure(error)
            }
        }
    }

    fn validate_inner(&self, key: &str, ctx: &RequestContext) -> Result<License, TierlockError> {
        // 1. Throttle before touching anything else.
        let decision = self.rate_limiter.check(&ctx.client_id, VALIDATE_ACTION);
        if !decision.allowed {
            return Err(TierlockError::RateLimited {
                retry_after_secs: decision.retry_after_secs(),
            });
        }

        // 2-3. Decode and authenticate the key.
        let license = decode_key(key, self.config.key_prefix)?;
        verify_signature(&license, self.config.public_key_hex)?;

        // 4. Refuse to trust "now" while the clock looks tampered.
        let (sample, integrity) = self.observe_time();
        if !integrity.safe {
            warn!(issues = ?integrity.issues, "rejecting validation on unsafe clock");
            return Err(TierlockError::TimeIntegrity);
        }

        // 5. Expiry against trusted time, not the raw system clock.
        if license.is_expired(sample.value) {
            return Err(TierlockError::Expired);
        }

        // 6. Remote confirmation, per policy.
        self.confirm_remote(&license)?;

        // 7. Swap the active license, then persist fire-and-forget.
        {
            let mut active = self.active.write().expect("license lock");
            *active = license.clone();
        }
        info!(license_id = %license.id, tier = %license.tier, "license activated");
        if let Err(e) = self.store.save(key) {
            warn!(error = %e, "failed to persist validated license");
        }

        Ok(license)
    }

    fn confirm_remote(&self, license: &License) -> Result<(), TierlockError> {
        let Some(verifier) = self.remote.as_ref() else {
            return Ok(());
        };

        match verifier.confirm(license) {
            Ok(confirmation) if confirmation.revoked => Err(TierlockError::Revoked),
            Ok(confirmation) if !confirmation.confirmed => {
                debug!(license_id = %license.id, "server did not confirm license");
                Err(TierlockError::Revoked)
            }
            Ok(_) => Ok(()),
            Err(TierlockError::RemoteUnreachable(detail)) => {
                match self.config.remote_policy {
                    RemotePolicy::Required => Err(TierlockError::RemoteUnreachable(detail)),
                    _ => {
                        warn!(
                            detail = %detail,
                            "license server unreachable, degrading to local validation"
                        );
                        Ok(())
                    }
                }
            }
            Err(other) => Err(other),
        }
    }

    /// Pull a trusted-time sample and feed it to the anomaly detector.
    fn observe_time(&self) -> (TimeSample, TimeIntegrityReport) {
        let sample = self.trusted_time.trusted_now();
        self.protection.observe(&sample);
        (sample, self.protection.check_integrity())
    }

    /// The active license (community sentinel if none validated).
    pub fn current_license(&self) -> License {
        self.active.read().expect("license lock").clone()
    }

    /// Derived read-only status snapshot of the active license.
    ///
    /// Reads use the cached time offset only, so they never wait on a
    /// network resync.
    pub fn current_status(&self) -> LicenseStatus {
        let license = self.current_license();
        let now = self.trusted_time.cached_now().value;
        LicenseStatus::derive(&license, now, self.user_counter.current_users())
    }

    /// Whether the named flag is granted by the active license or is a
    /// universal community feature.
    ///
    /// An expired paid license is treated as community: only its universal
    /// flags survive.
    pub fn has_feature(&self, flag: &str) -> bool {
        if community_flags().contains(&flag) {
            return true;
        }
        let license = self.current_license();
        let now = self.trusted_time.cached_now().value;
        license.is_valid(now) && license.grants(flag)
    }

    /// Whether the feature gate enables `flag` under the active license.
    pub fn is_feature_enabled(&self, flag: &str) -> bool {
        self.check_feature_access(flag).enabled
    }

    /// Full gate decision for `flag`, including upgrade prompt data.
    ///
    /// Like `current_status`, never waits on a network resync.
    pub fn check_feature_access(&self, flag: &str) -> FeatureAccess {
        let license = self.current_license();
        let now = self.trusted_time.cached_now().value;
        self.gate
            .check_access(flag, license.tier, license.is_valid(now))
    }

    /// Run a rate-limit check for an arbitrary action without validating.
    ///
    /// For route handlers that throttle other license endpoints and need
    /// the decision for response headers.
    pub fn check_rate_limit(&self, ctx: &RequestContext, action: &str) -> RateLimitDecision {
        self.rate_limiter.check(&ctx.client_id, action)
    }

    /// Time-protection integrity report, for diagnostics endpoints.
    pub fn time_integrity(&self) -> TimeIntegrityReport {
        let sample = self.trusted_time.trusted_now();
        self.protection.observe(&sample);
        self.protection.check_integrity()
    }

    /// Drop back to the community sentinel and clear the persisted key.
    pub fn deactivate(&self) -> Result<(), TierlockError> {
        {
            let mut active = self.active.write().expect("license lock");
            *active = License::community();
        }
        info!("license deactivated, falling back to community");
        self.store.clear()
    }

    /// Get the current configuration.
    pub fn config(&self) -> &TierlockConfig {
        &self.config
    }

    /// Try to restore a persisted key; any failure leaves the community
    /// sentinel active.
    fn restore_from_store(&self) {
        let key = match self.store.load() {
            Ok(Some(key)) => key,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read persisted license");
                return;
            }
        };

        // Local-only revalidation: no rate limit, no remote round-trip.
        let restored = decode_key(&key, self.config.key_prefix)
            .and_then(|license| {
                verify_signature(&license, self.config.public_key_hex)?;
                Ok(license)
            })
            .and_then(|license| {
                let (sample, _) = self.observe_time();
                if license.is_expired(sample.value) {
                    Err(TierlockError::Expired)
                } else {
                    Ok(license)
                }
            });

        match restored {
            Ok(license) => {
                info!(license_id = %license.id, tier = %license.tier, "restored persisted license");
                *self.active.write().expect("license lock") = license;
            }
            Err(e) => {
                warn!(error = %e, "persisted license no longer valid, using community");
            }
        }
    }
}

/// Builder injecting non-default components (tests, embedders).
pub struct LicenseManagerBuilder {
    config: TierlockConfig,
    clock: Option<Arc<dyn Clock>>,
    sources: Vec<Box<dyn NetworkTimeSource>>,
    remote: Option<Box<dyn RemoteVerifier>>,
    store: Option<Box<dyn LicenseStore>>,
    user_counter: Option<Box<dyn UserCounter>>,
}

impl LicenseManagerBuilder {
    /// Use a custom clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use custom network time sources.
    pub fn time_sources(mut self, sources: Vec<Box<dyn NetworkTimeSource>>) -> Self {
        self.sources = sources;
        self
    }

    /// Use a custom remote verifier.
    pub fn remote(mut self, remote: Box<dyn RemoteVerifier>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Use a custom license store.
    pub fn store(mut self, store: Box<dyn LicenseStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom seat counter backed by the host's user storage.
    pub fn user_counter(mut self, counter: Box<dyn UserCounter>) -> Self {
        self.user_counter = Some(counter);
        self
    }

    /// Assemble the manager.
    ///
    /// # Errors
    /// Returns an error if configuration validation fails or a default
    /// component cannot be constructed.
    pub fn build(self) -> Result<LicenseManager, TierlockError> {
        self.config.validate()?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Box<dyn LicenseStore> = match self.store {
            Some(store) => store,
            None => Box::new(FileStore::new(self.config.store_namespace)?),
        };
        let user_counter = self.user_counter.unwrap_or_else(|| Box::new(SingleSeat));
        LicenseManager::assemble(
            self.config,
            clock,
            self.sources,
            self.remote,
            store,
            user_counter,
        )
    }
}
