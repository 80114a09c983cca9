//! Tierlock configuration.

use crate::ratelimit::RateLimitPolicy;
use crate::remote::RemotePolicy;
use std::time::Duration;

/// Configuration for the licensing engine.
///
/// This struct contains all product-specific settings: key format, the
/// verification key, gating URLs, and the policies for rate limiting,
/// remote confirmation, and network time.
#[derive(Debug, Clone)]
pub struct TierlockConfig {
    /// Product name used in logs and the demo tooling (e.g., "docklet").
    pub product_name: &'static str,

    /// License key prefix including trailing underscore (e.g., "docklet_").
    pub key_prefix: &'static str,

    /// Product Ed25519 public key (hex-encoded, 64 characters).
    /// SECURITY: This should be hard-coded in your application, not from environment.
    pub public_key_hex: &'static str,

    /// Pricing-page path reported to clients on gated features.
    pub upgrade_url: &'static str,

    /// Namespace for persisting the validated license key.
    /// Each product should use a unique namespace to avoid collisions.
    pub store_namespace: &'static str,

    /// License server base URL for remote confirmation (required unless
    /// `remote_policy` is `Disabled`).
    pub license_server_url: Option<&'static str>,

    /// How remote-confirmation failures are treated.
    pub remote_policy: RemotePolicy,

    /// Throttling policy for license validation requests.
    pub rate_limit: RateLimitPolicy,

    /// HTTPS endpoints whose `Date` headers serve as network time references.
    pub time_endpoints: &'static [&'static str],

    /// How often the trusted-time offset is refreshed from the network.
    pub resync_interval: Duration,

    /// Timeout applied to every network call (time fetch, remote confirm).
    pub network_timeout: Duration,
}

impl Default for TierlockConfig {
    fn default() -> Self {
        Self {
            product_name: "tierlock",
            key_prefix: "tierlock_",
            public_key_hex: "",
            upgrade_url: "/pricing",
            store_namespace: "tierlock",
            license_server_url: None,
            remote_policy: RemotePolicy::Disabled,
            rate_limit: RateLimitPolicy::default(),
            time_endpoints: &["https://www.cloudflare.com", "https://www.google.com"],
            resync_interval: Duration::from_secs(15 * 60),
            network_timeout: Duration::from_secs(5),
        }
    }
}

impl TierlockConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), crate::TierlockError> {
        if self.key_prefix.is_empty() {
            return Err(crate::TierlockError::ConfigError(
                "key_prefix cannot be empty".to_string(),
            ));
        }
        if self.public_key_hex.len() != 64 {
            return Err(crate::TierlockError::ConfigError(format!(
                "public_key_hex must be 64 hex characters, got {}",
                self.public_key_hex.len()
            )));
        }
        if self.store_namespace.is_empty() {
            return Err(crate::TierlockError::ConfigError(
                "store_namespace cannot be empty".to_string(),
            ));
        }
        if self.remote_policy != RemotePolicy::Disabled && self.license_server_url.is_none() {
            return Err(crate::TierlockError::ConfigError(
                "license_server_url required when remote confirmation is enabled".to_string(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(crate::TierlockError::ConfigError(
                "rate_limit.max_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
