//! Tierlock error types.

use thiserror::Error;

/// Errors that can occur during license validation and feature gating.
///
/// Client-facing variants carry deliberately generic messages; diagnostic
/// detail stays server-side in `tracing` output.
#[derive(Debug, Error)]
pub enum TierlockError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Too many validation attempts from one client (HTTP 429 class).
    #[error("Too many validation attempts, retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until the client may retry.
        retry_after_secs: u64,
    },

    /// License key could not be decoded (bad prefix, base64, or JSON).
    #[error("Invalid license format")]
    InvalidFormat,

    /// License signature verification failed.
    #[error("License signature verification failed")]
    SignatureInvalid,

    /// License is past its expiry date.
    #[error("License expired")]
    Expired,

    /// The local clock cannot be trusted for expiry checks.
    #[error("Time integrity check failed, please resync system time")]
    TimeIntegrity,

    /// License server unreachable (retryable, never "invalid").
    #[error("License server unreachable: {0}")]
    RemoteUnreachable(String),

    /// License server rejected or revoked the license.
    #[error("License has been revoked")]
    Revoked,

    /// Network time source failed.
    #[error("Time source error: {0}")]
    TimeSource(String),

    /// License store I/O error.
    #[error("Store I/O error: {0}")]
    StoreIO(String),
}

impl TierlockError {
    /// Whether the caller may retry without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TierlockError::RateLimited { .. } | TierlockError::RemoteUnreachable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        let err = TierlockError::RateLimited {
            retry_after_secs: 30,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn signature_failure_is_not_retryable() {
        assert!(!TierlockError::SignatureInvalid.is_retryable());
    }

    #[test]
    fn messages_do_not_leak_internals() {
        let msg = TierlockError::InvalidFormat.to_string();
        assert_eq!(msg, "Invalid license format");
    }
}
