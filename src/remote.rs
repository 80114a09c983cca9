//! Remote license confirmation (revocation / fraud checks).
//!
//! The remote check is a capability-injected strategy, so tests can
//! script a verifier without sockets. Depending on policy, an unreachable
//! server either degrades to local-only validation or surfaces as a
//! retryable error, never as "invalid".
//!
//! Server responses are Ed25519-signed and verified before their
//! `confirmed`/`revoked` verdicts are trusted.

use crate::errors::TierlockError;
use crate::license::key::decode_public_key;
use crate::license::model::License;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// How remote-confirmation failures are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePolicy {
    /// Never contact the license server; local validation only.
    Disabled,
    /// Contact the server, but degrade to local-only when unreachable.
    BestEffort,
    /// Validation fails (retryably) when the server is unreachable.
    Required,
}

/// A verified confirmation verdict from the license server.
#[derive(Debug, Clone)]
pub struct RemoteConfirmation {
    /// Server confirmed the license as known and in good standing.
    pub confirmed: bool,

    /// Server marked the license as revoked.
    pub revoked: bool,

    /// Server-side check timestamp.
    pub checked_at: DateTime<Utc>,
}

/// Remote confirmation strategy.
pub trait RemoteVerifier: Send + Sync {
    /// Confirm a locally-verified license with the license server.
    fn confirm(&self, license: &License) -> Result<RemoteConfirmation, TierlockError>;
}

/// Wire format of the server's confirmation response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationResponse {
    license_id: String,
    confirmed: bool,
    revoked: bool,
    checked_at: DateTime<Utc>,
    signature: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationRequest<'a> {
    license_id: &'a str,
    organization: &'a str,
}

/// The string the server signs over a confirmation verdict.
pub fn confirmation_signing_string(
    license_id: &str,
    confirmed: bool,
    revoked: bool,
    checked_at: DateTime<Utc>,
) -> String {
    format!(
        "license-confirmation\nid: {}\nconfirmed: {}\nrevoked: {}\nchecked-at: {}",
        license_id,
        confirmed,
        revoked,
        checked_at.to_rfc3339()
    )
}

/// Verify a confirmation response signature and extract the verdict.
pub fn verify_confirmation(
    body: &[u8],
    expected_license_id: &str,
    public_key_hex: &str,
) -> Result<RemoteConfirmation, TierlockError> {
    let response: ConfirmationResponse = serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "malformed confirmation response");
        TierlockError::RemoteUnreachable("malformed server response".to_string())
    })?;

    if response.license_id != expected_license_id {
        debug!("confirmation response is for a different license");
        return Err(TierlockError::SignatureInvalid);
    }

    let sig_bytes = STANDARD
        .decode(&response.signature)
        .map_err(|_| TierlockError::SignatureInvalid)?;
    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| TierlockError::SignatureInvalid)?;
    let signature = Signature::from_bytes(&sig_array);

    let signing_string = confirmation_signing_string(
        &response.license_id,
        response.confirmed,
        response.revoked,
        response.checked_at,
    );

    let verifying_key = decode_public_key(public_key_hex)?;
    verifying_key
        .verify(signing_string.as_bytes(), &signature)
        .map_err(|_| TierlockError::SignatureInvalid)?;

    Ok(RemoteConfirmation {
        confirmed: response.confirmed,
        revoked: response.revoked,
        checked_at: response.checked_at,
    })
}

/// Production verifier talking to the license server over HTTPS.
pub struct HttpRemoteVerifier {
    client: reqwest::blocking::Client,
    base_url: String,
    public_key_hex: String,
}

impl HttpRemoteVerifier {
    /// Create a verifier for the given server, with a short timeout.
    pub fn new(
        base_url: &str,
        public_key_hex: &str,
        timeout: Duration,
    ) -> Result<Self, TierlockError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                TierlockError::RemoteUnreachable(format!("Failed to build client: {}", e))
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            public_key_hex: public_key_hex.to_string(),
        })
    }
}

impl RemoteVerifier for HttpRemoteVerifier {
    fn confirm(&self, license: &License) -> Result<RemoteConfirmation, TierlockError> {
        let url = format!("{}/v1/licenses/confirm", self.base_url);
        let request = ConfirmationRequest {
            license_id: &license.id,
            organization: &license.organization,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| TierlockError::RemoteUnreachable(format!("Request failed: {}", e)))?;

        let body = response
            .bytes()
            .map_err(|e| TierlockError::RemoteUnreachable(format!("Failed to read body: {}", e)))?;

        verify_confirmation(&body, &license.id, &self.public_key_hex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    // Well-known Ed25519 test vector (DO NOT USE IN PRODUCTION)
    const TEST_SIGNING_SEED_HEX: &str =
        "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const TEST_PUBLIC_KEY_HEX: &str =
        "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    fn signed_response(license_id: &str, confirmed: bool, revoked: bool) -> Vec<u8> {
        let checked_at: DateTime<Utc> = "2025-01-15T12:00:00Z".parse().unwrap();
        let seed: [u8; 32] = hex::decode(TEST_SIGNING_SEED_HEX)
            .unwrap()
            .try_into()
            .unwrap();
        let signing_key = SigningKey::from_bytes(&seed);
        let signing_string =
            confirmation_signing_string(license_id, confirmed, revoked, checked_at);
        let signature = STANDARD.encode(signing_key.sign(signing_string.as_bytes()).to_bytes());

        serde_json::to_vec(&serde_json::json!({
            "licenseId": license_id,
            "confirmed": confirmed,
            "revoked": revoked,
            "checkedAt": checked_at.to_rfc3339(),
            "signature": signature,
        }))
        .unwrap()
    }

    #[test]
    fn well_signed_confirmation_verifies() {
        let body = signed_response("lic-1", true, false);
        let confirmation = verify_confirmation(&body, "lic-1", TEST_PUBLIC_KEY_HEX).unwrap();
        assert!(confirmation.confirmed);
        assert!(!confirmation.revoked);
    }

    #[test]
    fn revoked_verdict_passes_signature_check() {
        let body = signed_response("lic-1", false, true);
        let confirmation = verify_confirmation(&body, "lic-1", TEST_PUBLIC_KEY_HEX).unwrap();
        assert!(confirmation.revoked);
    }

    #[test]
    fn tampered_verdict_fails_signature_check() {
        let body = signed_response("lic-1", false, true);
        // Flip the revoked flag without re-signing.
        let tampered = String::from_utf8(body)
            .unwrap()
            .replace("\"revoked\":true", "\"revoked\":false");

        let result = verify_confirmation(tampered.as_bytes(), "lic-1", TEST_PUBLIC_KEY_HEX);
        assert!(matches!(result, Err(TierlockError::SignatureInvalid)));
    }

    #[test]
    fn response_for_other_license_is_rejected() {
        let body = signed_response("lic-other", true, false);
        let result = verify_confirmation(&body, "lic-1", TEST_PUBLIC_KEY_HEX);
        assert!(matches!(result, Err(TierlockError::SignatureInvalid)));
    }

    #[test]
    fn malformed_body_is_a_retryable_error() {
        let result = verify_confirmation(b"not json", "lic-1", TEST_PUBLIC_KEY_HEX);
        assert!(matches!(result, Err(TierlockError::RemoteUnreachable(_))));
    }

    #[test]
    fn signing_string_is_stable() {
        let checked_at: DateTime<Utc> = "2025-01-15T12:00:00Z".parse().unwrap();
        let s = confirmation_signing_string("lic-1", true, false, checked_at);
        assert_eq!(
            s,
            "license-confirmation\nid: lic-1\nconfirmed: true\nrevoked: false\nchecked-at: 2025-01-15T12:00:00+00:00"
        );
    }
}
