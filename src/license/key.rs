//! License key codec and Ed25519 signature verification.
//!
//! Key format: a fixed product prefix followed by the base64-encoded JSON
//! license payload. The signature covers the canonical serialization of
//! every field except `signature` itself.
//!
//! Decode failures all map to the generic `InvalidFormat` error; what
//! actually went wrong is logged at debug level only, so parser internals
//! never leak to clients.

use crate::errors::TierlockError;
use crate::license::model::{License, LicenseTier};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Decode a license key into an (unverified) `License`.
///
/// Strips the product prefix, base64-decodes, and JSON-parses. The result
/// still needs `verify_signature` before it may be trusted.
pub fn decode_key(key: &str, prefix: &str) -> Result<License, TierlockError> {
    let encoded = key.strip_prefix(prefix).ok_or_else(|| {
        debug!("license key missing product prefix");
        TierlockError::InvalidFormat
    })?;

    let raw = STANDARD.decode(encoded.trim()).map_err(|e| {
        debug!(error = %e, "license key is not valid base64");
        TierlockError::InvalidFormat
    })?;

    let license: License = serde_json::from_slice(&raw).map_err(|e| {
        debug!(error = %e, "license payload is not valid JSON");
        TierlockError::InvalidFormat
    })?;

    Ok(license)
}

/// Canonical view of a license for signing: every field except `signature`,
/// in fixed order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SigningPayload<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    tier: LicenseTier,
    organization: &'a str,
    email: &'a str,
    max_users: i64,
    features: &'a [String],
    issued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Canonical bytes the license signature covers.
pub fn signing_bytes(license: &License) -> Result<Vec<u8>, TierlockError> {
    let payload = SigningPayload {
        id: &license.id,
        tier: license.tier,
        organization: &license.organization,
        email: &license.email,
        max_users: license.max_users,
        features: &license.features,
        issued_at: license.issued_at,
        expires_at: license.expires_at,
    };
    serde_json::to_vec(&payload).map_err(|e| {
        debug!(error = %e, "failed to serialize signing payload");
        TierlockError::InvalidFormat
    })
}

/// Cache for decoded verifying keys.
static KEY_CACHE: OnceCell<RwLock<HashMap<String, VerifyingKey>>> = OnceCell::new();

/// Decode a hex-encoded Ed25519 public key.
///
/// The key is cached after first decode for performance.
pub fn decode_public_key(hex_key: &str) -> Result<VerifyingKey, TierlockError> {
    let cache = KEY_CACHE.get_or_init(|| RwLock::new(HashMap::new()));
    if let Ok(guard) = cache.read() {
        if let Some(key) = guard.get(hex_key) {
            return Ok(*key);
        }
    }

    let bytes = hex::decode(hex_key)
        .map_err(|e| TierlockError::ConfigError(format!("Invalid public key hex: {}", e)))?;

    let key_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| TierlockError::ConfigError("Public key must be 32 bytes".to_string()))?;

    let verifying_key = VerifyingKey::from_bytes(&key_array)
        .map_err(|e| TierlockError::ConfigError(format!("Invalid Ed25519 public key: {}", e)))?;

    // Best-effort insert. If locking fails, still return the decoded key.
    if let Ok(mut guard) = cache.write() {
        guard.insert(hex_key.to_string(), verifying_key);
    }

    Ok(verifying_key)
}

/// Verify a license's Ed25519 signature against the product public key.
pub fn verify_signature(license: &License, public_key_hex: &str) -> Result<(), TierlockError> {
    let sig_bytes = STANDARD.decode(&license.signature).map_err(|e| {
        debug!(error = %e, "license signature is not valid base64");
        TierlockError::SignatureInvalid
    })?;

    let sig_array: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| TierlockError::SignatureInvalid)?;
    let signature = Signature::from_bytes(&sig_array);

    let verifying_key = decode_public_key(public_key_hex)?;
    let message = signing_bytes(license)?;

    verifying_key.verify(&message, &signature).map_err(|e| {
        debug!(license_id = %license.id, error = %e, "license signature mismatch");
        TierlockError::SignatureInvalid
    })?;

    Ok(())
}

/// Sign a license in place with a hex-encoded Ed25519 seed.
///
/// Key-issuance seam for tests and fixture tooling; production binaries
/// only ever verify.
#[cfg(any(test, feature = "test-seams"))]
pub fn sign_license(license: &mut License, signing_seed_hex: &str) -> Result<(), TierlockError> {
    use ed25519_dalek::{Signer, SigningKey};

    let seed = hex::decode(signing_seed_hex)
        .map_err(|e| TierlockError::ConfigError(format!("Invalid signing seed hex: {}", e)))?;
    let seed: [u8; 32] = seed
        .try_into()
        .map_err(|_| TierlockError::ConfigError("Signing seed must be 32 bytes".to_string()))?;

    let signing_key = SigningKey::from_bytes(&seed);
    let message = signing_bytes(license)?;
    license.signature = STANDARD.encode(signing_key.sign(&message).to_bytes());
    Ok(())
}

/// Encode a license as a prefixed key string.
#[cfg(any(test, feature = "test-seams"))]
pub fn encode_key(license: &License, prefix: &str) -> Result<String, TierlockError> {
    let json = serde_json::to_vec(license).map_err(|_| TierlockError::InvalidFormat)?;
    Ok(format!("{}{}", prefix, STANDARD.encode(json)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Well-known Ed25519 test vector (DO NOT USE IN PRODUCTION)
    const TEST_SIGNING_SEED_HEX: &str =
        "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const TEST_PUBLIC_KEY_HEX: &str =
        "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    fn enterprise_license() -> License {
        License {
            id: "lic-ent-1".to_string(),
            tier: LicenseTier::Enterprise,
            organization: "Acme".to_string(),
            email: "ops@acme.test".to_string(),
            max_users: -1,
            features: vec!["multi_user".to_string(), "sso_integration".to_string()],
            issued_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            expires_at: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            signature: String::new(),
        }
    }

    fn signed_key() -> String {
        let mut license = enterprise_license();
        sign_license(&mut license, TEST_SIGNING_SEED_HEX).unwrap();
        encode_key(&license, "tierlock_").unwrap()
    }

    #[test]
    fn signed_key_round_trips_exactly() {
        let mut license = enterprise_license();
        sign_license(&mut license, TEST_SIGNING_SEED_HEX).unwrap();
        let key = encode_key(&license, "tierlock_").unwrap();

        let decoded = decode_key(&key, "tierlock_").unwrap();
        assert_eq!(decoded, license);
        assert!(verify_signature(&decoded, TEST_PUBLIC_KEY_HEX).is_ok());
    }

    #[test]
    fn missing_prefix_is_a_format_error() {
        let key = signed_key();
        let stripped = key.strip_prefix("tierlock_").unwrap();
        let result = decode_key(stripped, "tierlock_");
        assert!(matches!(result, Err(TierlockError::InvalidFormat)));
    }

    #[test]
    fn garbage_base64_is_a_format_error() {
        let result = decode_key("tierlock_!!!not-base64!!!", "tierlock_");
        assert!(matches!(result, Err(TierlockError::InvalidFormat)));
    }

    #[test]
    fn non_json_payload_is_a_format_error() {
        let key = format!("tierlock_{}", STANDARD.encode(b"not json"));
        let result = decode_key(&key, "tierlock_");
        assert!(matches!(result, Err(TierlockError::InvalidFormat)));
    }

    #[test]
    fn tampered_field_fails_verification() {
        let key = signed_key();
        let mut decoded = decode_key(&key, "tierlock_").unwrap();
        decoded.max_users = 10_000;

        let result = verify_signature(&decoded, TEST_PUBLIC_KEY_HEX);
        assert!(matches!(result, Err(TierlockError::SignatureInvalid)));
    }

    #[test]
    fn tampered_signature_bytes_fail_verification() {
        let key = signed_key();
        let mut decoded = decode_key(&key, "tierlock_").unwrap();
        decoded.signature = STANDARD.encode([0u8; 64]);

        let result = verify_signature(&decoded, TEST_PUBLIC_KEY_HEX);
        assert!(matches!(result, Err(TierlockError::SignatureInvalid)));
    }

    #[test]
    fn empty_signature_fails_verification() {
        let license = enterprise_license();
        let result = verify_signature(&license, TEST_PUBLIC_KEY_HEX);
        assert!(matches!(result, Err(TierlockError::SignatureInvalid)));
    }

    #[test]
    fn signing_bytes_exclude_the_signature_field() {
        let mut license = enterprise_license();
        let before = signing_bytes(&license).unwrap();
        license.signature = "anything".to_string();
        let after = signing_bytes(&license).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn decode_public_key_rejects_bad_hex() {
        let result = decode_public_key("not-valid-hex");
        assert!(matches!(result, Err(TierlockError::ConfigError(_))));
    }

    #[test]
    fn decode_public_key_rejects_wrong_length() {
        let result = decode_public_key("0000");
        assert!(matches!(result, Err(TierlockError::ConfigError(_))));
    }
}
