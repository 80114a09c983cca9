//! License data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// License tier, ordered community < professional < enterprise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseTier {
    /// Free tier, always available.
    Community,
    /// Paid single-team tier.
    Professional,
    /// Paid organization tier.
    Enterprise,
}

impl fmt::Display for LicenseTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LicenseTier::Community => "community",
            LicenseTier::Professional => "professional",
            LicenseTier::Enterprise => "enterprise",
        };
        f.write_str(name)
    }
}

/// A signed, time-bounded grant of feature access at a given tier.
///
/// Valid iff the signature verifies and `expires_at` is absent or in the
/// future per trusted time. The community sentinel carries no signature
/// and is always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct License {
    /// Opaque license identifier.
    pub id: String,

    /// Tier granted by this license.
    #[serde(rename = "type")]
    pub tier: LicenseTier,

    /// Organization display name.
    pub organization: String,

    /// Contact email.
    pub email: String,

    /// Seat limit, -1 meaning unlimited.
    pub max_users: i64,

    /// Feature flags granted by this license.
    pub features: Vec<String>,

    /// When the license was issued.
    pub issued_at: DateTime<Utc>,

    /// Expiry; absent means perpetual.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Base64 Ed25519 signature over the canonical payload.
    #[serde(default)]
    pub signature: String,
}

impl License {
    /// The community fallback sentinel.
    ///
    /// The platform always has *some* valid license; this is the value the
    /// engine holds when no signed key has been validated.
    pub fn community() -> Self {
        Self {
            id: "community".to_string(),
            tier: LicenseTier::Community,
            organization: "Community Edition".to_string(),
            email: String::new(),
            max_users: 1,
            features: crate::gate::community_flags()
                .iter()
                .map(|f| (*f).to_string())
                .collect(),
            issued_at: DateTime::<Utc>::UNIX_EPOCH,
            expires_at: None,
            signature: String::new(),
        }
    }

    /// Whether this is the community sentinel.
    pub fn is_community(&self) -> bool {
        self.tier == LicenseTier::Community
    }

    /// Whether the license has expired as of `now` (trusted time).
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => expiry <= now,
            None => false,
        }
    }

    /// Whether the license is currently usable.
    ///
    /// Signature validity is established at decode time; here only the
    /// temporal bound is re-checked against trusted time.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }

    /// Whether this license grants the named feature flag.
    pub fn grants(&self, flag: &str) -> bool {
        self.features.iter().any(|f| f == flag)
    }
}

/// Derived read-only snapshot of the active license.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseStatus {
    /// Whether the active license is currently valid.
    pub is_valid: bool,

    /// Tier of the active license.
    #[serde(rename = "type")]
    pub tier: LicenseTier,

    /// Feature flags granted.
    pub features: Vec<String>,

    /// Seat limit, -1 meaning unlimited.
    pub max_users: i64,

    /// Seats currently in use, per the host's user storage.
    pub current_users: i64,

    /// Expiry of the active license, if bounded.
    pub expires_at: Option<DateTime<Utc>>,

    /// Convenience tier flags for route handlers.
    pub is_enterprise: bool,
    /// True for the professional tier.
    pub is_professional: bool,
    /// True for the community tier.
    pub is_community: bool,
}

impl LicenseStatus {
    /// Build a snapshot of `license` as of `now` (trusted time).
    ///
    /// `current_users` comes from the host's user storage; the engine
    /// only reports it.
    pub fn derive(license: &License, now: DateTime<Utc>, current_users: i64) -> Self {
        Self {
            is_valid: license.is_valid(now),
            tier: license.tier,
            features: license.features.clone(),
            max_users: license.max_users,
            current_users,
            expires_at: license.expires_at,
            is_enterprise: license.tier == LicenseTier::Enterprise,
            is_professional: license.tier == LicenseTier::Professional,
            is_community: license.tier == LicenseTier::Community,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bounded_license(expires_at: DateTime<Utc>) -> License {
        License {
            id: "lic-1".to_string(),
            tier: LicenseTier::Enterprise,
            organization: "Acme".to_string(),
            email: "ops@acme.test".to_string(),
            max_users: 50,
            features: vec!["multi_user".to_string()],
            issued_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            expires_at: Some(expires_at),
            signature: "sig".to_string(),
        }
    }

    #[test]
    fn community_sentinel_is_always_valid() {
        let license = License::community();
        assert!(license.is_community());
        assert!(license.is_valid(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()));
        assert!(license.signature.is_empty());
    }

    #[test]
    fn expiry_is_checked_against_supplied_now() {
        let expiry = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let license = bounded_license(expiry);

        assert!(!license.is_expired(Utc.with_ymd_and_hms(2025, 5, 31, 0, 0, 0).unwrap()));
        assert!(license.is_expired(expiry));
        assert!(license.is_expired(Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn perpetual_license_never_expires() {
        let mut license = bounded_license(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        license.expires_at = None;
        assert!(!license.is_expired(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn status_snapshot_reflects_tier_flags() {
        let expiry = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let license = bounded_license(expiry);
        let status =
            LicenseStatus::derive(&license, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(), 7);

        assert!(status.is_valid);
        assert!(status.is_enterprise);
        assert!(!status.is_professional);
        assert!(!status.is_community);
        assert_eq!(status.max_users, 50);
        assert_eq!(status.current_users, 7);
    }

    #[test]
    fn status_snapshot_of_expired_license_is_invalid() {
        let expiry = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let license = bounded_license(expiry);
        let status =
            LicenseStatus::derive(&license, Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(), 1);

        assert!(!status.is_valid);
        assert!(status.is_enterprise);
    }

    #[test]
    fn wire_serialization_uses_camel_case_and_type() {
        let license = License::community();
        let json = serde_json::to_value(&license).unwrap();
        assert_eq!(json["type"], "community");
        assert!(json.get("maxUsers").is_some());
        assert!(json.get("issuedAt").is_some());
        assert!(json.get("expiresAt").is_none()); // perpetual => omitted
    }
}
