//! Public-surface tests that run without any feature flags.

use tempfile::tempdir;
use tierlock::store::LicenseStore;
use tierlock::{
    FileStore, LicenseManager, LicenseTier, MemoryStore, RequestContext, TierlockConfig,
    TierlockError,
};

// Public half of an RFC 8032 test vector; any 64-hex key satisfies config.
const PUBLIC_KEY_HEX: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

fn config() -> TierlockConfig {
    TierlockConfig {
        public_key_hex: PUBLIC_KEY_HEX,
        time_endpoints: &[],
        ..TierlockConfig::default()
    }
}

fn manager_with_memory_store() -> LicenseManager {
    LicenseManager::builder(config())
        .store(Box::new(MemoryStore::new()))
        .build()
        .expect("manager builds")
}

#[test]
fn default_config_requires_a_public_key() {
    assert!(matches!(
        TierlockConfig::default().validate(),
        Err(TierlockError::ConfigError(_))
    ));
    config().validate().expect("keyed config");
}

#[test]
fn remote_policy_requires_server_url() {
    let bad = TierlockConfig {
        remote_policy: tierlock::RemotePolicy::Required,
        license_server_url: None,
        ..config()
    };
    assert!(matches!(bad.validate(), Err(TierlockError::ConfigError(_))));
}

#[test]
fn fresh_manager_runs_on_community() {
    let manager = manager_with_memory_store();
    let status = manager.current_status();
    assert_eq!(status.tier, LicenseTier::Community);
    assert!(status.is_valid);
    assert!(manager.has_feature("markdown_editing"));
    assert!(!manager.has_feature("sso_integration"));
}

#[test]
fn garbage_key_is_rejected_with_generic_error() {
    let manager = manager_with_memory_store();
    let ctx = RequestContext::from_peer_addr("203.0.113.7:52114");
    let outcome = manager.validate_license("not-a-license", &ctx);
    assert!(!outcome.valid);
    assert!(matches!(outcome.error, Some(TierlockError::InvalidFormat)));
}

#[test]
fn unknown_feature_flag_is_disabled_with_reason() {
    let manager = manager_with_memory_store();
    let access = manager.check_feature_access("time_travel");
    assert!(!access.enabled);
    assert!(access.reason.is_some());
}

#[test]
fn file_store_round_trips_a_key() {
    let dir = tempdir().expect("tempdir");
    let store = FileStore::at_path(dir.path().join("license.key")).expect("store");

    assert!(store.load().expect("load").is_none());
    store.save("tierlock_abc123").expect("save");
    assert_eq!(store.load().expect("load").as_deref(), Some("tierlock_abc123"));
    store.clear().expect("clear");
    assert!(store.load().expect("load").is_none());
}
