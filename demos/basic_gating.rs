//! Basic license validation and feature gating example.
//!
//! This example signs a license key with a throwaway test keypair,
//! validates it, and walks through the feature gate at each tier.
//!
//! # Running
//!
//! ```bash
//! cargo run --example basic_gating --features test-seams
//! ```
//!
//! # Note
//!
//! In production, `public_key_hex` should be a compile-time constant
//! embedded in your binary, and keys are signed server-side by the tool
//! that holds the private seed. The `test-seams` signing helpers exist
//! for tests and demos only.

use chrono::{Duration, Utc};
use tierlock::license::key::{encode_key, sign_license};
use tierlock::{
    License, LicenseManager, LicenseTier, MemoryStore, RequestContext, TierlockConfig,
    TierlockError,
};

// Well-known Ed25519 test vector. Never ship this keypair.
const DEMO_SIGNING_SEED: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
const DEMO_PUBLIC_KEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

fn main() {
    // Build configuration with compile-time constants.
    let config = TierlockConfig {
        public_key_hex: DEMO_PUBLIC_KEY,
        ..TierlockConfig::default()
    };

    let manager = match LicenseManager::builder(config)
        .store(Box::new(MemoryStore::new()))
        .build()
    {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Before any key is validated the engine runs on the community tier.
    println!("Initial tier: {}", manager.current_status().tier);
    println!(
        "  markdown_editing enabled: {}",
        manager.is_feature_enabled("markdown_editing")
    );
    println!(
        "  multi_user enabled:       {}",
        manager.is_feature_enabled("multi_user")
    );

    // Mint a professional key the way a licensing backend would.
    let mut license = License {
        id: "lic-demo-0001".to_string(),
        tier: LicenseTier::Professional,
        organization: "Demo Org".to_string(),
        email: "demo@example.com".to_string(),
        max_users: 10,
        features: vec!["api_access".to_string(), "custom_branding".to_string()],
        issued_at: Utc::now(),
        expires_at: Some(Utc::now() + Duration::days(365)),
        signature: String::new(),
    };
    sign_license(&mut license, DEMO_SIGNING_SEED).expect("demo signing");
    let key = encode_key(&license, "tierlock_").expect("demo encoding");
    println!("\nMinted key: {}...", &key[..40.min(key.len())]);

    // Validate it. The pipeline runs rate limiting, decode, signature
    // verification, time-integrity and expiry checks before swapping the
    // active license.
    let ctx = RequestContext::from_peer_addr("203.0.113.7:52114");
    let outcome = manager.validate_license(&key, &ctx);
    match outcome.error {
        None => {
            let status = manager.current_status();
            println!("\n✓ License valid!");
            println!("  Tier:      {}", status.tier);
            println!("  Max users: {}", status.max_users);
            if let Some(expires) = status.expires_at {
                println!("  Expires:   {}", expires);
            }
        }
        Some(TierlockError::RateLimited { retry_after_secs }) => {
            eprintln!("Throttled, retry in {}s", retry_after_secs);
            std::process::exit(1);
        }
        Some(TierlockError::SignatureInvalid) => {
            // Security: someone may be tampering with keys.
            eprintln!("SECURITY: key signature verification failed!");
            std::process::exit(1);
        }
        Some(e) => {
            eprintln!("Validation error: {}", e);
            std::process::exit(1);
        }
    }

    // Walk the gate with the professional license active.
    println!("\nFeature access under {}:", manager.current_status().tier);
    for flag in ["comments", "api_access", "custom_branding", "multi_user"] {
        let access = manager.check_feature_access(flag);
        if access.enabled {
            println!("  ✓ {}", flag);
        } else {
            println!(
                "  ✗ {} — {}",
                flag,
                access.reason.unwrap_or_default()
            );
            if let Some(url) = access.upgrade_url {
                println!("      upgrade at {}", url);
            }
        }
    }
}
