//! Tier-based feature gating.
//!
//! A closed enum of known feature flags plus a static requirement table.
//! Unknown flags resolve to "disabled, unrecognized feature" rather than
//! an error, so route middleware can pass user-supplied flag names through
//! unchecked.

use crate::license::model::LicenseTier;
use serde::Serialize;

/// All tiers from `professional` up.
const PROFESSIONAL_UP: &[LicenseTier] = &[LicenseTier::Professional, LicenseTier::Enterprise];

/// Enterprise only.
const ENTERPRISE_ONLY: &[LicenseTier] = &[LicenseTier::Enterprise];

/// Always enabled, any tier.
const ANY_TIER: &[LicenseTier] = &[];

/// Known feature flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Core Markdown editing (community).
    MarkdownEditing,
    /// Inline comments on documents (community).
    Comments,
    /// Text annotations (community).
    Annotations,
    /// REST API access (professional+).
    ApiAccess,
    /// Custom branding and theming (professional+).
    CustomBranding,
    /// Priority support channel (professional+).
    PrioritySupport,
    /// Multi-user workspaces (enterprise).
    MultiUser,
    /// Single sign-on integration (enterprise).
    SsoIntegration,
    /// Fine-grained permissions (enterprise).
    AdvancedPermissions,
    /// Audit logging (enterprise).
    AuditLogs,
}

/// One row of the static requirement table.
struct FeatureSpec {
    required: &'static [LicenseTier],
    description: &'static str,
}

impl Feature {
    /// Resolve a flag string to a known feature.
    pub fn parse(flag: &str) -> Option<Feature> {
        match flag {
            "markdown_editing" => Some(Feature::MarkdownEditing),
            "comments" => Some(Feature::Comments),
            "annotations" => Some(Feature::Annotations),
            "api_access" => Some(Feature::ApiAccess),
            "custom_branding" => Some(Feature::CustomBranding),
            "priority_support" => Some(Feature::PrioritySupport),
            "multi_user" => Some(Feature::MultiUser),
            "sso_integration" => Some(Feature::SsoIntegration),
            "advanced_permissions" => Some(Feature::AdvancedPermissions),
            "audit_logs" => Some(Feature::AuditLogs),
            _ => None,
        }
    }

    /// The wire-format flag string.
    pub fn flag(&self) -> &'static str {
        match self {
            Feature::MarkdownEditing => "markdown_editing",
            Feature::Comments => "comments",
            Feature::Annotations => "annotations",
            Feature::ApiAccess => "api_access",
            Feature::CustomBranding => "custom_branding",
            Feature::PrioritySupport => "priority_support",
            Feature::MultiUser => "multi_user",
            Feature::SsoIntegration => "sso_integration",
            Feature::AdvancedPermissions => "advanced_permissions",
            Feature::AuditLogs => "audit_logs",
        }
    }

    fn spec(&self) -> FeatureSpec {
        match self {
            Feature::MarkdownEditing => FeatureSpec {
                required: ANY_TIER,
                description: "Markdown document editing",
            },
            Feature::Comments => FeatureSpec {
                required: ANY_TIER,
                description: "Inline comments on documents",
            },
            Feature::Annotations => FeatureSpec {
                required: ANY_TIER,
                description: "Text annotations",
            },
            Feature::ApiAccess => FeatureSpec {
                required: PROFESSIONAL_UP,
                description: "REST API access",
            },
            Feature::CustomBranding => FeatureSpec {
                required: PROFESSIONAL_UP,
                description: "Custom branding and theming",
            },
            Feature::PrioritySupport => FeatureSpec {
                required: PROFESSIONAL_UP,
                description: "Priority support channel",
            },
            Feature::MultiUser => FeatureSpec {
                required: ENTERPRISE_ONLY,
                description: "Multi-user workspaces",
            },
            Feature::SsoIntegration => FeatureSpec {
                required: ENTERPRISE_ONLY,
                description: "Single sign-on integration",
            },
            Feature::AdvancedPermissions => FeatureSpec {
                required: ENTERPRISE_ONLY,
                description: "Fine-grained permissions",
            },
            Feature::AuditLogs => FeatureSpec {
                required: ENTERPRISE_ONLY,
                description: "Audit logging",
            },
        }
    }
}

/// Flags that are universally available on the community tier.
pub fn community_flags() -> &'static [&'static str] {
    &["markdown_editing", "comments", "annotations"]
}

/// Result of a feature access check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAccess {
    /// Whether the feature is enabled under the current license.
    pub enabled: bool,

    /// Human-readable denial reason (None when enabled).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Pricing-page path for upgrade prompts (None when enabled).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upgrade_url: Option<String>,

    /// Tiers that unlock the feature, for programmatic prompts.
    pub required_license: Vec<LicenseTier>,
}

/// Maps feature flags to license-tier requirements.
#[derive(Debug, Clone)]
pub struct FeatureGate {
    upgrade_url: String,
}

impl FeatureGate {
    /// Create a gate reporting the given upgrade URL on denials.
    pub fn new(upgrade_url: &str) -> Self {
        Self {
            upgrade_url: upgrade_url.to_string(),
        }
    }

    /// Decide whether `flag` is available under `tier`.
    ///
    /// `license_valid` is the current validity of the active license per
    /// trusted time; gated features require tier membership AND validity.
    /// Community features are always enabled, and unknown flags are
    /// reported disabled rather than erroring.
    pub fn check_access(&self, flag: &str, tier: LicenseTier, license_valid: bool) -> FeatureAccess {
        let Some(feature) = Feature::parse(flag) else {
            return FeatureAccess {
                enabled: false,
                reason: Some(format!("Unrecognized feature \"{}\"", flag)),
                upgrade_url: None,
                required_license: Vec::new(),
            };
        };

        let spec = feature.spec();
        if spec.required.is_empty() {
            return FeatureAccess {
                enabled: true,
                reason: None,
                upgrade_url: None,
                required_license: Vec::new(),
            };
        }

        if spec.required.contains(&tier) && license_valid {
            return FeatureAccess {
                enabled: true,
                reason: None,
                upgrade_url: None,
                required_license: spec.required.to_vec(),
            };
        }

        let tiers = spec
            .required
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join(" or ");
        let reason = if spec.required.contains(&tier) {
            format!(
                "{} requires a currently valid {} license",
                spec.description, tiers
            )
        } else {
            format!("{} requires a {} license", spec.description, tiers)
        };

        FeatureAccess {
            enabled: false,
            reason: Some(reason),
            upgrade_url: Some(self.upgrade_url.clone()),
            required_license: spec.required.to_vec(),
        }
    }
}
