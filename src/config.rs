//! The declarative auth configuration consumed by the manager.
//!
//! The configuration arrives as already-merged structured data (loading and
//! merging the YAML documents is the embedding tool's concern). Provider and
//! identity names compare case-insensitively; the original spelling is the
//! display form.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Sentinel identity name a caller uses to switch authentication off.
pub const DISABLED_IDENTITY: &str = "<disabled>";

/// Sentinel identity name forcing an interactive selection even when a
/// default identity exists.
pub const SELECT_IDENTITY: &str = "<select>";

/// True only for the exact disabled sentinel.
pub fn is_authentication_disabled(name: &str) -> bool {
    name == DISABLED_IDENTITY
}

/// The edge form of an identity request: sentinel strings are converted to
/// variants here so the rest of the crate never string-matches them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IdentitySelector {
    Named(String),
    Disabled,
    ForceSelect,
}

impl From<&str> for IdentitySelector {
    fn from(name: &str) -> Self {
        match name {
            DISABLED_IDENTITY => IdentitySelector::Disabled,
            SELECT_IDENTITY => IdentitySelector::ForceSelect,
            other => IdentitySelector::Named(other.to_owned()),
        }
    }
}

/// A provider declaration: the root of an authentication chain.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Kind-specific settings, interpreted by the kind's constructor.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub spec: Map<String, Value>,
}

/// The upstream link of an identity. Exactly one of the two fields must be
/// set; the chain builder and validator reject anything else.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Via {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
}

/// A well-formed `via` link, after shape checking.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ViaTarget<'a> {
    Provider(&'a str),
    Identity(&'a str),
}

impl Via {
    pub fn provider(name: impl Into<String>) -> Self {
        Via {
            provider: Some(name.into()),
            identity: None,
        }
    }

    pub fn identity(name: impl Into<String>) -> Self {
        Via {
            provider: None,
            identity: Some(name.into()),
        }
    }

    /// The link target, or `None` when the link names neither or both of a
    /// provider and an identity.
    pub fn target(&self) -> Option<ViaTarget<'_>> {
        match (self.provider.as_deref(), self.identity.as_deref()) {
            (Some(provider), None) => Some(ViaTarget::Provider(provider)),
            (None, Some(identity)) => Some(ViaTarget::Identity(identity)),
            _ => None,
        }
    }
}

/// An identity declaration: a derivation step rooted, directly or through
/// other identities, in a provider.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct IdentityConfig {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<Via>,
    #[serde(default)]
    pub default: bool,
    /// Kind-specific principal description (role ARN, service account, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub principal: Map<String, Value>,
    /// Kind-specific settings, interpreted by the kind's constructor.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub spec: Map<String, Value>,
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogsConfig {
    fn default() -> Self {
        LogsConfig {
            level: default_log_level(),
        }
    }
}

/// Per-stack context handed through to the manager by the embedding tool.
/// The manager itself only interprets the `identity` field; the rest is
/// opaque and available to identity kinds that want it.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StackInfo {
    #[serde(default)]
    pub name: Option<String>,
    /// The identity to authenticate as, or one of the sentinel values.
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

/// The complete auth configuration, immutable for the lifetime of a manager.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub identities: HashMap<String, IdentityConfig>,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(skip)]
    identity_case_map: OnceCell<HashMap<String, String>>,
    #[serde(skip)]
    provider_case_map: OnceCell<HashMap<String, String>>,
}

impl AuthConfig {
    pub fn new(
        providers: HashMap<String, ProviderConfig>,
        identities: HashMap<String, IdentityConfig>,
    ) -> Self {
        AuthConfig {
            providers,
            identities,
            logs: LogsConfig::default(),
            identity_case_map: OnceCell::new(),
            provider_case_map: OnceCell::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty() && self.identities.is_empty()
    }

    /// Lowercased name → original-case name, for identities.
    pub fn identity_case_map(&self) -> &HashMap<String, String> {
        self.identity_case_map.get_or_init(|| {
            self.identities
                .keys()
                .map(|name| (name.to_lowercase(), name.clone()))
                .collect()
        })
    }

    /// Lowercased name → original-case name, for providers.
    pub fn provider_case_map(&self) -> &HashMap<String, String> {
        self.provider_case_map.get_or_init(|| {
            self.providers
                .keys()
                .map(|name| (name.to_lowercase(), name.clone()))
                .collect()
        })
    }

    /// Resolves an identity name case-insensitively to its configured
    /// spelling.
    pub fn canonical_identity_name(&self, name: &str) -> Option<&str> {
        self.identity_case_map()
            .get(&name.to_lowercase())
            .map(String::as_str)
    }

    /// Resolves a provider name case-insensitively to its configured
    /// spelling.
    pub fn canonical_provider_name(&self, name: &str) -> Option<&str> {
        self.provider_case_map()
            .get(&name.to_lowercase())
            .map(String::as_str)
    }

    pub fn identity(&self, name: &str) -> Option<(&str, &IdentityConfig)> {
        let canonical = self.canonical_identity_name(name)?;
        self.identities
            .get_key_value(canonical)
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn provider(&self, name: &str) -> Option<(&str, &ProviderConfig)> {
        let canonical = self.canonical_provider_name(name)?;
        self.providers
            .get_key_value(canonical)
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Identity names in their configured spelling, sorted for deterministic
    /// iteration.
    pub fn identity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.identities.keys().cloned().collect();
        names.sort();
        names
    }

    /// Provider names in their configured spelling, sorted.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Identities marked `default: true`, sorted.
    pub fn default_identity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .identities
            .iter()
            .filter(|(_, config)| config.default)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_authentication_disabled, AuthConfig, IdentitySelector, Via, ViaTarget,
        DISABLED_IDENTITY, SELECT_IDENTITY,
    };

    #[test]
    fn disabled_sentinel_is_exact() {
        assert!(is_authentication_disabled(DISABLED_IDENTITY));
        for other in ["", SELECT_IDENTITY, "false", "disabled", "<Disabled>"] {
            assert!(!is_authentication_disabled(other), "{other:?}");
        }
    }

    #[test]
    fn selector_conversion() {
        assert_eq!(
            IdentitySelector::from(DISABLED_IDENTITY),
            IdentitySelector::Disabled
        );
        assert_eq!(
            IdentitySelector::from(SELECT_IDENTITY),
            IdentitySelector::ForceSelect
        );
        assert_eq!(
            IdentitySelector::from("dev"),
            IdentitySelector::Named("dev".to_owned())
        );
    }

    #[test]
    fn via_target_requires_exactly_one_link() {
        assert_eq!(
            Via::provider("sso").target(),
            Some(ViaTarget::Provider("sso"))
        );
        assert_eq!(
            Via::identity("dev").target(),
            Some(ViaTarget::Identity("dev"))
        );
        assert_eq!(Via::default().target(), None);
        let both = Via {
            provider: Some("sso".to_owned()),
            identity: Some("dev".to_owned()),
        };
        assert_eq!(both.target(), None);
    }

    #[test]
    fn names_resolve_case_insensitively() {
        let config: AuthConfig = serde_yaml::from_str(
            r#"
providers:
  AWS-SSO:
    kind: static
identities:
  Dev-Admin:
    kind: aws-profile
    via:
      provider: aws-sso
"#,
        )
        .unwrap();

        assert_eq!(
            config.canonical_identity_name("dev-admin"),
            Some("Dev-Admin")
        );
        assert_eq!(
            config.canonical_identity_name("DEV-ADMIN"),
            Some("Dev-Admin")
        );
        assert_eq!(config.canonical_identity_name("missing"), None);
        assert_eq!(config.canonical_provider_name("aws-sso"), Some("AWS-SSO"));

        let (name, identity) = config.identity("dev-admin").unwrap();
        assert_eq!(name, "Dev-Admin");
        assert_eq!(identity.via, Some(Via::provider("aws-sso")));
    }

    #[test]
    fn logs_level_defaults_to_info() {
        let config: AuthConfig = serde_yaml::from_str("providers: {}\n").unwrap();
        assert_eq!(config.logs.level, "info");
    }
}
