//! Configuration-shape validation, run before any instance is constructed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::config::{AuthConfig, ViaTarget};
use crate::error::AuthError;
use crate::factory::Factory;

/// Provider and identity names double as keyring aliases and log fields, so
/// they are restricted to a conservative shape.
static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").unwrap());

/// Validates the configuration against the registered kinds.
///
/// `interactive` reports whether an interactive identity resolver is
/// available; when it is, multiple `default: true` identities are tolerated
/// because the ambiguity can be resolved by asking.
pub fn validate_config(
    config: &AuthConfig,
    factory: &Factory,
    interactive: bool,
) -> Result<(), AuthError> {
    if config.is_empty() {
        return Err(AuthError::InvalidAuthConfig(
            "configuration declares no providers and no identities".to_owned(),
        ));
    }

    // Names must be well formed and, since they share the credential cache
    // keyspace, unique across providers and identities together under
    // case-insensitive comparison.
    let mut seen: HashMap<String, String> = HashMap::new();
    for name in config
        .provider_names()
        .iter()
        .chain(config.identity_names().iter())
    {
        if !NAME_PATTERN.is_match(name) {
            return Err(AuthError::InvalidAuthConfig(format!(
                "name {name:?} is not a valid provider or identity name"
            )));
        }
        if let Some(existing) = seen.insert(name.to_lowercase(), name.clone()) {
            return Err(AuthError::InvalidAuthConfig(format!(
                "names {existing:?} and {name:?} collide under case-insensitive comparison"
            )));
        }
    }

    for (name, provider) in &config.providers {
        if !factory.has_provider_kind(&provider.kind) {
            return Err(AuthError::InvalidProviderKind(format!(
                "{} (provider {name:?})",
                provider.kind
            )));
        }
    }

    for (name, identity) in &config.identities {
        if !factory.has_identity_kind(&identity.kind) {
            return Err(AuthError::InvalidIdentityKind(format!(
                "{} (identity {name:?})",
                identity.kind
            )));
        }

        match &identity.via {
            None => {
                if factory.identity_kind_self_authenticates(&identity.kind) != Some(true) {
                    return Err(AuthError::InvalidIdentityConfig {
                        name: name.clone(),
                        reason: format!(
                            "identity kind {:?} requires a via link",
                            identity.kind
                        ),
                    });
                }
            }
            Some(via) => match via.target() {
                None => {
                    return Err(AuthError::InvalidIdentityConfig {
                        name: name.clone(),
                        reason: "via must name exactly one of provider or identity".to_owned(),
                    });
                }
                Some(ViaTarget::Provider(provider)) => {
                    if config.canonical_provider_name(provider).is_none() {
                        return Err(AuthError::InvalidAuthConfig(format!(
                            "identity {name:?} references unknown provider {provider:?}"
                        )));
                    }
                }
                Some(ViaTarget::Identity(upstream)) => {
                    if config.canonical_identity_name(upstream).is_none() {
                        return Err(AuthError::InvalidAuthConfig(format!(
                            "identity {name:?} references unknown identity {upstream:?}"
                        )));
                    }
                }
            },
        }
    }

    let defaults = config.default_identity_names();
    if defaults.len() > 1 && !interactive {
        return Err(AuthError::MultipleDefaultIdentities(defaults));
    }

    Ok(())
}
