//! Builds authentication chains from the `via` graph.
//!
//! A chain is the ordered list of step names executed to authenticate an
//! identity: one root provider (or a self-authenticating identity) followed
//! by the derivation identities, terminal identity last. The walk starts at
//! the requested identity and follows `via` links upstream, so the produced
//! order is the reverse of the walk.

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{AuthConfig, ViaTarget};
use crate::error::AuthError;
use crate::factory::Factory;

/// Builds the authentication chain for the named identity, root-first.
///
/// Invariants on success: no duplicate elements, the last element is the
/// requested identity (in configured spelling), and every non-terminal
/// element is referenced by its successor's `via`.
pub fn build_authentication_chain(
    config: &AuthConfig,
    factory: &Factory,
    target: &str,
) -> Result<Vec<String>, AuthError> {
    let (canonical, mut current) = config
        .identity(target)
        .ok_or_else(|| AuthError::IdentityNotFound(target.to_owned()))?;

    let mut chain = vec![canonical.to_owned()];
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(canonical.to_lowercase());
    let mut current_name = canonical.to_owned();

    loop {
        match &current.via {
            None => {
                // Chains of length one are only valid for identity kinds
                // that can authenticate without an upstream step.
                match factory.identity_kind_self_authenticates(&current.kind) {
                    Some(true) => break,
                    Some(false) => {
                        return Err(AuthError::InvalidIdentityConfig {
                            name: current_name,
                            reason: format!(
                                "identity kind {:?} requires a via link",
                                current.kind
                            ),
                        });
                    }
                    None => {
                        return Err(AuthError::InvalidIdentityKind(current.kind.clone()));
                    }
                }
            }
            Some(via) => match via.target() {
                None => {
                    return Err(AuthError::InvalidIdentityConfig {
                        name: current_name,
                        reason: "via must name exactly one of provider or identity".to_owned(),
                    });
                }
                Some(ViaTarget::Provider(provider)) => {
                    let (provider_name, _) = config.provider(provider).ok_or_else(|| {
                        AuthError::InvalidAuthConfig(format!(
                            "identity {current_name:?} references unknown provider {provider:?}"
                        ))
                    })?;
                    chain.push(provider_name.to_owned());
                    break;
                }
                Some(ViaTarget::Identity(identity)) => {
                    let (next_name, next) = config.identity(identity).ok_or_else(|| {
                        AuthError::InvalidAuthConfig(format!(
                            "identity {current_name:?} references unknown identity {identity:?}"
                        ))
                    })?;
                    if !visited.insert(next_name.to_lowercase()) {
                        return Err(AuthError::CircularDependency(next_name.to_owned()));
                    }
                    chain.push(next_name.to_owned());
                    current_name = next_name.to_owned();
                    current = next;
                }
            },
        }
    }

    chain.reverse();
    Ok(chain)
}

/// Resolves the provider the named identity transitively roots in, for
/// logout-driven enumeration. Unresolvable inputs (unknown names, malformed
/// or missing `via` links, cycles) are `None`, never an error: callers treat
/// "no provider" as an answer.
pub fn resolve_provider_for_identity(config: &AuthConfig, name: &str) -> Option<String> {
    let (canonical, mut current) = config.identity(name)?;
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(canonical.to_lowercase());

    loop {
        match current.via.as_ref()?.target()? {
            ViaTarget::Provider(provider) => {
                return config.provider(provider).map(|(name, _)| name.to_owned());
            }
            ViaTarget::Identity(identity) => {
                let (next_name, next) = config.identity(identity)?;
                if !visited.insert(next_name.to_lowercase()) {
                    return None;
                }
                current = next;
            }
        }
    }
}

/// The slice of manager state identities can reach through a
/// [`ManagerHandle`](crate::identity::ManagerHandle): enough of the
/// configuration to answer provider-resolution queries.
#[derive(Debug)]
pub struct ChainIndex {
    config: AuthConfig,
}

impl ChainIndex {
    pub(crate) fn new(config: AuthConfig) -> Arc<Self> {
        Arc::new(ChainIndex { config })
    }

    pub fn resolve_provider(&self, identity: &str) -> Option<String> {
        resolve_provider_for_identity(&self.config, identity)
    }
}

#[cfg(test)]
mod tests {
    use super::{build_authentication_chain, resolve_provider_for_identity};
    use crate::config::AuthConfig;
    use crate::error::{AuthError, AuthErrorKind};
    use crate::test_utils::{mock_factory, test_config};
    use assert_matches::assert_matches;

    fn linear_config() -> AuthConfig {
        test_config(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    via:
      provider: sso
  dev-admin:
    kind: mock
    via:
      identity: dev
"#,
        )
    }

    #[test]
    fn linear_chain_is_root_first() {
        let config = linear_config();
        let factory = mock_factory();

        let chain = build_authentication_chain(&config, &factory, "dev-admin").unwrap();
        assert_eq!(chain, vec!["sso", "dev", "dev-admin"]);

        let chain = build_authentication_chain(&config, &factory, "dev").unwrap();
        assert_eq!(chain, vec!["sso", "dev"]);
    }

    #[test]
    fn chain_lookup_is_case_insensitive() {
        let chain =
            build_authentication_chain(&linear_config(), &mock_factory(), "DEV-Admin").unwrap();
        assert_eq!(chain.last().map(String::as_str), Some("dev-admin"));
    }

    #[test]
    fn cycles_are_rejected() {
        let config = test_config(
            r#"
identities:
  a:
    kind: mock
    via:
      identity: b
  b:
    kind: mock
    via:
      identity: a
"#,
        );
        let err = build_authentication_chain(&config, &mock_factory(), "a").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::CircularDependency);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let config = test_config(
            r#"
identities:
  a:
    kind: mock
    via:
      identity: a
"#,
        );
        let err = build_authentication_chain(&config, &mock_factory(), "a").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::CircularDependency);
    }

    #[test]
    fn unknown_references_are_config_errors() {
        let config = test_config(
            r#"
identities:
  a:
    kind: mock
    via:
      provider: nowhere
"#,
        );
        let err = build_authentication_chain(&config, &mock_factory(), "a").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidAuthConfig);

        let err = build_authentication_chain(&config, &mock_factory(), "missing").unwrap_err();
        assert_matches!(err, AuthError::IdentityNotFound(name) => assert_eq!(name, "missing"));
    }

    #[test]
    fn missing_via_requires_self_authenticating_kind() {
        let config = test_config(
            r#"
identities:
  standalone:
    kind: mock-self
  broken:
    kind: mock
"#,
        );
        let factory = mock_factory();

        let chain = build_authentication_chain(&config, &factory, "standalone").unwrap();
        assert_eq!(chain, vec!["standalone"]);

        let err = build_authentication_chain(&config, &factory, "broken").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidIdentityConfig);
    }

    #[test]
    fn via_with_both_links_is_invalid() {
        let config = test_config(
            r#"
providers:
  sso:
    kind: mock
identities:
  a:
    kind: mock
    via:
      provider: sso
      identity: a
"#,
        );
        let err = build_authentication_chain(&config, &mock_factory(), "a").unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidIdentityConfig);
    }

    #[test]
    fn provider_resolution_for_logout() {
        let config = linear_config();
        assert_eq!(
            resolve_provider_for_identity(&config, "dev-admin"),
            Some("sso".to_owned())
        );
        assert_eq!(
            resolve_provider_for_identity(&config, "dev"),
            Some("sso".to_owned())
        );
        assert_eq!(resolve_provider_for_identity(&config, "missing"), None);

        let cyclic = test_config(
            r#"
identities:
  a:
    kind: mock
    via:
      identity: b
  b:
    kind: mock
    via:
      identity: a
"#,
        );
        assert_eq!(resolve_provider_for_identity(&cyclic, "a"), None);
    }
}
