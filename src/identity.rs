//! The identity contract: derivation steps of an authentication chain.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

use crate::chain::ChainIndex;
use crate::credentials::Credentials;
use crate::error::AuthError;

/// A non-owning handle from an identity back to the manager that owns it.
/// Identities use it to resolve their root provider through the full `via`
/// graph; when the handle is detached (manager gone, or never linked) they
/// fall back to whatever their own configuration can answer.
#[derive(Clone, Debug, Default)]
pub struct ManagerHandle {
    index: Weak<ChainIndex>,
}

impl ManagerHandle {
    pub(crate) fn new(index: &Arc<ChainIndex>) -> Self {
        ManagerHandle {
            index: Arc::downgrade(index),
        }
    }

    /// A handle that is not linked to any manager.
    pub fn detached() -> Self {
        ManagerHandle::default()
    }

    pub fn is_attached(&self) -> bool {
        self.index.strong_count() > 0
    }

    /// Resolves the named identity's transitive root provider, if the
    /// manager is still alive and the walk terminates at a provider.
    pub fn resolve_provider(&self, identity: &str) -> Option<String> {
        self.index
            .upgrade()
            .and_then(|index| index.resolve_provider(identity))
    }
}

/// A derivation step producing scoped credentials from an upstream provider
/// or identity; typically the artifact a user's tooling actually consumes.
#[async_trait]
pub trait Identity: Debug + Send + Sync {
    /// The configured identity name; doubles as the credential cache key.
    fn name(&self) -> &str;

    /// The registered kind string this identity was constructed from.
    fn kind(&self) -> &'static str;

    /// Links this identity to its owning manager. Idempotent; called by the
    /// manager after construction and again defensively before operations
    /// that need provider resolution.
    fn attach_manager(&mut self, handle: ManagerHandle);

    /// The name of the provider this identity ultimately roots in, resolved
    /// through the manager when linked, otherwise from this identity's own
    /// configuration (which only answers for a direct `via: {provider}`).
    fn provider_name(&self) -> Option<String>;

    /// Derives this identity's credentials. `upstream` is the previous chain
    /// step's output; it is `None` only for kinds that self-authenticate.
    async fn authenticate(
        &self,
        upstream: Option<Credentials>,
    ) -> Result<Credentials, AuthError>;

    /// Reads credentials from this identity's local storage (tier B of the
    /// credential cache). `Ok(None)` means the kind has no local storage or
    /// nothing is stored; expiry is the caller's check.
    async fn load_credentials(&self) -> Result<Option<Credentials>, AuthError>;

    /// The environment variables a child process needs to consume this
    /// identity's credentials, derived from configuration only.
    fn environment(&self) -> Result<HashMap<String, String>, AuthError>;

    /// Like [`Identity::environment`], but may materialize files (e.g. a
    /// shared-credentials file) and set variables pointing at them. Returns
    /// the amended environment.
    async fn prepare_environment(
        &self,
        env: HashMap<String, String>,
    ) -> Result<HashMap<String, String>, AuthError>;

    /// Tears down identity-local session state (tier-B storage, materialized
    /// files). Kinds without any answer `LogoutNotSupported`, which callers
    /// treat as success.
    async fn logout(&self) -> Result<(), AuthError> {
        Err(AuthError::LogoutNotSupported)
    }
}
