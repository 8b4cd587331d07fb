//! Registries mapping provider and identity kind strings to constructors.
//!
//! Kinds are plain data in the configuration; the factory turns them into
//! constructed instances and keeps unknown kinds surfacing as configuration
//! errors rather than anything more exotic. Constructors receive the
//! configured name and the full declaration, and parse the free-form `spec`
//! bag into their own typed settings.

use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};

use crate::config::{IdentityConfig, ProviderConfig};
use crate::error::AuthError;
use crate::identity::Identity;
use crate::kinds;
use crate::provider::Provider;

pub type ProviderCtor =
    Box<dyn Fn(&str, &ProviderConfig) -> Result<Box<dyn Provider>, AuthError> + Send + Sync>;

pub type IdentityCtor =
    Box<dyn Fn(&str, &IdentityConfig) -> Result<Box<dyn Identity>, AuthError> + Send + Sync>;

struct IdentityKindEntry {
    ctor: IdentityCtor,
    /// Whether identities of this kind may form a chain of length one,
    /// with no `via` link.
    self_authenticating: bool,
}

/// The kind registries. `Factory::default()` carries the built-in kinds;
/// embedders register additional ones before constructing a manager.
pub struct Factory {
    providers: HashMap<String, ProviderCtor>,
    identities: HashMap<String, IdentityKindEntry>,
}

impl Debug for Factory {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("provider_kinds", &self.provider_kinds())
            .field("identity_kinds", &self.identity_kinds())
            .finish()
    }
}

impl Default for Factory {
    fn default() -> Self {
        let mut factory = Factory::empty();
        kinds::register_builtin_kinds(&mut factory);
        factory
    }
}

impl Factory {
    /// A factory with no registered kinds.
    pub fn empty() -> Self {
        Factory {
            providers: HashMap::new(),
            identities: HashMap::new(),
        }
    }

    pub fn register_provider_kind(&mut self, kind: &str, ctor: ProviderCtor) {
        self.providers.insert(kind.to_owned(), ctor);
    }

    pub fn register_identity_kind(
        &mut self,
        kind: &str,
        self_authenticating: bool,
        ctor: IdentityCtor,
    ) {
        self.identities.insert(
            kind.to_owned(),
            IdentityKindEntry {
                ctor,
                self_authenticating,
            },
        );
    }

    pub fn has_provider_kind(&self, kind: &str) -> bool {
        self.providers.contains_key(kind)
    }

    pub fn has_identity_kind(&self, kind: &str) -> bool {
        self.identities.contains_key(kind)
    }

    /// `None` when the kind is unregistered.
    pub fn identity_kind_self_authenticates(&self, kind: &str) -> Option<bool> {
        self.identities
            .get(kind)
            .map(|entry| entry.self_authenticating)
    }

    pub fn provider_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn identity_kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.identities.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Constructs a provider from its declaration.
    pub fn new_provider(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Box<dyn Provider>, AuthError> {
        let ctor = self
            .providers
            .get(&config.kind)
            .ok_or_else(|| AuthError::InvalidProviderKind(config.kind.clone()))?;
        ctor(name, config)
    }

    /// Constructs an identity from its declaration.
    pub fn new_identity(
        &self,
        name: &str,
        config: &IdentityConfig,
    ) -> Result<Box<dyn Identity>, AuthError> {
        let entry = self
            .identities
            .get(&config.kind)
            .ok_or_else(|| AuthError::InvalidIdentityKind(config.kind.clone()))?;
        (entry.ctor)(name, config)
    }
}
