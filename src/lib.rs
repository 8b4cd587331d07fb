//! Pluggable cloud-credential orchestration for infrastructure-as-code
//! runs.
//!
//! A declarative configuration names authentication *providers* (SSO
//! portals, OIDC issuers, key material sources) and *identities* derived
//! from them through `via` links. The [`Manager`](manager::Manager) turns an
//! identity name into an ordered authentication chain, executes it with a
//! credential cache between steps so repeat runs skip still-valid prefixes,
//! and prepares the environment a child process (e.g. a Terraform
//! invocation) needs to consume the resulting credentials.
//!
//! Cloud-API-backed provider and identity kinds are registered by the
//! embedding tool through the [`Factory`](factory::Factory); this crate
//! ships the contracts, the chain executor, the two-tier credential store,
//! and the built-in kinds that work without network access.

pub mod chain;
pub mod config;
pub mod credentials;
pub mod error;
pub mod factory;
pub mod identity;
pub mod kinds;
pub mod logging;
pub mod manager;
pub mod prompt;
pub mod provider;
pub mod shell;
pub mod store;
pub mod test_utils;
pub mod validation;

pub use config::{
    is_authentication_disabled, AuthConfig, IdentityConfig, IdentitySelector, ProviderConfig,
    StackInfo, Via, DISABLED_IDENTITY, SELECT_IDENTITY,
};
pub use credentials::Credentials;
pub use error::{AuthError, AuthErrorKind, LogoutFailure};
pub use factory::Factory;
pub use identity::{Identity, ManagerHandle};
pub use manager::{Manager, Whoami};
pub use prompt::{IdentityPrompt, TtyPrompt};
pub use provider::Provider;
pub use store::{CredentialStore, Keyring, MemoryKeyring, OsKeyring};
