//! The provider contract: the root step of an authentication chain.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::credentials::Credentials;
use crate::error::AuthError;

/// A concrete authentication starting point (SSO portal, cloud CLI, OIDC
/// issuer, ...). Providers authenticate without input and yield credentials,
/// or a handle downstream identities exchange for credentials.
#[async_trait]
pub trait Provider: Debug + Send + Sync {
    /// The configured provider name; doubles as the credential cache key.
    fn name(&self) -> &str;

    /// The registered kind string this provider was constructed from.
    fn kind(&self) -> &'static str;

    /// The region configured for this provider, if its kind has one.
    fn region(&self) -> Option<&str> {
        None
    }

    /// Performs the root authentication.
    async fn authenticate(&self) -> Result<Credentials, AuthError>;

    /// Tears down provider-side session state. Kinds without any answer
    /// `LogoutNotSupported`, which callers treat as success.
    async fn logout(&self) -> Result<(), AuthError> {
        Err(AuthError::LogoutNotSupported)
    }
}
