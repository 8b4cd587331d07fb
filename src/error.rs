//! Error taxonomy for the authentication manager.
//!
//! Every failure callers can branch on is a variant of [`AuthError`]. Step
//! execution wraps the underlying failure together with the step name; use
//! [`AuthError::kind`] to reach the sentinel through any number of wrappers
//! instead of inspecting messages.

use std::fmt::{self, Display, Formatter};

use crate::store::StoreError;

/// A single failed teardown action inside an aggregated logout error.
#[derive(Debug)]
pub struct LogoutFailure {
    /// The provider or identity the action targeted.
    pub target: String,
    /// What went wrong.
    pub error: AuthError,
}

impl LogoutFailure {
    pub fn new(target: impl Into<String>, error: AuthError) -> Self {
        Self {
            target: target.into(),
            error,
        }
    }
}

impl Display for LogoutFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid auth configuration: {0}")]
    InvalidAuthConfig(String),
    #[error("provider kind {0:?} is not registered")]
    InvalidProviderKind(String),
    #[error("identity kind {0:?} is not registered")]
    InvalidIdentityKind(String),
    #[error("invalid configuration for provider {name:?}: {reason}")]
    InvalidProviderConfig { name: String, reason: String },
    #[error("invalid configuration for identity {name:?}: {reason}")]
    InvalidIdentityConfig { name: String, reason: String },
    #[error("authentication chain has not been built")]
    ChainNotBuilt,
    #[error("circular identity dependency involving {0:?}")]
    CircularDependency(String),
    #[error("identity {0:?} not found")]
    IdentityNotFound(String),
    #[error("identity {0:?} is not in the auth configuration")]
    IdentityNotInConfig(String),
    #[error("provider {0:?} is not in the auth configuration")]
    ProviderNotInConfig(String),
    #[error("no default identity is configured")]
    NoDefaultIdentity,
    #[error("multiple identities are marked as default: {}", .0.join(", "))]
    MultipleDefaultIdentities(Vec<String>),
    #[error("identity selection requires an interactive terminal")]
    SelectionRequiresTty,
    #[error("no identities are available")]
    NoIdentitiesAvailable,
    #[error("no credentials found for {0:?}")]
    NoCredentialsFound(String),
    #[error("credentials for {0:?} have expired")]
    ExpiredCredentials(String),
    #[error("logout is not supported")]
    LogoutNotSupported,
    #[error(
        "logout of {name:?} partially failed ({} of {attempted} actions failed)",
        .failures.len()
    )]
    PartialLogout {
        name: String,
        attempted: usize,
        failures: Vec<LogoutFailure>,
    },
    #[error("logout failed for {} target(s)", .0.len())]
    LogoutFailed(Vec<LogoutFailure>),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Credentials(#[from] crate::credentials::CredentialsError),
    #[error("authentication step {step:?} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<AuthError>,
    },
    #[error("auth manager: {0}")]
    Manager(String),
}

/// The sentinel behind an [`AuthError`], independent of step wrapping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthErrorKind {
    InvalidAuthConfig,
    InvalidProviderKind,
    InvalidIdentityKind,
    InvalidProviderConfig,
    InvalidIdentityConfig,
    ChainNotBuilt,
    CircularDependency,
    IdentityNotFound,
    IdentityNotInConfig,
    ProviderNotInConfig,
    NoDefaultIdentity,
    MultipleDefaultIdentities,
    SelectionRequiresTty,
    NoIdentitiesAvailable,
    NoCredentialsFound,
    ExpiredCredentials,
    LogoutNotSupported,
    PartialLogout,
    LogoutFailed,
    Store,
    Credentials,
    Manager,
}

impl AuthError {
    /// Wraps an error produced while executing the named chain step.
    pub fn step(step: impl Into<String>, source: AuthError) -> Self {
        AuthError::Step {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// The sentinel kind of this error. Step wrappers are transparent: the
    /// kind of the innermost wrapped error is reported.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::InvalidAuthConfig(_) => AuthErrorKind::InvalidAuthConfig,
            AuthError::InvalidProviderKind(_) => AuthErrorKind::InvalidProviderKind,
            AuthError::InvalidIdentityKind(_) => AuthErrorKind::InvalidIdentityKind,
            AuthError::InvalidProviderConfig { .. } => AuthErrorKind::InvalidProviderConfig,
            AuthError::InvalidIdentityConfig { .. } => AuthErrorKind::InvalidIdentityConfig,
            AuthError::ChainNotBuilt => AuthErrorKind::ChainNotBuilt,
            AuthError::CircularDependency(_) => AuthErrorKind::CircularDependency,
            AuthError::IdentityNotFound(_) => AuthErrorKind::IdentityNotFound,
            AuthError::IdentityNotInConfig(_) => AuthErrorKind::IdentityNotInConfig,
            AuthError::ProviderNotInConfig(_) => AuthErrorKind::ProviderNotInConfig,
            AuthError::NoDefaultIdentity => AuthErrorKind::NoDefaultIdentity,
            AuthError::MultipleDefaultIdentities(_) => AuthErrorKind::MultipleDefaultIdentities,
            AuthError::SelectionRequiresTty => AuthErrorKind::SelectionRequiresTty,
            AuthError::NoIdentitiesAvailable => AuthErrorKind::NoIdentitiesAvailable,
            AuthError::NoCredentialsFound(_) => AuthErrorKind::NoCredentialsFound,
            AuthError::ExpiredCredentials(_) => AuthErrorKind::ExpiredCredentials,
            AuthError::LogoutNotSupported => AuthErrorKind::LogoutNotSupported,
            AuthError::PartialLogout { .. } => AuthErrorKind::PartialLogout,
            AuthError::LogoutFailed(_) => AuthErrorKind::LogoutFailed,
            AuthError::Store(_) => AuthErrorKind::Store,
            AuthError::Credentials(_) => AuthErrorKind::Credentials,
            AuthError::Step { source, .. } => source.kind(),
            AuthError::Manager(_) => AuthErrorKind::Manager,
        }
    }

    /// True if this error, however deeply wrapped, is the given kind.
    pub fn is_kind(&self, kind: AuthErrorKind) -> bool {
        self.kind() == kind
    }
}
