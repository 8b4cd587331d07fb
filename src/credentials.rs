//! Credential values produced by authentication steps.
//!
//! The set of credential kinds is closed at compile time: a step yields AWS
//! key material, an Azure or GCP bearer token, or a GitHub OIDC token.
//! Whatever the kind, a credential answers whether it is expired, when it
//! expires, and which fields it contributes to a whoami record.
//!
//! Secret fields are redacted from `Debug` output; the serialized (`serde`)
//! form is complete because it is what the credential store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Formatter};

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    #[error("{kind} credentials are missing required field {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

/// AWS access key material, optionally a temporary session.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl Debug for AwsCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"redacted")
            .field("session_token", &self.session_token.as_ref().map(|_| "redacted"))
            .field("expiration", &self.expiration)
            .field("region", &self.region)
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// An Azure access token scoped to a tenant and subscription.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct AzureCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<String>,
}

impl Debug for AzureCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureCredentials")
            .field("access_token", &"redacted")
            .field("expiration", &self.expiration)
            .field("tenant_id", &self.tenant_id)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}

/// A GCP OAuth access token, typically for a service account.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct GcpCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
}

impl Debug for GcpCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpCredentials")
            .field("access_token", &"redacted")
            .field("expiration", &self.expiration)
            .field("project_id", &self.project_id)
            .field("service_account", &self.service_account)
            .finish()
    }
}

/// A GitHub OIDC token.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct GitHubCredentials {
    pub oidc_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl Debug for GitHubCredentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubCredentials")
            .field("oidc_token", &"redacted")
            .field("expiration", &self.expiration)
            .field("repository", &self.repository)
            .finish()
    }
}

/// A credential produced by a provider or identity step.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Credentials {
    Aws(AwsCredentials),
    Azure(AzureCredentials),
    Gcp(GcpCredentials),
    #[serde(rename = "github")]
    GitHub(GitHubCredentials),
}

impl Credentials {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Credentials::Aws(_) => "aws",
            Credentials::Azure(_) => "azure",
            Credentials::Gcp(_) => "gcp",
            Credentials::GitHub(_) => "github",
        }
    }

    /// When this credential stops being usable, if it carries an expiration
    /// at all. Credentials without one never expire on their own.
    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        match self {
            Credentials::Aws(c) => c.expiration,
            Credentials::Azure(c) => c.expiration,
            Credentials::Gcp(c) => c.expiration,
            Credentials::GitHub(c) => c.expiration,
        }
    }

    /// True once the expiration has passed. The comparison is against the
    /// current instant with no skew window.
    pub fn expired(&self) -> bool {
        match self.expiration() {
            Some(expiration) => expiration <= Utc::now(),
            None => false,
        }
    }

    /// Shape check: required fields are present and non-empty.
    pub fn validate(&self) -> Result<(), CredentialsError> {
        fn required(
            kind: &'static str,
            field: &'static str,
            value: &str,
        ) -> Result<(), CredentialsError> {
            if value.is_empty() {
                return Err(CredentialsError::MissingField { kind, field });
            }
            Ok(())
        }

        match self {
            Credentials::Aws(c) => {
                required("aws", "access_key_id", &c.access_key_id)?;
                required("aws", "secret_access_key", &c.secret_access_key)
            }
            Credentials::Azure(c) => required("azure", "access_token", &c.access_token),
            Credentials::Gcp(c) => required("gcp", "access_token", &c.access_token),
            Credentials::GitHub(c) => required("github", "oidc_token", &c.oidc_token),
        }
    }

    /// True iff this is an AWS credential carrying a non-empty session token.
    /// Such credentials are not persisted to the keyring; they reach the next
    /// run through identity-local storage instead.
    pub fn is_session_token(&self) -> bool {
        match self {
            Credentials::Aws(c) => c
                .session_token
                .as_ref()
                .map(|t| !t.is_empty())
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn as_aws(&self) -> Option<&AwsCredentials> {
        match self {
            Credentials::Aws(c) => Some(c),
            _ => None,
        }
    }

    /// The (region, account) pair this credential contributes to a whoami
    /// record, where the kind has a notion of either.
    pub fn whoami_fields(&self) -> (Option<String>, Option<String>) {
        match self {
            Credentials::Aws(c) => (c.region.clone(), c.account_id.clone()),
            Credentials::Azure(c) => (None, c.subscription_id.clone()),
            Credentials::Gcp(c) => (None, c.project_id.clone()),
            Credentials::GitHub(_) => (None, None),
        }
    }
}
