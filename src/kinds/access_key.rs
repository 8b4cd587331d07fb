//! The `static` provider kind: access key material straight from the
//! provider declaration. Useful for break-glass credentials and for wiring
//! fixtures; real deployments root their chains in an SSO or OIDC provider
//! registered by the embedding tool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::credentials::{AwsCredentials, Credentials};
use crate::error::AuthError;
use crate::provider::Provider;

pub(crate) const KIND: &str = "static";

#[derive(Debug, Deserialize)]
struct StaticKeySpec {
    access_key_id: String,
    secret_access_key: String,
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    account_id: Option<String>,
}

#[derive(Debug)]
pub struct StaticKeyProvider {
    name: String,
    credentials: AwsCredentials,
}

impl StaticKeyProvider {
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self, AuthError> {
        let spec: StaticKeySpec = serde_json::from_value(Value::Object(config.spec.clone()))
            .map_err(|e| AuthError::InvalidProviderConfig {
                name: name.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(StaticKeyProvider {
            name: name.to_owned(),
            credentials: AwsCredentials {
                access_key_id: spec.access_key_id,
                secret_access_key: spec.secret_access_key,
                session_token: spec.session_token,
                expiration: spec.expiration,
                region: config.region.clone(),
                account_id: spec.account_id,
            },
        })
    }
}

#[async_trait]
impl Provider for StaticKeyProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn region(&self) -> Option<&str> {
        self.credentials.region.as_deref()
    }

    async fn authenticate(&self) -> Result<Credentials, AuthError> {
        let credentials = Credentials::Aws(self.credentials.clone());
        credentials.validate()?;
        Ok(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::{StaticKeyProvider, KIND};
    use crate::config::ProviderConfig;
    use crate::credentials::Credentials;
    use crate::error::AuthErrorKind;
    use crate::provider::Provider;
    use serde_json::json;

    fn config(spec: serde_json::Value) -> ProviderConfig {
        ProviderConfig {
            kind: KIND.to_owned(),
            region: Some("us-west-2".to_owned()),
            spec: spec.as_object().unwrap().clone(),
            ..ProviderConfig::default()
        }
    }

    #[tokio::test]
    async fn yields_configured_credentials() {
        let provider = StaticKeyProvider::from_config(
            "break-glass",
            &config(json!({
                "access_key_id": "AKIAFAKE",
                "secret_access_key": "fake-secret",
                "account_id": "123456789012",
            })),
        )
        .unwrap();

        assert_eq!(provider.name(), "break-glass");
        assert_eq!(provider.region(), Some("us-west-2"));

        let credentials = provider.authenticate().await.unwrap();
        let Credentials::Aws(aws) = &credentials else {
            panic!("expected AWS credentials, got {credentials:?}");
        };
        assert_eq!(aws.access_key_id, "AKIAFAKE");
        assert_eq!(aws.region.as_deref(), Some("us-west-2"));
        assert!(!credentials.expired());
    }

    #[test]
    fn missing_key_material_is_a_config_error() {
        let err =
            StaticKeyProvider::from_config("broken", &config(json!({ "access_key_id": "AKIA" })))
                .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidProviderConfig);
    }

    #[tokio::test]
    async fn logout_is_not_supported() {
        let provider = StaticKeyProvider::from_config(
            "break-glass",
            &config(json!({
                "access_key_id": "AKIAFAKE",
                "secret_access_key": "fake-secret",
            })),
        )
        .unwrap();
        let err = provider.logout().await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::LogoutNotSupported);
    }
}
