//! The `environment` provider kind: AWS key material sourced from process
//! environment variables, the same contract the AWS SDKs implement. The
//! variable prefix is configurable so several providers can coexist.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::env;

use crate::config::ProviderConfig;
use crate::credentials::{AwsCredentials, Credentials};
use crate::error::AuthError;
use crate::provider::Provider;

pub(crate) const KIND: &str = "environment";

const DEFAULT_PREFIX: &str = "AWS";

#[derive(Debug, Default, Deserialize)]
struct EnvironmentSpec {
    #[serde(default)]
    prefix: Option<String>,
}

#[derive(Debug)]
pub struct EnvironmentProvider {
    name: String,
    region: Option<String>,
    prefix: String,
}

impl EnvironmentProvider {
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self, AuthError> {
        let spec: EnvironmentSpec = serde_json::from_value(Value::Object(config.spec.clone()))
            .map_err(|e| AuthError::InvalidProviderConfig {
                name: name.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(EnvironmentProvider {
            name: name.to_owned(),
            region: config.region.clone(),
            prefix: spec.prefix.unwrap_or_else(|| DEFAULT_PREFIX.to_owned()),
        })
    }

    fn var(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    fn required_var(&self, suffix: &str) -> Result<String, AuthError> {
        env::var(self.var(suffix))
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AuthError::NoCredentialsFound(self.name.clone()))
    }

    fn optional_var(&self, suffix: &str) -> Option<String> {
        env::var(self.var(suffix)).ok().filter(|v| !v.is_empty())
    }
}

#[async_trait]
impl Provider for EnvironmentProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    async fn authenticate(&self) -> Result<Credentials, AuthError> {
        let access_key_id = self.required_var("ACCESS_KEY_ID")?;
        let secret_access_key = self.required_var("SECRET_ACCESS_KEY")?;
        let session_token = self.optional_var("SESSION_TOKEN");

        let expiration = match self.optional_var("CREDENTIAL_EXPIRATION") {
            Some(raw) => Some(
                raw.parse::<DateTime<Utc>>()
                    .map_err(|e| {
                        AuthError::Manager(format!(
                            "provider {:?}: malformed {}: {e}",
                            self.name,
                            self.var("CREDENTIAL_EXPIRATION"),
                        ))
                    })?,
            ),
            None => None,
        };

        let region = self.region.clone().or_else(|| self.optional_var("REGION"));

        let credentials = Credentials::Aws(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token,
            expiration,
            region,
            account_id: None,
        });
        credentials.validate()?;
        Ok(credentials)
    }
}
