//! The `aws-profile` identity kind.
//!
//! Takes upstream AWS credentials and exposes them to child processes as a
//! named profile: `environment()` points `AWS_PROFILE` and
//! `AWS_SHARED_CREDENTIALS_FILE` at a tool-owned credentials file, and
//! `prepare_environment()` materializes that file. The file is written
//! atomically (temp file + rename) and readable only by the current user.
//!
//! The file doubles as this identity's local credential storage:
//! `load_credentials` parses it back, so session credentials skipped by the
//! keyring remain reachable across runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::config::{IdentityConfig, Via};
use crate::credentials::{AwsCredentials, Credentials};
use crate::error::AuthError;
use crate::identity::{Identity, ManagerHandle};

pub(crate) const KIND: &str = "aws-profile";

#[derive(Debug, Default, Deserialize)]
struct AwsProfileSpec {
    #[serde(default)]
    profile: Option<String>,
    #[serde(default)]
    credentials_file: Option<PathBuf>,
    #[serde(default)]
    region: Option<String>,
}

/// The default location for an identity's credentials file. Each identity
/// gets its own file so logout can remove it without touching anything else.
fn default_credentials_file(identity_name: &str) -> PathBuf {
    let base = std::env::var_os("CLOUDAUTH_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cloudauth")))
        .unwrap_or_else(|| PathBuf::from(".cloudauth"));
    base.join("credentials")
        .join(identity_name.replace('/', "-"))
}

pub struct AwsProfileIdentity {
    name: String,
    profile: String,
    credentials_file: PathBuf,
    region: Option<String>,
    via: Option<Via>,
    manager: ManagerHandle,
    /// The most recent authentication result, materialized on demand by
    /// `prepare_environment`.
    current: RwLock<Option<AwsCredentials>>,
}

impl std::fmt::Debug for AwsProfileIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsProfileIdentity")
            .field("name", &self.name)
            .field("profile", &self.profile)
            .field("credentials_file", &self.credentials_file)
            .field("region", &self.region)
            .field("via", &self.via)
            .field(
                "current",
                &self.current.read().unwrap().as_ref().map(|_| "redacted"),
            )
            .finish()
    }
}

impl AwsProfileIdentity {
    pub fn from_config(name: &str, config: &IdentityConfig) -> Result<Self, AuthError> {
        let spec: AwsProfileSpec = serde_json::from_value(Value::Object(config.spec.clone()))
            .map_err(|e| AuthError::InvalidIdentityConfig {
                name: name.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(AwsProfileIdentity {
            name: name.to_owned(),
            profile: spec.profile.unwrap_or_else(|| name.to_owned()),
            credentials_file: spec
                .credentials_file
                .unwrap_or_else(|| default_credentials_file(name)),
            region: spec.region,
            via: config.via.clone(),
            manager: ManagerHandle::detached(),
            current: RwLock::new(None),
        })
    }

    fn io_error(&self, action: &str, e: impl std::fmt::Display) -> AuthError {
        AuthError::Manager(format!(
            "identity {:?}: failed to {action} {}: {e}",
            self.name,
            self.credentials_file.display()
        ))
    }

    async fn write_file(&self, credentials: AwsCredentials) -> Result<(), AuthError> {
        let path = self.credentials_file.clone();
        let profile = self.profile.clone();
        tokio::task::spawn_blocking(move || write_credentials_file(&path, &profile, &credentials))
            .await
            .map_err(|e| self.io_error("write", e))?
            .map_err(|e| self.io_error("write", e))
    }
}

#[async_trait]
impl Identity for AwsProfileIdentity {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        KIND
    }

    fn attach_manager(&mut self, handle: ManagerHandle) {
        if !self.manager.is_attached() {
            self.manager = handle;
        }
    }

    fn provider_name(&self) -> Option<String> {
        if let Some(via) = &self.via {
            if let Some(provider) = &via.provider {
                return Some(provider.clone());
            }
        }
        self.manager.resolve_provider(&self.name)
    }

    async fn authenticate(
        &self,
        upstream: Option<Credentials>,
    ) -> Result<Credentials, AuthError> {
        let upstream = upstream.ok_or_else(|| AuthError::InvalidIdentityConfig {
            name: self.name.clone(),
            reason: "aws-profile identities require an upstream credential".to_owned(),
        })?;
        let aws = upstream.as_aws().ok_or_else(|| AuthError::InvalidIdentityConfig {
            name: self.name.clone(),
            reason: format!(
                "cannot derive an AWS profile from {} credentials",
                upstream.kind_name()
            ),
        })?;

        let mut derived = aws.clone();
        if self.region.is_some() {
            derived.region = self.region.clone();
        }

        *self.current.write().unwrap() = Some(derived.clone());
        Ok(Credentials::Aws(derived))
    }

    async fn load_credentials(&self) -> Result<Option<Credentials>, AuthError> {
        let path = self.credentials_file.clone();
        let profile = self.profile.clone();
        let loaded = tokio::task::spawn_blocking(move || read_credentials_file(&path, &profile))
            .await
            .map_err(|e| self.io_error("read", e))?
            .map_err(|e| self.io_error("read", e))?;
        Ok(loaded.map(Credentials::Aws))
    }

    fn environment(&self) -> Result<HashMap<String, String>, AuthError> {
        let mut env = HashMap::new();
        env.insert("AWS_PROFILE".to_owned(), self.profile.clone());
        env.insert(
            "AWS_SHARED_CREDENTIALS_FILE".to_owned(),
            self.credentials_file.display().to_string(),
        );
        if let Some(region) = &self.region {
            env.insert("AWS_REGION".to_owned(), region.clone());
        }
        Ok(env)
    }

    async fn prepare_environment(
        &self,
        mut env: HashMap<String, String>,
    ) -> Result<HashMap<String, String>, AuthError> {
        let current = self.current.read().unwrap().clone();
        if let Some(credentials) = current {
            self.write_file(credentials).await?;
        }
        env.extend(self.environment()?);
        Ok(env)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        *self.current.write().unwrap() = None;
        let path = self.credentials_file.clone();
        tokio::task::spawn_blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        })
        .await
        .map_err(|e| self.io_error("remove", e))?
        .map_err(|e| self.io_error("remove", e))
    }
}

fn write_credentials_file(
    path: &Path,
    profile: &str,
    credentials: &AwsCredentials,
) -> Result<(), std::io::Error> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut contents = String::new();
    let _ = writeln!(contents, "[{profile}]");
    let _ = writeln!(contents, "aws_access_key_id = {}", credentials.access_key_id);
    let _ = writeln!(
        contents,
        "aws_secret_access_key = {}",
        credentials.secret_access_key
    );
    if let Some(token) = &credentials.session_token {
        let _ = writeln!(contents, "aws_session_token = {token}");
    }
    if let Some(expiration) = &credentials.expiration {
        let _ = writeln!(contents, "expiration = {}", expiration.to_rfc3339());
    }
    if let Some(region) = &credentials.region {
        let _ = writeln!(contents, "region = {region}");
    }

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o600))?;
    }
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_credentials_file(
    path: &Path,
    profile: &str,
) -> Result<Option<AwsCredentials>, std::io::Error> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut in_profile = false;
    let mut fields: HashMap<&str, &str> = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_profile = section.trim() == profile;
            continue;
        }
        if !in_profile {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            fields.insert(key.trim(), value.trim());
        }
    }

    let (Some(access_key_id), Some(secret_access_key)) = (
        fields.get("aws_access_key_id"),
        fields.get("aws_secret_access_key"),
    ) else {
        return Ok(None);
    };

    let expiration = fields
        .get("expiration")
        .and_then(|raw| raw.parse::<DateTime<Utc>>().ok());

    Ok(Some(AwsCredentials {
        access_key_id: (*access_key_id).to_owned(),
        secret_access_key: (*secret_access_key).to_owned(),
        session_token: fields.get("aws_session_token").map(|t| (*t).to_owned()),
        expiration,
        region: fields.get("region").map(|r| (*r).to_owned()),
        account_id: None,
    }))
}
