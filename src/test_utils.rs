//! Shared test doubles: mock provider and identity kinds, a recording
//! keyring, and a scripted prompt. Public so integration tests can use them;
//! nothing here touches a real keyring, terminal, or network.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{AuthConfig, IdentityConfig, ProviderConfig, Via, ViaTarget};
use crate::credentials::{AwsCredentials, Credentials};
use crate::error::AuthError;
use crate::factory::Factory;
use crate::identity::{Identity, ManagerHandle};
use crate::logging::setup_test_logging;
use crate::manager::Manager;
use crate::prompt::IdentityPrompt;
use crate::provider::Provider;
use crate::store::{CredentialStore, Keyring, MemoryKeyring, StoreError};

/// Records every observable action mocks take, in order, so tests can assert
/// exactly what ran and with which inputs.
#[derive(Clone, Debug, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// The recorded calls beginning with the given prefix, in order.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// AWS credentials whose access key id is `{marker}-key`, expiring an hour
/// from now.
pub fn valid_aws_credentials(marker: &str) -> Credentials {
    Credentials::Aws(AwsCredentials {
        access_key_id: format!("{marker}-key"),
        secret_access_key: "mock-secret".to_owned(),
        session_token: None,
        expiration: Some(Utc::now() + Duration::hours(1)),
        region: None,
        account_id: None,
    })
}

/// Like [`valid_aws_credentials`], but expired five minutes ago.
pub fn expired_aws_credentials(marker: &str) -> Credentials {
    let mut credentials = valid_aws_credentials(marker);
    if let Credentials::Aws(aws) = &mut credentials {
        aws.expiration = Some(Utc::now() - Duration::minutes(5));
    }
    credentials
}

#[derive(Debug, Default, Deserialize)]
struct MockSpec {
    /// Produce session credentials, which the executor keeps out of the
    /// keyring.
    #[serde(default)]
    session_token: Option<String>,
    #[serde(default)]
    fail_authenticate: bool,
    #[serde(default)]
    fail_logout: bool,
    #[serde(default)]
    logout_not_supported: bool,
    /// Identity-local (tier-B) credentials returned by `load_credentials`.
    #[serde(default)]
    local_credentials: Option<Credentials>,
}

impl MockSpec {
    fn parse(name: &str, spec: &serde_json::Map<String, Value>) -> Result<Self, AuthError> {
        serde_json::from_value(Value::Object(spec.clone())).map_err(|e| {
            AuthError::InvalidProviderConfig {
                name: name.to_owned(),
                reason: e.to_string(),
            }
        })
    }

    fn credentials(&self, marker: &str) -> Credentials {
        let mut credentials = valid_aws_credentials(marker);
        if let Credentials::Aws(aws) = &mut credentials {
            aws.session_token = self.session_token.clone();
        }
        credentials
    }
}

/// A provider whose every call lands in the [`CallRecorder`].
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    region: Option<String>,
    spec: MockSpec,
    recorder: CallRecorder,
}

impl MockProvider {
    fn from_config(
        name: &str,
        config: &ProviderConfig,
        recorder: CallRecorder,
    ) -> Result<Self, AuthError> {
        Ok(MockProvider {
            name: name.to_owned(),
            region: config.region.clone(),
            spec: MockSpec::parse(name, &config.spec)?,
            recorder,
        })
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "mock"
    }

    fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    async fn authenticate(&self) -> Result<Credentials, AuthError> {
        self.recorder
            .record(format!("provider:{}:authenticate", self.name));
        if self.spec.fail_authenticate {
            return Err(AuthError::Manager(format!(
                "provider {:?} was told to fail",
                self.name
            )));
        }
        Ok(self.spec.credentials(&self.name))
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.recorder.record(format!("provider:{}:logout", self.name));
        if self.spec.logout_not_supported {
            return Err(AuthError::LogoutNotSupported);
        }
        if self.spec.fail_logout {
            return Err(AuthError::Manager(format!(
                "provider {:?} failed to log out",
                self.name
            )));
        }
        Ok(())
    }
}

/// An identity whose every call lands in the [`CallRecorder`]. Produced
/// credentials encode their upstream lineage in the access key id so tests
/// can assert which credentials each step received.
#[derive(Debug)]
pub struct MockIdentity {
    name: String,
    via: Option<Via>,
    spec: MockSpec,
    self_authenticating: bool,
    manager: ManagerHandle,
    recorder: CallRecorder,
}

impl MockIdentity {
    fn from_config(
        name: &str,
        config: &IdentityConfig,
        recorder: CallRecorder,
        self_authenticating: bool,
    ) -> Result<Self, AuthError> {
        Ok(MockIdentity {
            name: name.to_owned(),
            via: config.via.clone(),
            spec: MockSpec::parse(name, &config.spec)?,
            self_authenticating,
            manager: ManagerHandle::detached(),
            recorder,
        })
    }
}

#[async_trait]
impl Identity for MockIdentity {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        if self.self_authenticating {
            "mock-self"
        } else {
            "mock"
        }
    }

    fn attach_manager(&mut self, handle: ManagerHandle) {
        if !self.manager.is_attached() {
            self.manager = handle;
        }
    }

    fn provider_name(&self) -> Option<String> {
        if let Some(ViaTarget::Provider(provider)) =
            self.via.as_ref().and_then(|via| via.target())
        {
            return Some(provider.to_owned());
        }
        self.manager.resolve_provider(&self.name)
    }

    async fn authenticate(
        &self,
        upstream: Option<Credentials>,
    ) -> Result<Credentials, AuthError> {
        let upstream_marker = upstream
            .as_ref()
            .and_then(Credentials::as_aws)
            .map(|aws| aws.access_key_id.clone())
            .unwrap_or_else(|| "none".to_owned());
        self.recorder.record(format!(
            "identity:{}:authenticate:{upstream_marker}",
            self.name
        ));

        if self.spec.fail_authenticate {
            return Err(AuthError::Manager(format!(
                "identity {:?} was told to fail",
                self.name
            )));
        }
        if upstream.is_none() && !self.self_authenticating {
            return Err(AuthError::InvalidIdentityConfig {
                name: self.name.clone(),
                reason: "mock identities require an upstream credential".to_owned(),
            });
        }
        Ok(self.spec.credentials(&self.name))
    }

    async fn load_credentials(&self) -> Result<Option<Credentials>, AuthError> {
        self.recorder
            .record(format!("identity:{}:load_credentials", self.name));
        Ok(self.spec.local_credentials.clone())
    }

    fn environment(&self) -> Result<HashMap<String, String>, AuthError> {
        Ok(HashMap::from([
            ("MOCK_IDENTITY".to_owned(), self.name.clone()),
            (
                "MOCK_PROVIDER".to_owned(),
                self.provider_name().unwrap_or_else(|| "none".to_owned()),
            ),
        ]))
    }

    async fn prepare_environment(
        &self,
        mut env: HashMap<String, String>,
    ) -> Result<HashMap<String, String>, AuthError> {
        self.recorder
            .record(format!("identity:{}:prepare_environment", self.name));
        env.extend(self.environment()?);
        env.insert("MOCK_PREPARED".to_owned(), self.name.clone());
        Ok(env)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.recorder.record(format!("identity:{}:logout", self.name));
        if self.spec.logout_not_supported {
            return Err(AuthError::LogoutNotSupported);
        }
        if self.spec.fail_logout {
            return Err(AuthError::Manager(format!(
                "identity {:?} failed to log out",
                self.name
            )));
        }
        Ok(())
    }
}

/// Registers the `mock` provider kind and the `mock` / `mock-self` identity
/// kinds, wired to the given recorder.
pub fn register_mock_kinds(factory: &mut Factory, recorder: &CallRecorder) {
    let r = recorder.clone();
    factory.register_provider_kind(
        "mock",
        Box::new(move |name, config| {
            MockProvider::from_config(name, config, r.clone())
                .map(|p| Box::new(p) as Box<dyn Provider>)
        }),
    );
    let r = recorder.clone();
    factory.register_identity_kind(
        "mock",
        false,
        Box::new(move |name, config| {
            MockIdentity::from_config(name, config, r.clone(), false)
                .map(|i| Box::new(i) as Box<dyn Identity>)
        }),
    );
    let r = recorder.clone();
    factory.register_identity_kind(
        "mock-self",
        true,
        Box::new(move |name, config| {
            MockIdentity::from_config(name, config, r.clone(), true)
                .map(|i| Box::new(i) as Box<dyn Identity>)
        }),
    );
}

/// A factory with the built-in and mock kinds, wired to a throwaway
/// recorder. For tests that only need kind registration, not call
/// assertions.
pub fn mock_factory() -> Factory {
    let mut factory = Factory::default();
    register_mock_kinds(&mut factory, &CallRecorder::new());
    factory
}

/// A keyring decorator that records writes and deletes, so tests can assert
/// store traffic and its order.
#[derive(Clone, Debug)]
pub struct RecordingKeyring {
    inner: MemoryKeyring,
    recorder: CallRecorder,
}

impl Keyring for RecordingKeyring {
    fn get(&self, key: &str) -> Result<String, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.recorder.record(format!("store:set:{key}"));
        self.inner.set(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.recorder.record(format!("store:delete:{key}"));
        self.inner.delete(key)
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list()
    }
}

/// A prompt that answers from a script instead of a terminal.
#[derive(Clone, Debug)]
pub struct ScriptedPrompt {
    selection: Option<String>,
    interactive: bool,
    recorder: CallRecorder,
}

impl IdentityPrompt for ScriptedPrompt {
    fn interactive(&self) -> bool {
        self.interactive
    }

    fn select(&self, _message: &str, options: &[String]) -> Result<String, AuthError> {
        self.recorder.record("prompt:select");
        if options.is_empty() {
            return Err(AuthError::NoIdentitiesAvailable);
        }
        if !self.interactive {
            return Err(AuthError::SelectionRequiresTty);
        }
        match &self.selection {
            Some(wanted) => options
                .iter()
                .find(|option| *option == wanted)
                .cloned()
                .ok_or_else(|| {
                    AuthError::Manager(format!("scripted selection {wanted:?} not offered"))
                }),
            None => Ok(options[0].clone()),
        }
    }
}

/// Everything a manager test needs: a shared recorder, a shared in-memory
/// keyring, and constructors for the factory, store, and prompt that all
/// report into them.
#[derive(Clone, Debug, Default)]
pub struct MockEnv {
    pub recorder: CallRecorder,
    pub keyring: MemoryKeyring,
}

impl MockEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Factory {
        let mut factory = Factory::default();
        register_mock_kinds(&mut factory, &self.recorder);
        factory
    }

    pub fn store(&self) -> CredentialStore {
        CredentialStore::new(
            Box::new(RecordingKeyring {
                inner: self.keyring.clone(),
                recorder: self.recorder.clone(),
            }),
            &setup_test_logging(),
        )
    }

    /// An interactive scripted prompt; `selection` of `None` picks the first
    /// option.
    pub fn prompt(&self, selection: Option<&str>) -> Box<dyn IdentityPrompt> {
        Box::new(ScriptedPrompt {
            selection: selection.map(str::to_owned),
            interactive: true,
            recorder: self.recorder.clone(),
        })
    }

    /// A prompt that behaves like a detached terminal.
    pub fn non_interactive_prompt(&self) -> Box<dyn IdentityPrompt> {
        Box::new(ScriptedPrompt {
            selection: None,
            interactive: false,
            recorder: self.recorder.clone(),
        })
    }
}

/// A manager over the given config with mock kinds, a recording in-memory
/// store, and a first-option prompt.
pub fn manager_for(config: AuthConfig, env: &MockEnv) -> Manager {
    Manager::new(
        config,
        env.factory(),
        env.store(),
        env.prompt(None),
        &setup_test_logging(),
    )
    .expect("test manager construction failed")
}

/// Parses a YAML fixture into an [`AuthConfig`].
#[cfg(test)]
pub fn test_config(yaml: &str) -> AuthConfig {
    serde_yaml::from_str(yaml).expect("test config fixture must parse")
}
