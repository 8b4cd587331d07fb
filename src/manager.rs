//! The authentication manager: owns the configuration, the constructed
//! providers and identities, the chain cache, and the credential store, and
//! exposes the public authenticate / lookup / environment / logout API.
//!
//! A manager instance is not reentrant: its methods are intended to run
//! sequentially. A single authentication may block on provider I/O and on
//! interactive prompts; cancellation is the caller dropping the future.

use chrono::{DateTime, Utc};
use derivative::Derivative;
use serde::Serialize;
use slog::{debug, info, o, Logger};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::chain::{self, ChainIndex};
use crate::config::{AuthConfig, IdentitySelector, StackInfo};
use crate::credentials::Credentials;
use crate::error::{AuthError, LogoutFailure};
use crate::factory::Factory;
use crate::identity::{Identity, ManagerHandle};
use crate::prompt::IdentityPrompt;
use crate::provider::Provider;
use crate::shell::{environ_list_to_map, map_to_environ_list};
use crate::store::CredentialStore;
use crate::validation::validate_config;

/// The chain step name reported when an index is out of range.
const UNKNOWN_STEP: &str = "unknown";

/// The externally observable result of an authentication.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Whoami {
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub chain: Vec<String>,
}

#[derive(Debug)]
struct BuiltChain {
    target: String,
    steps: Vec<String>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Manager {
    config: AuthConfig,
    factory: Factory,
    store: CredentialStore,
    prompt: Box<dyn IdentityPrompt>,
    providers: HashMap<String, Box<dyn Provider>>,
    identities: HashMap<String, Box<dyn Identity>>,
    chain: Option<BuiltChain>,
    chain_index: Arc<ChainIndex>,
    #[derivative(Debug = "ignore")]
    logger: Logger,
}

impl Manager {
    /// Validates the configuration against the factory's registered kinds,
    /// constructs every declared provider and identity, and links the
    /// identities back to this manager.
    pub fn new(
        config: AuthConfig,
        factory: Factory,
        store: CredentialStore,
        prompt: Box<dyn IdentityPrompt>,
        parent_logger: &Logger,
    ) -> Result<Self, AuthError> {
        validate_config(&config, &factory, prompt.interactive())?;

        let logger = parent_logger.new(o!("component" => "auth_manager"));
        let chain_index = ChainIndex::new(config.clone());

        let mut providers: HashMap<String, Box<dyn Provider>> = HashMap::new();
        for (name, provider_config) in &config.providers {
            providers.insert(name.clone(), factory.new_provider(name, provider_config)?);
        }

        let mut identities: HashMap<String, Box<dyn Identity>> = HashMap::new();
        for (name, identity_config) in &config.identities {
            let mut identity = factory.new_identity(name, identity_config)?;
            identity.attach_manager(ManagerHandle::new(&chain_index));
            identities.insert(name.clone(), identity);
        }

        Ok(Manager {
            config,
            factory,
            store,
            prompt,
            providers,
            identities,
            chain: None,
            chain_index,
            logger,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// The last built chain, if any. The terminal element is the identity
    /// the chain authenticates.
    pub fn authentication_chain(&self) -> Option<&[String]> {
        self.chain.as_ref().map(|chain| chain.steps.as_slice())
    }

    /// Authenticates the named identity, reusing the deepest still-valid
    /// cached prefix of its chain and executing the remaining steps in
    /// order. Every produced credential is persisted under its step name,
    /// except AWS session credentials, which only identity-local storage
    /// keeps.
    pub async fn authenticate(&mut self, identity_name: &str) -> Result<Whoami, AuthError> {
        let canonical = self
            .config
            .canonical_identity_name(identity_name)
            .ok_or_else(|| AuthError::IdentityNotFound(identity_name.to_owned()))?
            .to_owned();

        self.build_chain_if_needed(&canonical)?;
        let steps = match &self.chain {
            Some(chain) => chain.steps.clone(),
            None => return Err(AuthError::ChainNotBuilt),
        };

        let logger = self.logger.new(o!(
            "identity" => canonical.clone(),
            "trace_id" => Uuid::new_v4().to_string(),
        ));

        let cached_index = self.find_first_valid_cached_credentials(&steps).await?;
        let start = Self::determine_starting_index(cached_index);
        debug!(logger, "executing authentication chain";
            "chain" => format!("{steps:?}"),
            "cached_index" => cached_index.map(|i| i as i64).unwrap_or(-1),
        );

        let mut previous: Option<Credentials> = None;
        for (index, step) in steps.iter().enumerate().skip(start) {
            if Some(index) == cached_index {
                previous = Some(self.store.retrieve(step).await?);
                debug!(logger, "reusing cached credentials"; "step" => step.as_str());
                continue;
            }

            let produced = if let Some(provider) = self.providers.get(step.as_str()) {
                debug!(logger, "running provider step"; "step" => step.as_str());
                provider
                    .authenticate()
                    .await
                    .map_err(|e| AuthError::step(step, e))?
            } else if let Some(identity) = self.identities.get(step.as_str()) {
                debug!(logger, "running identity step"; "step" => step.as_str());
                identity
                    .authenticate(previous.take())
                    .await
                    .map_err(|e| AuthError::step(step, e))?
            } else {
                return Err(AuthError::step(
                    self.chain_step_name(index),
                    AuthError::Manager(format!("chain step {step:?} was never constructed")),
                ));
            };

            if produced.is_session_token() {
                debug!(logger, "session credentials stay out of the keyring";
                    "step" => step.as_str());
            } else {
                self.store.store(step, &produced).await?;
            }
            previous = Some(produced);
        }

        let credentials = previous.ok_or(AuthError::ChainNotBuilt)?;
        let whoami = self.whoami(&canonical, &steps, &credentials);
        info!(logger, "authenticated";
            "expiration" => whoami.expiration.map(|e| e.to_rfc3339()),
        );
        Ok(whoami)
    }

    /// Looks up credentials without running any authentication: the keyring
    /// first, then the identity's local storage. Expired credentials are an
    /// error, as is a miss in both tiers.
    pub async fn get_cached_credentials(&self, identity_name: &str) -> Result<Whoami, AuthError> {
        let canonical = self
            .config
            .canonical_identity_name(identity_name)
            .ok_or_else(|| AuthError::IdentityNotFound(identity_name.to_owned()))?
            .to_owned();
        let identity = self
            .identities
            .get(&canonical)
            .ok_or_else(|| AuthError::IdentityNotFound(canonical.clone()))?;

        let credentials = match self.store.retrieve(&canonical).await {
            Ok(credentials) => Some(credentials),
            Err(e) if e.is_not_found() => identity.load_credentials().await?,
            Err(e) => return Err(e.into()),
        };
        let credentials =
            credentials.ok_or_else(|| AuthError::NoCredentialsFound(canonical.clone()))?;

        credentials.validate()?;
        if credentials.expired() {
            return Err(AuthError::ExpiredCredentials(canonical));
        }

        let steps = chain::build_authentication_chain(&self.config, &self.factory, &canonical)?;
        Ok(self.whoami(&canonical, &steps, &credentials))
    }

    /// Resolves which identity to use when the caller did not name one.
    ///
    /// Exactly one `default: true` identity answers directly. Ambiguity
    /// (none, or several) is resolved interactively when a prompt is
    /// available, otherwise it is an error. `force_select` always prompts.
    pub fn get_default_identity(&self, force_select: bool) -> Result<String, AuthError> {
        let names = self.config.identity_names();
        if names.is_empty() {
            return Err(AuthError::NoIdentitiesAvailable);
        }
        let interactive = self.prompt.interactive();

        if force_select {
            if !interactive {
                return Err(AuthError::SelectionRequiresTty);
            }
            return self.prompt.select("Select an identity", &names);
        }

        let defaults = self.config.default_identity_names();
        match defaults.as_slice() {
            [single] => Ok(single.clone()),
            [] if interactive => self.prompt.select("Select an identity", &names),
            [] => Err(AuthError::NoDefaultIdentity),
            _ if interactive => self
                .prompt
                .select("Multiple identities are marked default; select one", &defaults),
            _ => Err(AuthError::MultipleDefaultIdentities(defaults)),
        }
    }

    /// The environment variables a child process needs for the identity,
    /// from configuration only.
    pub fn get_environment_variables(
        &mut self,
        identity_name: &str,
    ) -> Result<HashMap<String, String>, AuthError> {
        let canonical = self
            .config
            .canonical_identity_name(identity_name)
            .ok_or_else(|| AuthError::IdentityNotFound(identity_name.to_owned()))?
            .to_owned();
        self.ensure_identity_has_manager(&canonical);

        self.identities
            .get(&canonical)
            .ok_or_else(|| AuthError::IdentityNotFound(canonical.clone()))?
            .environment()
    }

    /// Amends a `KEY=VALUE` environment list with everything the identity
    /// needs, materializing credential files where the kind calls for it.
    pub async fn prepare_shell_environment(
        &mut self,
        identity_name: &str,
        env: &[String],
    ) -> Result<Vec<String>, AuthError> {
        let canonical = self
            .config
            .canonical_identity_name(identity_name)
            .ok_or_else(|| AuthError::IdentityNotFound(identity_name.to_owned()))?
            .to_owned();
        self.ensure_identity_has_manager(&canonical);

        let identity = self
            .identities
            .get(&canonical)
            .ok_or_else(|| AuthError::IdentityNotFound(canonical.clone()))?;
        let prepared = identity
            .prepare_environment(environ_list_to_map(env))
            .await?;
        Ok(map_to_environ_list(&prepared))
    }

    /// Logs out a single identity: its keyring entry (never the provider's)
    /// and its identity-local state. Partial failure reports which actions
    /// failed.
    pub async fn logout(
        &mut self,
        identity_name: &str,
        delete_keyring: bool,
    ) -> Result<(), AuthError> {
        let canonical = self
            .config
            .canonical_identity_name(identity_name)
            .ok_or_else(|| AuthError::IdentityNotInConfig(identity_name.to_owned()))?
            .to_owned();

        let mut attempted = 0usize;
        let mut failures = Vec::new();

        if delete_keyring {
            attempted += 1;
            if let Err(e) = self.store.delete(&canonical).await {
                failures.push(LogoutFailure::new(canonical.clone(), e.into()));
            }
        }

        if let Some(identity) = self.identities.get(&canonical) {
            attempted += 1;
            match identity.logout().await {
                Ok(()) | Err(AuthError::LogoutNotSupported) => {}
                Err(e) => failures.push(LogoutFailure::new(canonical.clone(), e)),
            }
        }

        info!(self.logger, "identity logout finished";
            "identity" => canonical.as_str(),
            "attempted" => attempted,
            "failed" => failures.len(),
        );

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AuthError::PartialLogout {
                name: canonical,
                attempted,
                failures,
            })
        }
    }

    /// Logs out every identity transitively rooted in the named provider,
    /// then the provider itself. Failures are aggregated, not short-
    /// circuited.
    pub async fn logout_provider(
        &mut self,
        provider_name: &str,
        delete_keyring: bool,
    ) -> Result<(), AuthError> {
        let canonical = self
            .config
            .canonical_provider_name(provider_name)
            .ok_or_else(|| AuthError::ProviderNotInConfig(provider_name.to_owned()))?
            .to_owned();

        let mut failures = Vec::new();
        for identity_name in self.identities_rooted_in(&canonical) {
            if let Err(e) = self.logout(&identity_name, delete_keyring).await {
                failures.push(LogoutFailure::new(identity_name, e));
            }
        }

        if delete_keyring {
            if let Err(e) = self.store.delete(&canonical).await {
                failures.push(LogoutFailure::new(canonical.clone(), e.into()));
            }
        }
        if let Some(provider) = self.providers.get(&canonical) {
            match provider.logout().await {
                Ok(()) | Err(AuthError::LogoutNotSupported) => {}
                Err(e) => failures.push(LogoutFailure::new(canonical.clone(), e)),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AuthError::LogoutFailed(failures))
        }
    }

    /// Logs out every identity, then every provider. Provider teardown runs
    /// even when identity teardown failed; everything aggregates into one
    /// error.
    pub async fn logout_all(&mut self, delete_keyring: bool) -> Result<(), AuthError> {
        let mut failures = Vec::new();

        for identity_name in self.config.identity_names() {
            if let Err(e) = self.logout(&identity_name, delete_keyring).await {
                failures.push(LogoutFailure::new(identity_name, e));
            }
        }

        for provider_name in self.config.provider_names() {
            if delete_keyring {
                if let Err(e) = self.store.delete(&provider_name).await {
                    failures.push(LogoutFailure::new(provider_name.clone(), e.into()));
                }
            }
            if let Some(provider) = self.providers.get(&provider_name) {
                match provider.logout().await {
                    Ok(()) | Err(AuthError::LogoutNotSupported) => {}
                    Err(e) => failures.push(LogoutFailure::new(provider_name.clone(), e)),
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AuthError::LogoutFailed(failures))
        }
    }

    /// The pre-hook entry point: authenticates the stack's identity and
    /// amends the given environment. The disabled sentinel returns the
    /// environment untouched; the select sentinel forces a prompt; an
    /// unnamed identity falls back to default resolution.
    pub async fn prepare_stack_environment(
        &mut self,
        stack: &StackInfo,
        env: Vec<String>,
    ) -> Result<Vec<String>, AuthError> {
        let selector = stack
            .identity
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(IdentitySelector::from);

        let identity_name = match selector {
            Some(IdentitySelector::Disabled) => {
                debug!(self.logger, "authentication disabled for stack";
                    "stack" => stack.name.as_deref().unwrap_or(""));
                return Ok(env);
            }
            Some(IdentitySelector::ForceSelect) => self.get_default_identity(true)?,
            Some(IdentitySelector::Named(name)) => name,
            None => self.get_default_identity(false)?,
        };

        self.authenticate(&identity_name).await?;
        self.prepare_shell_environment(&identity_name, &env).await
    }

    /// Re-links an identity to this manager. Linking cannot fail for
    /// constructed identities; an unknown name is logged and ignored since
    /// downstream logic falls back to config-only resolution.
    fn ensure_identity_has_manager(&mut self, name: &str) {
        let handle = ManagerHandle::new(&self.chain_index);
        match self.identities.get_mut(name) {
            Some(identity) => identity.attach_manager(handle),
            None => debug!(self.logger, "cannot link identity to manager"; "identity" => name),
        }
    }

    fn build_chain_if_needed(&mut self, canonical: &str) -> Result<(), AuthError> {
        let stale = self
            .chain
            .as_ref()
            .map(|chain| chain.target != canonical)
            .unwrap_or(true);
        if stale {
            let steps = chain::build_authentication_chain(&self.config, &self.factory, canonical)?;
            self.chain = Some(BuiltChain {
                target: canonical.to_owned(),
                steps,
            });
        }
        Ok(())
    }

    /// Scans the chain from the terminal step toward the root and returns
    /// the deepest index whose stored credential is present and unexpired.
    async fn find_first_valid_cached_credentials(
        &self,
        steps: &[String],
    ) -> Result<Option<usize>, AuthError> {
        for index in (0..steps.len()).rev() {
            match self.store.retrieve(&steps[index]).await {
                Ok(credentials) if !credentials.expired() => return Ok(Some(index)),
                Ok(_) => continue,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(None)
    }

    /// Where chain execution starts: step zero on a cold cache, otherwise
    /// the cached step itself, whose stored credential feeds the next step.
    fn determine_starting_index(cached_index: Option<usize>) -> usize {
        cached_index.unwrap_or(0)
    }

    fn chain_step_name(&self, index: usize) -> String {
        self.chain
            .as_ref()
            .and_then(|chain| chain.steps.get(index))
            .cloned()
            .unwrap_or_else(|| UNKNOWN_STEP.to_owned())
    }

    fn identities_rooted_in(&self, provider: &str) -> Vec<String> {
        self.config
            .identity_names()
            .into_iter()
            .filter(|name| {
                chain::resolve_provider_for_identity(&self.config, name)
                    .map(|root| root.eq_ignore_ascii_case(provider))
                    .unwrap_or(false)
            })
            .collect()
    }

    fn whoami(&self, identity: &str, chain: &[String], credentials: &Credentials) -> Whoami {
        let (region, account) = credentials.whoami_fields();
        let region = region.or_else(|| {
            chain
                .first()
                .and_then(|root| self.config.provider(root))
                .and_then(|(_, provider)| provider.region.clone())
        });
        Whoami {
            identity: identity.to_owned(),
            expiration: credentials.expiration(),
            region,
            account,
            chain: chain.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Manager;
    use crate::error::{AuthError, AuthErrorKind};
    use crate::test_utils::{manager_for, test_config, MockEnv};
    use assert_matches::assert_matches;

    const LINEAR: &str = r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    via:
      provider: sso
  dev-admin:
    kind: mock
    via:
      identity: dev
"#;

    fn manager(yaml: &str) -> (Manager, MockEnv) {
        let env = MockEnv::new();
        (manager_for(test_config(yaml), &env), env)
    }

    #[test]
    fn construction_rejects_an_empty_config() {
        let env = MockEnv::new();
        let err = Manager::new(
            test_config("{}"),
            env.factory(),
            env.store(),
            env.prompt(None),
            &crate::logging::setup_test_logging(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::InvalidAuthConfig);
    }

    #[tokio::test]
    async fn unknown_identity_is_reported_at_runtime() {
        let (mut manager, _env) = manager(LINEAR);
        assert_matches!(
            manager.authenticate("ghost").await,
            Err(AuthError::IdentityNotFound(name)) => assert_eq!(name, "ghost")
        );
        assert_matches!(
            manager.get_cached_credentials("ghost").await,
            Err(AuthError::IdentityNotFound(_))
        );
        assert_matches!(
            manager.logout("ghost", true).await,
            Err(AuthError::IdentityNotInConfig(_))
        );
        assert_matches!(
            manager.logout_provider("ghost", true).await,
            Err(AuthError::ProviderNotInConfig(_))
        );
    }

    #[tokio::test]
    async fn chain_is_cached_per_target() {
        let (mut manager, _env) = manager(LINEAR);
        assert!(manager.authentication_chain().is_none());

        manager.authenticate("dev-admin").await.unwrap();
        assert_eq!(
            manager.authentication_chain().unwrap(),
            ["sso", "dev", "dev-admin"]
        );

        manager.authenticate("dev").await.unwrap();
        assert_eq!(manager.authentication_chain().unwrap(), ["sso", "dev"]);
    }

    #[test]
    fn default_identity_resolution_matrix() {
        // Exactly one default: answered without a prompt.
        let (manager, _env) = manager(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    default: true
    via:
      provider: sso
  prod:
    kind: mock
    via:
      provider: sso
"#,
        );
        assert_eq!(manager.get_default_identity(false).unwrap(), "dev");

        // No default, non-interactive.
        let env = MockEnv::new();
        let config = test_config(LINEAR);
        let manager = Manager::new(
            config,
            env.factory(),
            env.store(),
            env.non_interactive_prompt(),
            &crate::logging::setup_test_logging(),
        )
        .unwrap();
        assert_matches!(
            manager.get_default_identity(false),
            Err(AuthError::NoDefaultIdentity)
        );
        // Forcing selection without a terminal.
        assert_matches!(
            manager.get_default_identity(true),
            Err(AuthError::SelectionRequiresTty)
        );
    }

    #[test]
    fn multiple_defaults_without_a_prompt_are_ambiguous() {
        let env = MockEnv::new();
        let config = test_config(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    default: true
    via:
      provider: sso
  prod:
    kind: mock
    default: true
    via:
      provider: sso
"#,
        );
        // Construction itself requires an interactive resolver here, so
        // build with one, then resolve non-interactively.
        let manager = Manager::new(
            config.clone(),
            env.factory(),
            env.store(),
            env.prompt(Some("prod")),
            &crate::logging::setup_test_logging(),
        )
        .unwrap();
        assert_eq!(manager.get_default_identity(false).unwrap(), "prod");

        let err = Manager::new(
            config,
            env.factory(),
            env.store(),
            env.non_interactive_prompt(),
            &crate::logging::setup_test_logging(),
        )
        .unwrap_err();
        assert_matches!(err, AuthError::MultipleDefaultIdentities(names) => {
            assert_eq!(names, vec!["dev".to_owned(), "prod".to_owned()]);
        });
    }

    #[test]
    fn no_identities_at_all_is_its_own_error() {
        let (manager, _env) = manager(
            r#"
providers:
  sso:
    kind: mock
"#,
        );
        assert_matches!(
            manager.get_default_identity(false),
            Err(AuthError::NoIdentitiesAvailable)
        );
        assert_matches!(
            manager.get_default_identity(true),
            Err(AuthError::NoIdentitiesAvailable)
        );
    }

    #[test]
    fn forced_selection_prompts_even_with_a_default() {
        let env = MockEnv::new();
        let config = test_config(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    default: true
    via:
      provider: sso
  prod:
    kind: mock
    via:
      provider: sso
"#,
        );
        let manager = Manager::new(
            config,
            env.factory(),
            env.store(),
            env.prompt(Some("prod")),
            &crate::logging::setup_test_logging(),
        )
        .unwrap();
        assert_eq!(manager.get_default_identity(true).unwrap(), "prod");
    }

    #[test]
    fn starting_index_reuses_the_cached_step() {
        assert_eq!(Manager::determine_starting_index(None), 0);
        assert_eq!(Manager::determine_starting_index(Some(0)), 0);
        assert_eq!(Manager::determine_starting_index(Some(2)), 2);
    }

    #[tokio::test]
    async fn out_of_range_steps_are_reported_as_unknown() {
        let (mut manager, _env) = manager(LINEAR);
        manager.authenticate("dev").await.unwrap();
        assert_eq!(manager.chain_step_name(0), "sso");
        assert_eq!(manager.chain_step_name(7), "unknown");
    }

    #[tokio::test]
    async fn environment_round_trips_through_the_identity() {
        let (mut manager, _env) = manager(LINEAR);
        let vars = manager.get_environment_variables("dev").unwrap();
        assert_eq!(vars.get("MOCK_IDENTITY").map(String::as_str), Some("dev"));
        assert_eq!(vars.get("MOCK_PROVIDER").map(String::as_str), Some("sso"));

        // The root provider resolves transitively through the manager link,
        // not just from a direct via.
        let vars = manager.get_environment_variables("dev-admin").unwrap();
        assert_eq!(vars.get("MOCK_PROVIDER").map(String::as_str), Some("sso"));

        let prepared = manager
            .prepare_shell_environment("dev", &["EXISTING=1".to_owned()])
            .await
            .unwrap();
        assert!(prepared.contains(&"EXISTING=1".to_owned()));
        assert!(prepared.contains(&"MOCK_IDENTITY=dev".to_owned()));
        assert!(prepared.contains(&"MOCK_PREPARED=dev".to_owned()));
    }
}
