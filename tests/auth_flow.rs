//! End-to-end exercises of the authentication manager: chain execution
//! against a warm and cold credential cache, cached lookup with identity-
//! storage fallback, the stack pre-hook, and the logout cascades. Everything
//! runs against mock kinds and an in-memory keyring.

use assert_matches::assert_matches;
use cloudauth::error::{AuthError, AuthErrorKind};
use cloudauth::manager::Manager;
use cloudauth::test_utils::{
    expired_aws_credentials, manager_for, valid_aws_credentials, MockEnv,
};
use cloudauth::AuthConfig;

fn config(yaml: &str) -> AuthConfig {
    serde_yaml::from_str(yaml).expect("config fixture must parse")
}

/// Provider `sso`, identity `dev` via the provider, identity `dev-admin`
/// via `dev`.
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

fn linear_manager(env: &MockEnv) -> Manager {
    manager_for(config(LINEAR), env)
}

#[tokio::test]
async fn linear_chain_cold_cache_runs_every_step_in_order() {
    let env = MockEnv::new();
    let mut manager = linear_manager(&env);

    let whoami = manager.authenticate("dev-admin").await.unwrap();
    assert_eq!(whoami.identity, "dev-admin");
    assert_eq!(whoami.chain, vec!["sso", "dev", "dev-admin"]);
    assert!(whoami.expiration.is_some());

    // Each step ran exactly once, each identity fed by its predecessor's
    // output (the lineage marker is the upstream access key id).
    assert_eq!(env.recorder.count("provider:sso:authenticate"), 1);
    assert_eq!(env.recorder.count("identity:dev:authenticate:sso-key"), 1);
    assert_eq!(
        env.recorder.count("identity:dev-admin:authenticate:dev-key"),
        1
    );

    // Three stores, root first.
    assert_eq!(
        env.recorder.matching("store:set:"),
        vec!["store:set:sso", "store:set:dev", "store:set:dev-admin"]
    );
}

#[tokio::test]
async fn warm_cache_at_depth_skips_the_cached_prefix() {
    let env = MockEnv::new();
    env.store()
        .store("dev", &valid_aws_credentials("dev"))
        .await
        .unwrap();
    env.recorder.clear();

    let mut manager = linear_manager(&env);
    let whoami = manager.authenticate("dev-admin").await.unwrap();
    assert_eq!(whoami.identity, "dev-admin");

    // Neither the provider nor the cached identity re-authenticated; the
    // terminal step consumed the cached credentials.
    assert_eq!(env.recorder.matching("provider:sso:authenticate").len(), 0);
    assert_eq!(env.recorder.matching("identity:dev:authenticate").len(), 0);
    assert_eq!(
        env.recorder.count("identity:dev-admin:authenticate:dev-key"),
        1
    );
    assert_eq!(
        env.recorder.matching("store:set:"),
        vec!["store:set:dev-admin"]
    );
}

#[tokio::test]
async fn valid_terminal_cache_runs_nothing() {
    let env = MockEnv::new();
    env.store()
        .store("dev-admin", &valid_aws_credentials("dev-admin"))
        .await
        .unwrap();
    env.recorder.clear();

    let mut manager = linear_manager(&env);
    let whoami = manager.authenticate("dev-admin").await.unwrap();
    assert_eq!(whoami.identity, "dev-admin");

    assert!(env.recorder.matching("provider:").is_empty());
    assert!(env.recorder.matching("identity:").is_empty());
    assert!(env.recorder.matching("store:set:").is_empty());
}

#[tokio::test]
async fn expired_terminal_cache_forces_a_full_rerun() {
    let env = MockEnv::new();
    env.store()
        .store("dev-admin", &expired_aws_credentials("stale"))
        .await
        .unwrap();
    env.recorder.clear();

    let mut manager = linear_manager(&env);
    manager.authenticate("dev-admin").await.unwrap();

    assert_eq!(env.recorder.count("provider:sso:authenticate"), 1);
    assert_eq!(env.recorder.count("identity:dev:authenticate:sso-key"), 1);
    assert_eq!(
        env.recorder.count("identity:dev-admin:authenticate:dev-key"),
        1
    );

    // The stored terminal credential is the freshly produced one.
    let stored = env.store().retrieve("dev-admin").await.unwrap();
    assert!(!stored.expired());
    assert_eq!(
        stored.as_aws().unwrap().access_key_id,
        "dev-admin-key"
    );
}

#[tokio::test]
async fn cyclic_via_links_fail_authentication() {
    let env = MockEnv::new();
    let mut manager = manager_for(
        config(
            r#"
identities:
  a:
    kind: mock
    via:
      identity: b
  b:
    kind: mock
    via:
      identity: a
"#,
        ),
        &env,
    );

    let err = manager.authenticate("a").await.unwrap_err();
    assert_eq!(err.kind(), AuthErrorKind::CircularDependency);
    assert!(env.recorder.matching("identity:").is_empty());
}

#[tokio::test]
async fn session_credentials_stay_out_of_the_keyring() {
    let env = MockEnv::new();
    let mut manager = manager_for(
        config(
            r#"
providers:
  sso:
    kind: mock
identities:
  deploy:
    kind: mock
    via:
      provider: sso
    spec:
      session_token: fake-session
"#,
        ),
        &env,
    );

    let whoami = manager.authenticate("deploy").await.unwrap();
    assert_eq!(whoami.identity, "deploy");

    // The provider credential is persisted; the session credential is not.
    assert_eq!(env.recorder.matching("store:set:"), vec!["store:set:sso"]);
    assert!(env
        .store()
        .retrieve("deploy")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn failing_step_is_wrapped_with_its_name() {
    let env = MockEnv::new();
    let mut manager = manager_for(
        config(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    via:
      provider: sso
    spec:
      fail_authenticate: true
"#,
        ),
        &env,
    );

    let err = manager.authenticate("dev").await.unwrap_err();
    assert_matches!(err, AuthError::Step { ref step, .. } => assert_eq!(step, "dev"));
    // The root step succeeded and was persisted before the failure.
    assert_eq!(env.recorder.matching("store:set:"), vec!["store:set:sso"]);
}

#[tokio::test]
async fn cached_lookup_prefers_the_keyring() {
    let env = MockEnv::new();
    env.store()
        .store("dev", &valid_aws_credentials("dev"))
        .await
        .unwrap();

    let manager = linear_manager(&env);
    let whoami = manager.get_cached_credentials("dev").await.unwrap();
    assert_eq!(whoami.identity, "dev");
    assert_eq!(whoami.chain, vec!["sso", "dev"]);
    // Tier B was never consulted.
    assert!(env
        .recorder
        .matching("identity:dev:load_credentials")
        .is_empty());
}

#[tokio::test]
async fn cached_lookup_falls_back_to_identity_storage() {
    let env = MockEnv::new();
    let local = valid_aws_credentials("local");
    let manager = manager_for(
        config(&format!(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    via:
      provider: sso
    spec:
      local_credentials: {}
"#,
            serde_json::to_string(&local).unwrap()
        )),
        &env,
    );

    let whoami = manager.get_cached_credentials("dev").await.unwrap();
    assert_eq!(whoami.identity, "dev");
    assert_eq!(env.recorder.count("identity:dev:load_credentials"), 1);
}

#[tokio::test]
async fn cached_lookup_misses_and_expiries_are_distinct_errors() {
    let env = MockEnv::new();
    let manager = linear_manager(&env);

    // Miss in both tiers.
    assert_matches!(
        manager.get_cached_credentials("dev").await,
        Err(AuthError::NoCredentialsFound(name)) => assert_eq!(name, "dev")
    );

    // Expired in tier A.
    env.store()
        .store("dev", &expired_aws_credentials("dev"))
        .await
        .unwrap();
    assert_matches!(
        manager.get_cached_credentials("dev").await,
        Err(AuthError::ExpiredCredentials(name)) => assert_eq!(name, "dev")
    );

    // Expired in tier B.
    let env = MockEnv::new();
    let manager = manager_for(
        config(&format!(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    via:
      provider: sso
    spec:
      local_credentials: {}
"#,
            serde_json::to_string(&expired_aws_credentials("local")).unwrap()
        )),
        &env,
    );
    assert_matches!(
        manager.get_cached_credentials("dev").await,
        Err(AuthError::ExpiredCredentials(_))
    );
}

#[tokio::test]
async fn disabled_stack_skips_authentication_entirely() {
    let env = MockEnv::new();
    let mut manager = linear_manager(&env);

    let stack: cloudauth::StackInfo = serde_yaml::from_str(
        r#"
name: networking-prod
identity: "<disabled>"
"#,
    )
    .unwrap();

    let environ = vec!["PATH=/usr/bin".to_owned()];
    let result = manager
        .prepare_stack_environment(&stack, environ.clone())
        .await
        .unwrap();

    assert_eq!(result, environ);
    assert!(env.recorder.calls().is_empty());
}

#[tokio::test]
async fn named_stack_identity_authenticates_and_prepares_the_environment() {
    let env = MockEnv::new();
    let mut manager = linear_manager(&env);

    let stack = cloudauth::StackInfo {
        name: Some("networking-dev".to_owned()),
        identity: Some("dev".to_owned()),
        ..cloudauth::StackInfo::default()
    };

    let result = manager
        .prepare_stack_environment(&stack, vec!["PATH=/usr/bin".to_owned()])
        .await
        .unwrap();

    assert!(result.contains(&"PATH=/usr/bin".to_owned()));
    assert!(result.contains(&"MOCK_IDENTITY=dev".to_owned()));
    assert_eq!(env.recorder.count("provider:sso:authenticate"), 1);
}

#[tokio::test]
async fn logout_touches_only_the_named_identity() {
    let env = MockEnv::new();
    let mut manager = linear_manager(&env);
    manager.authenticate("dev-admin").await.unwrap();
    env.recorder.clear();

    manager.logout("dev", true).await.unwrap();

    assert_eq!(
        env.recorder.matching("store:delete:"),
        vec!["store:delete:dev"]
    );
    assert_eq!(env.recorder.count("identity:dev:logout"), 1);
    assert!(env.recorder.matching("identity:dev-admin:logout").is_empty());
    assert!(env.recorder.matching("provider:").is_empty());

    // The provider and sibling identity entries survive.
    assert!(env.store().retrieve("sso").await.is_ok());
    assert!(env.store().retrieve("dev-admin").await.is_ok());
}

#[tokio::test]
async fn logout_provider_cascades_across_the_via_graph() {
    let env = MockEnv::new();
    let mut manager = manager_for(
        config(
            r#"
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
  release:
    kind: mock
    via:
      identity: dev-admin
"#,
        ),
        &env,
    );
    manager.authenticate("release").await.unwrap();
    env.recorder.clear();

    manager.logout_provider("sso", true).await.unwrap();

    assert_eq!(
        env.recorder.matching("store:delete:"),
        vec![
            "store:delete:dev",
            "store:delete:dev-admin",
            "store:delete:release",
            "store:delete:sso",
        ]
    );
    assert_eq!(env.recorder.count("identity:dev:logout"), 1);
    assert_eq!(env.recorder.count("identity:dev-admin:logout"), 1);
    assert_eq!(env.recorder.count("identity:release:logout"), 1);
    assert_eq!(env.recorder.count("provider:sso:logout"), 1);
}

#[tokio::test]
async fn logout_not_supported_counts_as_success() {
    let env = MockEnv::new();
    let mut manager = manager_for(
        config(
            r#"
providers:
  sso:
    kind: mock
    spec:
      logout_not_supported: true
identities:
  dev:
    kind: mock
    via:
      provider: sso
    spec:
      logout_not_supported: true
"#,
        ),
        &env,
    );

    manager.logout("dev", true).await.unwrap();
    manager.logout_provider("sso", true).await.unwrap();
    manager.logout_all(true).await.unwrap();
}

#[tokio::test]
async fn identity_logout_failure_is_partial() {
    let env = MockEnv::new();
    let mut manager = manager_for(
        config(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    via:
      provider: sso
    spec:
      fail_logout: true
"#,
        ),
        &env,
    );

    let err = manager.logout("dev", true).await.unwrap_err();
    assert_matches!(err, AuthError::PartialLogout { name, attempted, failures } => {
        assert_eq!(name, "dev");
        assert_eq!(attempted, 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].target, "dev");
    });
}

#[tokio::test]
async fn logout_all_attempts_providers_despite_identity_failures() {
    let env = MockEnv::new();
    let mut manager = manager_for(
        config(
            r#"
providers:
  sso:
    kind: mock
identities:
  dev:
    kind: mock
    via:
      provider: sso
    spec:
      fail_logout: true
  prod:
    kind: mock
    via:
      provider: sso
"#,
        ),
        &env,
    );

    let err = manager.logout_all(true).await.unwrap_err();
    assert_matches!(err, AuthError::LogoutFailed(failures) => {
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].target, "dev");
    });

    // Every target was still attempted, the provider included.
    assert_eq!(env.recorder.count("identity:dev:logout"), 1);
    assert_eq!(env.recorder.count("identity:prod:logout"), 1);
    assert_eq!(env.recorder.count("provider:sso:logout"), 1);
    assert_eq!(
        env.recorder.matching("store:delete:"),
        vec![
            "store:delete:dev",
            "store:delete:prod",
            "store:delete:sso",
        ]
    );
}

#[tokio::test]
async fn whoami_region_falls_back_to_the_root_provider() {
    let env = MockEnv::new();
    let mut manager = manager_for(
        config(
            r#"
providers:
  sso:
    kind: mock
    region: eu-west-1
identities:
  dev:
    kind: mock
    via:
      provider: sso
"#,
        ),
        &env,
    );

    let whoami = manager.authenticate("dev").await.unwrap();
    assert_eq!(whoami.region.as_deref(), Some("eu-west-1"));

    let rendered = serde_json::to_value(&whoami).unwrap();
    assert_eq!(rendered["identity"], "dev");
    assert_eq!(rendered["chain"], serde_json::json!(["sso", "dev"]));
}
