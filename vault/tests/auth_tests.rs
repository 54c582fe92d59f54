//! Login strategies executed through the client.

use secrecy::ExposeSecret;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use test_utils::{MockExecutor, fixtures};
use vault_client::auth::{
    AppRoleProvider, CachingTokenProvider, KubernetesProvider, SecretIdSource, SecretSource,
    StaticTokenProvider, TokenProvider, UserPassProvider, build_provider, token::lookup_self,
};
use vault_client::{
    AuthConfig, ManualClock, Override, Request, RequestExecutor, VaultClient, VaultConfig,
    database, leases,
};

const SECRET_PATH: &str = "v1/secret/data/app";

fn config() -> VaultConfig {
    VaultConfig::new(
        "http://vault.test:8200",
        AuthConfig::Token(SecretSource::Plain("s.unused".into())),
    )
}

/// Answers logins with `s.issued` and everything else with a data body.
fn vault() -> Arc<MockExecutor> {
    Arc::new(MockExecutor::new(|request, _| {
        let path = request.path();
        if path.ends_with("/login") || path.contains("/login/") {
            (200, Some(fixtures::auth_response("s.issued", 3600, true)))
        } else if path == "v1/sys/wrapping/unwrap" {
            (200, Some(fixtures::wrapped_secret("password", "unwrapped-pw")))
        } else if path.ends_with("/secret-id") {
            (200, Some(fixtures::data(json!({"secret_id": "generated-sid"}))))
        } else {
            (200, Some(fixtures::data(json!({"value": 1}))))
        }
    }))
}

fn client(exec: &Arc<MockExecutor>, provider: impl TokenProvider + 'static) -> VaultClient {
    VaultClient::with_parts(
        config(),
        exec.clone(),
        Arc::new(CachingTokenProvider::new(provider, Duration::from_secs(30))),
        Arc::new(ManualClock::default()),
    )
    .unwrap()
}

fn token_of(request: &Request) -> Option<String> {
    request.token().as_set().map(|t| t.expose_secret().to_string())
}

#[tokio::test]
async fn test_userpass_login_then_request() {
    let exec = vault();
    let client = client(
        &exec,
        UserPassProvider::new("userpass", "alice", SecretSource::Plain("pw".into())),
    );

    client.execute(Request::get("read", ["secret", "data", "app"])).await.unwrap();
    client.execute(Request::get("read", ["secret", "data", "app"])).await.unwrap();

    assert_eq!(
        exec.paths(),
        vec!["v1/auth/userpass/login/alice", SECRET_PATH, SECRET_PATH]
    );
    let requests = exec.requests();
    assert!(matches!(requests[0].token(), Override::Clear));
    assert_eq!(requests[0].body().unwrap()["password"], "pw");
    assert_eq!(token_of(&requests[1]).as_deref(), Some("s.issued"));
    assert_eq!(token_of(&requests[2]).as_deref(), Some("s.issued"));
}

#[tokio::test]
async fn test_wrapped_password_is_unwrapped_once() {
    let exec = vault();
    let provider = UserPassProvider::new("userpass", "bob", SecretSource::Wrapped("s.wrap".into()));
    let client = client(&exec, provider);

    client.execute(Request::get("read", ["secret", "data", "app"])).await.unwrap();
    client.token_provider().invalidate();
    client.execute(Request::get("read", ["secret", "data", "app"])).await.unwrap();

    let paths = exec.paths();
    assert_eq!(paths.iter().filter(|p| *p == "v1/sys/wrapping/unwrap").count(), 1);
    assert_eq!(paths.iter().filter(|p| p.contains("/login/")).count(), 2);

    let requests = exec.requests();
    assert_eq!(token_of(&requests[0]).as_deref(), Some("s.wrap"));
    assert_eq!(requests[1].body().unwrap()["password"], "unwrapped-pw");
}

#[tokio::test]
async fn test_approle_generated_secret_id() {
    let exec = vault();
    let provider = AppRoleProvider::new(
        "approle",
        "role-123",
        SecretIdSource::Generated {
            role_name: "billing".to_string(),
            token: "s.admin".into(),
        },
    );
    let client = client(&exec, provider);

    client.execute(Request::get("read", ["secret", "data", "app"])).await.unwrap();

    let requests = exec.requests();
    assert_eq!(requests[0].path(), "v1/auth/approle/role/billing/secret-id");
    assert_eq!(token_of(&requests[0]).as_deref(), Some("s.admin"));
    assert_eq!(requests[1].path(), "v1/auth/approle/login");
    assert_eq!(
        requests[1].body().unwrap(),
        &json!({"role_id": "role-123", "secret_id": "generated-sid"})
    );
}

#[tokio::test]
async fn test_kubernetes_reads_token_file() {
    let path = std::env::temp_dir().join(format!("sa-token-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, "eyJhbGciOi.jwt.sig\n").await.unwrap();

    let exec = vault();
    let provider = KubernetesProvider::new("kubernetes", "web", path.to_string_lossy());
    let client = client(&exec, provider);
    client.execute(Request::get("read", ["secret", "data", "app"])).await.unwrap();

    let login = &exec.requests()[0];
    assert_eq!(login.path(), "v1/auth/kubernetes/login");
    assert_eq!(login.body().unwrap(), &json!({"role": "web", "jwt": "eyJhbGciOi.jwt.sig"}));
    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn test_missing_kubernetes_token_fails_auth() {
    let exec = vault();
    let provider = KubernetesProvider::new("kubernetes", "web", "/nonexistent/sa/token");
    let client = client(&exec, provider);

    let err = client
        .execute(Request::get("read", ["secret", "data", "app"]))
        .await
        .unwrap_err();
    assert!(matches!(err, vault_client::VaultError::AuthenticationFailed(_)));
    assert_eq!(exec.call_count(), 0);
}

#[tokio::test]
async fn test_static_token_makes_no_login_call() {
    let exec = vault();
    let client = client(&exec, StaticTokenProvider::new(SecretSource::Plain("s.static".into())));

    client.execute(Request::get("read", ["secret", "data", "app"])).await.unwrap();
    assert_eq!(exec.paths(), vec![SECRET_PATH]);
    assert_eq!(token_of(&exec.requests()[0]).as_deref(), Some("s.static"));
}

#[tokio::test]
async fn test_failed_login_propagates() {
    let exec = Arc::new(MockExecutor::always(400, fixtures::errors(&["invalid username or password"])));
    let client = client(
        &exec,
        UserPassProvider::new("userpass", "alice", SecretSource::Plain("wrong".into())),
    );

    let err = client
        .execute(Request::get("read", ["secret", "data", "app"]))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert_eq!(exec.call_count(), 1);
}

#[tokio::test]
async fn test_build_provider_follows_config() {
    let exec = vault();
    let auth = AuthConfig::UserPass {
        mount: "ldap-users".to_string(),
        username: "carol".to_string(),
        password: SecretSource::Plain("pw".into()),
    };
    let client = VaultClient::with_parts(
        config(),
        exec.clone(),
        Arc::new(CachingTokenProvider::from_boxed(build_provider(&auth), Duration::from_secs(30))),
        Arc::new(ManualClock::default()),
    )
    .unwrap();

    client.execute(Request::get("read", ["secret", "data", "app"])).await.unwrap();
    assert_eq!(exec.paths()[0], "v1/auth/ldap-users/login/carol");
}

#[tokio::test]
async fn test_lookup_self_uses_managed_token() {
    let exec = Arc::new(MockExecutor::always(
        200,
        fixtures::data(json!({"accessor": "acc-1", "policies": ["default"], "ttl": 3000, "renewable": true})),
    ));
    let client = client(&exec, StaticTokenProvider::new(SecretSource::Plain("s.static".into())));

    let lookup = lookup_self(&client).await.unwrap();
    assert_eq!(lookup.accessor, "acc-1");
    assert_eq!(lookup.ttl, 3000);
    assert_eq!(token_of(&exec.requests()[0]).as_deref(), Some("s.static"));
}

#[tokio::test]
async fn test_database_credentials_and_lease_lifecycle() {
    let exec = Arc::new(MockExecutor::new(|request, _| match request.path().as_str() {
        "v1/database/creds/readonly" => (
            200,
            Some(json!({
                "lease_id": "database/creds/readonly/l1",
                "renewable": true,
                "lease_duration": 600,
                "data": {"username": "v-ro", "password": "pw"}
            })),
        ),
        "v1/sys/leases/renew" => (
            200,
            Some(json!({"lease_id": "database/creds/readonly/l1", "renewable": true, "lease_duration": 1200})),
        ),
        _ => (204, None),
    }));
    let client = client(&exec, StaticTokenProvider::new(SecretSource::Plain("s.static".into())));

    let creds = database::credentials(&client, client.clock(), "database", "readonly")
        .await
        .unwrap();
    assert_eq!(creds.username, "v-ro");

    let renewed = leases::renew(&client, client.clock(), &creds.lease, None).await.unwrap();
    assert_eq!(renewed.duration, Duration::from_secs(1200));
    leases::revoke(&client, &renewed.id).await.unwrap();

    assert_eq!(
        exec.paths(),
        vec![
            "v1/database/creds/readonly",
            "v1/sys/leases/renew",
            "v1/sys/leases/revoke"
        ]
    );
}

#[test]
fn test_client_from_config() {
    let client = VaultClient::new(config().with_namespace("team-a")).unwrap();
    assert_eq!(client.config().namespace.as_deref(), Some("team-a"));
    assert!(format!("{client:?}").contains("token"));

    let invalid = VaultClient::new(config().with_max_attempts(0));
    assert!(invalid.is_err());
}
