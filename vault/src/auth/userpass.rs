use super::{AuthRequest, ResolvedSecret, SecretSource, TokenProvider, login};
use crate::{error::VaultResult, request::Request, token::Token};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{info, instrument};

/// Username/password login.
#[derive(Debug)]
pub struct UserPassProvider {
    mount: String,
    username: String,
    password: ResolvedSecret,
}

impl UserPassProvider {
    /// Create a provider logging in at `auth/{mount}/login/{username}`.
    #[must_use]
    pub fn new(mount: impl Into<String>, username: impl Into<String>, password: SecretSource) -> Self {
        Self {
            mount: mount.into(),
            username: username.into(),
            password: ResolvedSecret::new(password, "password"),
        }
    }
}

#[async_trait]
impl TokenProvider for UserPassProvider {
    #[instrument(skip_all, fields(mount = %self.mount, username = %self.username))]
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
        let password = self.password.resolve(auth.executor).await?;
        let request = Request::post(
            "userpass login",
            ["auth", self.mount.as_str(), "login", self.username.as_str()],
        )
        .with_body(serde_json::json!({ "password": password.expose_secret() }));
        let token = login(auth, request).await?;
        info!(lease = ?token.lease_duration(), "Authenticated with Vault");
        Ok(token)
    }
}
