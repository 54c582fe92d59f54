use super::{AuthRequest, TokenProvider, login};
use crate::{
    error::{VaultError, VaultResult},
    request::Request,
    token::Token,
};
use async_trait::async_trait;
use tracing::{info, instrument};

/// Login with the pod's mounted service account token.
#[derive(Debug, Clone)]
pub struct KubernetesProvider {
    mount: String,
    role: String,
    token_path: String,
}

impl KubernetesProvider {
    /// Create a provider logging in at `auth/{mount}/login`.
    #[must_use]
    pub fn new(mount: impl Into<String>, role: impl Into<String>, token_path: impl Into<String>) -> Self {
        Self {
            mount: mount.into(),
            role: role.into(),
            token_path: token_path.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for KubernetesProvider {
    #[instrument(skip_all, fields(role = %self.role))]
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
        // Re-read on every login: the kubelet rotates projected tokens.
        let jwt = tokio::fs::read_to_string(&self.token_path)
            .await
            .map_err(|e| VaultError::auth_failed(format!("{}: {e}", self.token_path)))?;

        let request = Request::post("kubernetes login", ["auth", self.mount.as_str(), "login"])
            .with_body(serde_json::json!({
                "role": self.role,
                "jwt": jwt.trim(),
            }));
        let token = login(auth, request).await?;
        info!(lease = ?token.lease_duration(), "Authenticated with Vault");
        Ok(token)
    }
}
