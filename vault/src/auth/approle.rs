use super::{AuthRequest, ResolvedSecret, SecretIdSource, TokenProvider, login};
use crate::{
    error::{VaultError, VaultResult},
    executor::RequestExecutor,
    request::{Confidentiality, Request},
    token::Token,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, instrument};

enum SecretId {
    Resolved(ResolvedSecret),
    Generated { role_name: String, token: SecretString },
}

/// AppRole login with a role id and a secret id.
pub struct AppRoleProvider {
    mount: String,
    role_id: String,
    secret_id: SecretId,
}

impl AppRoleProvider {
    /// Create a provider logging in at `auth/{mount}/login`.
    #[must_use]
    pub fn new(mount: impl Into<String>, role_id: impl Into<String>, secret_id: SecretIdSource) -> Self {
        let secret_id = match secret_id {
            SecretIdSource::Secret(source) => {
                SecretId::Resolved(ResolvedSecret::new(source, "secret_id"))
            }
            SecretIdSource::Generated { role_name, token } => {
                SecretId::Generated { role_name, token }
            }
        };
        Self {
            mount: mount.into(),
            role_id: role_id.into(),
            secret_id,
        }
    }

    async fn secret_id(&self, executor: &dyn RequestExecutor) -> VaultResult<SecretString> {
        match &self.secret_id {
            SecretId::Resolved(secret) => secret.resolve(executor).await,
            SecretId::Generated { role_name, token } => {
                #[derive(Deserialize)]
                struct Generated {
                    secret_id: String,
                }

                debug!(role_name, "Generating AppRole secret id");
                let request = Request::post(
                    "generate secret id",
                    ["auth", self.mount.as_str(), "role", role_name.as_str(), "secret-id"],
                )
                .with_token(token.clone())
                .with_confidentiality(Confidentiality::High)
                .expect_ok();
                let generated: Generated = executor.execute(request).await?.result()?;
                if generated.secret_id.is_empty() {
                    return Err(VaultError::invalid_response("empty generated secret id"));
                }
                Ok(SecretString::from(generated.secret_id))
            }
        }
    }
}

impl std::fmt::Debug for AppRoleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppRoleProvider")
            .field("mount", &self.mount)
            .field("role_id", &self.role_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for AppRoleProvider {
    #[instrument(skip_all, fields(mount = %self.mount))]
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
        let secret_id = self.secret_id(auth.executor).await?;
        let request = Request::post("approle login", ["auth", self.mount.as_str(), "login"])
            .with_body(serde_json::json!({
                "role_id": self.role_id,
                "secret_id": secret_id.expose_secret(),
            }));
        let token = login(auth, request).await?;
        info!(lease = ?token.lease_duration(), "Authenticated with Vault");
        Ok(token)
    }
}
