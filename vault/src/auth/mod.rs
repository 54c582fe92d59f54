//! Token providers: pluggable login strategies and the caching decorator.
//!
//! Every provider executes its login call through the [`RequestExecutor`]
//! handed in with the [`AuthRequest`], so login traffic gets the same
//! defaults (address, namespace, timeout) as any other call.

mod approle;
mod caching;
mod kubernetes;
mod secret;
mod static_token;
pub mod token;
mod userpass;

pub use approle::AppRoleProvider;
pub use caching::{CachingTokenProvider, DEFAULT_GRACE_PERIOD};
pub use kubernetes::KubernetesProvider;
pub use secret::{ResolvedSecret, SecretIdSource, SecretSource};
pub use static_token::StaticTokenProvider;
pub use userpass::UserPassProvider;

use crate::{
    clock::Clock,
    config::AuthConfig,
    error::VaultResult,
    executor::RequestExecutor,
    request::{Confidentiality, Request, ResultShape},
    token::Token,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

/// Context of one authentication attempt.
pub struct AuthRequest<'a> {
    /// The call that needs a token
    pub request: &'a Request,
    /// Logging confidentiality of that call
    pub confidentiality: Confidentiality,
    /// Executor used for login and renewal calls
    pub executor: &'a dyn RequestExecutor,
    /// Time source for token creation instants
    pub clock: &'a dyn Clock,
}

impl<'a> AuthRequest<'a> {
    /// Create an authentication context for `request`.
    #[must_use]
    pub fn new(
        request: &'a Request,
        executor: &'a dyn RequestExecutor,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            request,
            confidentiality: request.confidentiality(),
            executor,
            clock,
        }
    }
}

/// Produces a token for outbound requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a usable token, logging in if needed.
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token>;

    /// Drop any cached token so the next call logs in again.
    fn invalidate(&self) {}
}

#[async_trait]
impl<P: TokenProvider + ?Sized> TokenProvider for std::sync::Arc<P> {
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
        (**self).provide(auth).await
    }

    fn invalidate(&self) {
        (**self).invalidate();
    }
}

/// `auth` block returned by login and renewal endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthInfo {
    /// Issued token
    pub client_token: String,
    /// Whether the token can be renewed
    #[serde(default)]
    pub renewable: bool,
    /// Lease duration in seconds; zero never expires
    #[serde(default)]
    pub lease_duration: u64,
    /// Allowed uses; zero is unlimited
    #[serde(default)]
    pub num_uses: u32,
    /// Attached policies
    #[serde(default)]
    pub policies: Vec<String>,
}

impl AuthInfo {
    /// Convert into a token created at `now`.
    #[must_use]
    pub fn into_token(self, now: DateTime<Utc>) -> Token {
        let token = if self.lease_duration == 0 {
            Token::non_expiring(self.client_token, now)
        } else {
            Token::new(
                self.client_token,
                self.renewable,
                Duration::from_secs(self.lease_duration),
                now,
            )
        };
        if self.num_uses > 0 {
            token.with_allowed_uses(self.num_uses)
        } else {
            token
        }
    }
}

/// Execute a login request without a token and read the issued token.
pub(crate) async fn login(auth: &AuthRequest<'_>, request: Request) -> VaultResult<Token> {
    let request = request
        .without_token()
        .with_shape(ResultShape::Auth)
        .expect_ok()
        .with_confidentiality(auth.confidentiality.max(Confidentiality::Medium));
    let info: AuthInfo = auth.executor.execute(request).await?.result()?;
    Ok(info.into_token(auth.clock.now()))
}

/// Build the login strategy selected by the configuration.
#[must_use]
pub fn build_provider(config: &AuthConfig) -> Box<dyn TokenProvider> {
    match config.clone() {
        AuthConfig::Token(source) => Box::new(StaticTokenProvider::new(source)),
        AuthConfig::UserPass {
            mount,
            username,
            password,
        } => Box::new(UserPassProvider::new(mount, username, password)),
        AuthConfig::AppRole {
            mount,
            role_id,
            secret_id,
        } => Box::new(AppRoleProvider::new(mount, role_id, secret_id)),
        AuthConfig::Kubernetes {
            mount,
            role,
            token_path,
        } => Box::new(KubernetesProvider::new(mount, role, token_path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Expiring;

    fn info(lease_duration: u64, num_uses: u32) -> AuthInfo {
        AuthInfo {
            client_token: "s.issued".to_string(),
            renewable: true,
            lease_duration,
            num_uses,
            policies: vec!["default".to_string()],
        }
    }

    #[test]
    fn test_auth_info_into_token() {
        let now = Utc::now();
        let token = info(3600, 0).into_token(now);
        assert_eq!(token.lease_duration(), Some(Duration::from_secs(3600)));
        assert!(token.is_renewable());
        assert_eq!(token.uses_remaining(), None);
        assert!(!token.is_from_cache());
    }

    #[test]
    fn test_zero_lease_never_expires() {
        let token = info(0, 0).into_token(Utc::now());
        assert!(token.expires_at().is_none());
        assert!(!token.is_renewable());
    }

    #[test]
    fn test_num_uses_limits_token() {
        let token = info(60, 2).into_token(Utc::now());
        assert_eq!(token.uses_remaining(), Some(2));
    }

    #[test]
    fn test_auth_info_deserializes_minimal_block() {
        let info: AuthInfo =
            serde_json::from_value(serde_json::json!({"client_token": "s.x"})).unwrap();
        assert_eq!(info.lease_duration, 0);
        assert!(info.policies.is_empty());
    }
}
