use super::{AuthRequest, ResolvedSecret, SecretSource, TokenProvider};
use crate::{error::VaultResult, token::Token};
use async_trait::async_trait;

/// Provider for a fixed token, optionally delivered wrapped.
///
/// The token never expires from the client's point of view.
#[derive(Debug)]
pub struct StaticTokenProvider {
    token: ResolvedSecret,
}

impl StaticTokenProvider {
    /// Create a provider for `source`.
    #[must_use]
    pub fn new(source: SecretSource) -> Self {
        Self {
            token: ResolvedSecret::new(source, "token"),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
        let secret = self.token.resolve(auth.executor).await?;
        Ok(Token::non_expiring(secret, auth.clock.now()))
    }
}
