//! Credential sources that may be wrapped.

use crate::{error::VaultResult, executor::RequestExecutor, wrapping};
use secrecy::SecretString;
use tokio::sync::OnceCell;

/// A secret given directly or as a response-wrapping token.
#[derive(Debug, Clone)]
pub enum SecretSource {
    /// The secret itself.
    Plain(SecretString),
    /// Single-use wrapping token that unwraps to the secret.
    Wrapped(SecretString),
}

/// Where an AppRole secret id comes from.
#[derive(Debug, Clone)]
pub enum SecretIdSource {
    /// Fixed or wrapped secret id.
    Secret(SecretSource),
    /// Generate a fresh secret id for every login.
    Generated {
        /// AppRole role name
        role_name: String,
        /// Token allowed to generate secret ids
        token: SecretString,
    },
}

/// A [`SecretSource`] resolved at most once.
///
/// Wrapping tokens are single-use, so the unwrapped value is memoized.
#[derive(Debug)]
pub struct ResolvedSecret {
    source: SecretSource,
    field: &'static str,
    value: OnceCell<SecretString>,
}

impl ResolvedSecret {
    /// Resolve `source`, reading `field` from the unwrapped payload.
    #[must_use]
    pub fn new(source: SecretSource, field: &'static str) -> Self {
        Self {
            source,
            field,
            value: OnceCell::new(),
        }
    }

    /// Return the secret, unwrapping it on first use.
    ///
    /// # Errors
    ///
    /// Fails when unwrapping fails or the payload lacks the expected field.
    pub async fn resolve(&self, executor: &dyn RequestExecutor) -> VaultResult<SecretString> {
        match &self.source {
            SecretSource::Plain(secret) => Ok(secret.clone()),
            SecretSource::Wrapped(wrapping_token) => self
                .value
                .get_or_try_init(|| async {
                    wrapping::unwrap(executor, wrapping_token)
                        .await?
                        .secret(self.field)
                })
                .await
                .cloned(),
        }
    }
}
