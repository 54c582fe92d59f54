//! Vault client: request defaults, managed tokens and auth-aware retry.

use crate::{
    auth::{AuthRequest, CachingTokenProvider, TokenProvider, build_provider},
    clock::{Clock, SystemClock},
    config::VaultConfig,
    error::{VaultError, VaultResult},
    executor::{HttpExecutor, RequestExecutor},
    request::{Override, Request, Response},
    transit::Transit,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryDecision {
    /// Try again with whatever token the provider hands out.
    Retry,
    /// Drop the cached token, then try again.
    RetryFresh,
    /// Propagate the failure.
    GiveUp,
}

impl RetryDecision {
    fn classify(error: &VaultError, from_cache: bool) -> Self {
        match error {
            VaultError::TokenUsesExhausted => Self::Retry,
            e if from_cache && e.is_permission_denied() => Self::RetryFresh,
            _ => Self::GiveUp,
        }
    }
}

/// A failed attempt together with the token state it ran under.
struct AttemptFailure {
    error: VaultError,
    from_cache: bool,
}

impl AttemptFailure {
    const fn new(error: VaultError, from_cache: bool) -> Self {
        Self { error, from_cache }
    }
}

/// Vault client.
///
/// Requests that leave their token unset get one from the token provider;
/// failures caused by a stale or used-up token are retried up to
/// [`VaultConfig::max_attempts`] times in total.
pub struct VaultClient {
    config: VaultConfig,
    base_url: Url,
    executor: Arc<dyn RequestExecutor>,
    tokens: Arc<dyn TokenProvider>,
    clock: Arc<dyn Clock>,
}

impl VaultClient {
    /// Create a client talking HTTP to the configured address, logging in
    /// with the configured method.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: VaultConfig) -> VaultResult<Self> {
        config.validate()?;
        let executor = HttpExecutor::new(&config)?;
        let tokens = CachingTokenProvider::from_boxed(build_provider(&config.auth), config.grace_period)
            .with_renew_increment(config.renew_increment);
        Self::with_parts(config, Arc::new(executor), Arc::new(tokens), Arc::new(SystemClock))
    }

    /// Create a client from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_parts(
        config: VaultConfig,
        executor: Arc<dyn RequestExecutor>,
        tokens: Arc<dyn TokenProvider>,
        clock: Arc<dyn Clock>,
    ) -> VaultResult<Self> {
        config.validate()?;
        let base_url = config.base_url()?;
        Ok(Self {
            config,
            base_url,
            executor,
            tokens,
            clock,
        })
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Token provider used for requests without an explicit token.
    #[must_use]
    pub fn token_provider(&self) -> &dyn TokenProvider {
        self.tokens.as_ref()
    }

    /// Time source used for token bookkeeping.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Transit engine mounted at `mount`.
    #[must_use]
    pub fn transit(&self, mount: impl Into<String>) -> Transit<'_> {
        Transit::new(self, mount)
    }

    async fn attempt(&self, request: &Request) -> Result<Response, AttemptFailure> {
        let auth = AuthRequest::new(request, self, self.clock.as_ref());
        let token = self
            .tokens
            .provide(&auth)
            .await
            .map_err(|e| AttemptFailure::new(e, false))?;
        let from_cache = token.is_from_cache();
        token
            .consume_use()
            .map_err(|e| AttemptFailure::new(e, from_cache))?;

        let mut call = request.clone();
        call.set_token(Override::Set(token.client_token().clone()));
        self.executor
            .execute(call)
            .await
            .map_err(|e| AttemptFailure::new(e, from_cache))
    }
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.config.auth.method())
            .field("max_attempts", &self.config.max_attempts)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestExecutor for VaultClient {
    #[instrument(skip_all, fields(operation = %request.operation(), request_id = %Uuid::new_v4()))]
    async fn execute(&self, mut request: Request) -> VaultResult<Response> {
        request.apply_defaults(
            &self.base_url,
            self.config.timeout,
            self.config.namespace.as_ref(),
            self.config.confidentiality,
        );

        if !request.token().is_inherit() {
            return self.executor.execute(request).await;
        }

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let failure = match self.attempt(&request).await {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            let decision = RetryDecision::classify(&failure.error, failure.from_cache);
            if decision == RetryDecision::GiveUp {
                return Err(failure.error);
            }
            // A refused cached token is dropped even when no attempt is left.
            if decision == RetryDecision::RetryFresh {
                debug!("Cached token was refused, invalidating");
                self.tokens.invalidate();
            }
            if attempt >= max_attempts {
                warn!(attempt, error = %failure.error, "Giving up after retryable failure");
                return Err(failure.error);
            }
            warn!(attempt, error = %failure.error, "Retrying Vault request");
            attempt += 1;
        }
    }
}
