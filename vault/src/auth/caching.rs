use super::{AuthRequest, TokenProvider, token::renew_self};
use crate::{
    error::VaultResult,
    token::{Expiring, Token},
};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default window before expiry in which renewable tokens are renewed.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Holds one token, renewing it inside the grace window and logging in
/// again through the wrapped provider when it is dead.
///
/// The slot is swapped atomically. Concurrent callers that miss the cache
/// may each log in; the last store wins.
pub struct CachingTokenProvider {
    inner: Box<dyn TokenProvider>,
    grace_period: Duration,
    renew_increment: Option<Duration>,
    slot: ArcSwapOption<Token>,
}

impl CachingTokenProvider {
    /// Wrap `inner` with the given grace period.
    #[must_use]
    pub fn new(inner: impl TokenProvider + 'static, grace_period: Duration) -> Self {
        Self::from_boxed(Box::new(inner), grace_period)
    }

    /// Wrap an already boxed provider.
    #[must_use]
    pub fn from_boxed(inner: Box<dyn TokenProvider>, grace_period: Duration) -> Self {
        Self {
            inner,
            grace_period,
            renew_increment: None,
            slot: ArcSwapOption::empty(),
        }
    }

    /// Ask for this increment on every renewal.
    #[must_use]
    pub const fn with_renew_increment(mut self, increment: Option<Duration>) -> Self {
        self.renew_increment = increment;
        self
    }

    /// The cached token, if any.
    #[must_use]
    pub fn current(&self) -> Option<Token> {
        self.slot.load_full().map(|token| (*token).clone())
    }

    async fn refresh(&self, auth: &AuthRequest<'_>, current: Option<Token>) -> VaultResult<Token> {
        let now = auth.clock.now();
        let mut current = current;

        if let Some(token) = current.as_ref().filter(|t| t.should_extend(self.grace_period, now)) {
            match renew_self(auth.executor, auth.clock, token, self.renew_increment).await {
                Ok(renewed) => {
                    debug!(lease = ?renewed.lease_duration(), "Renewed Vault token");
                    current = Some(renewed);
                }
                Err(e) if e.is_token_invalid() => {
                    warn!(error = %e, "Cached token can no longer be renewed, logging in again");
                    current = None;
                }
                Err(e) => return Err(e),
            }
        }

        let token = match current {
            Some(token) => token,
            None => {
                let token = self.inner.provide(auth).await?;
                info!(lease = ?token.lease_duration(), "Obtained new Vault token");
                token
            }
        };

        if token
            .lease_duration()
            .is_some_and(|lease| lease < self.grace_period)
        {
            warn!(
                lease = ?token.lease_duration(),
                grace_period = ?self.grace_period,
                "Token lease is shorter than the grace period; every call will renew"
            );
        }

        self.slot.store(Some(Arc::new(token.cached())));
        Ok(token)
    }
}

impl std::fmt::Debug for CachingTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingTokenProvider")
            .field("grace_period", &self.grace_period)
            .field("renew_increment", &self.renew_increment)
            .field("cached", &self.slot.load().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for CachingTokenProvider {
    #[instrument(skip_all)]
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
        let now = auth.clock.now();
        let cached = self
            .slot
            .load_full()
            .filter(|token| !token.is_expired(now) && !token.is_exhausted());

        match cached {
            Some(token) if !token.should_extend(self.grace_period, now) => Ok((*token).clone()),
            Some(token) => self.refresh(auth, Some((*token).clone())).await,
            None => self.refresh(auth, None).await,
        }
    }

    fn invalidate(&self) {
        debug!("Invalidating cached Vault token");
        self.slot.store(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        error::VaultError,
        executor::RequestExecutor,
        request::{Request, Response},
    };
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out tokens "login-1", "login-2", ... with the configured lease.
    struct CountingLogin {
        logins: AtomicUsize,
        lease: Duration,
        renewable: bool,
    }

    impl CountingLogin {
        fn new(lease: Duration, renewable: bool) -> Self {
            Self {
                logins: AtomicUsize::new(0),
                lease,
                renewable,
            }
        }
    }

    #[async_trait]
    impl TokenProvider for CountingLogin {
        async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
            let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Token::new(
                format!("login-{n}"),
                self.renewable,
                self.lease,
                auth.clock.now(),
            ))
        }
    }

    /// Answers renew-self with a fixed status.
    struct RenewExecutor {
        status: u16,
        renewals: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RequestExecutor for RenewExecutor {
        async fn execute(&self, request: Request) -> VaultResult<Response> {
            self.renewals
                .lock()
                .map_err(|_| VaultError::transport("renew", "poisoned"))?
                .push(request.path());
            let body = if self.status == 200 {
                serde_json::json!({"auth": {"client_token": "renewed", "renewable": true, "lease_duration": 600}})
            } else {
                serde_json::json!({"errors": ["permission denied"]})
            };
            request.respond(self.status, Some(body))
        }
    }

    fn executor(status: u16) -> RenewExecutor {
        RenewExecutor {
            status,
            renewals: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_warm_cache_reuses_token() {
        let login = Arc::new(CountingLogin::new(Duration::from_secs(600), true));
        let cache = CachingTokenProvider::new(Arc::clone(&login), DEFAULT_GRACE_PERIOD);
        let clock = ManualClock::new(Utc::now());
        let exec = executor(200);
        let request = Request::get("read", ["secret", "data", "a"]);
        let auth = AuthRequest::new(&request, &exec, &clock);

        let first = cache.provide(&auth).await.unwrap();
        let second = cache.provide(&auth).await.unwrap();
        assert!(!first.is_from_cache());
        assert!(second.is_from_cache());
        assert!(first.same_secret(&second));
        assert_eq!(login.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_renews_inside_grace_window() {
        let login = Arc::new(CountingLogin::new(Duration::from_secs(60), true));
        let cache = CachingTokenProvider::new(Arc::clone(&login), DEFAULT_GRACE_PERIOD);
        let clock = ManualClock::new(Utc::now());
        let exec = executor(200);
        let request = Request::get("read", ["secret", "data", "a"]);
        let auth = AuthRequest::new(&request, &exec, &clock);

        cache.provide(&auth).await.unwrap();
        clock.advance(Duration::from_secs(45));
        let renewed = cache.provide(&auth).await.unwrap();

        assert_eq!(renewed.lease_duration(), Some(Duration::from_secs(600)));
        assert_eq!(login.logins.load(Ordering::SeqCst), 1);
        assert_eq!(
            exec.renewals.lock().unwrap().as_slice(),
            ["v1/auth/token/renew-self".to_string()]
        );
    }

    #[tokio::test]
    async fn test_renewal_keeps_remaining_uses() {
        struct ThreeUses;

        #[async_trait]
        impl TokenProvider for ThreeUses {
            async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
                Ok(Token::new("three-uses", true, Duration::from_secs(60), auth.clock.now())
                    .with_allowed_uses(3))
            }
        }

        let cache = CachingTokenProvider::new(ThreeUses, DEFAULT_GRACE_PERIOD);
        let clock = ManualClock::new(Utc::now());
        let exec = executor(200);
        let request = Request::get("read", ["secret", "data", "a"]);
        let auth = AuthRequest::new(&request, &exec, &clock);

        let first = cache.provide(&auth).await.unwrap();
        first.consume_use().unwrap();
        clock.advance(Duration::from_secs(45));
        let renewed = cache.provide(&auth).await.unwrap();

        assert_eq!(exec.renewals.lock().unwrap().len(), 1);
        assert_eq!(renewed.uses_remaining(), Some(2));
        renewed.consume_use().unwrap();
        assert_eq!(first.uses_remaining(), Some(1));
        assert_eq!(cache.current().unwrap().uses_remaining(), Some(1));
    }

    #[tokio::test]
    async fn test_invalid_renewal_falls_back_to_login() {
        let login = Arc::new(CountingLogin::new(Duration::from_secs(60), true));
        let cache = CachingTokenProvider::new(Arc::clone(&login), DEFAULT_GRACE_PERIOD);
        let clock = ManualClock::new(Utc::now());
        let exec = executor(403);
        let request = Request::get("read", ["secret", "data", "a"]);
        let auth = AuthRequest::new(&request, &exec, &clock);

        cache.provide(&auth).await.unwrap();
        clock.advance(Duration::from_secs(45));
        let token = cache.provide(&auth).await.unwrap();

        assert_eq!(login.logins.load(Ordering::SeqCst), 2);
        assert!(token.same_secret(&Token::non_expiring("login-2", Utc::now())));
    }

    #[tokio::test]
    async fn test_other_renewal_failures_propagate() {
        let login = Arc::new(CountingLogin::new(Duration::from_secs(60), true));
        let cache = CachingTokenProvider::new(Arc::clone(&login), DEFAULT_GRACE_PERIOD);
        let clock = ManualClock::new(Utc::now());
        let exec = executor(500);
        let request = Request::get("read", ["secret", "data", "a"]);
        let auth = AuthRequest::new(&request, &exec, &clock);

        cache.provide(&auth).await.unwrap();
        clock.advance(Duration::from_secs(45));
        let err = cache.provide(&auth).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_expired_token_is_replaced() {
        let login = Arc::new(CountingLogin::new(Duration::from_secs(60), false));
        let cache = CachingTokenProvider::new(Arc::clone(&login), Duration::from_secs(5));
        let clock = ManualClock::new(Utc::now());
        let exec = executor(200);
        let request = Request::get("read", ["secret", "data", "a"]);
        let auth = AuthRequest::new(&request, &exec, &clock);

        let a = cache.provide(&auth).await.unwrap();
        clock.advance(Duration::from_secs(61));
        let b = cache.provide(&auth).await.unwrap();
        assert!(!a.same_secret(&b));
        assert!(exec.renewals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_token_is_replaced() {
        struct OneUse;

        #[async_trait]
        impl TokenProvider for OneUse {
            async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
                Ok(Token::new("one-use", false, Duration::from_secs(600), auth.clock.now())
                    .with_allowed_uses(1))
            }
        }

        let cache = CachingTokenProvider::new(OneUse, DEFAULT_GRACE_PERIOD);
        let clock = ManualClock::new(Utc::now());
        let exec = executor(200);
        let request = Request::get("read", ["secret", "data", "a"]);
        let auth = AuthRequest::new(&request, &exec, &clock);

        let first = cache.provide(&auth).await.unwrap();
        first.consume_use().unwrap();
        let second = cache.provide(&auth).await.unwrap();
        assert!(!second.is_from_cache());
        assert!(second.consume_use().is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_forces_login() {
        let login = Arc::new(CountingLogin::new(Duration::from_secs(600), true));
        let cache = CachingTokenProvider::new(Arc::clone(&login), DEFAULT_GRACE_PERIOD);
        let clock = ManualClock::new(Utc::now());
        let exec = executor(200);
        let request = Request::get("read", ["secret", "data", "a"]);
        let auth = AuthRequest::new(&request, &exec, &clock);

        cache.provide(&auth).await.unwrap();
        cache.invalidate();
        assert!(cache.current().is_none());
        cache.provide(&auth).await.unwrap();
        assert_eq!(login.logins.load(Ordering::SeqCst), 2);
    }
}
