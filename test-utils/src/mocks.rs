//! Mock collaborators for the Vault client.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use vault_client::{
    AuthRequest, Request, RequestExecutor, Response, Token, TokenProvider, VaultResult,
};

type Handler = Box<dyn Fn(&Request, usize) -> (u16, Option<Value>) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Executor that records every request and answers through a handler.
///
/// The handler gets the request and its zero-based call number.
pub struct MockExecutor {
    handler: Handler,
    requests: Mutex<Vec<Request>>,
}

impl MockExecutor {
    /// Answer every call through `handler`.
    #[must_use]
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Request, usize) -> (u16, Option<Value>) + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Play back `replies` in order, then answer `200 {}`.
    #[must_use]
    pub fn scripted(replies: Vec<(u16, Value)>) -> Self {
        let replies = Mutex::new(VecDeque::from(replies));
        Self::new(move |_, _| {
            lock(&replies)
                .pop_front()
                .map_or((200, Some(serde_json::json!({}))), |(status, body)| {
                    (status, Some(body))
                })
        })
    }

    /// Answer every call with the same reply.
    #[must_use]
    pub fn always(status: u16, body: Value) -> Self {
        Self::new(move |_, _| (status, Some(body.clone())))
    }

    /// Requests seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Paths of the calls so far.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        lock(&self.requests).iter().map(Request::path).collect()
    }
}

impl std::fmt::Debug for MockExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockExecutor")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RequestExecutor for MockExecutor {
    async fn execute(&self, request: Request) -> VaultResult<Response> {
        let call = {
            let mut requests = lock(&self.requests);
            requests.push(request.clone());
            requests.len() - 1
        };
        let (status, body) = (self.handler)(&request, call);
        request.respond(status, body)
    }
}

/// Provider that logs in as `{prefix}-1`, `{prefix}-2`, ...
#[derive(Debug)]
pub struct SequenceProvider {
    prefix: String,
    lease: Duration,
    renewable: bool,
    uses: Option<u32>,
    logins: AtomicUsize,
}

impl SequenceProvider {
    /// Tokens with the given lease, not renewable, unlimited uses.
    #[must_use]
    pub fn new(prefix: impl Into<String>, lease: Duration) -> Self {
        Self {
            prefix: prefix.into(),
            lease,
            renewable: false,
            uses: None,
            logins: AtomicUsize::new(0),
        }
    }

    /// Issue renewable tokens.
    #[must_use]
    pub const fn renewable(mut self) -> Self {
        self.renewable = true;
        self
    }

    /// Issue tokens limited to `uses` calls.
    #[must_use]
    pub const fn with_uses(mut self, uses: u32) -> Self {
        self.uses = Some(uses);
        self
    }

    /// Number of logins so far.
    #[must_use]
    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    /// Secret of the `n`th login, starting at 1.
    #[must_use]
    pub fn secret(&self, n: usize) -> String {
        format!("{}-{n}", self.prefix)
    }
}

#[async_trait]
impl TokenProvider for SequenceProvider {
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
        let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
        let token = Token::new(self.secret(n), self.renewable, self.lease, auth.clock.now());
        Ok(match self.uses {
            Some(uses) => token.with_allowed_uses(uses),
            None => token,
        })
    }
}

/// Provider whose tokens always look cached, counting invalidations.
#[derive(Debug, Default)]
pub struct CachedTokenProvider {
    provided: AtomicUsize,
    invalidations: AtomicUsize,
}

impl CachedTokenProvider {
    /// Create the provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tokens handed out.
    #[must_use]
    pub fn provided(&self) -> usize {
        self.provided.load(Ordering::SeqCst)
    }

    /// Number of invalidations.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.invalidations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn provide(&self, auth: &AuthRequest<'_>) -> VaultResult<Token> {
        self.provided.fetch_add(1, Ordering::SeqCst);
        Ok(Token::new("s.cached", true, Duration::from_secs(3600), auth.clock.now()).cached())
    }

    fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}
