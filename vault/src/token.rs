//! Time-bounded credentials: tokens and leases.
//!
//! Both share the same expiry math through [`Expiring`]. Renewal never
//! mutates a value; it produces a replacement.

use crate::error::{VaultError, VaultResult};
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Expiry and renewal math shared by tokens and leases.
pub trait Expiring {
    /// Instant the credential was issued or last renewed.
    fn created(&self) -> DateTime<Utc>;

    /// Lifetime from [`Expiring::created`]; `None` never expires.
    fn duration(&self) -> Option<Duration>;

    /// Whether Vault allows extending the credential.
    fn is_renewable(&self) -> bool;

    /// Instant after which the credential is dead.
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        let lifetime = TimeDelta::from_std(self.duration()?).ok()?;
        self.created().checked_add_signed(lifetime)
    }

    /// `now > created + duration`
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }

    /// `now + grace > created + duration`
    fn is_expiring_within(&self, grace: Duration, now: DateTime<Utc>) -> bool {
        let Some(at) = self.expires_at() else {
            return false;
        };
        TimeDelta::from_std(grace)
            .ok()
            .and_then(|grace| now.checked_add_signed(grace))
            .is_none_or(|horizon| horizon > at)
    }

    /// Alive, renewable and inside the grace window.
    fn should_extend(&self, grace: Duration, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.is_renewable() && self.is_expiring_within(grace, now)
    }
}

/// Short-lived Vault token with its lease metadata.
///
/// Clones share one use counter, so a token handed out by the cache and the
/// copy kept in the cache never double-count a use.
#[derive(Clone)]
pub struct Token {
    client_token: SecretString,
    renewable: bool,
    lease_duration: Option<Duration>,
    created: DateTime<Utc>,
    from_cache: bool,
    uses_remaining: Option<Arc<AtomicI64>>,
}

impl Token {
    /// Create a token with unlimited uses.
    #[must_use]
    pub fn new(
        client_token: impl Into<SecretString>,
        renewable: bool,
        lease_duration: Duration,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            client_token: client_token.into(),
            renewable,
            lease_duration: Some(lease_duration),
            created,
            from_cache: false,
            uses_remaining: None,
        }
    }

    /// Create a token that never expires and is never renewed.
    #[must_use]
    pub fn non_expiring(client_token: impl Into<SecretString>, created: DateTime<Utc>) -> Self {
        Self {
            client_token: client_token.into(),
            renewable: false,
            lease_duration: None,
            created,
            from_cache: false,
            uses_remaining: None,
        }
    }

    /// Limit the token to `uses` requests.
    #[must_use]
    pub fn with_allowed_uses(mut self, uses: u32) -> Self {
        self.uses_remaining = Some(Arc::new(AtomicI64::new(i64::from(uses))));
        self
    }

    /// View of this token as served from the cache.
    #[must_use]
    pub fn cached(&self) -> Self {
        Self {
            from_cache: true,
            ..self.clone()
        }
    }

    /// The secret value sent in `X-Vault-Token`.
    #[must_use]
    pub const fn client_token(&self) -> &SecretString {
        &self.client_token
    }

    /// Lease duration, `None` when the token never expires.
    #[must_use]
    pub const fn lease_duration(&self) -> Option<Duration> {
        self.lease_duration
    }

    /// Whether the token was served from the cache.
    #[must_use]
    pub const fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// Remaining uses, `None` when unlimited.
    #[must_use]
    pub fn uses_remaining(&self) -> Option<i64> {
        self.uses_remaining
            .as_ref()
            .map(|uses| uses.load(Ordering::Acquire))
    }

    /// True once every allowed use has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.uses_remaining().is_some_and(|uses| uses <= 0)
    }

    /// Consume one use of the token.
    ///
    /// Lock-free: racers on the last use get exactly one winner. Once the
    /// counter goes below zero it stays at -1.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::TokenUsesExhausted`] when no use is left.
    pub fn consume_use(&self) -> VaultResult<()> {
        let Some(uses) = &self.uses_remaining else {
            return Ok(());
        };
        match uses.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
            (n > 0).then(|| n - 1)
        }) {
            Ok(_) => Ok(()),
            Err(_) => {
                uses.store(-1, Ordering::Release);
                Err(VaultError::TokenUsesExhausted)
            }
        }
    }

    /// Carry the use limit of `previous` over to this renewed token.
    ///
    /// Renewal never adds uses: the result shares the counter of `previous`,
    /// lowered to this token's own count when that one is smaller.
    #[must_use]
    pub(crate) fn keep_uses_of(mut self, previous: &Self) -> Self {
        if let Some(counter) = &previous.uses_remaining {
            if let Some(reported) = self.uses_remaining() {
                counter.fetch_min(reported, Ordering::AcqRel);
            }
            self.uses_remaining = Some(Arc::clone(counter));
        }
        self
    }

    /// Whether two tokens carry the same secret.
    #[must_use]
    pub fn same_secret(&self, other: &Self) -> bool {
        self.client_token.expose_secret() == other.client_token.expose_secret()
    }
}

impl Expiring for Token {
    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn duration(&self) -> Option<Duration> {
        self.lease_duration
    }

    fn is_renewable(&self) -> bool {
        self.renewable
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("client_token", &"[REDACTED]")
            .field("renewable", &self.renewable)
            .field("lease_duration", &self.lease_duration)
            .field("created", &self.created)
            .field("from_cache", &self.from_cache)
            .field("uses_remaining", &self.uses_remaining())
            .finish()
    }
}

/// Lease on a dynamically issued secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Lease identifier used for renewal and revocation
    pub id: String,
    /// Whether the lease can be extended
    pub renewable: bool,
    /// Lease duration; zero means the secret does not expire
    pub duration: Duration,
    /// Instant the lease was issued or last renewed
    pub created: DateTime<Utc>,
}

impl Lease {
    /// Create a lease.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        renewable: bool,
        duration: Duration,
        created: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            renewable,
            duration,
            created,
        }
    }
}

impl Expiring for Lease {
    fn created(&self) -> DateTime<Utc> {
        self.created
    }

    fn duration(&self) -> Option<Duration> {
        (!self.duration.is_zero()).then_some(self.duration)
    }

    fn is_renewable(&self) -> bool {
        self.renewable
    }
}
