//! Property tests for token and lease lifecycle math.

use chrono::{DateTime, TimeDelta, Utc};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use test_utils::{elapsed_strategy, grace_strategy, lease_strategy, token_secret_strategy, uses_strategy};
use vault_client::{Expiring, Lease, Token, VaultError};

fn epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn later(secs: u64) -> DateTime<Utc> {
    epoch() + TimeDelta::seconds(i64::try_from(secs).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// `should_extend` is exactly "alive, renewable and inside the grace window".
    #[test]
    fn should_extend_matches_definition(
        secret in token_secret_strategy(),
        lease in lease_strategy(),
        renewable in any::<bool>(),
        grace in grace_strategy(),
        elapsed in elapsed_strategy(),
        uses in proptest::option::of(0u32..3),
    ) {
        let mut token = if lease.is_zero() {
            Token::non_expiring(secret, epoch())
        } else {
            Token::new(secret, renewable, lease, epoch())
        };
        if let Some(uses) = uses {
            token = token.with_allowed_uses(uses);
        }
        let now = later(elapsed);

        let expected = !token.is_expired(now)
            && token.is_renewable()
            && token.is_expiring_within(grace, now);
        prop_assert_eq!(token.should_extend(grace, now), expected);
    }

    /// Expiry is strictly after `created + duration`.
    #[test]
    fn expiry_boundary(lease_secs in 1u64..86_400, elapsed in elapsed_strategy()) {
        let token = Token::new("s.x", true, Duration::from_secs(lease_secs), epoch());
        prop_assert_eq!(token.is_expired(later(elapsed)), elapsed > lease_secs);
    }

    /// Leases share the token expiry math.
    #[test]
    fn lease_matches_token_math(
        lease in lease_strategy(),
        renewable in any::<bool>(),
        grace in grace_strategy(),
        elapsed in elapsed_strategy(),
    ) {
        let as_lease = Lease::new("database/creds/app/1", renewable, lease, epoch());
        let now = later(elapsed);
        if lease.is_zero() {
            prop_assert!(!as_lease.is_expired(now));
            prop_assert!(!as_lease.should_extend(grace, now));
        } else {
            let as_token = Token::new("s.x", renewable, lease, epoch());
            prop_assert_eq!(as_lease.is_expired(now), as_token.is_expired(now));
            prop_assert_eq!(as_lease.should_extend(grace, now), as_token.should_extend(grace, now));
        }
    }

    /// N allowed uses succeed exactly N times across racing threads.
    #[test]
    fn concurrent_uses_are_counted_exactly(uses in uses_strategy(), threads in 2usize..8) {
        let token = Token::new("s.limited", false, Duration::from_secs(60), epoch()).with_allowed_uses(uses);
        let cached = token.cached();
        let granted = Arc::new(AtomicUsize::new(0));
        let refused = Arc::new(AtomicUsize::new(0));
        let attempts_per_thread = usize::try_from(uses).unwrap() + 2;

        std::thread::scope(|scope| {
            for i in 0..threads {
                let handle = if i % 2 == 0 { token.clone() } else { cached.clone() };
                let granted = Arc::clone(&granted);
                let refused = Arc::clone(&refused);
                scope.spawn(move || {
                    for _ in 0..attempts_per_thread {
                        match handle.consume_use() {
                            Ok(()) => granted.fetch_add(1, Ordering::SeqCst),
                            Err(VaultError::TokenUsesExhausted) => refused.fetch_add(1, Ordering::SeqCst),
                            Err(other) => panic!("unexpected error: {other}"),
                        };
                    }
                });
            }
        });

        prop_assert_eq!(granted.load(Ordering::SeqCst), usize::try_from(uses).unwrap());
        prop_assert_eq!(
            refused.load(Ordering::SeqCst),
            threads * attempts_per_thread - usize::try_from(uses).unwrap()
        );
        prop_assert!(token.is_exhausted());
        prop_assert_eq!(token.uses_remaining(), Some(-1));
    }

    /// Exhaustion is terminal.
    #[test]
    fn exhausted_token_never_recovers(uses in uses_strategy(), extra in 1usize..10) {
        let token = Token::new("s.limited", false, Duration::from_secs(60), epoch()).with_allowed_uses(uses);
        for _ in 0..uses {
            prop_assert!(token.consume_use().is_ok());
        }
        for _ in 0..extra {
            prop_assert!(matches!(token.consume_use(), Err(VaultError::TokenUsesExhausted)));
            prop_assert_eq!(token.uses_remaining(), Some(-1));
        }
    }
}

#[test]
fn debug_output_hides_secret() {
    let token = Token::new("hvs.supersecretvalue", true, Duration::from_secs(60), epoch());
    assert!(!format!("{token:?}").contains("supersecretvalue"));
}
