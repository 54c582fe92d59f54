//! Shared proptest generators for vault-client tests.

use proptest::prelude::*;
use std::time::Duration;
use vault_client::transit::KeyType;

/// Generate token secrets shaped like Vault service tokens.
pub fn token_secret_strategy() -> impl Strategy<Value = String> {
    "hvs\\.[A-Za-z0-9]{24}"
}

/// Generate lease durations, including zero (never expires).
pub fn lease_strategy() -> impl Strategy<Value = Duration> {
    prop_oneof![
        1 => Just(Duration::ZERO),
        9 => (1u64..86_400).prop_map(Duration::from_secs),
    ]
}

/// Generate grace periods.
pub fn grace_strategy() -> impl Strategy<Value = Duration> {
    (0u64..3_600).prop_map(Duration::from_secs)
}

/// Generate clock offsets from a token's creation, in seconds.
pub fn elapsed_strategy() -> impl Strategy<Value = u64> {
    0u64..172_800
}

/// Generate arbitrary payload bytes.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Generate transit key types that encrypt.
pub fn encryption_key_type_strategy() -> impl Strategy<Value = KeyType> {
    prop::sample::select(
        KeyType::ALL
            .into_iter()
            .filter(|k| k.supports_encryption())
            .collect::<Vec<_>>(),
    )
}

/// Generate transit key types that sign.
pub fn signing_key_type_strategy() -> impl Strategy<Value = KeyType> {
    prop::sample::select(
        KeyType::ALL
            .into_iter()
            .filter(|k| k.supports_signing())
            .collect::<Vec<_>>(),
    )
}

/// Generate an allowed-uses count for limited tokens.
pub fn uses_strategy() -> impl Strategy<Value = u32> {
    1u32..64
}
