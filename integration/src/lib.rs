//! Shared setup for the HTTP-level Vault client tests.

use vault_client::auth::SecretSource;
use vault_client::{AuthConfig, VaultConfig};

/// Configuration pointing at `address` with a fixed root token.
#[must_use]
pub fn token_config(address: impl Into<String>) -> VaultConfig {
    VaultConfig::new(
        address,
        AuthConfig::Token(SecretSource::Plain("s.root".into())),
    )
}

/// Configuration logging in as `username` through userpass.
#[must_use]
pub fn userpass_config(address: impl Into<String>, username: &str, password: &str) -> VaultConfig {
    VaultConfig::new(
        address,
        AuthConfig::UserPass {
            mount: "userpass".to_string(),
            username: username.to_string(),
            password: SecretSource::Plain(password.into()),
        },
    )
}
