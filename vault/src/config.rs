//! Vault client configuration.

use crate::{
    auth::{SecretIdSource, SecretSource},
    error::{VaultError, VaultResult},
    request::Confidentiality,
};
use secrecy::{ExposeSecret, SecretString};
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Default Kubernetes service account token path.
pub const DEFAULT_KUBERNETES_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Login strategy, chosen when the client is built.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// Fixed (or wrapped) token.
    Token(SecretSource),
    /// Username and password.
    UserPass {
        /// Auth mount path
        mount: String,
        /// Username
        username: String,
        /// Password source
        password: SecretSource,
    },
    /// Role id and secret id.
    AppRole {
        /// Auth mount path
        mount: String,
        /// Public role id
        role_id: String,
        /// Secret id source
        secret_id: SecretIdSource,
    },
    /// Kubernetes service account identity.
    Kubernetes {
        /// Auth mount path
        mount: String,
        /// Vault role bound to the service account
        role: String,
        /// Path of the mounted service account token
        token_path: String,
    },
}

impl AuthConfig {
    /// Short name used in logs.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Token(_) => "token",
            Self::UserPass { .. } => "userpass",
            Self::AppRole { .. } => "approle",
            Self::Kubernetes { .. } => "kubernetes",
        }
    }
}

/// Vault client configuration.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Vault server address
    pub address: String,
    /// Default namespace
    pub namespace: Option<String>,
    /// Default per-call timeout
    pub timeout: Duration,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Default logging confidentiality
    pub confidentiality: Confidentiality,
    /// Attempts per logical call, including the first
    pub max_attempts: u32,
    /// Window before expiry in which a renewable token is renewed
    pub grace_period: Duration,
    /// Increment requested on token renewal
    pub renew_increment: Option<Duration>,
    /// Accept invalid TLS certificates
    pub tls_skip_verify: bool,
    /// User agent sent with every request
    pub user_agent: String,
    /// Login strategy
    pub auth: AuthConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            namespace: None,
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            confidentiality: Confidentiality::Medium,
            max_attempts: 3,
            grace_period: Duration::from_secs(30),
            renew_increment: None,
            tls_skip_verify: false,
            user_agent: concat!("vault-client-rust/", env!("CARGO_PKG_VERSION")).to_string(),
            auth: AuthConfig::Kubernetes {
                mount: "kubernetes".to_string(),
                role: String::new(),
                token_path: DEFAULT_KUBERNETES_TOKEN_PATH.to_string(),
            },
        }
    }
}

impl VaultConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(address: impl Into<String>, auth: AuthConfig) -> Self {
        Self {
            address: address.into(),
            auth,
            ..Default::default()
        }
    }

    /// Load configuration from the process environment and `.env`.
    ///
    /// # Errors
    ///
    /// Fails when a variable does not parse or the result does not validate.
    pub fn from_env() -> VaultResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Fails when a variable does not parse or the result does not validate.
    pub fn from_lookup<F>(lookup: F) -> VaultResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            address: lookup("VAULT_ADDR").unwrap_or(defaults.address),
            namespace: lookup("VAULT_NAMESPACE").filter(|ns| !ns.is_empty()),
            timeout: parse_secs(&lookup, "VAULT_TIMEOUT_SECS", defaults.timeout)?,
            connect_timeout: parse_secs(
                &lookup,
                "VAULT_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            )?,
            confidentiality: parse_var(&lookup, "VAULT_CONFIDENTIALITY", defaults.confidentiality)?,
            max_attempts: parse_var(&lookup, "VAULT_MAX_ATTEMPTS", defaults.max_attempts)?,
            grace_period: parse_secs(&lookup, "VAULT_GRACE_PERIOD_SECS", defaults.grace_period)?,
            renew_increment: lookup("VAULT_RENEW_INCREMENT_SECS")
                .map(|raw| parse_value::<u64>("VAULT_RENEW_INCREMENT_SECS", &raw))
                .transpose()?
                .map(Duration::from_secs),
            tls_skip_verify: parse_var(&lookup, "VAULT_SKIP_VERIFY", false)?,
            user_agent: defaults.user_agent,
            auth: auth_from_lookup(&lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set grace period.
    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Set the attempts per logical call.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the default namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the default logging confidentiality.
    #[must_use]
    pub const fn with_confidentiality(mut self, confidentiality: Confidentiality) -> Self {
        self.confidentiality = confidentiality;
        self
    }

    /// Set the renewal increment.
    #[must_use]
    pub const fn with_renew_increment(mut self, increment: Duration) -> Self {
        self.renew_increment = Some(increment);
        self
    }

    /// Parsed base address, always ending in `/`.
    ///
    /// # Errors
    ///
    /// Fails for unparsable or non-http(s) addresses.
    pub fn base_url(&self) -> VaultResult<Url> {
        let mut url = Url::parse(&self.address)
            .map_err(|e| VaultError::invalid_config(format!("VAULT_ADDR: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VaultError::invalid_config(format!(
                "VAULT_ADDR must be http or https, got {}",
                url.scheme()
            )));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> VaultResult<()> {
        self.base_url()?;
        if self.max_attempts == 0 {
            return Err(VaultError::invalid_config("max_attempts must be at least 1"));
        }
        match &self.auth {
            AuthConfig::Token(SecretSource::Plain(token)) if token.expose_secret().is_empty() => {
                Err(VaultError::invalid_config("token must not be empty"))
            }
            AuthConfig::UserPass { username, .. } if username.is_empty() => {
                Err(VaultError::invalid_config("username must not be empty"))
            }
            AuthConfig::AppRole { role_id, .. } if role_id.is_empty() => {
                Err(VaultError::invalid_config("role_id must not be empty"))
            }
            AuthConfig::Kubernetes { role, .. } if role.is_empty() => {
                Err(VaultError::invalid_config("kubernetes role must not be empty"))
            }
            _ => Ok(()),
        }
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> VaultResult<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| VaultError::invalid_config(format!("{name}: {e}")))
}

fn parse_var<T, F>(lookup: &F, name: &str, default: T) -> VaultResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map_or(Ok(default), |raw| parse_value(name, &raw))
}

fn parse_secs<F>(lookup: &F, name: &str, default: Duration) -> VaultResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_var(lookup, name, default.as_secs()).map(Duration::from_secs)
}

fn secret_from_lookup<F>(lookup: &F, plain: &str, wrapped: &str) -> VaultResult<SecretSource>
where
    F: Fn(&str) -> Option<String>,
{
    match (lookup(plain), lookup(wrapped)) {
        (Some(value), _) => Ok(SecretSource::Plain(SecretString::from(value))),
        (None, Some(wrapping)) => Ok(SecretSource::Wrapped(SecretString::from(wrapping))),
        (None, None) => Err(VaultError::invalid_config(format!(
            "one of {plain} or {wrapped} is required"
        ))),
    }
}

fn auth_from_lookup<F>(lookup: &F) -> VaultResult<AuthConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let method = lookup("VAULT_AUTH_METHOD").unwrap_or_else(|| {
        if lookup("VAULT_TOKEN").is_some() || lookup("VAULT_TOKEN_WRAPPED").is_some() {
            "token".to_string()
        } else {
            "kubernetes".to_string()
        }
    });
    let mount = |default: &str| lookup("VAULT_AUTH_MOUNT").unwrap_or_else(|| default.to_string());

    match method.to_ascii_lowercase().as_str() {
        "token" => Ok(AuthConfig::Token(secret_from_lookup(
            lookup,
            "VAULT_TOKEN",
            "VAULT_TOKEN_WRAPPED",
        )?)),
        "userpass" => Ok(AuthConfig::UserPass {
            mount: mount("userpass"),
            username: lookup("VAULT_USERNAME").unwrap_or_default(),
            password: secret_from_lookup(lookup, "VAULT_PASSWORD", "VAULT_PASSWORD_WRAPPED")?,
        }),
        "approle" => Ok(AuthConfig::AppRole {
            mount: mount("approle"),
            role_id: lookup("VAULT_ROLE_ID").unwrap_or_default(),
            secret_id: SecretIdSource::Secret(secret_from_lookup(
                lookup,
                "VAULT_SECRET_ID",
                "VAULT_SECRET_ID_WRAPPED",
            )?),
        }),
        "kubernetes" => Ok(AuthConfig::Kubernetes {
            mount: mount("kubernetes"),
            role: lookup("VAULT_KUBERNETES_ROLE").unwrap_or_default(),
            token_path: lookup("VAULT_KUBERNETES_TOKEN_PATH")
                .unwrap_or_else(|| DEFAULT_KUBERNETES_TOKEN_PATH.to_string()),
        }),
        other => Err(VaultError::invalid_config(format!(
            "unknown VAULT_AUTH_METHOD '{other}'"
        ))),
    }
}
