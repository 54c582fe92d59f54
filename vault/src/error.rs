//! Vault error types using thiserror 2.0.
//!
//! Separates transport failures, protocol failures (unexpected status codes)
//! and the locally raised token exhaustion, and classifies protocol failures
//! for the token cache.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Vault-specific errors.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Network, connect or I/O failure while talking to Vault.
    #[error("Vault unavailable during {operation}: {message}")]
    Transport {
        /// Operation being executed
        operation: String,
        /// Underlying failure
        message: String,
    },

    /// The per-call timeout elapsed.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation being executed
        operation: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Vault answered with a status the request did not expect.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The applied token has no uses left.
    #[error("Token uses exhausted")]
    TokenUsesExhausted,

    /// A transit verification reported an invalid signature.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Authentication could not be performed.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Vault answered with a body that does not match the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for Vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    /// Create a transport error.
    #[must_use]
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an authentication failed error.
    #[must_use]
    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create an invalid response error.
    #[must_use]
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Check if this is a protocol-level permission denial.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_permission_denied())
    }

    /// Check if the failure means the presented token can no longer be used.
    #[must_use]
    pub fn is_token_invalid(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_token_invalid())
    }

    /// HTTP status of a protocol failure.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Protocol(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Vault answered a request with an unexpected status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    /// Operation name of the failed request
    pub operation: String,
    /// Request path, without the base address
    pub path: String,
    /// HTTP status returned by Vault
    pub status: u16,
    /// Errors parsed from the `{"errors": [...]}` body
    pub errors: Vec<String>,
    /// Raw body when it was not the structured error shape
    pub body: Option<String>,
}

impl ProtocolError {
    /// Check for HTTP 403.
    #[must_use]
    pub const fn is_permission_denied(&self) -> bool {
        self.status == 403
    }

    /// Check whether the failure invalidates the presented token.
    ///
    /// Vault reports a dead token as 403, and a token past its max TTL as 400
    /// with a "not renewable" message on renewal.
    #[must_use]
    pub fn is_token_invalid(&self) -> bool {
        self.is_permission_denied()
            || (self.status == 400
                && self
                    .errors
                    .iter()
                    .chain(self.body.iter())
                    .any(|e| e.contains("not renewable")))
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed with status {} on {}",
            self.operation, self.status, self.path
        )?;
        if !self.errors.is_empty() {
            write!(f, ": {}", self.errors.join(", "))?;
        } else if let Some(body) = &self.body {
            write!(f, ": {body}")?;
        }
        Ok(())
    }
}
