//! Request execution over HTTP.

use crate::{
    config::VaultConfig,
    error::{VaultError, VaultResult},
    request::{Confidentiality, Method, Override, Request, Response},
};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

const TOKEN_HEADER: &str = "X-Vault-Token";
const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
const REQUEST_HEADER: &str = "X-Vault-Request";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Executes one request against Vault.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Execute `request` and return its checked response.
    async fn execute(&self, request: Request) -> VaultResult<Response>;
}

/// [`RequestExecutor`] backed by a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    http: Client,
}

impl HttpExecutor {
    /// Build the HTTP client from the Vault configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be built (e.g., TLS initialization fails).
    pub fn new(config: &VaultConfig) -> VaultResult<Self> {
        let http = ClientBuilder::new()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .danger_accept_invalid_certs(config.tls_skip_verify)
            .build()
            .map_err(VaultError::Http)?;
        Ok(Self { http })
    }

    /// Wrap an existing client.
    #[must_use]
    pub const fn from_client(http: Client) -> Self {
        Self { http }
    }
}

fn wire_method(method: Method) -> VaultResult<reqwest::Method> {
    Ok(match method {
        Method::Get => reqwest::Method::GET,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::List => reqwest::Method::from_bytes(b"LIST")
            .map_err(|e| VaultError::invalid_config(e.to_string()))?,
    })
}

fn parse_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(serde_json::from_slice(bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(bytes).trim().to_string())
    }))
}

#[async_trait]
impl RequestExecutor for HttpExecutor {
    async fn execute(&self, request: Request) -> VaultResult<Response> {
        let url = request.url()?;
        let timeout = request.timeout().unwrap_or(DEFAULT_TIMEOUT);
        let confidentiality = request.confidentiality();

        let mut builder = self
            .http
            .request(wire_method(request.method())?, url)
            .timeout(timeout)
            .header(REQUEST_HEADER, "true");
        if let Override::Set(token) = request.token() {
            builder = builder.header(TOKEN_HEADER, token.expose_secret());
        }
        if let Override::Set(namespace) = request.namespace() {
            builder = builder.header(NAMESPACE_HEADER, namespace);
        }
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        match confidentiality {
            Confidentiality::Low => trace!(
                operation = request.operation(),
                method = %request.method(),
                path = %request.path(),
                body = ?request.body(),
                "Sending Vault request"
            ),
            Confidentiality::Medium => debug!(
                operation = request.operation(),
                method = %request.method(),
                path = %request.path(),
                "Sending Vault request"
            ),
            Confidentiality::High => debug!(operation = request.operation(), "Sending Vault request"),
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                VaultError::Timeout {
                    operation: request.operation().to_string(),
                    timeout,
                }
            } else {
                VaultError::transport(request.operation(), e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                VaultError::Timeout {
                    operation: request.operation().to_string(),
                    timeout,
                }
            } else {
                VaultError::transport(request.operation(), e.to_string())
            }
        })?;
        let body = parse_body(&bytes);

        match confidentiality {
            Confidentiality::Low => {
                trace!(operation = request.operation(), status, body = ?body, "Vault response");
            }
            Confidentiality::Medium => {
                debug!(operation = request.operation(), path = %request.path(), status, "Vault response");
            }
            Confidentiality::High => debug!(operation = request.operation(), "Vault response"),
        }

        request.respond(status, body)
    }
}
