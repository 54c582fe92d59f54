//! Request descriptors and typed responses.
//!
//! A [`Request`] describes one Vault call completely: the client fills in
//! defaults only where the caller left a field unset, and every executor
//! validates the returned status through [`Request::respond`].

use crate::error::{ProtocolError, VaultError, VaultResult};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Vault HTTP methods, including the custom `LIST` verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET
    Get,
    /// PUT
    Put,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// LIST
    List,
}

impl Method {
    /// Verb as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::List => "LIST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request setting that distinguishes "unset" from "explicitly empty".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Override<T> {
    /// Use the client default.
    #[default]
    Inherit,
    /// Explicitly send nothing.
    Clear,
    /// Explicitly send this value.
    Set(T),
}

impl<T> Override<T> {
    /// True when the caller left the setting to the client.
    #[must_use]
    pub const fn is_inherit(&self) -> bool {
        matches!(self, Self::Inherit)
    }

    /// Borrow the explicit value, if any.
    #[must_use]
    pub const fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Replace `Inherit` with the given default; `None` becomes `Clear`.
    #[must_use]
    pub fn or_default_value(self, default: Option<T>) -> Self {
        match self {
            Self::Inherit => default.map_or(Self::Clear, Self::Set),
            other => other,
        }
    }
}

/// How much of a request may appear in logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidentiality {
    /// Bodies may be logged at TRACE.
    Low,
    /// Method, path and status only.
    #[default]
    Medium,
    /// Operation name only.
    High,
}

impl std::str::FromStr for Confidentiality {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(VaultError::invalid_config(format!(
                "unknown confidentiality level '{other}'"
            ))),
        }
    }
}

/// Which part of the response body holds the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResultShape {
    /// No result is read.
    Empty,
    /// The whole body.
    Body,
    /// The `data` object.
    #[default]
    Data,
    /// The `auth` object.
    Auth,
}

const DEFAULT_EXPECTED_STATUS: [u16; 3] = [200, 202, 204];

/// Descriptor of one Vault call.
#[derive(Debug, Clone)]
pub struct Request {
    operation: String,
    method: Method,
    api_version: String,
    path: Vec<String>,
    headers: BTreeMap<String, String>,
    query: Vec<(String, String)>,
    body: Option<Value>,
    token: Override<SecretString>,
    namespace: Override<String>,
    base_url: Option<Url>,
    timeout: Option<Duration>,
    confidentiality: Option<Confidentiality>,
    expected_status: Vec<u16>,
    shape: ResultShape,
}

impl Request {
    /// Create a request for `path` relative to the API version.
    ///
    /// Path segments may themselves contain `/` (mount paths often do).
    #[must_use]
    pub fn new<I, S>(operation: impl Into<String>, method: Method, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            operation: operation.into(),
            method,
            api_version: "v1".to_string(),
            path: path
                .into_iter()
                .map(Into::into)
                .map(|segment: String| segment.trim_matches('/').to_string())
                .filter(|segment| !segment.is_empty())
                .collect(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: None,
            token: Override::Inherit,
            namespace: Override::Inherit,
            base_url: None,
            timeout: None,
            confidentiality: None,
            expected_status: DEFAULT_EXPECTED_STATUS.to_vec(),
            shape: ResultShape::Data,
        }
    }

    /// GET request.
    #[must_use]
    pub fn get<I, S>(operation: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(operation, Method::Get, path)
    }

    /// POST request.
    #[must_use]
    pub fn post<I, S>(operation: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(operation, Method::Post, path)
    }

    /// PUT request.
    #[must_use]
    pub fn put<I, S>(operation: impl Into<String>, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(operation, Method::Put, path)
    }

    /// Set the API version prefix.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Set the JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Send an explicit token; bypasses the managed token and retries.
    #[must_use]
    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Override::Set(token);
        self
    }

    /// Send no token at all; used by login calls.
    #[must_use]
    pub fn without_token(mut self) -> Self {
        self.token = Override::Clear;
        self
    }

    /// Send an explicit namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Override::Set(namespace.into());
        self
    }

    /// Send no namespace even if the client has one configured.
    #[must_use]
    pub fn without_namespace(mut self) -> Self {
        self.namespace = Override::Clear;
        self
    }

    /// Target a different Vault address.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Set the per-call timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the logging confidentiality.
    #[must_use]
    pub const fn with_confidentiality(mut self, confidentiality: Confidentiality) -> Self {
        self.confidentiality = Some(confidentiality);
        self
    }

    /// Replace the accepted status codes.
    #[must_use]
    pub fn expect_status(mut self, statuses: &[u16]) -> Self {
        self.expected_status = statuses.to_vec();
        self
    }

    /// Accept 200 only.
    #[must_use]
    pub fn expect_ok(self) -> Self {
        self.expect_status(&[200])
    }

    /// Accept 204 only.
    #[must_use]
    pub fn expect_no_content(self) -> Self {
        self.expect_status(&[204]).with_shape(ResultShape::Empty)
    }

    /// Select where the result lives in the body.
    #[must_use]
    pub const fn with_shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    pub(crate) fn set_token(&mut self, token: Override<SecretString>) {
        self.token = token;
    }

    pub(crate) fn apply_defaults(
        &mut self,
        base_url: &Url,
        timeout: Duration,
        namespace: Option<&String>,
        confidentiality: Confidentiality,
    ) {
        self.base_url.get_or_insert_with(|| base_url.clone());
        self.timeout.get_or_insert(timeout);
        self.confidentiality.get_or_insert(confidentiality);
        if self.namespace.is_inherit() {
            self.namespace = Override::Inherit.or_default_value(namespace.cloned());
        }
    }

    /// Operation name used in logs and errors.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// `{api_version}/{path}`
    #[must_use]
    pub fn path(&self) -> String {
        std::iter::once(self.api_version.as_str())
            .chain(self.path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Path segments after the API version.
    #[must_use]
    pub fn path_segments(&self) -> &[String] {
        &self.path
    }

    /// Extra headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Query parameters.
    #[must_use]
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// JSON body.
    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Token setting.
    #[must_use]
    pub const fn token(&self) -> &Override<SecretString> {
        &self.token
    }

    /// Namespace setting.
    #[must_use]
    pub const fn namespace(&self) -> &Override<String> {
        &self.namespace
    }

    /// Base address, if resolved.
    #[must_use]
    pub const fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Per-call timeout, if resolved.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Logging confidentiality, defaulting to medium.
    #[must_use]
    pub fn confidentiality(&self) -> Confidentiality {
        self.confidentiality.unwrap_or_default()
    }

    /// Result location.
    #[must_use]
    pub const fn shape(&self) -> ResultShape {
        self.shape
    }

    /// Full URL of the call.
    ///
    /// # Errors
    ///
    /// Fails when no base address was configured or the path does not parse.
    pub fn url(&self) -> VaultResult<Url> {
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| VaultError::invalid_config("no Vault address configured"))?;
        let mut url = base
            .join(&self.path())
            .map_err(|e| VaultError::invalid_config(format!("invalid request path: {e}")))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.query);
        }
        Ok(url)
    }

    /// Turn a wire status and body into a response, enforcing the expected
    /// status codes.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Protocol`] for any status the request does not
    /// expect.
    pub fn respond(&self, status: u16, body: Option<Value>) -> VaultResult<Response> {
        if self.expected_status.contains(&status) {
            return Ok(Response {
                status,
                body,
                shape: self.shape,
            });
        }
        Err(self.protocol_error(status, body).into())
    }

    /// Build the protocol error for an unexpected status.
    #[must_use]
    pub fn protocol_error(&self, status: u16, body: Option<Value>) -> ProtocolError {
        let (errors, raw) = match body {
            Some(Value::Object(mut map)) => match map.remove("errors") {
                Some(Value::Array(errors)) => (
                    errors
                        .into_iter()
                        .map(|e| match e {
                            Value::String(s) => s,
                            other => other.to_string(),
                        })
                        .collect(),
                    None,
                ),
                _ => (Vec::new(), Some(Value::Object(map).to_string())),
            },
            Some(Value::String(s)) => (Vec::new(), Some(s)),
            Some(other) => (Vec::new(), Some(other.to_string())),
            None => (Vec::new(), None),
        };
        ProtocolError {
            operation: self.operation.clone(),
            path: self.path(),
            status,
            errors,
            body: raw.filter(|s| !s.is_empty()),
        }
    }
}

/// Response to a [`Request`], already checked against its expected status.
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    body: Option<Value>,
    shape: ResultShape,
}

impl Response {
    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Raw JSON body.
    #[must_use]
    pub const fn raw(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Deserialize the whole body.
    ///
    /// # Errors
    ///
    /// Fails when the body is missing or does not match `T`.
    pub fn body<T: DeserializeOwned>(&self) -> VaultResult<T> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body).map_err(VaultError::from)
    }

    /// Deserialize the result selected by the request's [`ResultShape`].
    ///
    /// # Errors
    ///
    /// Fails when the selected part is missing or does not match `T`.
    pub fn result<T: DeserializeOwned>(&self) -> VaultResult<T> {
        let part = match self.shape {
            ResultShape::Empty => Value::Null,
            ResultShape::Body => self.body.clone().unwrap_or(Value::Null),
            ResultShape::Data => self.field("data"),
            ResultShape::Auth => self.field("auth"),
        };
        serde_json::from_value(part).map_err(|e| {
            VaultError::invalid_response(format!(
                "unexpected {:?} result in {} response: {e}",
                self.shape, self.status
            ))
        })
    }

    fn field(&self, name: &str) -> Value {
        self.body
            .as_ref()
            .and_then(|body| body.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    }
}
