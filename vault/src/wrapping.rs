//! Response wrapping.

use crate::{
    auth::AuthInfo,
    error::{VaultError, VaultResult},
    executor::RequestExecutor,
    request::{Confidentiality, Request, ResultShape},
};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// Payload of an unwrapped response.
#[derive(Debug, Deserialize)]
pub struct Unwrapped {
    /// Wrapped `data` object
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    /// Wrapped `auth` block, present when a token was wrapped
    #[serde(default)]
    pub auth: Option<AuthInfo>,
}

impl Unwrapped {
    /// Read a string field of the wrapped payload as a secret.
    ///
    /// `token` also matches the `client_token` of a wrapped auth block.
    ///
    /// # Errors
    ///
    /// Fails when the field is absent or not a string.
    pub fn secret(&self, field: &str) -> VaultResult<SecretString> {
        if let Some(Value::String(value)) = self.data.as_ref().and_then(|data| data.get(field)) {
            return Ok(SecretString::from(value.clone()));
        }
        match &self.auth {
            Some(auth) if field == "token" => Ok(SecretString::from(auth.client_token.clone())),
            _ => Err(VaultError::invalid_response(format!(
                "unwrapped payload has no '{field}' field"
            ))),
        }
    }
}

/// Unwrap a response-wrapping token.
///
/// The wrapping token itself authenticates the call, so it bypasses the
/// client's managed token.
///
/// # Errors
///
/// Fails when Vault rejects the wrapping token (e.g. already unwrapped).
#[instrument(skip_all)]
pub async fn unwrap(
    executor: &dyn RequestExecutor,
    wrapping_token: &SecretString,
) -> VaultResult<Unwrapped> {
    debug!("Unwrapping secret");
    let request = Request::post("unwrap", ["sys", "wrapping", "unwrap"])
        .with_token(wrapping_token.clone())
        .with_shape(ResultShape::Body)
        .with_confidentiality(Confidentiality::High)
        .expect_ok();
    executor.execute(request).await?.result()
}
