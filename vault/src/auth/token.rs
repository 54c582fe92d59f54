//! Token self-operations.

use super::AuthInfo;
use crate::{
    clock::Clock,
    error::VaultResult,
    executor::RequestExecutor,
    request::{Confidentiality, Request, ResultShape},
    token::Token,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Renew `token` with its own credentials.
///
/// Returns a replacement token; `token` itself is left untouched. A
/// use-limited token keeps its remaining uses, which renewal never raises.
///
/// # Errors
///
/// Propagates the protocol error when Vault refuses the renewal; callers
/// check [`crate::VaultError::is_token_invalid`] to decide whether to log in
/// again.
#[instrument(skip_all, fields(increment = ?increment))]
pub async fn renew_self(
    executor: &dyn RequestExecutor,
    clock: &dyn Clock,
    token: &Token,
    increment: Option<Duration>,
) -> VaultResult<Token> {
    debug!("Renewing Vault token");
    let body = increment.map_or_else(
        || serde_json::json!({}),
        |increment| serde_json::json!({ "increment": increment.as_secs() }),
    );
    let request = Request::post("renew self", ["auth", "token", "renew-self"])
        .with_token(token.client_token().clone())
        .with_body(body)
        .with_shape(ResultShape::Auth)
        .with_confidentiality(Confidentiality::High)
        .expect_ok();
    let info: AuthInfo = executor.execute(request).await?.result()?;
    Ok(info.into_token(clock.now()).keep_uses_of(token))
}

/// Properties of the calling token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenLookup {
    /// Token accessor
    #[serde(default)]
    pub accessor: String,
    /// Attached policies
    #[serde(default)]
    pub policies: Vec<String>,
    /// Remaining time to live in seconds
    #[serde(default)]
    pub ttl: u64,
    /// Remaining uses; zero is unlimited
    #[serde(default)]
    pub num_uses: u32,
    /// Whether the token can be renewed
    #[serde(default)]
    pub renewable: bool,
    /// Namespace the token lives in
    #[serde(default)]
    pub namespace_path: Option<String>,
}

/// Look up the token the executor authenticates with.
///
/// # Errors
///
/// Propagates execution failures.
pub async fn lookup_self(executor: &dyn RequestExecutor) -> VaultResult<TokenLookup> {
    let request = Request::get("lookup self", ["auth", "token", "lookup-self"]).expect_ok();
    executor.execute(request).await?.result()
}
