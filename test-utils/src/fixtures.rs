//! Canned Vault wire bodies.

use serde_json::{Value, json};

/// Login or renewal reply.
#[must_use]
pub fn auth_response(client_token: &str, lease_seconds: u64, renewable: bool) -> Value {
    json!({
        "auth": {
            "client_token": client_token,
            "renewable": renewable,
            "lease_duration": lease_seconds,
            "policies": ["default"],
        }
    })
}

/// Error body with the given messages.
#[must_use]
pub fn errors(messages: &[&str]) -> Value {
    json!({ "errors": messages })
}

/// The 403 body Vault sends for a refused token.
#[must_use]
pub fn permission_denied() -> Value {
    errors(&["permission denied"])
}

/// `data` reply.
#[must_use]
pub fn data(data: Value) -> Value {
    json!({ "data": data })
}

/// Batch reply with the given per-item results.
#[must_use]
pub fn batch_results(results: Vec<Value>) -> Value {
    json!({ "data": { "batch_results": results } })
}

/// Unwrap reply carrying `field` in its data.
#[must_use]
pub fn wrapped_secret(field: &str, value: &str) -> Value {
    json!({ "data": { field: value } })
}
