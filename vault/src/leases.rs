//! Lease renewal and revocation for dynamic secrets.

use crate::{
    clock::Clock,
    error::VaultResult,
    executor::RequestExecutor,
    request::{Request, ResultShape},
    token::Lease,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Lease fields at the top level of a Vault response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaseInfo {
    /// Lease identifier
    #[serde(default)]
    pub lease_id: String,
    /// Whether the lease can be extended
    #[serde(default)]
    pub renewable: bool,
    /// Lease duration in seconds
    #[serde(default)]
    pub lease_duration: u64,
}

impl LeaseInfo {
    /// Convert into a lease issued at `now`.
    #[must_use]
    pub fn into_lease(self, now: chrono::DateTime<chrono::Utc>) -> Lease {
        Lease::new(
            self.lease_id,
            self.renewable,
            Duration::from_secs(self.lease_duration),
            now,
        )
    }
}

/// Extend `lease`, returning its replacement.
///
/// # Errors
///
/// Propagates execution failures.
#[instrument(skip_all, fields(lease_id = %lease.id))]
pub async fn renew(
    executor: &dyn RequestExecutor,
    clock: &dyn Clock,
    lease: &Lease,
    increment: Option<Duration>,
) -> VaultResult<Lease> {
    let mut body = serde_json::json!({ "lease_id": lease.id });
    if let Some(increment) = increment {
        body["increment"] = increment.as_secs().into();
    }
    let request = Request::put("renew lease", ["sys", "leases", "renew"])
        .with_body(body)
        .with_shape(ResultShape::Body)
        .expect_ok();
    let info: LeaseInfo = executor.execute(request).await?.result()?;
    let renewed = info.into_lease(clock.now());
    debug!(duration = ?renewed.duration, "Renewed lease");
    Ok(renewed)
}

/// Revoke a lease immediately.
///
/// # Errors
///
/// Propagates execution failures.
#[instrument(skip(executor))]
pub async fn revoke(executor: &dyn RequestExecutor, lease_id: &str) -> VaultResult<()> {
    let request = Request::put("revoke lease", ["sys", "leases", "revoke"])
        .with_body(serde_json::json!({ "lease_id": lease_id }))
        .with_shape(ResultShape::Empty);
    executor.execute(request).await?;
    debug!("Revoked lease");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, request::Response, token::Expiring};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct Recorder {
        reply: Option<Value>,
        status: u16,
        seen: Mutex<Vec<Request>>,
    }

    #[async_trait]
    impl RequestExecutor for Recorder {
        async fn execute(&self, request: Request) -> VaultResult<Response> {
            self.seen.lock().unwrap().push(request.clone());
            request.respond(self.status, self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_renew_returns_replacement() {
        let exec = Recorder {
            reply: Some(json!({"lease_id": "database/creds/app/abc", "renewable": true, "lease_duration": 7200})),
            status: 200,
            seen: Mutex::new(Vec::new()),
        };
        let clock = ManualClock::new(Utc::now());
        let lease = Lease::new("database/creds/app/abc", true, Duration::from_secs(60), clock.now());

        clock.advance(Duration::from_secs(50));
        let renewed = renew(&exec, &clock, &lease, Some(Duration::from_secs(7200)))
            .await
            .unwrap();

        assert_eq!(renewed.duration, Duration::from_secs(7200));
        assert_eq!(lease.duration, Duration::from_secs(60));
        assert!(!renewed.should_extend(Duration::from_secs(30), clock.now()));

        let seen = exec.seen.lock().unwrap();
        assert_eq!(seen[0].path(), "v1/sys/leases/renew");
        assert_eq!(seen[0].body().unwrap()["increment"], 7200);
    }

    #[tokio::test]
    async fn test_revoke_accepts_no_content() {
        let exec = Recorder {
            reply: None,
            status: 204,
            seen: Mutex::new(Vec::new()),
        };
        revoke(&exec, "database/creds/app/abc").await.unwrap();
        assert_eq!(
            exec.seen.lock().unwrap()[0].body().unwrap()["lease_id"],
            "database/creds/app/abc"
        );
    }
}
