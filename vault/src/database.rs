//! Dynamic database credentials.

use crate::{
    clock::Clock,
    error::VaultResult,
    executor::RequestExecutor,
    leases::LeaseInfo,
    request::{Confidentiality, Request, ResultShape},
    token::{Expiring, Lease},
};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, instrument};

/// Database credentials with lease information.
#[derive(Clone)]
pub struct DatabaseCredentials {
    /// Generated username
    pub username: String,
    /// Generated password
    pub password: SecretString,
    /// Lease backing the credentials
    pub lease: Lease,
}

impl DatabaseCredentials {
    /// Whether the lease should be renewed now.
    #[must_use]
    pub fn should_renew(&self, grace: Duration, now: DateTime<Utc>) -> bool {
        self.lease.should_extend(grace, now)
    }
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("lease", &self.lease)
            .finish()
    }
}

#[derive(Deserialize)]
struct CredsResponse {
    #[serde(flatten)]
    lease: LeaseInfo,
    data: CredsData,
}

#[derive(Deserialize)]
struct CredsData {
    username: String,
    password: String,
}

/// Generate credentials for `role` on the database engine at `mount`.
///
/// # Errors
///
/// Propagates execution failures.
#[instrument(skip(executor, clock))]
pub async fn credentials(
    executor: &dyn RequestExecutor,
    clock: &dyn Clock,
    mount: &str,
    role: &str,
) -> VaultResult<DatabaseCredentials> {
    let request = Request::get("database credentials", [mount, "creds", role])
        .with_shape(ResultShape::Body)
        .with_confidentiality(Confidentiality::High)
        .expect_ok();
    let response: CredsResponse = executor.execute(request).await?.result()?;
    let lease = response.lease.into_lease(clock.now());
    info!(ttl = ?lease.duration, "Issued database credentials");
    Ok(DatabaseCredentials {
        username: response.data.username,
        password: SecretString::from(response.data.password),
        lease,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::ManualClock, request::Response};
    use async_trait::async_trait;
    use secrecy::ExposeSecret;
    use serde_json::json;

    struct Creds;

    #[async_trait]
    impl RequestExecutor for Creds {
        async fn execute(&self, request: Request) -> VaultResult<Response> {
            assert_eq!(request.path(), "v1/database/creds/readonly");
            request.respond(
                200,
                Some(json!({
                    "lease_id": "database/creds/readonly/xyz",
                    "renewable": true,
                    "lease_duration": 3600,
                    "data": {"username": "v-readonly-1", "password": "pw"}
                })),
            )
        }
    }

    #[tokio::test]
    async fn test_credentials_carry_lease() {
        let clock = ManualClock::new(Utc::now());
        let creds = credentials(&Creds, &clock, "database", "readonly").await.unwrap();

        assert_eq!(creds.username, "v-readonly-1");
        assert_eq!(creds.password.expose_secret(), "pw");
        assert_eq!(creds.lease.id, "database/creds/readonly/xyz");
        assert!(!creds.should_renew(Duration::from_secs(60), clock.now()));

        clock.advance(Duration::from_secs(3590));
        assert!(creds.should_renew(Duration::from_secs(60), clock.now()));
        assert!(!format!("{creds:?}").contains("pw\""));
    }
}
