//! HashiCorp Vault client.
//!
//! Pluggable login strategies behind a caching token provider, request
//! execution with auth-aware retry, and batched transit cryptography with
//! per-item failure reporting.

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod executor;
pub mod leases;
pub mod request;
pub mod telemetry;
pub mod token;
pub mod transit;
pub mod wrapping;

pub use auth::{AuthRequest, CachingTokenProvider, TokenProvider};
pub use client::VaultClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, VaultConfig};
pub use error::{ProtocolError, VaultError, VaultResult};
pub use executor::{HttpExecutor, RequestExecutor};
pub use request::{Confidentiality, Method, Override, Request, Response, ResultShape};
pub use token::{Expiring, Lease, Token};
pub use transit::{BatchFailure, BatchResult, Transit, TransitError, TransitResult};
