//! Shared test utilities for vault-client.
//!
//! This crate provides:
//! - Request executors that record calls and answer from a script
//! - Token providers with observable login and invalidation counts
//! - An in-memory transit engine
//! - Wire fixtures and proptest generators

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod mocks;
pub mod transit;

pub use generators::*;
pub use mocks::{CachedTokenProvider, MockExecutor, SequenceProvider};
pub use transit::FakeTransit;
