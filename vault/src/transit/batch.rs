//! Per-item correlation and partial-failure aggregation for batch calls.

use crate::error::{VaultError, VaultResult};
use futures::future::try_join_all;
use serde::Deserialize;
use std::fmt;
use std::future::Future;

/// Outcome of one batch item: its value or the error Vault reported for it.
pub type BatchResult<T> = Result<T, String>;

/// Result of a batch operation: one value per request, in request order.
pub type TransitResult<T> = Result<Vec<T>, TransitError<T>>;

/// Some items of a batch failed.
///
/// Holds the outcome of every item, in request order, so successful items
/// can still be used.
#[derive(Debug, Clone)]
pub struct BatchFailure<T> {
    operation: String,
    results: Vec<BatchResult<T>>,
}

impl<T> BatchFailure<T> {
    pub(crate) fn new(operation: impl Into<String>, results: Vec<BatchResult<T>>) -> Self {
        Self {
            operation: operation.into(),
            results,
        }
    }

    /// Operation that failed.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Outcome of every item, positionally matching the requests.
    #[must_use]
    pub fn results(&self) -> &[BatchResult<T>] {
        &self.results
    }

    /// Take the outcomes.
    #[must_use]
    pub fn into_results(self) -> Vec<BatchResult<T>> {
        self.results
    }

    /// Failed items with their request index.
    pub fn errors(&self) -> impl Iterator<Item = (usize, &str)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| (i, e.as_str())))
    }

    /// Successful items with their request index.
    pub fn successes(&self) -> impl Iterator<Item = (usize, &T)> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().ok().map(|v| (i, v)))
    }

    /// Number of failed items.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.errors().count()
    }
}

impl<T> fmt::Display for BatchFailure<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} of {} batch items failed",
            self.operation,
            self.failed_count(),
            self.results.len()
        )?;
        if let Some((index, error)) = self.errors().next() {
            write!(f, " (item {index}: {error})")?;
        }
        Ok(())
    }
}

impl<T: fmt::Debug> std::error::Error for BatchFailure<T> {}

/// Failure of a transit operation.
#[derive(Debug)]
pub enum TransitError<T> {
    /// The call itself failed; no per-item outcome exists.
    Vault(VaultError),
    /// The call succeeded but some items failed.
    Batch(BatchFailure<T>),
}

impl<T> TransitError<T> {
    /// Per-item outcomes, when the failure was partial.
    #[must_use]
    pub const fn batch(&self) -> Option<&BatchFailure<T>> {
        match self {
            Self::Batch(failure) => Some(failure),
            Self::Vault(_) => None,
        }
    }

    /// The plain error, when the call itself failed.
    #[must_use]
    pub const fn vault(&self) -> Option<&VaultError> {
        match self {
            Self::Vault(error) => Some(error),
            Self::Batch(_) => None,
        }
    }
}

impl<T> fmt::Display for TransitError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vault(error) => fmt::Display::fmt(error, f),
            Self::Batch(failure) => fmt::Display::fmt(failure, f),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TransitError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Vault(error) => Some(error),
            Self::Batch(_) => None,
        }
    }
}

impl<T> From<VaultError> for TransitError<T> {
    fn from(error: VaultError) -> Self {
        Self::Vault(error)
    }
}

impl<T> From<BatchFailure<T>> for TransitError<T> {
    fn from(failure: BatchFailure<T>) -> Self {
        Self::Batch(failure)
    }
}

/// One element of `batch_results`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireResult {
    #[serde(default)]
    pub ciphertext: Option<String>,
    #[serde(default)]
    pub plaintext: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub valid: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WireResult {
    /// The item's own error, if Vault reported one.
    pub(crate) fn error(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchData {
    #[serde(default)]
    pub batch_results: Vec<WireResult>,
}

/// A caller request and the position its outcome goes to.
#[derive(Debug)]
pub(crate) struct BatchItem<'r, R> {
    pub index: usize,
    pub request: &'r R,
}

/// Group requests by `key`, keeping first-appearance order of the groups
/// and request order inside each group.
pub(crate) fn partition<'r, R, K, F>(requests: &'r [R], key: F) -> Vec<(K, Vec<BatchItem<'r, R>>)>
where
    K: PartialEq,
    F: Fn(&R) -> K,
{
    let mut groups: Vec<(K, Vec<BatchItem<'r, R>>)> = Vec::new();
    for (index, request) in requests.iter().enumerate() {
        let k = key(request);
        let item = BatchItem { index, request };
        match groups.iter_mut().find(|(g, _)| *g == k) {
            Some((_, items)) => items.push(item),
            None => groups.push((k, vec![item])),
        }
    }
    groups
}

/// Submit every group concurrently and merge the per-item outcomes back
/// into request order.
///
/// `submit` returns the wire results of one group; they are correlated to
/// the group's items by position. Any item error turns the whole result
/// into a [`BatchFailure`] that still carries the successful items.
pub(crate) async fn run<'r, R, K, T, F, Fut>(
    operation: &str,
    total: usize,
    groups: Vec<(K, Vec<BatchItem<'r, R>>)>,
    submit: F,
) -> TransitResult<T>
where
    F: Fn(K, Vec<&'r R>) -> Fut,
    Fut: Future<Output = VaultResult<Vec<BatchResult<T>>>>,
{
    let calls = groups.into_iter().map(|(key, items)| {
        let indices: Vec<usize> = items.iter().map(|item| item.index).collect();
        let requests: Vec<&'r R> = items.iter().map(|item| item.request).collect();
        let call = submit(key, requests);
        async move {
            let results = call.await?;
            if results.len() != indices.len() {
                return Err(VaultError::invalid_response(format!(
                    "{operation}: {} batch results for {} requests",
                    results.len(),
                    indices.len()
                )));
            }
            Ok(indices.into_iter().zip(results).collect::<Vec<_>>())
        }
    });

    let mut slots: Vec<Option<BatchResult<T>>> = (0..total).map(|_| None).collect();
    for (index, result) in try_join_all(calls).await?.into_iter().flatten() {
        if let Some(slot) = slots.get_mut(index) {
            *slot = Some(result);
        }
    }

    let results: Vec<BatchResult<T>> = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err("no result for batch item".to_string())))
        .collect();

    if results.iter().any(Result::is_err) {
        return Err(BatchFailure::new(operation, results).into());
    }
    Ok(results.into_iter().filter_map(Result::ok).collect())
}
