//! Transit engine: batched encryption and signing with per-item outcomes.
//!
//! Every batch operation takes the caller's requests in order and returns
//! one value per request in the same order. When some items fail, the
//! [`TransitError::Batch`] variant carries the outcome of every item.

mod batch;
mod types;

pub use batch::{BatchFailure, BatchResult, TransitError, TransitResult};
pub use types::{
    ClearData, DecryptRequest, EncryptOptions, EncryptRequest, HashAlgorithm, KeyType,
    MarshalingAlgorithm, RewrapRequest, SignOptions, SignRequest, SignatureAlgorithm,
    VerifyRequest, key_version_of,
};

use crate::{
    error::{VaultError, VaultResult},
    executor::RequestExecutor,
    request::{Confidentiality, Request, ResultShape},
};
use batch::{WireResult, partition, run};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

/// Mount path used when none is given.
pub const DEFAULT_MOUNT: &str = "transit";

const INVALID_SIGNATURE: &str = "invalid signature";

/// Client for one transit mount.
pub struct Transit<'c> {
    executor: &'c dyn RequestExecutor,
    mount: String,
}

impl<'c> Transit<'c> {
    /// Transit engine at `mount`; an empty mount means [`DEFAULT_MOUNT`].
    #[must_use]
    pub fn new(executor: &'c dyn RequestExecutor, mount: impl Into<String>) -> Self {
        let mount = mount.into().trim_matches('/').to_string();
        Self {
            executor,
            mount: if mount.is_empty() {
                DEFAULT_MOUNT.to_string()
            } else {
                mount
            },
        }
    }

    /// Mount path.
    #[must_use]
    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// Create a named key.
    ///
    /// # Errors
    ///
    /// Propagates execution failures.
    #[instrument(skip(self), fields(mount = %self.mount))]
    pub async fn create_key(&self, key: &str, key_type: KeyType) -> VaultResult<()> {
        let request = Request::post("create transit key", [self.mount.as_str(), "keys", key])
            .with_body(serde_json::json!({ "type": key_type }))
            .with_shape(ResultShape::Empty);
        self.executor.execute(request).await?;
        debug!("Created transit key");
        Ok(())
    }

    /// Add a new version to a key.
    ///
    /// # Errors
    ///
    /// Propagates execution failures.
    #[instrument(skip(self), fields(mount = %self.mount))]
    pub async fn rotate_key(&self, key: &str) -> VaultResult<()> {
        let request = Request::post(
            "rotate transit key",
            [self.mount.as_str(), "keys", key, "rotate"],
        )
        .with_shape(ResultShape::Empty);
        self.executor.execute(request).await?;
        Ok(())
    }

    /// Encrypt every plaintext with `key`.
    ///
    /// # Errors
    ///
    /// [`TransitError::Batch`] when some items failed, [`TransitError::Vault`]
    /// when the call failed or the batch holds a single item.
    #[instrument(skip_all, fields(mount = %self.mount, key = %key, items = requests.len()))]
    pub async fn encrypt(
        &self,
        key: &str,
        requests: &[EncryptRequest],
        options: &EncryptOptions,
    ) -> TransitResult<String> {
        match requests {
            [] => return Ok(Vec::new()),
            [only] => return Ok(vec![self.encrypt_one(key, only, options).await?]),
            _ => {}
        }
        let groups = partition(requests, |_| ());
        run("encrypt", requests.len(), groups, |(), items| async move {
            let mut body = batch_body(items.iter().map(|r| r.to_wire()));
            options.write_to(&mut body);
            let results = self.submit(self.data_request("encrypt", "encrypt", key), body).await?;
            Ok(results
                .into_iter()
                .map(|w| item(w, "ciphertext", |w| w.ciphertext))
                .collect())
        })
        .await
    }

    /// Encrypt one plaintext.
    ///
    /// # Errors
    ///
    /// Propagates execution failures, including Vault's error for the item.
    pub async fn encrypt_one(
        &self,
        key: &str,
        request: &EncryptRequest,
        options: &EncryptOptions,
    ) -> VaultResult<String> {
        #[derive(Deserialize)]
        struct Encrypted {
            ciphertext: String,
        }

        let mut body = request.to_wire();
        options.write_to(&mut body);
        let out: Encrypted = self
            .single(self.data_request("encrypt", "encrypt", key), body)
            .await?;
        Ok(out.ciphertext)
    }

    /// Decrypt every ciphertext with `key`.
    ///
    /// # Errors
    ///
    /// [`TransitError::Batch`] when some items failed, [`TransitError::Vault`]
    /// when the call failed or the batch holds a single item.
    #[instrument(skip_all, fields(mount = %self.mount, key = %key, items = requests.len()))]
    pub async fn decrypt(&self, key: &str, requests: &[DecryptRequest]) -> TransitResult<ClearData> {
        match requests {
            [] => return Ok(Vec::new()),
            [only] => return Ok(vec![self.decrypt_one(key, only).await?]),
            _ => {}
        }
        let groups = partition(requests, |_| ());
        run("decrypt", requests.len(), groups, |(), items| async move {
            let body = batch_body(items.iter().map(|r| r.to_wire()));
            let results = self.submit(self.data_request("decrypt", "decrypt", key), body).await?;
            Ok(results
                .into_iter()
                .map(|w| item(w, "plaintext", |w| w.plaintext).and_then(|p| decode_plaintext(&p)))
                .collect())
        })
        .await
    }

    /// Decrypt one ciphertext.
    ///
    /// # Errors
    ///
    /// Propagates execution failures, including Vault's error for the item.
    pub async fn decrypt_one(&self, key: &str, request: &DecryptRequest) -> VaultResult<ClearData> {
        #[derive(Deserialize)]
        struct Decrypted {
            plaintext: String,
        }

        let out: Decrypted = self
            .single(self.data_request("decrypt", "decrypt", key), request.to_wire())
            .await?;
        decode_plaintext(&out.plaintext).map_err(VaultError::invalid_response)
    }

    /// Re-encrypt every ciphertext under the requested key version.
    ///
    /// # Errors
    ///
    /// [`TransitError::Batch`] when some items failed, [`TransitError::Vault`]
    /// when the call failed or the batch holds a single item.
    #[instrument(skip_all, fields(mount = %self.mount, key = %key, items = requests.len()))]
    pub async fn rewrap(&self, key: &str, requests: &[RewrapRequest]) -> TransitResult<String> {
        match requests {
            [] => return Ok(Vec::new()),
            [only] => return Ok(vec![self.rewrap_one(key, only).await?]),
            _ => {}
        }
        let groups = partition(requests, |_| ());
        run("rewrap", requests.len(), groups, |(), items| async move {
            let body = batch_body(items.iter().map(|r| r.to_wire()));
            let results = self.submit(self.data_request("rewrap", "rewrap", key), body).await?;
            Ok(results
                .into_iter()
                .map(|w| item(w, "ciphertext", |w| w.ciphertext))
                .collect())
        })
        .await
    }

    /// Re-encrypt one ciphertext.
    ///
    /// # Errors
    ///
    /// Propagates execution failures, including Vault's error for the item.
    pub async fn rewrap_one(&self, key: &str, request: &RewrapRequest) -> VaultResult<String> {
        #[derive(Deserialize)]
        struct Rewrapped {
            ciphertext: String,
        }

        let out: Rewrapped = self
            .single(self.data_request("rewrap", "rewrap", key), request.to_wire())
            .await?;
        Ok(out.ciphertext)
    }

    /// Sign every input with `key`.
    ///
    /// Vault takes one key version per call, so requests pinned to different
    /// versions are sent as one call per version and merged back.
    ///
    /// # Errors
    ///
    /// [`TransitError::Batch`] when some items failed, [`TransitError::Vault`]
    /// when a call failed or the batch holds a single item.
    #[instrument(skip_all, fields(mount = %self.mount, key = %key, items = requests.len()))]
    pub async fn sign(
        &self,
        key: &str,
        requests: &[SignRequest],
        options: &SignOptions,
    ) -> TransitResult<String> {
        match requests {
            [] => return Ok(Vec::new()),
            [only] => return Ok(vec![self.sign_one(key, only, options).await?]),
            _ => {}
        }
        let groups = partition(requests, |r| r.key_version);
        debug!(calls = groups.len(), "Signing batch");
        run("sign", requests.len(), groups, |version, items| async move {
            let mut body = batch_body(items.iter().map(|r| r.to_wire()));
            if let Some(version) = version {
                body.insert("key_version".into(), version.into());
            }
            options.write_to(&mut body);
            let results = self.submit(self.data_request("sign", "sign", key), body).await?;
            Ok(results
                .into_iter()
                .map(|w| item(w, "signature", |w| w.signature))
                .collect())
        })
        .await
    }

    /// Sign one input.
    ///
    /// # Errors
    ///
    /// Propagates execution failures, including Vault's error for the item.
    pub async fn sign_one(
        &self,
        key: &str,
        request: &SignRequest,
        options: &SignOptions,
    ) -> VaultResult<String> {
        #[derive(Deserialize)]
        struct Signed {
            signature: String,
        }

        let mut body = request.to_wire();
        if let Some(version) = request.key_version {
            body.insert("key_version".into(), version.into());
        }
        options.write_to(&mut body);
        let out: Signed = self.single(self.data_request("sign", "sign", key), body).await?;
        Ok(out.signature)
    }

    /// Check every signature against `key`.
    ///
    /// An item Vault reports as not valid fails with "invalid signature".
    ///
    /// # Errors
    ///
    /// [`TransitError::Batch`] when some signatures failed, and
    /// [`TransitError::Vault`] when the call failed or the batch holds a
    /// single item ([`VaultError::InvalidSignature`] when that item is not
    /// valid).
    #[instrument(skip_all, fields(mount = %self.mount, key = %key, items = requests.len()))]
    pub async fn verify(
        &self,
        key: &str,
        requests: &[VerifyRequest],
        options: &SignOptions,
    ) -> Result<(), TransitError<()>> {
        match requests {
            [] => return Ok(()),
            [only] => return Ok(self.verify_one(key, only, options).await?),
            _ => {}
        }
        let groups = partition(requests, |_| ());
        run("verify", requests.len(), groups, |(), items| async move {
            let mut body = batch_body(items.iter().map(|r| r.to_wire()));
            options.write_to(&mut body);
            let results = self.submit(self.data_request("verify", "verify", key), body).await?;
            Ok(results.into_iter().map(verified).collect())
        })
        .await
        .map(|_| ())
    }

    /// Check one signature.
    ///
    /// # Errors
    ///
    /// [`VaultError::InvalidSignature`] when Vault reports the signature as
    /// not valid, otherwise execution failures.
    pub async fn verify_one(
        &self,
        key: &str,
        request: &VerifyRequest,
        options: &SignOptions,
    ) -> VaultResult<()> {
        #[derive(Deserialize)]
        struct Verified {
            valid: bool,
        }

        let mut body = request.to_wire();
        options.write_to(&mut body);
        let out: Verified = self
            .single(self.data_request("verify", "verify", key), body)
            .await?;
        if out.valid {
            Ok(())
        } else {
            Err(VaultError::InvalidSignature)
        }
    }

    fn data_request(&self, operation: &str, action: &str, key: &str) -> Request {
        Request::post(operation, [self.mount.as_str(), action, key])
            .with_confidentiality(Confidentiality::High)
    }

    async fn single<T: serde::de::DeserializeOwned>(
        &self,
        request: Request,
        body: Map<String, Value>,
    ) -> VaultResult<T> {
        self.executor
            .execute(request.with_body(Value::Object(body)).expect_ok())
            .await?
            .result()
    }

    /// Submit one batch call.
    ///
    /// Vault answers 400 when any item failed (unless the mount overrides
    /// `partial_failure_response_code`), still listing the per-item errors;
    /// only a 400 without `batch_results` is a call failure.
    async fn submit(&self, request: Request, body: Map<String, Value>) -> VaultResult<Vec<WireResult>> {
        let request = request
            .with_body(Value::Object(body))
            .expect_status(&[200, 400]);
        let probe = request.clone();
        let response = self.executor.execute(request).await?;

        let results = response
            .raw()
            .and_then(|body| body.get("data"))
            .and_then(|data| data.get("batch_results"));
        match results {
            Some(results) => serde_json::from_value(results.clone()).map_err(|e| {
                VaultError::invalid_response(format!("{}: malformed batch results: {e}", probe.operation()))
            }),
            None if response.status() == 400 => {
                Err(probe.protocol_error(400, response.raw().cloned()).into())
            }
            None => Err(VaultError::invalid_response(format!(
                "{}: missing batch results",
                probe.operation()
            ))),
        }
    }
}

impl std::fmt::Debug for Transit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transit")
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}

fn batch_body(items: impl Iterator<Item = Map<String, Value>>) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(
        "batch_input".into(),
        Value::Array(items.map(Value::Object).collect()),
    );
    body
}

fn item<T>(wire: WireResult, field: &str, extract: impl FnOnce(WireResult) -> Option<T>) -> BatchResult<T> {
    if let Some(error) = wire.error() {
        return Err(error.to_string());
    }
    extract(wire).ok_or_else(|| format!("missing {field} in batch result"))
}

fn verified(wire: WireResult) -> BatchResult<()> {
    if let Some(error) = wire.error() {
        return Err(error.to_string());
    }
    match wire.valid {
        Some(true) => Ok(()),
        Some(false) => Err(INVALID_SIGNATURE.to_string()),
        None => Err("missing valid in batch result".to_string()),
    }
}

fn decode_plaintext(encoded: &str) -> BatchResult<ClearData> {
    ClearData::from_base64(encoded).map_err(|e| format!("plaintext is not base64: {e}"))
}
