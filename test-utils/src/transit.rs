//! In-memory transit engine.
//!
//! Answers transit requests the way Vault shapes them (single and batch
//! bodies, per-item errors, versioned keys) without real cryptography:
//! ciphertexts and signatures are reversible encodings tagged with the
//! key name and version, which is enough to exercise correlation logic.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use vault_client::{Request, RequestExecutor, Response, VaultResult, transit::KeyType};

type Item = Result<Value, String>;

#[derive(Debug, Clone, Copy)]
struct FakeKey {
    key_type: KeyType,
    latest: u32,
}

/// Transit engine kept in memory.
#[derive(Debug, Default)]
pub struct FakeTransit {
    keys: Mutex<HashMap<String, FakeKey>>,
    requests: Mutex<Vec<Request>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeTransit {
    /// Empty engine; encrypting with an unknown key creates it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine holding `name` at version 1.
    #[must_use]
    pub fn with_key(self, name: &str, key_type: KeyType) -> Self {
        lock(&self.keys).insert(name.to_string(), FakeKey { key_type, latest: 1 });
        self
    }

    /// Add a version to `name`, returning the new latest version.
    pub fn rotate(&self, name: &str) -> Option<u32> {
        let mut keys = lock(&self.keys);
        let key = keys.get_mut(name)?;
        key.latest += 1;
        Some(key.latest)
    }

    /// Requests seen so far.
    #[must_use]
    pub fn requests(&self) -> Vec<Request> {
        lock(&self.requests).clone()
    }

    /// Number of calls to `action` (`encrypt`, `sign`, ...).
    #[must_use]
    pub fn calls_to(&self, action: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.path_segments().get(1).is_some_and(|a| a == action))
            .count()
    }

    fn key(&self, name: &str) -> Result<FakeKey, String> {
        lock(&self.keys)
            .get(name)
            .copied()
            .ok_or_else(|| format!("key '{name}' not found"))
    }

    fn version(key: FakeKey, requested: Option<u64>) -> Result<u32, String> {
        match requested {
            None | Some(0) => Ok(key.latest),
            Some(v) => u32::try_from(v)
                .ok()
                .filter(|v| *v <= key.latest)
                .ok_or_else(|| "invalid key version".to_string()),
        }
    }

    fn encrypt(&self, name: &str, item: &Map<String, Value>, top: &Map<String, Value>) -> Item {
        let plaintext = text(item, "plaintext")?;
        let key_type = top
            .get("type")
            .and_then(|t| serde_json::from_value(t.clone()).ok())
            .unwrap_or(KeyType::Aes256Gcm96);
        let key = *lock(&self.keys)
            .entry(name.to_string())
            .or_insert(FakeKey { key_type, latest: 1 });
        if !key.key_type.supports_encryption() {
            return Err(format!("key type {} does not support encryption", key.key_type));
        }
        let version = Self::version(key, item.get("key_version").and_then(Value::as_u64))?;
        let context = item.get("context").and_then(Value::as_str).unwrap_or("");
        let payload = STANDARD.encode(format!("{name}|{version}|{context}|{plaintext}"));
        Ok(json!({ "ciphertext": format!("vault:v{version}:{payload}"), "key_version": version }))
    }

    fn decrypt(&self, name: &str, item: &Map<String, Value>) -> Item {
        let key = self.key(name)?;
        let ciphertext = text(item, "ciphertext")?;
        let context = item.get("context").and_then(Value::as_str).unwrap_or("");
        let fields = open(ciphertext, name, context, "")?;
        if fields.version > key.latest {
            return Err("invalid ciphertext: unknown key version".to_string());
        }
        Ok(json!({ "plaintext": fields.data }))
    }

    fn rewrap(&self, name: &str, item: &Map<String, Value>) -> Item {
        let plaintext = self.decrypt(name, item)?;
        let mut reencrypt = item.clone();
        reencrypt.insert("plaintext".into(), plaintext["plaintext"].clone());
        let out = self.encrypt(name, &reencrypt, &Map::new())?;
        Ok(json!({ "ciphertext": out["ciphertext"] }))
    }

    fn sign(&self, name: &str, item: &Map<String, Value>, top: &Map<String, Value>) -> Item {
        let key = self.key(name)?;
        if !key.key_type.supports_signing() {
            return Err(format!("key type {} does not support signing", key.key_type));
        }
        let input = text(item, "input")?;
        let version = Self::version(key, top.get("key_version").and_then(Value::as_u64))?;
        let context = item.get("context").and_then(Value::as_str).unwrap_or("");
        let payload = STANDARD.encode(format!("{name}|{version}|{context}|sig:{input}"));
        Ok(json!({ "signature": format!("vault:v{version}:{payload}"), "key_version": version }))
    }

    fn verify(&self, name: &str, item: &Map<String, Value>) -> Item {
        let key = self.key(name)?;
        let input = text(item, "input")?;
        let signature = text(item, "signature")?;
        let context = item.get("context").and_then(Value::as_str).unwrap_or("");
        let valid = open(signature, name, context, "sig:")
            .is_ok_and(|f| f.version <= key.latest && f.data == input);
        Ok(json!({ "valid": valid }))
    }

    fn item(&self, action: &str, name: &str, item: &Map<String, Value>, top: &Map<String, Value>) -> Item {
        match action {
            "encrypt" => self.encrypt(name, item, top),
            "decrypt" => self.decrypt(name, item),
            "rewrap" => self.rewrap(name, item),
            "sign" => self.sign(name, item, top),
            "verify" => self.verify(name, item),
            other => Err(format!("unsupported path '{other}'")),
        }
    }

    fn data_call(&self, action: &str, name: &str, body: &Map<String, Value>) -> (u16, Value) {
        let Some(Value::Array(inputs)) = body.get("batch_input") else {
            return match self.item(action, name, body, body) {
                Ok(data) => (200, json!({ "data": data })),
                Err(error) => (400, json!({ "errors": [error] })),
            };
        };

        let results: Vec<Item> = inputs
            .iter()
            .map(|input| match input {
                Value::Object(item) => self.item(action, name, item, body),
                _ => Err("batch item is not an object".to_string()),
            })
            .collect();
        let status = if results.iter().any(Result::is_err) { 400 } else { 200 };
        let results: Vec<Value> = results
            .into_iter()
            .map(|r| r.unwrap_or_else(|error| json!({ "error": error })))
            .collect();
        (status, json!({ "data": { "batch_results": results } }))
    }

    fn key_call(&self, name: &str, body: &Map<String, Value>) -> (u16, Option<Value>) {
        let key_type = body
            .get("type")
            .and_then(|t| serde_json::from_value(t.clone()).ok())
            .unwrap_or(KeyType::Aes256Gcm96);
        lock(&self.keys)
            .entry(name.to_string())
            .or_insert(FakeKey { key_type, latest: 1 });
        (204, None)
    }
}

#[async_trait]
impl RequestExecutor for FakeTransit {
    async fn execute(&self, request: Request) -> VaultResult<Response> {
        lock(&self.requests).push(request.clone());
        let body = match request.body() {
            Some(Value::Object(body)) => body.clone(),
            _ => Map::new(),
        };
        let segments: Vec<&str> = request.path_segments().iter().map(String::as_str).collect();
        let (status, reply) = match segments.as_slice() {
            [_, "keys", name] => self.key_call(name, &body),
            [_, "keys", name, "rotate"] => match self.rotate(name) {
                Some(_) => (204, None),
                None => (404, Some(json!({ "errors": [] }))),
            },
            [_, action, name] => {
                let (status, reply) = self.data_call(action, name, &body);
                (status, Some(reply))
            }
            _ => (404, Some(json!({ "errors": [] }))),
        };
        request.respond(status, reply)
    }
}

struct Opened {
    version: u32,
    data: String,
}

fn text<'a>(item: &'a Map<String, Value>, field: &str) -> Result<&'a str, String> {
    item.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing {field}"))
}

fn open(value: &str, name: &str, context: &str, marker: &str) -> Result<Opened, String> {
    let invalid = || "invalid ciphertext".to_string();
    let (version, payload) = value
        .strip_prefix("vault:v")
        .and_then(|rest| rest.split_once(':'))
        .ok_or_else(invalid)?;
    let version: u32 = version.parse().map_err(|_| invalid())?;
    let decoded = STANDARD.decode(payload).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    let mut parts = decoded.splitn(4, '|');
    let (Some(key), Some(tagged), Some(ctx), Some(data)) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid());
    };
    if key != name || tagged != version.to_string() {
        return Err(invalid());
    }
    if ctx != context {
        return Err("invalid ciphertext: context mismatch".to_string());
    }
    let data = data.strip_prefix(marker).ok_or_else(invalid)?;
    Ok(Opened {
        version,
        data: data.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let fake = FakeTransit::new();
        let mut item = Map::new();
        item.insert("plaintext".into(), "aGk=".into());
        let out = fake.encrypt("k", &item, &Map::new()).unwrap();
        let ciphertext = out["ciphertext"].as_str().unwrap();
        assert!(ciphertext.starts_with("vault:v1:"));

        let mut item = Map::new();
        item.insert("ciphertext".into(), ciphertext.into());
        assert_eq!(fake.decrypt("k", &item).unwrap()["plaintext"], "aGk=");
    }

    #[test]
    fn test_corrupt_ciphertext_rejected() {
        let fake = FakeTransit::new().with_key("k", KeyType::Aes256Gcm96);
        let mut item = Map::new();
        item.insert("ciphertext".into(), "vault:v1:garbage!".into());
        assert!(fake.decrypt("k", &item).is_err());
    }
}
