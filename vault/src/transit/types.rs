//! Transit request and option types.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Plaintext or context bytes, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ClearData(Vec<u8>);

impl ClearData {
    /// Wrap raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Decode from base64 as sent by Vault.
    ///
    /// # Errors
    ///
    /// Returns the decoder error for malformed input.
    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded).map(Self)
    }

    /// Encode as base64 for the wire.
    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    /// Borrow the bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ClearData {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<Vec<u8>> for ClearData {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for ClearData {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for ClearData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClearData({} bytes)", self.0.len())
    }
}

/// Transit key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// AES-128 GCM with a 96-bit nonce
    #[serde(rename = "aes128-gcm96")]
    Aes128Gcm96,
    /// AES-256 GCM with a 96-bit nonce
    #[serde(rename = "aes256-gcm96")]
    Aes256Gcm96,
    /// ChaCha20-Poly1305
    #[serde(rename = "chacha20-poly1305")]
    ChaCha20Poly1305,
    /// Ed25519
    #[serde(rename = "ed25519")]
    Ed25519,
    /// ECDSA on P-256
    #[serde(rename = "ecdsa-p256")]
    EcdsaP256,
    /// ECDSA on P-384
    #[serde(rename = "ecdsa-p384")]
    EcdsaP384,
    /// ECDSA on P-521
    #[serde(rename = "ecdsa-p521")]
    EcdsaP521,
    /// RSA 2048
    #[serde(rename = "rsa-2048")]
    Rsa2048,
    /// RSA 3072
    #[serde(rename = "rsa-3072")]
    Rsa3072,
    /// RSA 4096
    #[serde(rename = "rsa-4096")]
    Rsa4096,
}

impl KeyType {
    /// Every key type.
    pub const ALL: [Self; 10] = [
        Self::Aes128Gcm96,
        Self::Aes256Gcm96,
        Self::ChaCha20Poly1305,
        Self::Ed25519,
        Self::EcdsaP256,
        Self::EcdsaP384,
        Self::EcdsaP521,
        Self::Rsa2048,
        Self::Rsa3072,
        Self::Rsa4096,
    ];

    /// Name as used by Vault.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aes128Gcm96 => "aes128-gcm96",
            Self::Aes256Gcm96 => "aes256-gcm96",
            Self::ChaCha20Poly1305 => "chacha20-poly1305",
            Self::Ed25519 => "ed25519",
            Self::EcdsaP256 => "ecdsa-p256",
            Self::EcdsaP384 => "ecdsa-p384",
            Self::EcdsaP521 => "ecdsa-p521",
            Self::Rsa2048 => "rsa-2048",
            Self::Rsa3072 => "rsa-3072",
            Self::Rsa4096 => "rsa-4096",
        }
    }

    /// Whether keys of this type encrypt and decrypt.
    #[must_use]
    pub const fn supports_encryption(self) -> bool {
        matches!(
            self,
            Self::Aes128Gcm96
                | Self::Aes256Gcm96
                | Self::ChaCha20Poly1305
                | Self::Rsa2048
                | Self::Rsa3072
                | Self::Rsa4096
        )
    }

    /// Whether keys of this type sign and verify.
    #[must_use]
    pub const fn supports_signing(self) -> bool {
        matches!(
            self,
            Self::Ed25519
                | Self::EcdsaP256
                | Self::EcdsaP384
                | Self::EcdsaP521
                | Self::Rsa2048
                | Self::Rsa3072
                | Self::Rsa4096
        )
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash applied to sign and verify input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-1
    #[serde(rename = "sha1")]
    Sha1,
    /// SHA-224
    #[serde(rename = "sha2-224")]
    Sha2_224,
    /// SHA-256
    #[serde(rename = "sha2-256")]
    Sha2_256,
    /// SHA-384
    #[serde(rename = "sha2-384")]
    Sha2_384,
    /// SHA-512
    #[serde(rename = "sha2-512")]
    Sha2_512,
    /// Input is signed as is
    #[serde(rename = "none")]
    None,
}

/// RSA signature padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    /// RSASSA-PSS
    Pss,
    /// RSASSA-PKCS1-v1_5
    Pkcs1v15,
}

/// ECDSA signature encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarshalingAlgorithm {
    /// ASN.1 DER
    Asn1,
    /// JWS raw r||s
    Jws,
}

/// Options applied to a whole encrypt call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptOptions {
    /// Key type used when encrypting creates the key
    pub key_type: Option<KeyType>,
    /// Request convergent encryption
    pub convergent: bool,
}

impl EncryptOptions {
    pub(crate) fn write_to(&self, body: &mut Map<String, Value>) {
        if let Some(key_type) = self.key_type {
            body.insert("type".into(), key_type.as_str().into());
        }
        if self.convergent {
            body.insert("convergent_encryption".into(), true.into());
        }
    }
}

/// Options applied to a whole sign or verify call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Input hash
    pub hash_algorithm: Option<HashAlgorithm>,
    /// RSA padding
    pub signature_algorithm: Option<SignatureAlgorithm>,
    /// Input is already hashed
    pub prehashed: bool,
    /// ECDSA signature encoding
    pub marshaling_algorithm: Option<MarshalingAlgorithm>,
}

impl SignOptions {
    pub(crate) fn write_to(&self, body: &mut Map<String, Value>) {
        if let Some(hash) = self.hash_algorithm {
            body.insert("hash_algorithm".into(), serde_json::json!(hash));
        }
        if let Some(algorithm) = self.signature_algorithm {
            body.insert("signature_algorithm".into(), serde_json::json!(algorithm));
        }
        if self.prehashed {
            body.insert("prehashed".into(), true.into());
        }
        if let Some(marshaling) = self.marshaling_algorithm {
            body.insert("marshaling_algorithm".into(), serde_json::json!(marshaling));
        }
    }
}

/// One plaintext to encrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptRequest {
    /// Data to encrypt
    pub plaintext: ClearData,
    /// Derivation context for derived keys
    pub context: Option<ClearData>,
    /// Key version to encrypt with; latest when unset
    pub key_version: Option<u32>,
}

impl EncryptRequest {
    /// Encrypt `plaintext` with the latest key version.
    #[must_use]
    pub fn new(plaintext: impl Into<ClearData>) -> Self {
        Self {
            plaintext: plaintext.into(),
            context: None,
            key_version: None,
        }
    }

    /// Set the derivation context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<ClearData>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Pin the key version.
    #[must_use]
    pub const fn with_key_version(mut self, version: u32) -> Self {
        self.key_version = Some(version);
        self
    }

    pub(crate) fn to_wire(&self) -> Map<String, Value> {
        let mut item = Map::new();
        item.insert("plaintext".into(), self.plaintext.to_base64().into());
        insert_context(&mut item, self.context.as_ref());
        if let Some(version) = self.key_version {
            item.insert("key_version".into(), version.into());
        }
        item
    }
}

/// One ciphertext to decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptRequest {
    /// `vault:v{n}:...` ciphertext
    pub ciphertext: String,
    /// Derivation context for derived keys
    pub context: Option<ClearData>,
}

impl DecryptRequest {
    /// Decrypt `ciphertext`.
    #[must_use]
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            context: None,
        }
    }

    /// Set the derivation context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<ClearData>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub(crate) fn to_wire(&self) -> Map<String, Value> {
        let mut item = Map::new();
        item.insert("ciphertext".into(), self.ciphertext.clone().into());
        insert_context(&mut item, self.context.as_ref());
        item
    }
}

/// One ciphertext to re-encrypt under a newer key version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrapRequest {
    /// `vault:v{n}:...` ciphertext
    pub ciphertext: String,
    /// Derivation context for derived keys
    pub context: Option<ClearData>,
    /// Target key version; latest when unset
    pub key_version: Option<u32>,
}

impl RewrapRequest {
    /// Rewrap `ciphertext` to the latest key version.
    #[must_use]
    pub fn new(ciphertext: impl Into<String>) -> Self {
        Self {
            ciphertext: ciphertext.into(),
            context: None,
            key_version: None,
        }
    }

    /// Set the derivation context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<ClearData>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Pin the target key version.
    #[must_use]
    pub const fn with_key_version(mut self, version: u32) -> Self {
        self.key_version = Some(version);
        self
    }

    pub(crate) fn to_wire(&self) -> Map<String, Value> {
        let mut item = Map::new();
        item.insert("ciphertext".into(), self.ciphertext.clone().into());
        insert_context(&mut item, self.context.as_ref());
        if let Some(version) = self.key_version {
            item.insert("key_version".into(), version.into());
        }
        item
    }
}

/// One input to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    /// Data to sign
    pub input: ClearData,
    /// Derivation context for derived keys
    pub context: Option<ClearData>,
    /// Key version to sign with; latest when unset
    pub key_version: Option<u32>,
}

impl SignRequest {
    /// Sign `input` with the latest key version.
    #[must_use]
    pub fn new(input: impl Into<ClearData>) -> Self {
        Self {
            input: input.into(),
            context: None,
            key_version: None,
        }
    }

    /// Set the derivation context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<ClearData>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Pin the key version.
    #[must_use]
    pub const fn with_key_version(mut self, version: u32) -> Self {
        self.key_version = Some(version);
        self
    }

    pub(crate) fn to_wire(&self) -> Map<String, Value> {
        let mut item = Map::new();
        item.insert("input".into(), self.input.to_base64().into());
        insert_context(&mut item, self.context.as_ref());
        item
    }
}

/// One signature to check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyRequest {
    /// Signed data
    pub input: ClearData,
    /// `vault:v{n}:...` signature
    pub signature: String,
    /// Derivation context for derived keys
    pub context: Option<ClearData>,
}

impl VerifyRequest {
    /// Check `signature` over `input`.
    #[must_use]
    pub fn new(input: impl Into<ClearData>, signature: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            signature: signature.into(),
            context: None,
        }
    }

    /// Set the derivation context.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<ClearData>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub(crate) fn to_wire(&self) -> Map<String, Value> {
        let mut item = Map::new();
        item.insert("input".into(), self.input.to_base64().into());
        item.insert("signature".into(), self.signature.clone().into());
        insert_context(&mut item, self.context.as_ref());
        item
    }
}

fn insert_context(item: &mut Map<String, Value>, context: Option<&ClearData>) {
    if let Some(context) = context {
        item.insert("context".into(), context.to_base64().into());
    }
}

/// Key version embedded in a `vault:v{n}:` ciphertext or signature.
#[must_use]
pub fn key_version_of(value: &str) -> Option<u32> {
    value
        .strip_prefix("vault:v")?
        .split_once(':')
        .and_then(|(version, _)| version.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_data_debug_hides_bytes() {
        let data = ClearData::from("hunter2");
        assert_eq!(format!("{data:?}"), "ClearData(7 bytes)");
    }

    #[test]
    fn test_clear_data_base64() {
        let data = ClearData::from("hello");
        assert_eq!(data.to_base64(), "aGVsbG8=");
        assert_eq!(ClearData::from_base64("aGVsbG8=").unwrap(), data);
        assert!(ClearData::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_key_type_wire_names() {
        for key_type in KeyType::ALL {
            let encoded = serde_json::to_value(key_type).unwrap();
            assert_eq!(encoded, key_type.as_str());
        }
        assert!(KeyType::Rsa2048.supports_encryption() && KeyType::Rsa2048.supports_signing());
        assert!(!KeyType::Ed25519.supports_encryption());
        assert!(!KeyType::Aes256Gcm96.supports_signing());
    }

    #[test]
    fn test_options_write_only_set_fields() {
        let mut body = Map::new();
        EncryptOptions::default().write_to(&mut body);
        assert!(body.is_empty());

        SignOptions {
            hash_algorithm: Some(HashAlgorithm::Sha2_256),
            signature_algorithm: Some(SignatureAlgorithm::Pss),
            prehashed: true,
            marshaling_algorithm: Some(MarshalingAlgorithm::Jws),
        }
        .write_to(&mut body);
        assert_eq!(body["hash_algorithm"], "sha2-256");
        assert_eq!(body["signature_algorithm"], "pss");
        assert_eq!(body["prehashed"], true);
        assert_eq!(body["marshaling_algorithm"], "jws");
    }

    #[test]
    fn test_wire_items() {
        let item = EncryptRequest::new("hi").with_context("ctx").with_key_version(2).to_wire();
        assert_eq!(item["plaintext"], "aGk=");
        assert_eq!(item["context"], "Y3R4");
        assert_eq!(item["key_version"], 2);

        let item = SignRequest::new("hi").with_key_version(3).to_wire();
        assert!(item.get("key_version").is_none());
    }

    #[test]
    fn test_key_version_of() {
        assert_eq!(key_version_of("vault:v3:abcd"), Some(3));
        assert_eq!(key_version_of("vault:vx:abcd"), None);
        assert_eq!(key_version_of("plain"), None);
    }
}
