//! Serialized representation of a keychain.
//!
//! A dumped keychain is a JSON object:
//!
//! ```text
//! {
//!   "version": "keyvault v1",
//!   "kdf":     { "iterations": 100000 },
//!   "salt":    base64(16 bytes),
//!   "kvs":     { hex(blinded domain): base64(ciphertext), ... },
//!   "ivs":     { hex(blinded domain): base64(24 byte nonce), ... },
//!   "tag":     hex(HMAC-SHA256 over everything above)
//! }
//! ```
//!
//! [`StateBody`] is the part covered by the tag and has no tag field, so the
//! tag can never end up in its own input.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::crypto::{KdfParams, NONCE_LEN, SALT_LEN};
use crate::error::{KeychainError, Result};

/// Format identifier written into every dump.
pub const FORMAT_VERSION: &str = "keyvault v1";

/// Top-level fields of a dump. Anything else is rejected, since the tag would
/// not cover it.
const FIELDS: [&str; 6] = ["version", "kdf", "salt", "kvs", "ivs", "tag"];

/// Public, tag-covered state of a keychain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBody {
    version: String,
    kdf: KdfParams,
    salt: String,
    kvs: BTreeMap<String, String>,
    ivs: BTreeMap<String, String>,
}

impl StateBody {
    /// Creates an empty body for a freshly initialized keychain.
    pub fn new(kdf: KdfParams, salt: &[u8; SALT_LEN]) -> Self {
        Self {
            version: FORMAT_VERSION.to_string(),
            kdf,
            salt: BASE64.encode(salt),
            kvs: BTreeMap::new(),
            ivs: BTreeMap::new(),
        }
    }

    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }

    /// Returns the decoded salt.
    pub fn salt(&self) -> Result<[u8; SALT_LEN]> {
        decode_fixed(&self.salt, "salt")
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.kvs.len()
    }

    /// Returns the ciphertext and nonce stored under a blinded key.
    pub fn record(&self, key: &str) -> Result<Option<(Vec<u8>, [u8; NONCE_LEN])>> {
        let (Some(ct), Some(iv)) = (self.kvs.get(key), self.ivs.get(key)) else {
            return Ok(None);
        };
        let ct = BASE64
            .decode(ct)
            .map_err(|e| malformed(format!("ciphertext: {e}")))?;
        Ok(Some((ct, decode_fixed(iv, "iv")?)))
    }

    /// Inserts or replaces a record. Both maps are written together.
    pub fn upsert(&mut self, key: String, ciphertext: &[u8], iv: &[u8; NONCE_LEN]) {
        self.ivs.insert(key.clone(), BASE64.encode(iv));
        self.kvs.insert(key, BASE64.encode(ciphertext));
    }

    /// Removes a record from both maps. Returns `true` if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        let had_ct = self.kvs.remove(key).is_some();
        let had_iv = self.ivs.remove(key).is_some();
        had_ct || had_iv
    }

    /// Canonical bytes the whole-store tag is computed over.
    ///
    /// Field order is fixed by the struct and both maps are sorted, so equal
    /// bodies always produce equal bytes.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| malformed(e.to_string()))
    }

    /// Checks everything `load` relies on before deriving keys.
    fn validate(&self) -> Result<()> {
        if self.version != FORMAT_VERSION {
            return Err(malformed(format!("unsupported version: {:?}", self.version)));
        }

        self.kdf
            .validate()
            .map_err(|e| malformed(format!("kdf: {e}")))?;

        self.salt()?;

        if !self.kvs.keys().eq(self.ivs.keys()) {
            return Err(malformed("kvs and ivs have different keys"));
        }

        for (key, ct) in &self.kvs {
            if hex::decode(key).is_err() {
                return Err(malformed("record key is not hex"));
            }
            BASE64
                .decode(ct)
                .map_err(|e| malformed(format!("ciphertext: {e}")))?;
        }

        for iv in self.ivs.values() {
            decode_fixed::<NONCE_LEN>(iv, "iv")?;
        }

        Ok(())
    }
}

/// A parsed dump: the tag-covered body plus the tag that came with it.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistedState {
    #[serde(flatten)]
    body: StateBody,
    tag: String,
}

impl PersistedState {
    pub fn body(&self) -> &StateBody {
        &self.body
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn into_body(self) -> StateBody {
        self.body
    }
}

#[derive(Serialize)]
struct PersistedStateRef<'a> {
    #[serde(flatten)]
    body: &'a StateBody,
    tag: &'a str,
}

/// Parses and structurally validates a serialized keychain.
///
/// # Errors
///
/// Returns [`KeychainError::MalformedRepresentation`] if the input is not
/// valid JSON of the expected shape, has unknown top-level fields, an
/// unknown version, out-of-range KDF parameters, undecodable fields, or
/// mismatched `kvs`/`ivs` keys.
pub fn parse(repr: &str) -> Result<PersistedState> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(repr).map_err(|e| malformed(e.to_string()))?;
    if let Some(field) = object.keys().find(|k| !FIELDS.contains(&k.as_str())) {
        return Err(malformed(format!("unknown field: {field:?}")));
    }

    let state: PersistedState = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|e| malformed(e.to_string()))?;
    state.body.validate()?;
    Ok(state)
}

/// Serializes a body together with its tag.
pub fn serialize(body: &StateBody, tag: &str) -> Result<String> {
    serde_json::to_string(&PersistedStateRef { body, tag }).map_err(|e| malformed(e.to_string()))
}

fn decode_fixed<const N: usize>(encoded: &str, what: &str) -> Result<[u8; N]> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| malformed(format!("{what}: {e}")))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| malformed(format!("{what}: expected {N} bytes, got {}", b.len())))
}

fn malformed(reason: impl Into<String>) -> KeychainError {
    KeychainError::MalformedRepresentation(reason.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body() -> StateBody {
        let mut body = StateBody::new(KdfParams::default(), &[1u8; SALT_LEN]);
        body.upsert("aa".into(), b"ciphertext", &[2u8; NONCE_LEN]);
        body
    }

    #[test]
    fn serialize_parse_roundtrip() {
        let body = body();
        let repr = serialize(&body, "beef").unwrap();
        let parsed = parse(&repr).unwrap();

        assert_eq!(parsed.body(), &body);
        assert_eq!(parsed.tag(), "beef");
        assert_eq!(parsed.body().salt().unwrap(), [1u8; SALT_LEN]);
        let (ct, iv) = parsed.body().record("aa").unwrap().unwrap();
        assert_eq!(ct, b"ciphertext");
        assert_eq!(iv, [2u8; NONCE_LEN]);
    }

    #[test]
    fn serialized_form_has_expected_fields() {
        let repr = serialize(&body(), "beef").unwrap();
        let value: serde_json::Value = serde_json::from_str(&repr).unwrap();
        for field in FIELDS {
            assert!(value.get(field).is_some(), "missing {field}");
        }
        assert_eq!(value["version"], FORMAT_VERSION);
    }

    #[test]
    fn canonical_bytes_exclude_tag() {
        let bytes = body().canonical_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.get("tag").is_none());
    }

    #[test]
    fn canonical_bytes_ignore_insertion_order() {
        let mut a = StateBody::new(KdfParams::default(), &[0u8; SALT_LEN]);
        let mut b = a.clone();
        a.upsert("01".into(), b"x", &[0u8; NONCE_LEN]);
        a.upsert("02".into(), b"y", &[0u8; NONCE_LEN]);
        b.upsert("02".into(), b"y", &[0u8; NONCE_LEN]);
        b.upsert("01".into(), b"x", &[0u8; NONCE_LEN]);
        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
    }

    #[test]
    fn remove_clears_both_maps() {
        let mut body = body();
        assert!(body.remove("aa"));
        assert!(!body.remove("aa"));
        assert!(body.kvs.is_empty());
        assert!(body.ivs.is_empty());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            parse("not json"),
            Err(KeychainError::MalformedRepresentation(_))
        ));
        assert!(parse("{}").is_err());
    }

    #[test]
    fn parse_rejects_missing_tag() {
        let mut value: serde_json::Value =
            serde_json::from_str(&serialize(&body(), "beef").unwrap()).unwrap();
        value.as_object_mut().unwrap().remove("tag");
        assert!(parse(&value.to_string()).is_err());
    }

    #[test]
    fn parse_rejects_orphaned_iv() {
        let mut body = body();
        body.ivs.insert("bb".into(), BASE64.encode([0u8; NONCE_LEN]));
        let repr = serialize(&body, "beef").unwrap();
        assert!(matches!(
            parse(&repr),
            Err(KeychainError::MalformedRepresentation(_))
        ));
    }

    #[test]
    fn parse_rejects_short_iv() {
        let mut body = body();
        body.ivs.insert("aa".into(), BASE64.encode([0u8; 12]));
        assert!(parse(&serialize(&body, "beef").unwrap()).is_err());
    }

    #[test]
    fn parse_rejects_unknown_version() {
        let mut body = body();
        body.version = "keyvault v0".into();
        assert!(parse(&serialize(&body, "beef").unwrap()).is_err());
    }

    #[test]
    fn parse_rejects_weak_kdf() {
        let repr = serialize(&body(), "beef")
            .unwrap()
            .replace("\"iterations\":100000", "\"iterations\":1");
        assert!(matches!(
            parse(&repr),
            Err(KeychainError::MalformedRepresentation(_))
        ));
    }

    #[test]
    fn parse_rejects_excessive_kdf() {
        let repr = serialize(&body(), "beef")
            .unwrap()
            .replace("\"iterations\":100000", "\"iterations\":20000000");
        assert!(matches!(
            parse(&repr),
            Err(KeychainError::MalformedRepresentation(_))
        ));
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let mut value: serde_json::Value =
            serde_json::from_str(&serialize(&body(), "beef").unwrap()).unwrap();
        value["note"] = serde_json::Value::from("hello");
        assert!(matches!(
            parse(&value.to_string()),
            Err(KeychainError::MalformedRepresentation(_))
        ));
    }
}
