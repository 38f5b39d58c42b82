use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use super::KEY_LEN;
use crate::error::{KeychainError, Result};
use crate::format::{PersistedState, StateBody};

type HmacSha256 = Hmac<Sha256>;

fn mac_over(body: &StateBody, mac_key: &[u8; KEY_LEN]) -> Result<HmacSha256> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| KeychainError::Crypto(format!("hmac init failed: {e}")))?;
    mac.update(&body.canonical_bytes()?);
    Ok(mac)
}

/// Compute the whole-store tag (hex) over the tag-less body.
pub fn compute_tag(body: &StateBody, mac_key: &[u8; KEY_LEN]) -> Result<String> {
    let mac = mac_over(body, mac_key)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check the stored tag against a recomputation, in constant time.
///
/// A tag that is not valid hex simply fails verification.
pub fn verify_tag(state: &PersistedState, mac_key: &[u8; KEY_LEN]) -> Result<bool> {
    let Ok(expected) = hex::decode(state.tag()) else {
        return Ok(false);
    };
    let mac = mac_over(state.body(), mac_key)?;
    Ok(mac.verify_slice(&expected).is_ok())
}

/// Unkeyed SHA-256 (hex) of a full serialized keychain.
pub fn compute_digest(repr: &str) -> String {
    hex::encode(Sha256::digest(repr.as_bytes()))
}

/// Compare a serialized keychain against a trusted digest in constant time.
pub fn digest_matches(repr: &str, trusted: &str) -> bool {
    let Ok(trusted) = hex::decode(trusted.trim()) else {
        return false;
    };
    let actual = Sha256::digest(repr.as_bytes());
    actual.as_slice().ct_eq(&trusted).into()
}
