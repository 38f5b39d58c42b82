use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::KEY_LEN;
use crate::error::{KeychainError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Map a domain name to the opaque key it is stored under.
///
/// The result is the hex HMAC-SHA256 of the domain under the MAC subkey, so
/// it is stable for a given store and reveals nothing without the key.
pub fn blind(domain: &str, mac_key: &[u8; KEY_LEN]) -> Result<String> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(mac_key)
        .map_err(|e| KeychainError::Crypto(format!("hmac init failed: {e}")))?;
    mac.update(domain.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
