use hkdf::Hkdf;
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use super::KEY_LEN;
use crate::error::{KeychainError, Result};

/// Lowest PBKDF2 iteration count accepted, for new stores and loaded ones.
pub const MIN_ITERATIONS: u32 = 100_000;

/// Highest iteration count accepted. A loaded count is read before the tag
/// can be checked, so it must be bounded.
pub const MAX_ITERATIONS: u32 = 10_000_000;

const ENC_INFO: &[u8] = b"keyvault/enc";
const MAC_INFO: &[u8] = b"keyvault/mac";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
        }
    }
}

impl KdfParams {
    pub fn new(iterations: u32) -> Result<Self> {
        let params = Self { iterations };
        params.validate()?;
        Ok(params)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations < MIN_ITERATIONS {
            return Err(KeychainError::InvalidKdfParams(format!(
                "pbkdf2 iterations must be >= {MIN_ITERATIONS}, got {}",
                self.iterations
            )));
        }
        if self.iterations > MAX_ITERATIONS {
            return Err(KeychainError::InvalidKdfParams(format!(
                "pbkdf2 iterations must be <= {MAX_ITERATIONS}, got {}",
                self.iterations
            )));
        }
        Ok(())
    }
}

/// Subkeys derived from the master password. Only ever held in memory.
pub struct SecretMaterial {
    enc_key: [u8; KEY_LEN],
    mac_key: [u8; KEY_LEN],
}

impl SecretMaterial {
    pub fn enc_key(&self) -> &[u8; KEY_LEN] {
        &self.enc_key
    }

    pub fn mac_key(&self) -> &[u8; KEY_LEN] {
        &self.mac_key
    }
}

impl Drop for SecretMaterial {
    fn drop(&mut self) {
        self.enc_key.zeroize();
        self.mac_key.zeroize();
    }
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretMaterial(..)")
    }
}

/// Derive the encryption and MAC subkeys from a password and salt.
///
/// PBKDF2-HMAC-SHA256 stretches the password into a master key; HKDF then
/// expands two independent subkeys from it. A wrong password is not an
/// error here: it produces different keys that fail the integrity check.
pub fn derive(password: &str, salt: &[u8], kdf: KdfParams) -> Result<SecretMaterial> {
    kdf.validate()?;

    let mut master = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, kdf.iterations, master.as_mut_slice());

    let hk = Hkdf::<Sha256>::new(Some(salt), master.as_slice());
    let mut keys = SecretMaterial {
        enc_key: [0u8; KEY_LEN],
        mac_key: [0u8; KEY_LEN],
    };
    hk.expand(ENC_INFO, &mut keys.enc_key)
        .map_err(|e| KeychainError::Crypto(format!("hkdf expand failed: {e}")))?;
    hk.expand(MAC_INFO, &mut keys.mac_key)
        .map_err(|e| KeychainError::Crypto(format!("hkdf expand failed: {e}")))?;

    Ok(keys)
}
