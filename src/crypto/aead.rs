use super::{KEY_LEN, NONCE_LEN, SALT_LEN};
use crate::error::{KeychainError, Result};
use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use getrandom::fill;
use zeroize::Zeroizing;

/// Fill buffer with cryptographically secure random bytes
fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| KeychainError::Crypto("OS random generator unavailable".into()))
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN]> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate a fresh nonce. Called once per encryption.
pub fn generate_nonce() -> Result<[u8; NONCE_LEN]> {
    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;
    Ok(nonce)
}

/// Encrypt plaintext under a fresh random nonce, binding `aad`.
pub fn encrypt(
    key: &[u8; KEY_LEN],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let nonce = generate_nonce()?;

    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| KeychainError::Crypto("encryption failed".into()))?;

    Ok((ciphertext, nonce))
}

/// Decrypt ciphertext. Any authentication failure is reported as
/// [`KeychainError::AuthFailure`] and no plaintext is returned.
pub fn decrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| KeychainError::AuthFailure)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [7u8; KEY_LEN];
        let (ct, nonce) = encrypt(&key, b"hello", b"").unwrap();
        let pt = decrypt(&key, &nonce, &ct, b"").unwrap();
        assert_eq!(pt.as_slice(), b"hello");
    }

    #[test]
    fn nonces_are_fresh() {
        let key = [7u8; KEY_LEN];
        let (_, n1) = encrypt(&key, b"same", b"").unwrap();
        let (_, n2) = encrypt(&key, b"same", b"").unwrap();
        assert_ne!(n1, n2);
        assert_ne!(n1, [0u8; NONCE_LEN]);
    }

    #[test]
    fn wrong_key_is_auth_failure() {
        let (ct, nonce) = encrypt(&[1u8; KEY_LEN], b"hello", b"").unwrap();
        let err = decrypt(&[2u8; KEY_LEN], &nonce, &ct, b"").unwrap_err();
        assert!(matches!(err, KeychainError::AuthFailure));
    }

    #[test]
    fn wrong_aad_is_auth_failure() {
        let key = [3u8; KEY_LEN];
        let (ct, nonce) = encrypt(&key, b"hello", b"a").unwrap();
        let err = decrypt(&key, &nonce, &ct, b"b").unwrap_err();
        assert!(matches!(err, KeychainError::AuthFailure));
    }

    #[test]
    fn salts_differ() {
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
    }
}
