//! Length-hiding record encryption.
//!
//! Every value is padded to [`PADDED_LEN`] bytes before encryption:
//!
//! ```text
//! VALUE | 0x80 | 0x00 ... 0x00
//! ```
//!
//! so all ciphertexts have the same size regardless of the value stored.

use super::{KEY_LEN, MAX_VALUE_LEN, NONCE_LEN, PADDED_LEN, aead};
use crate::error::{KeychainError, Result};
use zeroize::Zeroizing;

const SENTINEL: u8 = 0x80;
const FILLER: u8 = 0x00;

fn pad(value: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if value.len() >= PADDED_LEN {
        return Err(KeychainError::ValueTooLong {
            len: value.len(),
            max: MAX_VALUE_LEN,
        });
    }

    let mut buf = Zeroizing::new(Vec::with_capacity(PADDED_LEN));
    buf.extend_from_slice(value);
    buf.push(SENTINEL);
    buf.resize(PADDED_LEN, FILLER);
    Ok(buf)
}

/// Strip filler and sentinel. `None` if the buffer is not validly padded.
fn unpad(padded: &[u8]) -> Option<&[u8]> {
    if padded.len() != PADDED_LEN {
        return None;
    }
    let end = padded.iter().rposition(|&b| b != FILLER)?;
    (padded[end] == SENTINEL).then(|| &padded[..end])
}

/// Pad and encrypt a value under a fresh nonce.
pub fn encode(
    value: &str,
    enc_key: &[u8; KEY_LEN],
    aad: &[u8],
) -> Result<(Vec<u8>, [u8; NONCE_LEN])> {
    let padded = pad(value.as_bytes())?;
    aead::encrypt(enc_key, &padded, aad)
}

/// Decrypt and unpad a value.
///
/// Anything other than an authentic, well-padded UTF-8 plaintext is reported
/// as [`KeychainError::AuthFailure`].
pub fn decode(
    ciphertext: &[u8],
    iv: &[u8; NONCE_LEN],
    enc_key: &[u8; KEY_LEN],
    aad: &[u8],
) -> Result<String> {
    let padded = aead::decrypt(enc_key, iv, ciphertext, aad)?;
    let value = unpad(&padded).ok_or(KeychainError::AuthFailure)?;
    std::str::from_utf8(value)
        .map(str::to_owned)
        .map_err(|_| KeychainError::AuthFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_LEN] = [5u8; KEY_LEN];

    #[test]
    fn pad_layout() {
        let padded = pad(b"abc").unwrap();
        assert_eq!(padded.len(), PADDED_LEN);
        assert_eq!(&padded[..3], b"abc");
        assert_eq!(padded[3], SENTINEL);
        assert!(padded[4..].iter().all(|&b| b == FILLER));
    }

    #[test]
    fn unpad_keeps_trailing_filler_bytes_of_value() {
        let value = [b'a', 0x00, 0x80, 0x00];
        let padded = pad(&value).unwrap();
        assert_eq!(unpad(&padded).unwrap(), &value);
    }

    #[test]
    fn unpad_rejects_missing_sentinel() {
        assert!(unpad(&[FILLER; PADDED_LEN]).is_none());
        let mut buf = [FILLER; PADDED_LEN];
        buf[0] = b'x';
        assert!(unpad(&buf).is_none());
        assert!(unpad(&[SENTINEL; 3]).is_none());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let longest = "x".repeat(MAX_VALUE_LEN);
        for value in ["", "p@ssw0rd", "ünïcödé", longest.as_str()] {
            let (ct, iv) = encode(value, &KEY, b"").unwrap();
            assert_eq!(decode(&ct, &iv, &KEY, b"").unwrap(), value);
        }
    }

    #[test]
    fn ciphertext_length_hides_value_length() {
        let (short, _) = encode("a", &KEY, b"").unwrap();
        let (long, _) = encode(&"a".repeat(MAX_VALUE_LEN), &KEY, b"").unwrap();
        assert_eq!(short.len(), long.len());
    }

    #[test]
    fn value_at_padded_len_rejected() {
        let err = encode(&"x".repeat(PADDED_LEN), &KEY, b"").unwrap_err();
        assert!(matches!(
            err,
            KeychainError::ValueTooLong {
                len: PADDED_LEN,
                max: MAX_VALUE_LEN
            }
        ));
    }

    #[test]
    fn flipped_ciphertext_is_auth_failure() {
        let (mut ct, iv) = encode("secret", &KEY, b"").unwrap();
        ct[0] ^= 0x01;
        assert!(matches!(
            decode(&ct, &iv, &KEY, b""),
            Err(KeychainError::AuthFailure)
        ));
    }

    #[test]
    fn flipped_iv_is_auth_failure() {
        let (ct, mut iv) = encode("secret", &KEY, b"").unwrap();
        iv[NONCE_LEN - 1] ^= 0x01;
        assert!(matches!(
            decode(&ct, &iv, &KEY, b""),
            Err(KeychainError::AuthFailure)
        ));
    }

    #[test]
    fn aad_is_bound() {
        let (ct, iv) = encode("secret", &KEY, b"example.com").unwrap();
        assert_eq!(decode(&ct, &iv, &KEY, b"example.com").unwrap(), "secret");
        assert!(decode(&ct, &iv, &KEY, b"example.org").is_err());
    }
}
