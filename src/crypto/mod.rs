//! Cryptographic primitives for the keychain.
//!
//! Provides key derivation, domain blinding, padded record encryption,
//! and whole-store integrity checks.

pub mod aead;
pub mod blind;
pub mod integrity;
pub mod kdf;
pub mod record;

pub use aead::generate_salt;
pub use blind::blind;
pub use integrity::{compute_digest, compute_tag, digest_matches, verify_tag};
pub use kdf::{KdfParams, SecretMaterial, derive};
pub use record::{decode, encode};

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the nonce (24 bytes for XChaCha20-Poly1305).
pub const NONCE_LEN: usize = 24;
/// Length of each derived subkey (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Size every value is padded to before encryption.
pub const PADDED_LEN: usize = 65;
/// Longest value that fits the padding scheme (room is left for the sentinel).
pub const MAX_VALUE_LEN: usize = PADDED_LEN - 1;
