use thiserror::Error;

pub type Result<T, E = KeychainError> = std::result::Result<T, E>;

/// Which integrity check rejected a serialized keychain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityCheck {
    /// The trusted digest did not match the serialized bytes.
    Digest,
    /// The whole-store tag did not verify; wrong password or tampering.
    Tag,
}

#[derive(Debug, Error)]
pub enum KeychainError {
    #[error("keychain is not initialized")]
    NotReady,

    #[error("integrity check failed ({0:?})")]
    IntegrityFailure(IntegrityCheck),

    #[error("record failed authentication; the keychain has been tampered with")]
    AuthFailure,

    #[error("value is {len} bytes, at most {max} can be stored")]
    ValueTooLong { len: usize, max: usize },

    #[error("malformed keychain representation: {0}")]
    MalformedRepresentation(String),

    #[error("invalid key derivation parameters: {0}")]
    InvalidKdfParams(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}
