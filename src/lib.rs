mod crypto;
mod error;
mod format;
mod shared;
mod storage;

pub use crate::crypto::{KdfParams, MAX_VALUE_LEN, compute_digest};
pub use crate::error::{IntegrityCheck, KeychainError, Result};
pub use crate::format::FORMAT_VERSION;
pub use crate::shared::SharedKeychain;
pub use crate::storage::{Storage, Stored};

use crate::crypto::SecretMaterial;
use crate::format::StateBody;
use anyhow::Context;
use directories::ProjectDirs;
use tracing::{debug, warn};

/// Records are encrypted without associated data; the whole-store tag binds
/// each ciphertext to its blinded key.
const RECORD_AAD: &[u8] = b"";

/// A password-protected store of domain → secret pairs.
///
/// A keychain starts out uninitialized and becomes ready after a successful
/// [`init`](Self::init) or [`load`](Self::load). Reads and writes on an
/// uninitialized keychain fail with [`KeychainError::NotReady`].
#[derive(Debug, Default)]
pub struct Keychain {
    state: State,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Uninitialized,
    Ready(Box<Unlocked>),
}

#[derive(Debug)]
struct Unlocked {
    secrets: SecretMaterial,
    body: StateBody,
}

/// Output of [`Keychain::dump`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dump {
    repr: String,
    digest: String,
}

impl Dump {
    /// The serialized keychain.
    pub fn repr(&self) -> &str {
        &self.repr
    }

    /// SHA-256 (hex) of [`repr`](Self::repr).
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn into_parts(self) -> (String, String) {
        (self.repr, self.digest)
    }
}

impl Keychain {
    /// Creates an uninitialized keychain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ready, empty keychain protected by `password`.
    pub fn create(password: &str) -> Result<Self> {
        Self::create_with_kdf(password, KdfParams::default())
    }

    pub fn create_with_kdf(password: &str, kdf: KdfParams) -> Result<Self> {
        let mut keychain = Self::new();
        keychain.init_with_kdf(password, kdf)?;
        Ok(keychain)
    }

    /// Loads a ready keychain from a dump. See [`load`](Self::load).
    pub fn open(password: &str, repr: &str, trusted_digest: Option<&str>) -> Result<Self> {
        let mut keychain = Self::new();
        keychain.load(password, repr, trusted_digest)?;
        Ok(keychain)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// Initializes an empty keychain with a fresh salt.
    ///
    /// Any contents the keychain had before are discarded.
    pub fn init(&mut self, password: &str) -> Result<()> {
        self.init_with_kdf(password, KdfParams::default())
    }

    pub fn init_with_kdf(&mut self, password: &str, kdf: KdfParams) -> Result<()> {
        let salt = crypto::generate_salt()?;
        let secrets = crypto::derive(password, &salt, kdf)?;
        let body = StateBody::new(kdf, &salt);

        self.state = State::Ready(Box::new(Unlocked { secrets, body }));
        debug!(iterations = kdf.iterations(), "keychain initialized");
        Ok(())
    }

    /// Replaces the contents of this keychain with a dump.
    ///
    /// If `trusted_digest` is given it must match the SHA-256 of `repr`. The
    /// whole-store tag is then verified with keys derived from `password`.
    /// On any error the keychain is left exactly as it was.
    ///
    /// # Errors
    ///
    /// - [`KeychainError::IntegrityFailure`] if the digest or the tag does
    ///   not match. A wrong password shows up as a tag mismatch.
    /// - [`KeychainError::MalformedRepresentation`] if `repr` cannot be parsed.
    pub fn load(
        &mut self,
        password: &str,
        repr: &str,
        trusted_digest: Option<&str>,
    ) -> Result<()> {
        if let Some(trusted) = trusted_digest {
            if !crypto::digest_matches(repr, trusted) {
                warn!("keychain digest does not match trusted digest");
                return Err(KeychainError::IntegrityFailure(IntegrityCheck::Digest));
            }
        }

        let state = format::parse(repr)?;
        let salt = state.body().salt()?;
        let secrets = crypto::derive(password, &salt, state.body().kdf())?;

        if !crypto::verify_tag(&state, secrets.mac_key())? {
            warn!("keychain tag verification failed");
            return Err(KeychainError::IntegrityFailure(IntegrityCheck::Tag));
        }

        let body = state.into_body();
        debug!(records = body.len(), "keychain loaded");
        self.state = State::Ready(Box::new(Unlocked { secrets, body }));
        Ok(())
    }

    /// Serializes the keychain under a freshly computed tag.
    ///
    /// Returns `Ok(None)` if the keychain is not ready.
    pub fn dump(&self) -> Result<Option<Dump>> {
        let State::Ready(unlocked) = &self.state else {
            debug!("dump requested on uninitialized keychain");
            return Ok(None);
        };

        let tag = crypto::compute_tag(&unlocked.body, unlocked.secrets.mac_key())?;
        let repr = format::serialize(&unlocked.body, &tag)?;
        let digest = crypto::compute_digest(&repr);

        debug!(records = unlocked.body.len(), "keychain dumped");
        Ok(Some(Dump { repr, digest }))
    }

    /// Returns the value stored for `domain`, or `None` if there is none.
    pub fn get(&self, domain: &str) -> Result<Option<String>> {
        let unlocked = self.unlocked()?;
        let key = crypto::blind(domain, unlocked.secrets.mac_key())?;

        let Some((ciphertext, iv)) = unlocked.body.record(&key)? else {
            return Ok(None);
        };

        crypto::decode(&ciphertext, &iv, unlocked.secrets.enc_key(), RECORD_AAD)
            .inspect_err(|_| warn!("stored record failed authentication"))
            .map(Some)
    }

    /// Stores `value` for `domain`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// [`KeychainError::ValueTooLong`] if `value` is longer than
    /// [`MAX_VALUE_LEN`] bytes. The keychain is unchanged on error.
    pub fn set(&mut self, domain: &str, value: &str) -> Result<()> {
        let unlocked = self.unlocked_mut()?;
        let key = crypto::blind(domain, unlocked.secrets.mac_key())?;
        let (ciphertext, iv) = crypto::encode(value, unlocked.secrets.enc_key(), RECORD_AAD)?;

        unlocked.body.upsert(key, &ciphertext, &iv);
        Ok(())
    }

    /// Removes the record for `domain`. Returns `true` if one was removed.
    pub fn remove(&mut self, domain: &str) -> Result<bool> {
        let unlocked = self.unlocked_mut()?;
        let key = crypto::blind(domain, unlocked.secrets.mac_key())?;
        Ok(unlocked.body.remove(&key))
    }

    /// Number of stored records.
    pub fn record_count(&self) -> Result<usize> {
        Ok(self.unlocked()?.body.len())
    }

    /// Key derivation parameters of this keychain.
    pub fn kdf(&self) -> Result<KdfParams> {
        Ok(self.unlocked()?.body.kdf())
    }

    fn unlocked(&self) -> Result<&Unlocked> {
        match &self.state {
            State::Ready(unlocked) => Ok(&**unlocked),
            State::Uninitialized => Err(KeychainError::NotReady),
        }
    }

    fn unlocked_mut(&mut self) -> Result<&mut Unlocked> {
        match &mut self.state {
            State::Ready(unlocked) => Ok(&mut **unlocked),
            State::Uninitialized => Err(KeychainError::NotReady),
        }
    }
}

pub fn default_storage() -> anyhow::Result<Storage> {
    let project_dirs =
        ProjectDirs::from("", "", "keyvault").context("could not determine platform directories")?;

    let path = project_dirs.data_dir().join("keyvault.json");

    Ok(Storage::new(path))
}
