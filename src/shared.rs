//! Thread-safe handle to a single keychain.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{Dump, Keychain, Result};

/// A cloneable, thread-safe handle to one [`Keychain`].
///
/// Reads (`get`, `dump`) share a read lock and may run in parallel. Every
/// mutation holds the write lock for its whole duration, so `kvs` and `ivs`
/// are never observed out of step and a dump always tags the same snapshot
/// it serializes.
#[derive(Debug, Clone, Default)]
pub struct SharedKeychain {
    inner: Arc<RwLock<Keychain>>,
}

impl From<Keychain> for SharedKeychain {
    fn from(keychain: Keychain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(keychain)),
        }
    }
}

impl SharedKeychain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.read().is_ready()
    }

    pub fn init(&self, password: &str) -> Result<()> {
        self.inner.write().init(password)
    }

    pub fn load(&self, password: &str, repr: &str, trusted_digest: Option<&str>) -> Result<()> {
        self.inner.write().load(password, repr, trusted_digest)
    }

    pub fn dump(&self) -> Result<Option<Dump>> {
        self.inner.read().dump()
    }

    pub fn get(&self, domain: &str) -> Result<Option<String>> {
        self.inner.read().get(domain)
    }

    pub fn set(&self, domain: &str, value: &str) -> Result<()> {
        self.inner.write().set(domain, value)
    }

    pub fn remove(&self, domain: &str) -> Result<bool> {
        self.inner.write().remove(domain)
    }
}
