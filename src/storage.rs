//! Storage backend for serialized keychains.

use anyhow::{Context, Result};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::Dump;

/// A storage backend for persisting dumped keychains.
///
/// The serialized keychain is written to `path`; its digest goes to a
/// sidecar file next to it (`<path>.sha256`) and is handed back as the
/// trusted digest on load.
#[derive(Clone, Debug)]
pub struct Storage {
    path: PathBuf,
}

/// What [`Storage::load`] read from disk.
#[derive(Debug)]
pub struct Stored {
    pub repr: String,
    pub digest: Option<String>,
}

impl Storage {
    /// Creates a new Storage instance with the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Returns `true` if the storage file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Returns the path of the digest sidecar file.
    pub fn digest_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".sha256");
        PathBuf::from(name)
    }

    /// Loads the serialized keychain and, if present, its stored digest.
    ///
    /// # Errors
    ///
    /// Returns an error if the keychain file cannot be read.
    pub fn load(&self) -> Result<Stored> {
        let repr = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        let digest = match fs::read_to_string(self.digest_path()) {
            Ok(d) => Some(d.trim().to_string()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e).context("failed to read digest file"),
        };

        Ok(Stored { repr, digest })
    }

    /// Saves a dump: the keychain first, then its digest.
    ///
    /// Both files are replaced atomically. Creates parent directories if
    /// they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub fn save(&self, dump: &Dump) -> Result<()> {
        write_atomic(&self.path, dump.repr().as_bytes())?;
        write_atomic(&self.digest_path(), dump.digest().as_bytes())?;
        Ok(())
    }
}

/// Writes `data` to `path` without ever leaving a partial file behind.
///
/// 1. Writes data to a temporary file with random name
/// 2. Syncs the temporary file to disk
/// 3. Atomically replaces the old file with the new one
/// 4. Syncs the parent directory to ensure the rename is persisted
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = random_tmp_path(path)?;

    // securely create temp file (fail if exists)
    let mut tmp_file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .context("failed to create temporary file")?;

    tmp_file.write_all(data)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    if let Err(e) = atomic_replace(path, &tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    if let Some(parent) = path.parent() {
        let dir = File::open(parent)?;
        dir.sync_all()?;
    }

    Ok(())
}

/// Generates a unique temporary file path in the same directory.
///
/// Format: `filename.tmp.<randomhex>`
fn random_tmp_path(path: &Path) -> Result<PathBuf> {
    let mut buf = [0u8; 8]; // 64 bit entropy
    fill(&mut buf)?;

    let file_name = path
        .file_name()
        .context("storage path has no file name")?
        .to_string_lossy();

    let tmp_name = format!("{}.tmp.{}", file_name, hex::encode(buf));

    Ok(path.with_file_name(tmp_name))
}

/// Atomically replaces the target file with the temporary file.
///
/// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
/// so the replacement is persisted to disk.
#[cfg(target_os = "windows")]
fn atomic_replace(target: &Path, tmp_path: &Path) -> Result<()> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;
    use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

    if !target.exists() {
        fs::rename(tmp_path, target)?;
        return Ok(());
    }

    fn to_wide(s: &OsStr) -> Vec<u16> {
        s.encode_wide().chain(std::iter::once(0)).collect()
    }

    let target_w = to_wide(target.as_os_str());
    let tmp_w = to_wide(tmp_path.as_os_str());

    // SAFETY:
    // - Strings are valid UTF-16 and null-terminated
    // - Pointers remain valid during the call
    // - Windows does not retain the pointers after return
    let result = unsafe {
        ReplaceFileW(
            target_w.as_ptr(),
            tmp_w.as_ptr(),
            std::ptr::null(),
            REPLACEFILE_WRITE_THROUGH,
            std::ptr::null(),
            std::ptr::null(),
        )
    };

    if result == 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).context("atomic replace failed");
    }

    Ok(())
}

/// Atomically replaces the target file with the temporary file.
///
/// On Unix, `rename()` is atomic when both paths are on the same filesystem.
#[cfg(not(target_os = "windows"))]
fn atomic_replace(target: &Path, tmp_path: &Path) -> Result<()> {
    fs::rename(tmp_path, target)?;
    Ok(())
}
