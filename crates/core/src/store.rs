//! Blob storage backends behind the persistent key-value contract.

use std::{
    collections::HashMap,
    fs,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tempfile::NamedTempFile;

/// Root directory under `~/.config` used for save blobs.
pub const DEFAULT_SAVE_DIR: &str = "tycoon/saves";

/// Persistent key-value store holding opaque blobs.
pub trait KeyValueStore: Send + Sync {
    /// Read the blob stored under `key`; `Ok(None)` when nothing was written yet.
    fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the blob under `key`. A failed write leaves the previous blob readable.
    fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// One JSON file per key beneath a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the provided directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default location under the user's config directory.
    pub fn default_root() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_SAVE_DIR)
    }

    /// Directory holding the blobs.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", sanitize_component(key)))
    }
}

impl KeyValueStore for FileStore {
    fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.replace_with(key, |file| file.write_all(bytes))
    }
}

impl FileStore {
    /// Stage the new contents next to the target, then swap them in.
    ///
    /// The target is only touched by the final rename, so any failure before
    /// it leaves the previous blob in place.
    fn replace_with<F>(&self, key: &str, fill: F) -> Result<()>
    where
        F: FnOnce(&mut fs::File) -> io::Result<()>,
    {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create {}", self.root.display()))?;
        let path = self.path_for(key);

        // Stage next to the target so the rename stays on one filesystem.
        let mut staged = NamedTempFile::new_in(&self.root)
            .with_context(|| format!("failed to stage write in {}", self.root.display()))?;
        fill(staged.as_file_mut())
            .with_context(|| format!("failed to write staged blob for {}", path.display()))?;
        staged
            .as_file()
            .sync_all()
            .with_context(|| format!("failed to sync staged blob for {}", path.display()))?;
        staged
            .persist(&path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace {}", path.display()))?;
        Ok(())
    }
}

/// In-process store, for tests and embedding hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a single blob.
    pub fn with_blob(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::new();
        store.blobs.write().insert(key.into(), bytes.into());
        store
    }
}

impl KeyValueStore for MemoryStore {
    fn read_blob(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(key).cloned())
    }

    fn write_blob(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs.write().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            result.push(ch);
        }
    }
    let trimmed = result.trim_matches('.');
    if trimmed.is_empty() {
        "blob".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_store_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path().join("saves"));
        assert_eq!(store.read_blob("tycoon.state.v1")?, None);

        store.write_blob("tycoon.state.v1", b"first")?;
        store.write_blob("tycoon.state.v1", b"second")?;
        assert_eq!(store.read_blob("tycoon.state.v1")?, Some(b"second".to_vec()));

        let leftovers = fs::read_dir(store.root())?.count();
        assert_eq!(leftovers, 1, "staging files must not linger");
        Ok(())
    }

    #[test]
    fn failed_write_leaves_no_partial_blob() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path());
        store.write_blob("kept", b"kept")?;

        // A non-empty directory squatting on the target path makes the final rename fail.
        fs::create_dir_all(store.path_for("blocked").join("occupied"))?;
        assert!(store.write_blob("blocked", b"lost").is_err());

        assert_eq!(store.read_blob("kept")?, Some(b"kept".to_vec()));
        assert_eq!(fs::read_dir(store.root())?.count(), 2);
        Ok(())
    }

    #[test]
    fn interrupted_overwrite_keeps_previous_blob() -> Result<()> {
        let dir = tempdir()?;
        let store = FileStore::new(dir.path());
        store.write_blob("tycoon.state.v1", b"{\"level\": 5}")?;

        let result = store.replace_with("tycoon.state.v1", |file| {
            file.write_all(b"{\"lev")?;
            Err(io::Error::new(ErrorKind::Other, "disk full"))
        });
        assert!(result.is_err());

        assert_eq!(
            store.read_blob("tycoon.state.v1")?,
            Some(b"{\"level\": 5}".to_vec())
        );
        assert_eq!(fs::read_dir(store.root())?.count(), 1, "staged file removed");
        Ok(())
    }

    #[test]
    fn memory_store_round_trip() -> Result<()> {
        let store = MemoryStore::with_blob("a", b"1".to_vec());
        assert_eq!(store.read_blob("a")?, Some(b"1".to_vec()));
        store.write_blob("a", b"2")?;
        assert_eq!(store.read_blob("a")?, Some(b"2".to_vec()));
        assert_eq!(store.read_blob("b")?, None);
        Ok(())
    }

    #[test]
    fn sanitize_creates_safe_filenames() {
        assert_eq!(sanitize_component("@tycoon/save v6"), "tycoonsavev6");
        assert_eq!(sanitize_component("tycoon.state.v1"), "tycoon.state.v1");
        assert_eq!(sanitize_component("../.."), "blob");
    }
}
