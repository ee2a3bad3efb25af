// src/storage.rs

//! Durable storage for run artifacts.
//!
//! Objects are addressed by `/`-separated keys such as
//! `wdi/logs/20250101-120000/dag.json`.

use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::fs::{FileSystem, RealFileSystem};

pub trait Storage: Send + Sync + Debug {
    /// Store `data` under `key` and return the object's location.
    fn put_bytes(&self, key: &str, data: &[u8]) -> Result<String>;

    /// Store the contents of a local file under `key`.
    fn upload_file(&self, path: &Path, key: &str) -> Result<String>;

    /// Fetch the object stored under `key`.
    fn get_bytes(&self, key: &str) -> Result<Vec<u8>>;
}

/// Storage backed by a directory, e.g. a mounted bucket.
#[derive(Debug, Clone)]
pub struct DirectoryStorage {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fs(root, Arc::new(RealFileSystem))
    }

    pub fn with_fs(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let valid = !key.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            bail!("invalid storage key '{key}'");
        }
        Ok(self.root.join(rel))
    }
}

impl Storage for DirectoryStorage {
    fn put_bytes(&self, key: &str, data: &[u8]) -> Result<String> {
        let path = self.object_path(key)?;
        self.fs.write(&path, data)?;
        Ok(path.display().to_string())
    }

    fn upload_file(&self, path: &Path, key: &str) -> Result<String> {
        let data = self
            .fs
            .read(path)
            .with_context(|| format!("reading {} for upload", path.display()))?;
        self.put_bytes(key, &data)
    }

    fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        if !self.fs.exists(&path) {
            bail!("storage object '{key}' not found");
        }
        self.fs
            .read(&path)
            .with_context(|| format!("reading storage object '{key}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn objects_land_under_root() {
        let fs = Arc::new(MockFileSystem::new());
        let storage = DirectoryStorage::with_fs("/bucket", fs.clone());

        let loc = storage.put_bytes("wdi/logs/r1/dag.json", b"{}").unwrap();
        assert_eq!(loc, "/bucket/wdi/logs/r1/dag.json");
        assert_eq!(fs.read(Path::new("/bucket/wdi/logs/r1/dag.json")).unwrap(), b"{}");
    }

    #[test]
    fn upload_copies_file_contents() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/logs/r1/memory.csv", "timestamp,rss_mb,vms_mb,pct\n");
        let storage = DirectoryStorage::with_fs("/bucket", fs.clone());

        storage
            .upload_file(Path::new("/logs/r1/memory.csv"), "c/logs/r1/memory.csv")
            .unwrap();
        assert_eq!(
            fs.read_to_string(Path::new("/bucket/c/logs/r1/memory.csv")).unwrap(),
            "timestamp,rss_mb,vms_mb,pct\n"
        );
    }

    #[test]
    fn get_returns_stored_bytes_or_errors() {
        let storage = DirectoryStorage::with_fs("/bucket", Arc::new(MockFileSystem::new()));
        storage.put_bytes("wdi/data/raw/a.json", b"[1]").unwrap();

        assert_eq!(storage.get_bytes("wdi/data/raw/a.json").unwrap(), b"[1]");
        let err = storage.get_bytes("wdi/data/raw/b.json").unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert!(storage.get_bytes("../a.json").is_err());
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let storage = DirectoryStorage::with_fs("/bucket", Arc::new(MockFileSystem::new()));
        assert!(storage.put_bytes("../etc/passwd", b"x").is_err());
        assert!(storage.put_bytes("/abs", b"x").is_err());
        assert!(storage.put_bytes("", b"x").is_err());
    }
}
