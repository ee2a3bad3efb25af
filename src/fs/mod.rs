// src/fs/mod.rs

//! Filesystem seam used for checkpoints, error summaries, raw assets and log
//! upload, so those paths can be exercised against [`mock::MockFileSystem`].

use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read(&self, path: &Path) -> Result<Vec<u8>>;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Write a whole file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    /// Replace a whole file so readers see either the old or the new
    /// contents, never a partial write.
    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).with_context(|| format!("reading file {:?}", path))
    }

    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
            }
        }
        fs::write(path, contents).with_context(|| format!("writing to file {:?}", path))
    }

    fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).with_context(|| format!("creating dir {:?}", dir))?;

        // The temp file must live on the same filesystem for the rename.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp file in {:?}", dir))?;
        tmp.write_all(contents)
            .with_context(|| format!("writing temp file for {:?}", path))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("syncing temp file for {:?}", path))?;
        tmp.persist(path)
            .map_err(|e| e.error)
            .with_context(|| format!("replacing file {:?}", path))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        entries.sort();
        Ok(entries)
    }
}

/// Every regular file under `root`, recursively, in sorted order.
pub fn walk_files(fs: &dyn FileSystem, root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for entry in fs.read_dir(&dir)? {
            if fs.is_dir(&entry) {
                stack.push(entry);
            } else {
                files.push(entry);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    #[test]
    fn walk_files_recurses_into_subdirectories() {
        let fs = MockFileSystem::new();
        fs.add_file("logs/run-1/dag.json", b"{}");
        fs.add_file("logs/run-1/memory.csv", b"timestamp,rss_mb,vms_mb,pct\n");
        fs.add_file("logs/run-1/nodes/ingest.log", b"ok");

        let files = walk_files(&fs, Path::new("logs/run-1")).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("logs/run-1/dag.json"),
                PathBuf::from("logs/run-1/memory.csv"),
                PathBuf::from("logs/run-1/nodes/ingest.log"),
            ]
        );
    }

    #[test]
    fn real_write_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        RealFileSystem.write(&path, b"hi").unwrap();
        assert_eq!(RealFileSystem.read_to_string(&path).unwrap(), "hi");
        assert_eq!(walk_files(&RealFileSystem, dir.path()).unwrap(), vec![path]);
    }

    #[test]
    fn atomic_write_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run/dag.json");
        RealFileSystem.write_atomic(&path, b"first").unwrap();
        RealFileSystem.write_atomic(&path, b"second").unwrap();

        assert_eq!(RealFileSystem.read_to_string(&path).unwrap(), "second");
        assert_eq!(walk_files(&RealFileSystem, dir.path()).unwrap(), vec![path]);
    }

    #[test]
    fn readers_never_see_a_partial_atomic_write() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dag.json");
        let small = vec![b'a'; 16];
        let large = vec![b'b'; 256 * 1024];
        RealFileSystem.write_atomic(&path, &small).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let (path, stop) = (path.clone(), Arc::clone(&stop));
            let (small, large) = (small.clone(), large.clone());
            std::thread::spawn(move || {
                let mut torn = 0usize;
                while !stop.load(Ordering::Relaxed) {
                    let seen = std::fs::read(&path).unwrap();
                    if seen != small && seen != large {
                        torn += 1;
                    }
                }
                torn
            })
        };

        for i in 0..200 {
            let contents = if i % 2 == 0 { &large } else { &small };
            RealFileSystem.write_atomic(&path, contents).unwrap();
        }
        stop.store(true, Ordering::Relaxed);

        assert_eq!(reader.join().unwrap(), 0);
    }
}
