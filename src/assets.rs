// src/assets.rs

//! Raw asset store used by node logic.
//!
//! Locally, assets live at `<data_dir>/raw/<asset_id>.<ext>`. In cloud mode
//! they go to durable storage under `<connector>/data/raw/<asset_id>.<ext>`.
//! Every load and save is reported to the tracking context, so nodes get
//! their reads and writes recorded without doing anything themselves.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::EnvConfig;
use crate::fs::{FileSystem, RealFileSystem};
use crate::storage::{DirectoryStorage, Storage};
use crate::track::{track_read, track_write};

#[derive(Debug, Clone)]
enum Backend {
    Local {
        root: PathBuf,
        fs: Arc<dyn FileSystem>,
    },
    Durable {
        storage: Arc<dyn Storage>,
        connector: String,
    },
}

#[derive(Debug, Clone)]
pub struct RawStore {
    backend: Backend,
}

impl RawStore {
    /// Store under `<data_dir>/raw`.
    pub fn new(data_dir: impl AsRef<Path>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            backend: Backend::Local {
                root: data_dir.as_ref().join("raw"),
                fs,
            },
        }
    }

    /// Store in `storage` under `<connector>/data/raw`.
    pub fn durable(storage: Arc<dyn Storage>, connector: impl Into<String>) -> Self {
        Self {
            backend: Backend::Durable {
                storage,
                connector: connector.into(),
            },
        }
    }

    /// Durable storage in cloud mode when `RUNDAG_STORAGE_DIR` is set,
    /// otherwise `DATA_DIR`.
    pub fn from_env(env: &EnvConfig) -> Self {
        match (&env.storage_dir, env.mode.is_cloud()) {
            (Some(dir), true) => Self::durable(
                Arc::new(DirectoryStorage::new(dir)),
                env.connector_name_or_default(),
            ),
            (None, true) => {
                warn!("cloud mode without a storage dir; raw assets stay local");
                Self::new(&env.data_dir, Arc::new(RealFileSystem))
            }
            (_, false) => Self::new(&env.data_dir, Arc::new(RealFileSystem)),
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self.backend, Backend::Durable { .. })
    }

    /// Where `asset_id.ext` lives: a local path or a storage key.
    pub fn location_of(&self, asset_id: &str, ext: &str) -> String {
        match &self.backend {
            Backend::Local { root, .. } => {
                root.join(format!("{asset_id}.{ext}")).display().to_string()
            }
            Backend::Durable { connector, .. } => {
                format!("{connector}/data/raw/{asset_id}.{ext}")
            }
        }
    }

    fn put(&self, asset_id: &str, ext: &str, content: &[u8]) -> Result<String> {
        let location = self.location_of(asset_id, ext);
        match &self.backend {
            Backend::Local { fs, .. } => {
                fs.write(Path::new(&location), content)?;
                Ok(location)
            }
            Backend::Durable { storage, .. } => storage.put_bytes(&location, content),
        }
    }

    fn get(&self, asset_id: &str, ext: &str) -> Result<Vec<u8>> {
        let location = self.location_of(asset_id, ext);
        match &self.backend {
            Backend::Local { fs, .. } => {
                let path = Path::new(&location);
                if !fs.exists(path) {
                    return Err(anyhow!("raw asset '{asset_id}.{ext}' not found"));
                }
                fs.read(path)
            }
            Backend::Durable { storage, .. } => storage
                .get_bytes(&location)
                .with_context(|| format!("raw asset '{asset_id}.{ext}' not found")),
        }
    }

    /// Save raw bytes. Returns where they were written.
    pub fn save_raw_file(&self, asset_id: &str, ext: &str, content: &[u8]) -> Result<String> {
        let location = self.put(asset_id, ext, content)?;
        track_write(asset_id, None);
        debug!(asset = %asset_id, location = %location, "saved raw file");
        Ok(location)
    }

    pub fn load_raw_file(&self, asset_id: &str, ext: &str) -> Result<Vec<u8>> {
        let data = self.get(asset_id, ext)?;
        track_read(asset_id);
        Ok(data)
    }

    /// Save `value` as pretty JSON. Top-level arrays count as rows written.
    pub fn save_raw_json<T: Serialize>(&self, asset_id: &str, value: &T) -> Result<String> {
        let json = serde_json::to_value(value)
            .with_context(|| format!("serializing raw asset '{asset_id}'"))?;
        let rows = json.as_array().map(|rows| rows.len() as u64);
        let bytes = serde_json::to_vec_pretty(&json)?;

        let location = self.put(asset_id, "json", &bytes)?;
        track_write(asset_id, rows);
        debug!(asset = %asset_id, rows = ?rows, location = %location, "saved raw json");
        Ok(location)
    }

    pub fn load_raw_json<T: DeserializeOwned>(&self, asset_id: &str) -> Result<T> {
        let bytes = self.load_raw_file(asset_id, "json")?;
        serde_json::from_slice(&bytes).with_context(|| format!("parsing raw asset '{asset_id}'"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::track::TrackingScope;

    fn store() -> RawStore {
        RawStore::new("/data", Arc::new(MockFileSystem::new()))
    }

    #[test]
    fn saves_and_loads_are_tracked() {
        let store = store();
        let scope = TrackingScope::bind();

        store
            .save_raw_json("wdi", &json!([{"country": "NO"}, {"country": "SE"}]))
            .unwrap();
        let rows: Vec<serde_json::Value> = store.load_raw_json("wdi").unwrap();
        store.save_raw_file("notes", "txt", b"hello").unwrap();

        let io = scope.finish();
        assert_eq!(rows.len(), 2);
        assert_eq!(io.reads, vec!["wdi"]);
        assert_eq!(io.writes, vec!["wdi", "notes"]);
        assert_eq!(io.rows_written, 2);
    }

    #[test]
    fn missing_asset_is_an_error() {
        let err = store().load_raw_file("nope", "csv").unwrap_err();
        assert!(err.to_string().contains("nope.csv"));
    }

    #[test]
    fn local_layout() {
        assert_eq!(store().location_of("wdi", "csv"), "/data/raw/wdi.csv");
        assert!(!store().is_durable());
    }

    #[test]
    fn durable_store_uses_connector_keys() {
        let fs = Arc::new(MockFileSystem::new());
        let storage = Arc::new(DirectoryStorage::with_fs("/bucket", fs.clone()));
        let store = RawStore::durable(storage, "wdi");
        let scope = TrackingScope::bind();

        let location = store.save_raw_json("obs", &json!([1, 2, 3])).unwrap();
        let back: Vec<u32> = store.load_raw_json("obs").unwrap();

        let io = scope.finish();
        assert_eq!(location, "/bucket/wdi/data/raw/obs.json");
        assert!(fs.exists(Path::new("/bucket/wdi/data/raw/obs.json")));
        assert_eq!(back, vec![1, 2, 3]);
        assert_eq!(io.reads, vec!["obs"]);
        assert_eq!(io.rows_written, 3);

        let err = store.load_raw_file("missing", "csv").unwrap_err();
        assert!(format!("{err:#}").contains("missing.csv"));
    }

    #[test]
    fn from_env_picks_durable_storage_only_in_cloud_mode() {
        let cloud = EnvConfig::from_lookup(|key| match key {
            "CI" => Some("true".to_string()),
            "CONNECTOR_NAME" => Some("wdi".to_string()),
            "RUNDAG_STORAGE_DIR" => Some("/mnt/bucket".to_string()),
            _ => None,
        });
        let store = RawStore::from_env(&cloud);
        assert!(store.is_durable());
        assert_eq!(store.location_of("a", "json"), "wdi/data/raw/a.json");

        let local = EnvConfig::from_lookup(|key| match key {
            "RUNDAG_STORAGE_DIR" => Some("/mnt/bucket".to_string()),
            _ => None,
        });
        assert!(!RawStore::from_env(&local).is_durable());

        let cloud_without_dir = EnvConfig::from_lookup(|key| (key == "CI").then(|| "true".to_string()));
        assert!(!RawStore::from_env(&cloud_without_dir).is_durable());
    }
}
