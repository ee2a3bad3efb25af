// src/supervisor/upload.rs

//! Copy the log directory to durable storage.

use std::path::Path;

use tracing::{info, warn};

use crate::fs::{walk_files, FileSystem};
use crate::storage::Storage;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
}

/// Storage key for a log file: `<connector>/logs/<run_id>/<relative path>`.
pub fn log_key(connector: &str, run_id: &str, relative: &Path) -> String {
    let rel: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{connector}/logs/{run_id}/{}", rel.join("/"))
}

/// Upload every file under `log_dir`. A file that fails is logged and
/// skipped; the rest are still attempted.
pub fn upload_logs(
    fs: &dyn FileSystem,
    storage: &dyn Storage,
    log_dir: &Path,
    connector: &str,
    run_id: &str,
) -> UploadSummary {
    let mut summary = UploadSummary::default();

    if !fs.is_dir(log_dir) {
        info!(log_dir = %log_dir.display(), "no logs to upload");
        return summary;
    }

    let files = match walk_files(fs, log_dir) {
        Ok(files) => files,
        Err(e) => {
            warn!(log_dir = %log_dir.display(), error = %e, "failed to list log directory");
            return summary;
        }
    };

    info!(files = files.len(), "uploading logs");
    for file in files {
        let Ok(relative) = file.strip_prefix(log_dir) else {
            continue;
        };
        let key = log_key(connector, run_id, relative);

        match storage.upload_file(&file, &key) {
            Ok(location) => {
                info!(key = %key, location = %location, "uploaded log file");
                summary.uploaded.push(key);
            }
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to upload log file");
                summary.failed.push(key);
            }
        }
    }

    summary
}
