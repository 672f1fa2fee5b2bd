//! File-backed status store.
//!
//! The status file is replaced atomically: the new content is written to a
//! sibling temp file, synced, then renamed over the target, so a reader never
//! sees a half-written file after an abrupt power loss.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::StatusError;
use crate::status::state::FlowStatus;

/// Owner read/write only.
const STATUS_FILE_MODE: u32 = 0o600;

/// Reads and writes the onboarding status file.
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted status.
    ///
    /// A missing, unreadable or corrupt file yields a fresh status at the
    /// first stage instead of an error.
    pub async fn load(&self) -> FlowStatus {
        let content = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No status file, starting fresh");
                return FlowStatus::default();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Unreadable status file, starting fresh");
                return FlowStatus::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Corrupt status file, starting fresh");
                FlowStatus::default()
            }
        }
    }

    /// Persist `status`, stamping its `updated_at`.
    pub async fn save(&self, status: &mut FlowStatus) -> Result<(), StatusError> {
        status.updated_at = Some(Utc::now());
        let content = serde_json::to_string_pretty(status)?;
        self.atomic_write(&content).await?;
        tracing::debug!(path = %self.path.display(), stage = %status.stage(), "Status saved");
        Ok(())
    }

    /// Remove the status file. A missing file is not an error.
    pub async fn clear(&self) -> Result<(), StatusError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(self.io_error(&self.path, source)),
        }
    }

    async fn atomic_write(&self, content: &str) -> Result<(), StatusError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_error(dir, e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(STATUS_FILE_MODE)
            .open(&tmp_path)
            .await
            .map_err(|e| self.io_error(&tmp_path, e))?;
        // A temp file left by an earlier crash keeps its old mode.
        fs::set_permissions(&tmp_path, Permissions::from_mode(STATUS_FILE_MODE))
            .await
            .map_err(|e| self.io_error(&tmp_path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| self.io_error(&tmp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| self.io_error(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.io_error(&self.path, e))?;
        // The rename is only durable once the directory entry is.
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        sync_dir(dir).await.map_err(|e| self.io_error(dir, e))
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StatusError {
        StatusError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}
