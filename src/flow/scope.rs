//! Directory that lives exactly as long as its guard.

use std::path::{Path, PathBuf};

use crate::error::FlowError;

/// Creates a directory and removes it again when dropped, whichever way the
/// owning scope is left.
#[derive(Debug)]
pub struct ScopedDir {
    path: PathBuf,
}

impl ScopedDir {
    /// Create `path` (and missing parents), handing it to `owner` as
    /// `(uid, gid)` when given.
    pub async fn create(
        path: impl Into<PathBuf>,
        owner: Option<(u32, u32)>,
    ) -> Result<Self, FlowError> {
        let path = path.into();
        let io_err = |source| FlowError::ScopedDir {
            path: path.display().to_string(),
            source,
        };

        tokio::fs::create_dir_all(&path).await.map_err(io_err)?;
        // From here on the guard owns the directory, even if chown fails.
        let dir = Self { path: path.clone() };
        if let Some((uid, gid)) = owner {
            let target = path.clone();
            tokio::task::spawn_blocking(move || {
                std::os::unix::fs::chown(&target, Some(uid), Some(gid))
            })
            .await
            .map_err(std::io::Error::other)
            .and_then(|res| res)
            .map_err(io_err)?;
        }
        Ok(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedDir {
    fn drop(&mut self) {
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Scoped directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scoped directory")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("home/alice/rabbithole");
        {
            let scoped = ScopedDir::create(&path, None).await.unwrap();
            assert!(scoped.path().is_dir());
            std::fs::write(scoped.path().join("carrot.txt"), "found it").unwrap();
        }
        assert!(!path.exists());
        assert!(dir.path().join("home/alice").exists());
    }

    #[tokio::test]
    async fn removed_on_early_return() {
        async fn fails_inside(path: &Path) -> Result<(), String> {
            let _scoped = ScopedDir::create(path, None)
                .await
                .map_err(|e| e.to_string())?;
            Err("shell crashed".to_string())
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rabbithole");
        assert!(fails_inside(&path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn removed_on_panic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rabbithole");
        let scoped = ScopedDir::create(&path, None).await.unwrap();
        let result = std::panic::catch_unwind(move || {
            let _scoped = scoped;
            panic!("subshell blew up");
        });
        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn chown_to_current_owner() {
        use std::os::unix::fs::MetadataExt;

        let dir = TempDir::new().unwrap();
        let meta = std::fs::metadata(dir.path()).unwrap();
        let path = dir.path().join("rabbithole");
        let scoped = ScopedDir::create(&path, Some((meta.uid(), meta.gid())))
            .await
            .unwrap();
        assert_eq!(std::fs::metadata(scoped.path()).unwrap().uid(), meta.uid());
    }

    #[tokio::test]
    async fn already_removed_is_fine() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rabbithole");
        let scoped = ScopedDir::create(&path, None).await.unwrap();
        std::fs::remove_dir_all(&path).unwrap();
        drop(scoped);
        assert!(!path.exists());
    }
}
