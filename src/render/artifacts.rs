//! Video artifact handles and the output directory they live in.
//!
//! An artifact is a plain file under the configured output directory. The
//! renderer creates it and the labeling session deletes it once the pair is
//! superseded. Dropping a handle never deletes the file.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// File name prefix for every rendered artifact.
pub const ARTIFACT_PREFIX: &str = "trajectory_";

/// Handle to a rendered video file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoArtifact {
    path: PathBuf,
}

impl VideoArtifact {
    /// Wraps an existing file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Full path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without the directory, as served to clients.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns true if the file is still on disk.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Removes the file. A file that is already gone is only logged.
    pub async fn delete(&self) {
        match fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Deleted video artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Video artifact already deleted")
            }
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to delete video artifact"),
        }
    }
}

/// Directory that holds rendered artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    base_path: PathBuf,
}

impl ArtifactDir {
    /// Creates a handle for the given directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Returns the base directory.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Creates the directory if it does not exist yet.
    pub async fn ensure(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_path).await
    }

    /// Returns a fresh, collision-free artifact path with the given extension.
    pub fn next_path(&self, extension: &str) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let id = Uuid::new_v4().simple();
        self.base_path
            .join(format!("{ARTIFACT_PREFIX}{stamp}_{id}.{extension}"))
    }

    /// Deletes artifacts left over from a previous session.
    ///
    /// Only files carrying the artifact prefix directly inside the directory
    /// are touched. Returns the number of files removed.
    pub async fn purge_stale(&self) -> std::io::Result<usize> {
        if !self.base_path.exists() {
            return Ok(0);
        }

        let stale: Vec<PathBuf> = WalkDir::new(&self.base_path)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(ARTIFACT_PREFIX)
            })
            .map(|entry| entry.into_path())
            .collect();

        for path in &stale {
            fs::remove_file(path).await?;
        }

        if !stale.is_empty() {
            debug!(count = stale.len(), dir = %self.base_path.display(), "Purged stale artifacts");
        }
        Ok(stale.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trajectory_x.webm");
        fs::write(&path, b"video").await.expect("write");

        let artifact = VideoArtifact::new(&path);
        assert!(artifact.exists());
        assert_eq!(artifact.file_name(), "trajectory_x.webm");

        artifact.delete().await;
        assert!(!artifact.exists());
        artifact.delete().await;
    }

    #[tokio::test]
    async fn test_next_path_is_unique() {
        let dir = ArtifactDir::new("/tmp/videos");
        let a = dir.next_path("webm");
        let b = dir.next_path("webm");
        assert_ne!(a, b);
        assert!(a
            .file_name()
            .expect("file name")
            .to_string_lossy()
            .starts_with(ARTIFACT_PREFIX));
        assert_eq!(a.extension().and_then(|e| e.to_str()), Some("webm"));
    }

    #[tokio::test]
    async fn test_purge_only_touches_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let artifacts = ArtifactDir::new(dir.path());
        fs::write(artifacts.next_path("webm"), b"a").await.expect("write");
        fs::write(artifacts.next_path("webm"), b"b").await.expect("write");
        fs::write(dir.path().join("keep.txt"), b"c").await.expect("write");

        assert_eq!(artifacts.purge_stale().await.expect("purge"), 2);
        assert!(dir.path().join("keep.txt").exists());
        assert_eq!(artifacts.purge_stale().await.expect("purge"), 0);
    }

    #[tokio::test]
    async fn test_purge_missing_dir() {
        let artifacts = ArtifactDir::new("/nonexistent/rlduels/videos");
        assert_eq!(artifacts.purge_stale().await.expect("purge"), 0);
    }
}
