//! Request-scoped storage for rendered artifacts.

use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::fs;
use tracing::warn;
use uuid::Uuid;

const ARTIFACT_EXTENSION: &str = "pdf";

/// Path of one rendered artifact. Unique per allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactHandle {
    path: PathBuf,
}

impl ArtifactHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Filesystem-backed artifact directory.
///
/// Paths are made unique with a random v4 UUID per allocation, so concurrent
/// requests never share a file and no locking is needed.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if missing. A recursive create already
    /// treats an existing directory, including one made by a racing request,
    /// as success; every other failure is returned.
    pub async fn ensure_directory(&self) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        builder.create(&self.root).await
    }

    pub fn allocate(&self) -> ArtifactHandle {
        let name = format!("{}.{ARTIFACT_EXTENSION}", Uuid::new_v4());
        ArtifactHandle {
            path: self.root.join(name),
        }
    }

    pub async fn read(&self, artifact: &ArtifactHandle) -> io::Result<Vec<u8>> {
        fs::read(&artifact.path).await
    }

    /// Remove an artifact. A file that is already gone is not an error.
    pub async fn remove(&self, artifact: &ArtifactHandle) -> io::Result<()> {
        match fs::remove_file(&artifact.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Best-effort [`remove`](Self::remove); failures are logged and dropped.
    pub async fn discard(&self, artifact: &ArtifactHandle) {
        if let Err(err) = self.remove(artifact).await {
            warn!(
                path = %artifact.path.display(),
                error = %err,
                "failed to remove rendered artifact"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[tokio::test]
    async fn ensure_directory_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path().join("nested").join("artifacts"));

        store.ensure_directory().await.expect("first create");
        store.ensure_directory().await.expect("second create");
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn concurrent_ensure_directory_calls_all_succeed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path().join("racing"));

        let results = futures::future::join_all((0..16).map(|_| store.ensure_directory())).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(store.root().is_dir());
    }

    #[tokio::test]
    async fn ensure_directory_propagates_other_failures() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").expect("write blocker");

        let store = ArtifactStore::new(&blocker);
        assert!(store.ensure_directory().await.is_err());
    }

    #[test]
    fn allocations_are_unique_and_live_under_the_root() {
        let store = ArtifactStore::new("/tmp/pdf-renderer");
        let paths: HashSet<_> = (0..256).map(|_| store.allocate()).collect();
        assert_eq!(paths.len(), 256);
        assert!(paths.iter().all(|handle| {
            handle.path().starts_with("/tmp/pdf-renderer")
                && handle.path().extension().is_some_and(|ext| ext == "pdf")
        }));
    }

    #[tokio::test]
    async fn read_and_remove_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(temp.path());
        let artifact = store.allocate();
        fs::write(artifact.path(), b"%PDF-1.7").await.expect("write");

        assert_eq!(store.read(&artifact).await.expect("read"), b"%PDF-1.7");
        store.remove(&artifact).await.expect("remove");
        store.remove(&artifact).await.expect("missing file is fine");
        assert!(store.read(&artifact).await.is_err());
    }
}
