// Per-request workspace directories
//
// Each acquisition request owns `<root>/<uuid>/`. Strategies write only
// inside it, and it is removed before the chain returns. Dropping a
// `Workspace` without releasing it removes the directory synchronously.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

/// Allocates isolated workspaces under a shared root
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Workspaces under the system temp directory
    pub fn in_temp_dir() -> Self {
        Self::new(std::env::temp_dir().join("tubescribe"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a fresh, uniquely named workspace directory
    pub async fn allocate(&self) -> io::Result<Workspace> {
        tokio::fs::create_dir_all(&self.root).await?;

        let id = Uuid::new_v4().simple().to_string();
        let path = self.root.join(&id);
        tokio::fs::create_dir(&path).await?;
        debug!(workspace = %path.display(), "allocated workspace");

        Ok(Workspace {
            id,
            root: self.root.clone(),
            path,
            released: false,
        })
    }
}

/// One request's private directory
#[derive(Debug)]
pub struct Workspace {
    id: String,
    root: PathBuf,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path next to the workspace (same filesystem, outside the directory)
    pub fn sibling_path(&self, extension: &str) -> PathBuf {
        if extension.is_empty() {
            self.root.join(&self.id)
        } else {
            self.root.join(format!("{}.{}", self.id, extension))
        }
    }

    /// Remove everything inside the workspace, keeping the directory.
    /// Returns the number of entries removed.
    pub async fn clear(&self) -> io::Result<usize> {
        let mut removed = 0;
        let mut entries = match tokio::fs::read_dir(&self.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.path).await?;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    /// Move `candidate` to `destination`, falling back to copy + delete when
    /// a rename is not possible (different filesystem).
    pub async fn relocate(&self, candidate: &Path, destination: &Path) -> io::Result<()> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        match tokio::fs::rename(candidate, destination).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(error = %e, "rename failed, copying artifact instead");
                copy_into_place(candidate, destination).await?;
                // the original goes away with the workspace
                if let Err(e) = tokio::fs::remove_file(candidate).await {
                    warn!(error = %e, "failed to remove relocated original");
                }
                Ok(())
            }
        }
    }

    /// Remove the workspace directory. Errors are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(workspace = %self.path.display(), "released workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                workspace = %self.path.display(),
                error = %e,
                "failed to remove workspace"
            ),
        }
    }
}

/// Copy through a hidden staging file next to `destination`, so a failed
/// copy never leaves a truncated artifact at the destination
async fn copy_into_place(candidate: &Path, destination: &Path) -> io::Result<()> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let staging = tempfile::Builder::new()
        .prefix(".tubescribe-")
        .suffix(".part")
        .tempfile_in(parent)?
        .into_temp_path();

    // staging is deleted on drop if anything below fails
    tokio::fs::copy(candidate, &staging).await?;
    staging.persist(destination).map_err(|e| e.error)
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(
                    workspace = %self.path.display(),
                    error = %e,
                    "failed to remove workspace on drop"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocates_unique_directories() {
        let root = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(root.path().join("work"));

        let a = manager.allocate().await.unwrap();
        let b = manager.allocate().await.unwrap();

        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(a.path().starts_with(manager.root()));
    }

    #[tokio::test]
    async fn clear_empties_but_keeps_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path()).allocate().await.unwrap();

        std::fs::write(ws.path().join("audio.part"), b"x").unwrap();
        std::fs::create_dir(ws.path().join("frag")).unwrap();
        std::fs::write(ws.path().join("frag").join("1"), b"x").unwrap();

        assert_eq!(ws.clear().await.unwrap(), 2);
        assert!(ws.path().is_dir());
        assert_eq!(std::fs::read_dir(ws.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn release_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path()).allocate().await.unwrap();
        let path = ws.path().to_path_buf();
        std::fs::write(path.join("audio.mp3"), b"x").unwrap();

        ws.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path()).allocate().await.unwrap();
        let path = ws.path().to_path_buf();

        drop(ws);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn relocate_moves_file_out_of_workspace() {
        let root = tempfile::tempdir().unwrap();
        let ws = WorkspaceManager::new(root.path()).allocate().await.unwrap();
        let candidate = ws.path().join("audio.mp3");
        std::fs::write(&candidate, vec![7u8; 1500]).unwrap();

        let destination = ws.sibling_path("mp3");
        ws.relocate(&candidate, &destination).await.unwrap();
        ws.release().await;

        assert!(!candidate.exists());
        assert_eq!(std::fs::metadata(&destination).unwrap().len(), 1500);
    }

    #[tokio::test]
    async fn copy_into_place_leaves_only_the_destination() {
        let src = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let candidate = src.path().join("audio.mp3");
        std::fs::write(&candidate, vec![3u8; 2048]).unwrap();
        let destination = dest_dir.path().join("out.mp3");

        copy_into_place(&candidate, &destination).await.unwrap();

        assert_eq!(std::fs::metadata(&destination).unwrap().len(), 2048);
        let names: Vec<_> = std::fs::read_dir(dest_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.mp3")]);
    }

    #[tokio::test]
    async fn failed_copy_leaves_nothing_at_destination() {
        let src = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();
        let destination = dest_dir.path().join("out.mp3");

        let err = copy_into_place(&src.path().join("missing.mp3"), &destination)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert!(!destination.exists());
        assert_eq!(std::fs::read_dir(dest_dir.path()).unwrap().count(), 0);
    }
}
