use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::{NamedTempFile, TempDir};
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{
    validate_relative_path, ArtifactFile, ArtifactStore, BuildSnapshot, StorageResult,
};

/// Filesystem-backed artifact store.
///
/// Layout: `<root>/<resource_id>/<build_id>/<file path>`. Every regular file
/// under a build directory is a tracked file of that build.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a new `FsArtifactStore` rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn build_dir(&self, resource_id: &str, build_id: &str) -> StorageResult<PathBuf> {
        validate_relative_path(resource_id)?;
        validate_relative_path(build_id)?;
        Ok(self.root.join(resource_id).join(build_id))
    }
}

fn read_build(dir: &Path, resource_id: &str, build_id: &str) -> StorageResult<BuildSnapshot> {
    if !dir.is_dir() {
        return Err(StorageError::BuildNotFound {
            resource_id: resource_id.to_string(),
            build_id: build_id.to_string(),
        });
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = relative_slash_path(dir, &path)?;
                let bytes = fs::read(&path)?;
                let content = String::from_utf8(bytes).map_err(|_| StorageError::NonUtf8 {
                    path: relative.clone(),
                })?;
                files.push(ArtifactFile::new(relative, content));
            }
        }
    }

    debug!(resource_id, build_id, files = files.len(), "Loaded build snapshot");
    Ok(BuildSnapshot::new(resource_id, build_id, files))
}

fn relative_slash_path(base: &Path, path: &Path) -> StorageResult<String> {
    let relative = path
        .strip_prefix(base)
        .map_err(|_| StorageError::InvalidPath {
            path: path.display().to_string(),
        })?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    Ok(parts.join("/"))
}

fn write_build(build_dir: &Path, files: &[ArtifactFile]) -> StorageResult<()> {
    let resource_dir = build_dir
        .parent()
        .ok_or_else(|| StorageError::InvalidPath {
            path: build_dir.display().to_string(),
        })?;
    fs::create_dir_all(resource_dir)?;

    // Stage the whole build next to its final location, then swap it in.
    let staging = TempDir::new_in(resource_dir)?;
    for file in files {
        let target = staging.path().join(&file.path);
        let parent = target.parent().unwrap_or(staging.path());
        fs::create_dir_all(parent)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(file.content.as_bytes())?;
        tmp.persist(&target).map_err(|e| e.error)?;
    }

    let staged = staging.into_path();
    if build_dir.exists() {
        let retired = TempDir::new_in(resource_dir)?;
        let retired_path = retired.path().join("previous");
        fs::rename(build_dir, &retired_path)?;
        fs::rename(&staged, build_dir)?;
        // `retired` removes the previous snapshot on drop.
    } else {
        fs::rename(&staged, build_dir)?;
    }
    Ok(())
}

fn join_error(err: tokio::task::JoinError) -> StorageError {
    StorageError::Io(io::Error::other(err))
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn load_build(&self, resource_id: &str, build_id: &str) -> StorageResult<BuildSnapshot> {
        let dir = self.build_dir(resource_id, build_id)?;
        let resource_id = resource_id.to_string();
        let build_id = build_id.to_string();
        tokio::task::spawn_blocking(move || read_build(&dir, &resource_id, &build_id))
            .await
            .map_err(join_error)?
    }

    async fn contains_build(&self, resource_id: &str, build_id: &str) -> StorageResult<bool> {
        let dir = self.build_dir(resource_id, build_id)?;
        Ok(tokio::fs::metadata(&dir)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn put_build(
        &self,
        resource_id: &str,
        build_id: &str,
        files: Vec<ArtifactFile>,
    ) -> StorageResult<()> {
        for file in &files {
            validate_relative_path(&file.path)?;
        }
        let dir = self.build_dir(resource_id, build_id)?;
        tokio::task::spawn_blocking(move || write_build(&dir, &files))
            .await
            .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> (tempfile::TempDir, FsArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_load_roundtrip() {
        let (_dir, store) = make_store();
        store
            .put_build(
                "svc",
                "b1",
                vec![
                    ArtifactFile::new("src/main.ts", "console.log(1)"),
                    ArtifactFile::new("package.json", "{}"),
                ],
            )
            .await
            .unwrap();

        let snap = store.load_build("svc", "b1").await.unwrap();
        let paths: Vec<_> = snap.files().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["package.json", "src/main.ts"]);
        assert_eq!(snap.get("src/main.ts").unwrap().content, "console.log(1)");
    }

    #[tokio::test]
    async fn put_replaces_previous_snapshot() {
        let (_dir, store) = make_store();
        store
            .put_build("svc", "b1", vec![ArtifactFile::new("old.txt", "x")])
            .await
            .unwrap();
        store
            .put_build("svc", "b1", vec![ArtifactFile::new("new.txt", "y")])
            .await
            .unwrap();

        let snap = store.load_build("svc", "b1").await.unwrap();
        assert!(snap.get("old.txt").is_none());
        assert_eq!(snap.get("new.txt").unwrap().content, "y");
    }

    #[tokio::test]
    async fn missing_build_is_not_found() {
        let (_dir, store) = make_store();
        let err = store.load_build("svc", "nope").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.contains_build("svc", "nope").await.unwrap());
    }

    #[tokio::test]
    async fn rejects_escaping_identifiers() {
        let (_dir, store) = make_store();
        let err = store.load_build("../svc", "b1").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));

        let err = store
            .put_build("svc", "b1", vec![ArtifactFile::new("../x", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn non_utf8_file_is_reported() {
        let (dir, store) = make_store();
        let build = dir.path().join("svc").join("b1");
        fs::create_dir_all(&build).unwrap();
        fs::write(build.join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let err = store.load_build("svc", "b1").await.unwrap_err();
        assert!(matches!(err, StorageError::NonUtf8 { .. }));
    }
}
