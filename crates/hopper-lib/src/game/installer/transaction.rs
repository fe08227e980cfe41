use crate::error::{InstallError, InstallResult};
use anyhow::Context;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Per-run scratch directory under `<data_dir>/tmp`. Removed when the run
/// reaches a terminal state, whatever that state is.
#[derive(Debug)]
pub struct ScratchSpace {
    run_id: Uuid,
    dir: PathBuf,
    removed: bool,
}

impl ScratchSpace {
    pub fn create(scratch_root: &Path) -> InstallResult<Self> {
        let run_id = Uuid::new_v4();
        let dir = scratch_root.join(format!("install-{}", run_id));
        fs::create_dir_all(&dir)
            .with_context(|| format!("Create scratch dir {:?}", dir))?;
        log::debug!("[txn:{}] scratch at {:?}", run_id, dir);
        Ok(Self {
            run_id,
            dir,
            removed: false,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// A named directory inside the scratch space, created on demand.
    pub fn subdir(&self, name: &str) -> InstallResult<PathBuf> {
        let dir = self.dir.join(name);
        fs::create_dir_all(&dir).with_context(|| format!("Create scratch subdir {:?}", dir))?;
        Ok(dir)
    }

    /// Remove the scratch directory. Safe to call more than once.
    pub fn cleanup(&mut self) -> InstallResult<()> {
        if self.removed {
            return Ok(());
        }
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)
                .with_context(|| format!("Remove scratch dir {:?}", self.dir))?;
        }
        self.removed = true;
        log::debug!("[txn:{}] scratch removed", self.run_id);
        Ok(())
    }
}

impl Drop for ScratchSpace {
    fn drop(&mut self) {
        if !self.removed && self.dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                log::warn!("[txn:{}] failed to remove scratch {:?}: {}", self.run_id, self.dir, e);
            }
        }
    }
}

/// Write `bytes` to a temp file next to `path`, then rename it into place.
/// Readers see either the old file or the complete new one.
pub fn write_atomic_sync(path: &Path, bytes: &[u8]) -> InstallResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| InstallError::config(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent).with_context(|| format!("Create dir {:?}", parent))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("Create temp file in {:?}", parent))?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| InstallError::Io(e.error))?;
    Ok(())
}

pub async fn write_atomic(path: &Path, bytes: &[u8]) -> InstallResult<()> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || write_atomic_sync(&path, &bytes))
        .await
        .map_err(|e| InstallError::Other(e.into()))?
}

pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> InstallResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scratch_is_removed_once() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchSpace::create(root.path()).unwrap();
        let nested = scratch.subdir("installer").unwrap();
        fs::write(nested.join("install_profile.json"), b"{}").unwrap();
        assert!(scratch
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("install-"));

        scratch.cleanup().unwrap();
        assert!(!scratch.path().exists());
        scratch.cleanup().unwrap();
    }

    #[test]
    fn dropping_scratch_removes_it() {
        let root = tempfile::tempdir().unwrap();
        let dir = {
            let scratch = ScratchSpace::create(root.path()).unwrap();
            scratch.path().to_path_buf()
        };
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn atomic_write_replaces_whole_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("instance.json");
        write_atomic(&target, b"first").await.unwrap();
        write_atomic(&target, b"second").await.unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");

        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "instance.json")
            .collect();
        assert!(leftovers.is_empty());
    }
}
