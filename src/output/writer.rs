//! Atomic file placement
//!
//! Files are written to a temporary sibling first and renamed into place, so a
//! reader never observes a half-written document. A replaced file is kept as a
//! backup until the caller confirms the surrounding transaction.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A file staged next to its final location
#[derive(Debug)]
pub struct StagedFile {
    target: PathBuf,
    temp: PathBuf,
    backup: Option<PathBuf>,
    published: bool,
}

impl StagedFile {
    /// Writes `bytes` to a temporary file beside `target`
    ///
    /// Missing parent directories are created.
    pub fn stage(target: &Path, bytes: &[u8]) -> io::Result<Self> {
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let temp = sibling(target, "tmp");
        fill_new(&temp, |file| {
            file.write_all(bytes)?;
            file.sync_all()
        })?;

        Ok(Self {
            target: target.to_path_buf(),
            temp,
            backup: None,
            published: false,
        })
    }

    /// Moves the staged file into place, keeping any previous file as a backup
    pub fn publish(&mut self) -> io::Result<()> {
        if self.target.exists() {
            let backup = sibling(&self.target, "bak");
            fs::rename(&self.target, &backup)?;
            self.backup = Some(backup);
        }

        if let Err(e) = fs::rename(&self.temp, &self.target) {
            if let Some(backup) = self.backup.take() {
                let _ = fs::rename(&backup, &self.target);
            }
            return Err(e);
        }

        self.published = true;
        Ok(())
    }

    /// Confirms the write and drops the backup
    pub fn finish(self) {
        if let Some(backup) = &self.backup {
            if let Err(e) = fs::remove_file(backup) {
                tracing::warn!("Failed to remove backup {}: {}", backup.display(), e);
            }
        }
    }

    /// Undoes the write, restoring the previous file if there was one
    pub fn rollback(self) {
        if !self.published {
            let _ = fs::remove_file(&self.temp);
            return;
        }

        let restored = match &self.backup {
            Some(backup) => fs::rename(backup, &self.target),
            None => fs::remove_file(&self.target),
        };
        if let Err(e) = restored {
            tracing::error!("Failed to roll back {}: {}", self.target.display(), e);
        }
    }
}

/// Writes a whole file atomically
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut staged = StagedFile::stage(target, bytes)?;
    match staged.publish() {
        Ok(()) => {
            staged.finish();
            Ok(())
        }
        Err(e) => {
            staged.rollback();
            Err(e)
        }
    }
}

/// Verifies the output root exists (creating it) and accepts writes
pub fn check_writable(root: &Path) -> io::Result<()> {
    fs::create_dir_all(root)?;
    let marker = root.join(format!(".sitedown-write-check-{}", uuid::Uuid::new_v4().simple()));
    File::create(&marker)?.write_all(b"ok")?;
    fs::remove_file(&marker)
}

/// Creates `path` and fills it, removing the file again if filling fails
fn fill_new<F>(path: &Path, fill: F) -> io::Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut file = File::create(path)?;
    if let Err(e) = fill(&mut file) {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

fn sibling(target: &Path, kind: &str) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(
        ".{}.sitedown-{}-{}",
        name,
        kind,
        uuid::Uuid::new_v4().simple()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_publish_creates_file_and_dirs() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("guide/setup.md");

        let mut staged = StagedFile::stage(&target, b"# Setup\n").unwrap();
        assert!(!target.exists());
        staged.publish().unwrap();
        staged.finish();

        assert_eq!(fs::read_to_string(&target).unwrap(), "# Setup\n");
        assert_eq!(fs::read_dir(dir.path().join("guide")).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let temp = sibling(&dir.path().join("page.md"), "tmp");

        let result = fill_new(&temp, |file| {
            file.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        });

        assert_eq!(result.unwrap_err().to_string(), "disk full");
        assert!(!temp.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rollback_restores_previous_content() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("page.md");
        fs::write(&target, "old").unwrap();

        let mut staged = StagedFile::stage(&target, b"new").unwrap();
        staged.publish().unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");

        staged.rollback();
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_rollback_before_publish_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("page.md");

        let staged = StagedFile::stage(&target, b"new").unwrap();
        staged.rollback();

        assert!(!target.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("SUMMARY.md");
        write_atomic(&target, b"one").unwrap();
        write_atomic(&target, b"two").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "two");
    }

    #[test]
    fn test_check_writable() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("export");
        check_writable(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }
}
