//! Directory enumeration for upload.
//!
//! Recursively walks a root and returns every regular file with its
//! size. The resulting list is frozen as the run's total; symlinks and
//! special files are skipped.

use std::path::{Path, PathBuf};

/// A file slated for upload. Immutable once enumerated; consumed
/// exactly once by an upload task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Path as enumerated.
    pub path: PathBuf,
    /// Size in bytes at enumeration time.
    pub size: u64,
}

impl FileHandle {
    /// File name component, lossily decoded for display.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned())
    }
}

/// Scans `root` recursively and returns every regular file under it.
pub fn scan_files(root: &Path) -> Result<Vec<FileHandle>, std::io::Error> {
    let mut files = Vec::new();
    walk_dir(root, &mut files)?;
    Ok(files)
}

fn walk_dir(current: &Path, files: &mut Vec<FileHandle>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let path = entry.path();
        // DirEntry::metadata does not traverse symlinks, so links are
        // neither followed nor uploaded.
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(&path, files)?;
        } else if metadata.is_file() {
            files.push(FileHandle {
                path,
                size: metadata.len(),
            });
        }
    }
    Ok(())
}
