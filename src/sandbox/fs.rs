//! Read-only filesystem primitives. Not subject to the safety classifier.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SandboxError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::NotFound {
            SandboxError::NotFound(path.to_path_buf())
        } else {
            SandboxError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Reads a file as text; invalid UTF-8 is replaced, not rejected.
pub(super) async fn read_file(path: &Path) -> Result<String, SandboxError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| SandboxError::from_io(path, e))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub(super) async fn list_directory(path: &Path) -> Result<BTreeSet<String>, SandboxError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| SandboxError::from_io(path, e))?;
    if !metadata.is_dir() {
        return Err(SandboxError::NotADirectory(path.to_path_buf()));
    }

    let mut entries = tokio::fs::read_dir(path)
        .await
        .map_err(|e| SandboxError::from_io(path, e))?;
    let mut names = BTreeSet::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| SandboxError::from_io(path, e))?
    {
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}
