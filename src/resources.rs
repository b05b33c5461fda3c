//! Resource store: one documentation file per resource under a root directory.
//!
//! `git` resolves to `<root>/git.md`. The root is never written to.
use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::ResourcesConfig;

#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource directory not found: {}", .0.display())]
    RootMissing(PathBuf),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("invalid resource name: {0:?}")]
    InvalidName(String),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Raw documentation text of one resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub content: String,
}

pub struct ResourceLoader {
    root: PathBuf,
    extension: String,
}

impl ResourceLoader {
    pub fn new(config: &ResourcesConfig) -> Self {
        Self {
            root: config.path.clone(),
            extension: config.extension.trim_start_matches('.').to_string(),
        }
    }

    /// Sorted names of every resource in the store.
    pub async fn list(&self) -> Result<BTreeSet<String>, ResourceError> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| self.root_error(e))?;

        let mut names = BTreeSet::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.root_error(e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file() || t.is_symlink())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.insert(stem.to_string());
            }
        }

        debug!("Found {} resources in {}", names.len(), self.root.display());
        Ok(names)
    }

    pub async fn load(&self, name: &str) -> Result<Resource, ResourceError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Resource {
                name: name.to_string(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if tokio::fs::metadata(&self.root).await.is_err() {
                    Err(ResourceError::RootMissing(self.root.clone()))
                } else {
                    Err(ResourceError::NotFound(name.to_string()))
                }
            }
            Err(source) => Err(ResourceError::Io { path, source }),
        }
    }

    /// Resource names are bare file stems: no separators, no dot-segments.
    fn path_for(&self, name: &str) -> Result<PathBuf, ResourceError> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(ResourceError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.{}", self.extension)))
    }

    fn root_error(&self, e: std::io::Error) -> ResourceError {
        if e.kind() == ErrorKind::NotFound {
            ResourceError::RootMissing(self.root.clone())
        } else {
            ResourceError::Io {
                path: self.root.clone(),
                source: e,
            }
        }
    }
}
