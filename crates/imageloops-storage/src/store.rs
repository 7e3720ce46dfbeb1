use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::sanitize::{path_component, prompt_prefix};

/// Upper bound on `_N` suffixes tried before giving up on a destination.
const MAX_COLLISION_SUFFIX: usize = 1000;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write artifact {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No free file name left for {}", .0.display())]
    Exhausted(PathBuf),

    #[error("Refusing to store empty artifact at {}", .0.display())]
    Empty(PathBuf),
}

/// Durable storage for generated image bytes
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Directory artifacts land in
    fn root(&self) -> &Path;

    /// Derive the destination for an artifact of `prompt` created at `created_at`.
    fn destination_for(&self, prompt: &str, created_at: DateTime<Utc>, extension: &str) -> PathBuf {
        let stem = format!(
            "{}_{}",
            prompt_prefix(prompt),
            created_at.format("%Y%m%d%H%M%S")
        );
        self.root().join(format!("{}.{}", stem, extension))
    }

    /// Write `bytes` at `destination`, never overwriting an existing file.
    ///
    /// Returns the path actually written, which differs from `destination`
    /// when that name was already taken.
    async fn persist(&self, bytes: &[u8], destination: &Path) -> Result<PathBuf, StoreError>;
}

/// Filesystem-backed artifact store
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Store rooted at `{output_root}/{sanitized prompt prefix}`
    pub fn for_prompt(output_root: &Path, prompt: &str) -> Self {
        Self::new(output_root.join(path_component(prompt)))
    }

    /// Create the root directory (and parents) if missing.
    pub async fn ensure_root(&self) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::CreateDir {
                path: self.root.clone(),
                source,
            })
    }

    async fn write_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn persist(&self, bytes: &[u8], destination: &Path) -> Result<PathBuf, StoreError> {
        if bytes.is_empty() {
            return Err(StoreError::Empty(destination.to_path_buf()));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        for attempt in 0..=MAX_COLLISION_SUFFIX {
            let candidate = if attempt == 0 {
                destination.to_path_buf()
            } else {
                with_suffix(destination, attempt)
            };

            match Self::write_new(&candidate, bytes).await {
                Ok(()) => {
                    debug!(path = %candidate.display(), bytes = bytes.len(), "Artifact persisted");
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => {
                    return Err(StoreError::Write {
                        path: candidate,
                        source,
                    })
                }
            }
        }

        Err(StoreError::Exhausted(destination.to_path_buf()))
    }
}

/// `dir/name.ext` -> `dir/name_N.ext`
fn with_suffix(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_destination_uses_prefix_and_timestamp() {
        let store = FsArtifactStore::new(PathBuf::from("/out/run"));
        let at = Utc.with_ymd_and_hms(2024, 2, 18, 13, 55, 43).unwrap();
        let dest = store.destination_for("Heavy rain, low visibility, 40s", at, "png");
        assert_eq!(
            dest,
            PathBuf::from("/out/run/Heavy_rain_low_visibility_40s_20240218135543.png")
        );
    }

    #[test]
    fn test_for_prompt_nests_run_directory() {
        let store = FsArtifactStore::for_prompt(Path::new("/out"), "Sunny, 72°");
        assert_eq!(store.root(), Path::new("/out/Sunny_72"));
    }

    #[test]
    fn test_with_suffix() {
        assert_eq!(
            with_suffix(Path::new("/a/img.png"), 2),
            PathBuf::from("/a/img_2.png")
        );
        assert_eq!(with_suffix(Path::new("/a/img"), 1), PathBuf::from("/a/img_1"));
    }
}
