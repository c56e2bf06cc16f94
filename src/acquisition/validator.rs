// Result validator
//
// A coarse existence-and-size check. It does not look inside the file, so an
// HTML error page larger than the threshold still passes. Strategies that
// can produce such content (the direct HTTP fallback) are low confidence.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Artifacts must be strictly larger than this many bytes
pub const DEFAULT_MIN_ARTIFACT_BYTES: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{} does not exist", .0.display())]
    Missing(PathBuf),

    #[error("{} is not a regular file", .0.display())]
    NotAFile(PathBuf),

    #[error("artifact is {size} bytes, expected more than {min}")]
    TooSmall { size: u64, min: u64 },

    #[error("cannot read {}: {message}", .path.display())]
    Unreadable { path: PathBuf, message: String },
}

#[derive(Debug, Clone, Copy)]
pub struct ResultValidator {
    min_bytes: u64,
}

impl Default for ResultValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ARTIFACT_BYTES)
    }
}

impl ResultValidator {
    pub fn new(min_bytes: u64) -> Self {
        Self { min_bytes }
    }

    pub fn min_bytes(&self) -> u64 {
        self.min_bytes
    }

    /// Check the artifact and return its size
    pub async fn inspect(&self, path: &Path) -> Result<u64, ValidationError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ValidationError::Missing(path.to_path_buf()))
            }
            Err(e) => {
                return Err(ValidationError::Unreadable {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };

        if !metadata.is_file() {
            return Err(ValidationError::NotAFile(path.to_path_buf()));
        }

        let size = metadata.len();
        if size <= self.min_bytes {
            return Err(ValidationError::TooSmall {
                size,
                min: self.min_bytes,
            });
        }
        Ok(size)
    }

    pub async fn validate(&self, path: &Path) -> bool {
        self.inspect(path).await.is_ok()
    }
}
