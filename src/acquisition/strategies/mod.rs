// Acquisition strategies
//
// Each strategy owns its precondition and one attempt. Strategies never
// validate their own output and never touch files outside the request's
// workspace; the chain does both.

pub mod alternate;
pub mod cli;
pub mod direct_http;
pub mod library;
pub mod python;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::errors::StrategyFailure;
use super::models::{AcquisitionRequest, StrategyKind};

pub use alternate::AlternateLibraryExtractor;
pub use cli::CliExtractor;
pub use direct_http::DirectHttpFallback;
pub use library::LibraryExtractor;
pub use python::PythonHost;

/// Candidate artifact path, or the reason there is none
pub type AcquisitionOutcome = Result<PathBuf, StrategyFailure>;

#[async_trait]
pub trait AcquisitionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Name used in logs and failure records
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// `Err(reason)` when the strategy cannot run for this request
    async fn check_precondition(&self, request: &AcquisitionRequest) -> Result<(), String>;

    /// Try to produce an audio file inside `request.workspace`
    async fn attempt(
        &self,
        request: &AcquisitionRequest,
        cancel: &CancellationToken,
    ) -> AcquisitionOutcome;
}

const AUDIO_EXTENSIONS: [&str; 9] = [
    "mp3", "m4a", "webm", "opus", "ogg", "wav", "aac", "flac", "mp4",
];

// Leftovers from interrupted downloads
const PARTIAL_EXTENSIONS: [&str; 4] = ["part", "ytdl", "tmp", "temp"];

/// Largest finished file in `dir`, preferring known audio extensions
pub async fn find_audio_artifact(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut best_audio: Option<(u64, PathBuf)> = None;
    let mut best_other: Option<(u64, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        let path = entry.path();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if PARTIAL_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }

        let slot = if AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            &mut best_audio
        } else {
            &mut best_other
        };
        if slot.as_ref().map_or(true, |(size, _)| metadata.len() > *size) {
            *slot = Some((metadata.len(), path));
        }
    }

    Ok(best_audio.or(best_other).map(|(_, path)| path))
}
