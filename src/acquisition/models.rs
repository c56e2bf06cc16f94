// Common data models for the acquisition chain

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempPath;

use super::errors::StrategyFailure;
use super::video_id;

/// The four extraction strategies, in their fixed priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// yt-dlp Python library (fastest and cleanest when it works)
    Library,
    /// yt-dlp binary (broadest option surface, most resilient to anti-bot)
    Cli,
    /// pytube Python library + ffmpeg (independent code path, weaker)
    AlternateLibrary,
    /// Raw HTTP request against a metadata endpoint (best-effort heuristic)
    DirectHttp,
}

impl StrategyKind {
    /// Every strategy, highest priority first
    pub const ORDER: [StrategyKind; 4] = [
        StrategyKind::Library,
        StrategyKind::Cli,
        StrategyKind::AlternateLibrary,
        StrategyKind::DirectHttp,
    ];

    pub fn priority(self) -> u8 {
        match self {
            Self::Library => 0,
            Self::Cli => 1,
            Self::AlternateLibrary => 2,
            Self::DirectHttp => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Library => "yt-dlp-library",
            Self::Cli => "yt-dlp-cli",
            Self::AlternateLibrary => "pytube-library",
            Self::DirectHttp => "direct-http",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input handed to every strategy
#[derive(Debug, Clone)]
pub struct AcquisitionRequest {
    pub source_url: String,
    /// Best-effort platform video ID; strategies needing it check for it
    pub video_id: Option<String>,
    /// Private directory owned by this request
    pub workspace: PathBuf,
}

impl AcquisitionRequest {
    pub fn new(source_url: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        let source_url = source_url.into();
        let video_id = video_id::derive_from_str(&source_url);

        Self {
            source_url,
            video_id,
            workspace: workspace.into(),
        }
    }

    /// yt-dlp style output template inside the workspace
    pub fn output_template(&self) -> PathBuf {
        self.workspace.join("audio.%(ext)s")
    }

    /// Final transcoded file name inside the workspace
    pub fn audio_target(&self, extension: &str) -> PathBuf {
        self.workspace.join(format!("audio.{}", extension))
    }
}

#[derive(Debug)]
enum ArtifactLocation {
    /// Removed when the handle is dropped
    Temporary(TempPath),
    /// Caller-supplied path, never removed by us
    Persistent(PathBuf),
}

/// A validated audio file handed over to the caller
#[derive(Debug)]
pub struct AcquiredAudio {
    location: ArtifactLocation,
    size_bytes: u64,
    strategy: StrategyKind,
    video_id: Option<String>,
    failed_attempts: Vec<StrategyFailure>,
}

impl AcquiredAudio {
    pub(crate) fn temporary(
        path: PathBuf,
        size_bytes: u64,
        strategy: StrategyKind,
        video_id: Option<String>,
        failed_attempts: Vec<StrategyFailure>,
    ) -> Self {
        Self {
            location: ArtifactLocation::Temporary(TempPath::from_path(path)),
            size_bytes,
            strategy,
            video_id,
            failed_attempts,
        }
    }

    pub(crate) fn persistent(
        path: PathBuf,
        size_bytes: u64,
        strategy: StrategyKind,
        video_id: Option<String>,
        failed_attempts: Vec<StrategyFailure>,
    ) -> Self {
        Self {
            location: ArtifactLocation::Persistent(path),
            size_bytes,
            strategy,
            video_id,
            failed_attempts,
        }
    }

    pub fn path(&self) -> &Path {
        match &self.location {
            ArtifactLocation::Temporary(path) => path,
            ArtifactLocation::Persistent(path) => path,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Strategy that produced the artifact
    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    /// Failures recorded before the winning strategy
    pub fn failed_attempts(&self) -> &[StrategyFailure] {
        &self.failed_attempts
    }

    /// Suggested download file name
    pub fn download_name(&self) -> String {
        let extension = self
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3");
        match &self.video_id {
            Some(id) => format!("youtube_audio_{}.{}", id, extension),
            None => format!("youtube_audio.{}", extension),
        }
    }

    /// Stop the artifact from being deleted on drop
    pub fn keep(self) -> io::Result<PathBuf> {
        match self.location {
            ArtifactLocation::Temporary(path) => path.keep().map_err(|e| e.error),
            ArtifactLocation::Persistent(path) => Ok(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matches_priority() {
        let mut kinds = vec![
            StrategyKind::DirectHttp,
            StrategyKind::Library,
            StrategyKind::AlternateLibrary,
            StrategyKind::Cli,
        ];
        kinds.sort_by_key(|k| k.priority());
        assert_eq!(kinds, StrategyKind::ORDER.to_vec());
    }

    #[test]
    fn request_derives_video_id() {
        let request = AcquisitionRequest::new("https://youtu.be/dQw4w9WgXcQ?t=3", "/tmp/ws");
        assert_eq!(request.video_id.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(request.output_template(), PathBuf::from("/tmp/ws/audio.%(ext)s"));
        assert_eq!(request.audio_target("mp3"), PathBuf::from("/tmp/ws/audio.mp3"));
    }

    #[test]
    fn temporary_artifact_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.mp3");
        std::fs::write(&path, vec![1u8; 2048]).unwrap();

        let audio = AcquiredAudio::temporary(
            path.clone(),
            2048,
            StrategyKind::Cli,
            Some("abc".to_string()),
            Vec::new(),
        );
        assert_eq!(audio.download_name(), "youtube_audio_abc.mp3");
        drop(audio);
        assert!(!path.exists());
    }

    #[test]
    fn kept_artifact_survives_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.mp3");
        std::fs::write(&path, vec![1u8; 2048]).unwrap();

        let audio =
            AcquiredAudio::temporary(path.clone(), 2048, StrategyKind::Cli, None, Vec::new());
        let kept = audio.keep().unwrap();
        assert_eq!(kept, path);
        assert!(path.exists());
    }
}
