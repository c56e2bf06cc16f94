// Speech-to-text engines
//
// The engine is a black box behind `TranscriptionEngine`. The HTTP layer
// holds one engine instance and bounds how many transcriptions run at once.

pub mod whisper;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::acquisition::RunError;

pub use whisper::WhisperCliEngine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Seconds from the start of the audio
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub language: Option<String>,
    pub segments: Vec<Segment>,
}

impl Transcript {
    /// End of the last segment, in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }
}

#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("transcription engine unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("{program} exited with code {code}: {stderr}")]
    Failed {
        program: String,
        code: String,
        stderr: String,
    },

    #[error("engine produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("cannot parse engine output: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("i/o error during transcription: {0}")]
    Io(#[from] io::Error),
}

#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Model identifier reported by `/health`
    fn model_name(&self) -> &str;

    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscriptionError>;
}
