//! tubescribe - resilient audio acquisition and transcription for
//! video-platform URLs.
//!
//! The core is [`acquisition::StrategyChain`]: an ordered set of extraction
//! strategies tried in sequence until one yields an audio file that passes
//! validation. [`transcription`] turns that file into text and [`service`]
//! exposes both over HTTP.

pub mod acquisition;
pub mod config;
pub mod logging;
pub mod service;
pub mod transcription;

#[cfg(all(test, unix))]
mod testing;

use thiserror::Error;

pub use acquisition::{AcquiredAudio, AcquisitionError, StrategyChain};
pub use transcription::{Transcript, TranscriptionEngine, TranscriptionError};

/// Any failure of the fetch-then-transcribe pipeline
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error(transparent)]
    Transport(#[from] acquisition::transport::TransportError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
