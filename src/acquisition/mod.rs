// Acquisition module - turns a media URL into a local audio artifact
//
// The StrategyChain tries each extraction strategy in a fixed priority order:
// - yt-dlp library (hosted by a Python interpreter)
// - yt-dlp command-line binary
// - pytube library + ffmpeg transcode
// - direct HTTP request against a metadata endpoint (low confidence)
//
// Every request gets its own workspace directory which is removed before the
// chain returns, whatever the outcome.

pub mod chain;
pub mod diagnostics;
pub mod errors;
pub mod models;
pub mod runner;
pub mod settings;
pub mod strategies;
pub mod tools;
pub mod transport;
pub mod validator;
pub mod video_id;
pub mod workspace;

pub use chain::StrategyChain;
pub use diagnostics::{diagnose_error, BlockingReason};
pub use errors::{AcquisitionError, AggregatedFailure, FailureKind, StrategyFailure};
pub use models::{AcquiredAudio, AcquisitionRequest, StrategyKind};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, RunError};
pub use settings::ExtractorSettings;
pub use strategies::{
    AcquisitionOutcome, AcquisitionStrategy, AlternateLibraryExtractor, CliExtractor,
    DirectHttpFallback, LibraryExtractor,
};
pub use transport::TransportConfig;
pub use validator::{ResultValidator, ValidationError, DEFAULT_MIN_ARTIFACT_BYTES};
pub use workspace::{Workspace, WorkspaceManager};
