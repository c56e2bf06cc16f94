// Command-line / environment configuration shared by the binaries

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::acquisition::runner::CommandRunner;
use crate::acquisition::settings::DEFAULT_METADATA_ENDPOINT;
use crate::acquisition::transport::TransportError;
use crate::acquisition::{
    ExtractorSettings, ResultValidator, StrategyChain, TransportConfig, WorkspaceManager,
    DEFAULT_MIN_ARTIFACT_BYTES,
};
use crate::transcription::whisper::{DEFAULT_MODEL, DEFAULT_TRANSCRIBE_TIMEOUT};
use crate::transcription::{TranscriptionError, WhisperCliEngine};

/// Acquisition chain options. Network behaviour (TLS, proxy, IPv4) comes
/// from the environment, see [`TransportConfig::from_env`].
#[derive(Args, Debug, Clone)]
pub struct AcquisitionArgs {
    /// Root under which per-request workspaces are created.
    #[arg(long = "temp-dir", env = "TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Upper bound for any single external command (seconds).
    #[arg(long = "command-timeout-secs", default_value_t = 600)]
    pub command_timeout_secs: u64,

    /// Artifacts at or below this size are rejected.
    #[arg(long = "min-artifact-bytes", default_value_t = DEFAULT_MIN_ARTIFACT_BYTES)]
    pub min_artifact_bytes: u64,

    /// Python interpreter hosting yt_dlp and pytube.
    #[arg(long = "python")]
    pub python: Option<PathBuf>,

    /// yt-dlp executable.
    #[arg(long = "yt-dlp")]
    pub ytdlp: Option<PathBuf>,

    /// ffmpeg executable.
    #[arg(long = "ffmpeg")]
    pub ffmpeg: Option<PathBuf>,

    /// Metadata endpoint for the direct HTTP fallback; `{id}` is replaced.
    #[arg(long = "metadata-endpoint", default_value = DEFAULT_METADATA_ENDPOINT)]
    pub metadata_endpoint: String,
}

impl AcquisitionArgs {
    pub fn workspaces(&self) -> WorkspaceManager {
        match &self.temp_dir {
            Some(root) => WorkspaceManager::new(root.join("tubescribe")),
            None => WorkspaceManager::in_temp_dir(),
        }
    }

    pub fn settings(&self, transport: TransportConfig) -> ExtractorSettings {
        let mut settings = ExtractorSettings::new(transport)
            .with_command_timeout(Duration::from_secs(self.command_timeout_secs))
            .with_metadata_endpoint(self.metadata_endpoint.clone());
        if let Some(python) = &self.python {
            settings = settings.with_python(python);
        }
        if let Some(ytdlp) = &self.ytdlp {
            settings = settings.with_ytdlp(ytdlp);
        }
        if let Some(ffmpeg) = &self.ffmpeg {
            settings = settings.with_ffmpeg(ffmpeg);
        }
        settings
    }

    /// The standard four-strategy chain, transport read from the environment
    pub fn build_chain(&self, runner: CommandRunner) -> Result<StrategyChain, TransportError> {
        StrategyChain::standard(
            self.workspaces(),
            ResultValidator::new(self.min_artifact_bytes),
            self.settings(TransportConfig::from_env()),
            runner,
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct WhisperArgs {
    /// Whisper model name (tiny, base, small, medium, large).
    #[arg(long = "whisper-model", env = "WHISPER_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// whisper executable; discovered on PATH when omitted.
    #[arg(long = "whisper-binary")]
    pub binary: Option<PathBuf>,

    /// Force the spoken language instead of auto-detecting it.
    #[arg(long = "language")]
    pub language: Option<String>,

    #[arg(long = "transcribe-timeout-secs", default_value_t = DEFAULT_TRANSCRIBE_TIMEOUT.as_secs())]
    pub transcribe_timeout_secs: u64,
}

impl WhisperArgs {
    pub fn build_engine(
        &self,
        runner: CommandRunner,
    ) -> Result<WhisperCliEngine, TranscriptionError> {
        let engine = match &self.binary {
            Some(binary) => WhisperCliEngine::new(binary, self.model.clone(), runner),
            None => WhisperCliEngine::discover(self.model.clone(), runner)?,
        };
        let engine = engine.with_timeout(Duration::from_secs(self.transcribe_timeout_secs));
        Ok(match &self.language {
            Some(language) => engine.with_language(language.clone()),
            None => engine,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser, Debug)]
    struct Harness {
        #[command(flatten)]
        acquisition: AcquisitionArgs,
        #[command(flatten)]
        whisper: WhisperArgs,
    }

    #[test]
    fn defaults() {
        let parsed = Harness::try_parse_from(["test"]).unwrap();
        assert_eq!(parsed.acquisition.command_timeout_secs, 600);
        assert_eq!(parsed.acquisition.min_artifact_bytes, 1000);
        assert_eq!(parsed.acquisition.metadata_endpoint, DEFAULT_METADATA_ENDPOINT);
        assert_eq!(parsed.whisper.transcribe_timeout_secs, 3600);
        assert!(parsed.whisper.language.is_none());
    }

    #[test]
    fn explicit_tools_flow_into_settings() {
        let parsed = Harness::try_parse_from([
            "test",
            "--yt-dlp",
            "/opt/yt-dlp",
            "--ffmpeg",
            "/opt/ffmpeg",
            "--command-timeout-secs",
            "5",
        ])
        .unwrap();

        let settings = parsed.acquisition.settings(TransportConfig::default());
        assert_eq!(settings.ytdlp_path.as_deref(), Some(std::path::Path::new("/opt/yt-dlp")));
        assert_eq!(settings.ffmpeg_path.as_deref(), Some(std::path::Path::new("/opt/ffmpeg")));
        assert_eq!(settings.command_timeout, Duration::from_secs(5));
    }

    #[test]
    fn temp_dir_gets_a_private_subdirectory() {
        let parsed = Harness::try_parse_from(["test", "--temp-dir", "/data/tmp"]).unwrap();
        assert_eq!(
            parsed.acquisition.workspaces().root(),
            std::path::Path::new("/data/tmp/tubescribe")
        );
    }

    #[test]
    fn explicit_whisper_binary_skips_discovery() {
        let parsed = Harness::try_parse_from([
            "test",
            "--whisper-binary",
            "/nonexistent/whisper",
            "--whisper-model",
            "tiny",
        ])
        .unwrap();
        let engine = parsed.whisper.build_engine(CommandRunner::default()).unwrap();
        assert_eq!(engine.binary(), std::path::Path::new("/nonexistent/whisper"));
    }
}
