// pytube + ffmpeg strategy
//
// An independent code path for when yt-dlp is broken upstream. pytube fetches
// the first audio-only stream; ffmpeg transcodes it. A missing or failing
// transcoder is not fatal: the raw stream is handed over as-is.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::python::PythonHost;
use super::{AcquisitionOutcome, AcquisitionStrategy};
use crate::acquisition::errors::StrategyFailure;
use crate::acquisition::models::{AcquisitionRequest, StrategyKind};
use crate::acquisition::runner::{CommandRunner, CommandSpec, RunError};
use crate::acquisition::settings::ExtractorSettings;
use crate::acquisition::tools::{self, ToolKind};

// argv: url, out_dir, proxy ("" for none), insecure ("1" disables cert checks)
const DOWNLOAD_SCRIPT: &str = r#"import ssl, sys
url, out_dir, proxy, insecure = sys.argv[1], sys.argv[2], sys.argv[3], sys.argv[4]
if insecure == "1":
    ssl._create_default_https_context = ssl._create_unverified_context
from pytube import YouTube
proxies = {"http": proxy, "https": proxy} if proxy else None
stream = YouTube(url, proxies=proxies).streams.filter(only_audio=True).first()
if stream is None:
    sys.stderr.write("no audio-only stream available\n")
    sys.exit(2)
print(stream.download(output_path=out_dir, filename_prefix="raw-"))
"#;

pub struct AlternateLibraryExtractor {
    host: PythonHost,
    ffmpeg: Option<PathBuf>,
    settings: ExtractorSettings,
    runner: CommandRunner,
}

impl AlternateLibraryExtractor {
    pub fn new(settings: ExtractorSettings, runner: CommandRunner) -> Self {
        let python = tools::resolve(settings.python_path.as_deref(), ToolKind::Python);

        Self {
            host: PythonHost::new(python, "pytube", runner.clone()),
            ffmpeg: tools::resolve(settings.ffmpeg_path.as_deref(), ToolKind::Ffmpeg),
            settings,
            runner,
        }
    }

    fn transcode_spec(&self, ffmpeg: &Path, input: &Path, output: &Path) -> CommandSpec {
        CommandSpec::new(ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-vn", "-ar", "44100", "-ac", "2", "-b:a"])
            .arg(format!("{}k", self.settings.audio_quality_kbps))
            .args(["-f", self.settings.audio_format.as_str()])
            .arg(output)
    }

    /// Transcode `raw`, or keep it when the transcoder is unusable.
    /// Only cancellation is an error here.
    async fn transcode_or_keep(
        &self,
        request: &AcquisitionRequest,
        raw: PathBuf,
        cancel: &CancellationToken,
    ) -> AcquisitionOutcome {
        let kind = self.kind();
        let Some(ffmpeg) = &self.ffmpeg else {
            warn!("ffmpeg not found, keeping raw stream");
            return Ok(raw);
        };

        let target = request.audio_target(&self.settings.audio_format);
        let spec = self.transcode_spec(ffmpeg, &raw, &target);

        match self
            .runner
            .run(&spec, self.settings.command_timeout, cancel)
            .await
        {
            Ok(output) if output.success() && tokio::fs::metadata(&target).await.is_ok() => {
                if let Err(e) = tokio::fs::remove_file(&raw).await {
                    warn!(error = %e, "failed to remove raw stream after transcode");
                }
                Ok(target)
            }
            Ok(output) => {
                warn!(
                    exit_code = ?output.exit_code,
                    stderr = %output.stderr_tail(3),
                    "ffmpeg failed, keeping raw stream"
                );
                let _ = tokio::fs::remove_file(&target).await;
                Ok(raw)
            }
            Err(e @ RunError::Cancelled { .. }) => Err(StrategyFailure::from_run_error(kind, &e)),
            Err(e) => {
                warn!(error = %e, "ffmpeg unusable, keeping raw stream");
                let _ = tokio::fs::remove_file(&target).await;
                Ok(raw)
            }
        }
    }
}

#[async_trait]
impl AcquisitionStrategy for AlternateLibraryExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::AlternateLibrary
    }

    async fn check_precondition(&self, _request: &AcquisitionRequest) -> Result<(), String> {
        self.host.ensure_module().await.map(|_| ())
    }

    async fn attempt(
        &self,
        request: &AcquisitionRequest,
        cancel: &CancellationToken,
    ) -> AcquisitionOutcome {
        let kind = self.kind();
        let interpreter = self
            .host
            .ensure_module()
            .await
            .map_err(|reason| StrategyFailure::precondition(kind, reason))?;

        let proxy = self.settings.transport.proxy.clone().unwrap_or_default();
        let spec = PythonHost::script(interpreter, DOWNLOAD_SCRIPT)
            .arg(&request.source_url)
            .arg(&request.workspace)
            .arg(proxy)
            .arg(if self.settings.transport.insecure_tls { "1" } else { "0" })
            .envs(self.settings.transport.child_env())
            .current_dir(&request.workspace);

        info!(url = %request.source_url, "downloading with pytube");
        let output = self
            .runner
            .run(&spec, self.settings.command_timeout, cancel)
            .await
            .map_err(|e| StrategyFailure::from_run_error(kind, &e))?;

        if !output.success() {
            return Err(StrategyFailure::from_exit(kind, "pytube", &output));
        }

        let stdout = output.stdout_lossy();
        let raw = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from);
        let raw = match raw {
            Some(path) if tokio::fs::metadata(&path).await.is_ok() => path,
            _ => {
                return Err(StrategyFailure::external_process(
                    kind,
                    "pytube did not report a downloaded file",
                ))
            }
        };

        self.transcode_or_keep(request, raw, cancel).await
    }
}
