// yt-dlp binary strategy
//
// Broadest option surface of all strategies and the most resilient to
// anti-bot changes, since the binary is usually the first thing updated.

use std::path::PathBuf;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{find_audio_artifact, AcquisitionOutcome, AcquisitionStrategy};
use crate::acquisition::errors::StrategyFailure;
use crate::acquisition::models::{AcquisitionRequest, StrategyKind};
use crate::acquisition::runner::{CommandRunner, CommandSpec};
use crate::acquisition::settings::ExtractorSettings;
use crate::acquisition::tools::{self, ToolKind};

lazy_static! {
    static ref DESTINATION: Regex =
        Regex::new(r"^\[(?:download|ExtractAudio)\] Destination: (.+)$").unwrap();
    static ref ALREADY_DOWNLOADED: Regex =
        Regex::new(r"^\[download\] (.+) has already been downloaded").unwrap();
}

pub struct CliExtractor {
    ytdlp: Option<PathBuf>,
    ffmpeg: Option<PathBuf>,
    settings: ExtractorSettings,
    runner: CommandRunner,
}

impl CliExtractor {
    pub fn new(settings: ExtractorSettings, runner: CommandRunner) -> Self {
        Self {
            ytdlp: tools::resolve(settings.ytdlp_path.as_deref(), ToolKind::YtDlp),
            ffmpeg: tools::resolve(settings.ffmpeg_path.as_deref(), ToolKind::Ffmpeg),
            settings,
            runner,
        }
    }

    /// Build command arguments
    fn build_args(&self, request: &AcquisitionRequest) -> Vec<String> {
        let mut args = vec![
            "--no-cache-dir".to_string(),
            "--geo-bypass".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
        ];

        args.extend(self.settings.transport.ytdlp_network_args());

        args.extend([
            "--extract-audio".to_string(),
            "--audio-format".to_string(),
            self.settings.audio_format.clone(),
            "--audio-quality".to_string(),
            format!("{}K", self.settings.audio_quality_kbps),
        ]);

        if let Some(ffmpeg) = &self.ffmpeg {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        args.push("--output".to_string());
        args.push(request.output_template().to_string_lossy().into_owned());
        args.push(request.source_url.clone());

        args
    }
}

/// Last destination announced on stdout. Post-processor lines come after the
/// download lines, so the last match is the transcoded file.
fn parse_destination(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            DESTINATION
                .captures(line)
                .or_else(|| ALREADY_DOWNLOADED.captures(line))
                .and_then(|caps| caps.get(1))
                .map(|m| PathBuf::from(m.as_str().trim()))
        })
        .last()
}

#[async_trait]
impl AcquisitionStrategy for CliExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cli
    }

    async fn check_precondition(&self, _request: &AcquisitionRequest) -> Result<(), String> {
        match &self.ytdlp {
            Some(path) if path.is_file() => Ok(()),
            Some(path) => Err(format!("yt-dlp binary not found at {}", path.display())),
            None => Err("yt-dlp binary not found".to_string()),
        }
    }

    async fn attempt(
        &self,
        request: &AcquisitionRequest,
        cancel: &CancellationToken,
    ) -> AcquisitionOutcome {
        let kind = self.kind();
        let ytdlp = self
            .ytdlp
            .as_ref()
            .ok_or_else(|| StrategyFailure::precondition(kind, "yt-dlp binary not found"))?;

        let spec = CommandSpec::new(ytdlp)
            .args(self.build_args(request))
            .envs(self.settings.transport.child_env())
            .current_dir(&request.workspace);

        info!(url = %request.source_url, "downloading with yt-dlp binary");
        let output = self
            .runner
            .run(&spec, self.settings.command_timeout, cancel)
            .await
            .map_err(|e| StrategyFailure::from_run_error(kind, &e))?;

        if !output.success() {
            return Err(StrategyFailure::from_exit(kind, "yt-dlp", &output));
        }

        if let Some(destination) = parse_destination(&output.stdout_lossy()) {
            let destination = if destination.is_relative() {
                request.workspace.join(destination)
            } else {
                destination
            };
            if destination.starts_with(&request.workspace)
                && tokio::fs::metadata(&destination).await.is_ok()
            {
                return Ok(destination);
            }
            debug!(destination = %destination.display(), "announced destination missing");
        }

        match find_audio_artifact(&request.workspace).await {
            Ok(Some(path)) => Ok(path),
            Ok(None) => Err(StrategyFailure::external_process(
                kind,
                "yt-dlp exited successfully but produced no output file",
            )),
            Err(e) => Err(StrategyFailure::external_process(
                kind,
                format!("cannot scan workspace: {}", e),
            )),
        }
    }
}
