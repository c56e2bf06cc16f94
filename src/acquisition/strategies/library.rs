// yt-dlp library strategy
//
// Highest priority: the library call skips the binary's argument parsing and
// has the cleanest post-processing. The options are handed to the script as
// one JSON document.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::python::PythonHost;
use super::{find_audio_artifact, AcquisitionOutcome, AcquisitionStrategy};
use crate::acquisition::errors::StrategyFailure;
use crate::acquisition::models::{AcquisitionRequest, StrategyKind};
use crate::acquisition::runner::CommandRunner;
use crate::acquisition::settings::ExtractorSettings;
use crate::acquisition::tools::{self, ToolKind};

const DOWNLOAD_SCRIPT: &str = r#"import json, sys
import yt_dlp
opts = json.loads(sys.argv[1])
with yt_dlp.YoutubeDL(opts) as ydl:
    code = ydl.download([sys.argv[2]])
sys.exit(code or 0)
"#;

pub struct LibraryExtractor {
    host: PythonHost,
    settings: ExtractorSettings,
    ffmpeg: Option<PathBuf>,
    runner: CommandRunner,
}

impl LibraryExtractor {
    pub fn new(settings: ExtractorSettings, runner: CommandRunner) -> Self {
        let python = tools::resolve(settings.python_path.as_deref(), ToolKind::Python);
        let ffmpeg = tools::resolve(settings.ffmpeg_path.as_deref(), ToolKind::Ffmpeg);

        Self {
            host: PythonHost::new(python, "yt_dlp", runner.clone()),
            settings,
            ffmpeg,
            runner,
        }
    }

    /// `YoutubeDL` options for one request
    fn build_options(&self, request: &AcquisitionRequest) -> Value {
        let transport = &self.settings.transport;

        let mut opts = json!({
            "format": "bestaudio/best",
            "outtmpl": request.output_template().to_string_lossy(),
            "postprocessors": [{
                "key": "FFmpegExtractAudio",
                "preferredcodec": self.settings.audio_format,
                "preferredquality": self.settings.audio_quality_kbps.to_string(),
            }],
            "nocheckcertificate": transport.insecure_tls,
            "geo_bypass": true,
            "socket_timeout": transport.socket_timeout.as_secs().max(1),
            "http_headers": { "User-Agent": transport.user_agent },
            "noplaylist": true,
            "cachedir": false,
            "quiet": true,
            "no_warnings": true,
        });

        if let Some(map) = opts.as_object_mut() {
            if let Some(proxy) = &transport.proxy {
                map.insert("proxy".to_string(), json!(proxy));
            }
            if transport.force_ipv4 {
                map.insert("source_address".to_string(), json!("0.0.0.0"));
            }
            if let Some(ffmpeg) = &self.ffmpeg {
                map.insert(
                    "ffmpeg_location".to_string(),
                    json!(ffmpeg.to_string_lossy()),
                );
            }
        }

        opts
    }
}

#[async_trait]
impl AcquisitionStrategy for LibraryExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Library
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

        let spec = PythonHost::script(interpreter, DOWNLOAD_SCRIPT)
            .arg(self.build_options(request).to_string())
            .arg(&request.source_url)
            .envs(self.settings.transport.child_env())
            .current_dir(&request.workspace);

        info!(url = %request.source_url, "downloading with yt_dlp library");
        let output = self
            .runner
            .run(&spec, self.settings.command_timeout, cancel)
            .await
            .map_err(|e| StrategyFailure::from_run_error(kind, &e))?;

        if !output.success() {
            return Err(StrategyFailure::from_exit(kind, "yt_dlp", &output));
        }

        let expected = request.audio_target(&self.settings.audio_format);
        if tokio::fs::metadata(&expected).await.is_ok() {
            return Ok(expected);
        }

        debug!(expected = %expected.display(), "expected output missing, scanning workspace");
        match find_audio_artifact(&request.workspace).await {
            Ok(Some(path)) => Ok(path),
            Ok(None) => Err(StrategyFailure::external_process(
                kind,
                "yt_dlp finished without producing an output file",
            )),
            Err(e) => Err(StrategyFailure::external_process(
                kind,
                format!("cannot scan workspace: {}", e),
            )),
        }
    }
}
