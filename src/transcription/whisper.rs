// Whisper engine - shells out to the `whisper` CLI through the command runner
// and reads the JSON file it writes into a scratch directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Segment, Transcript, TranscriptionEngine, TranscriptionError};
use crate::acquisition::runner::{CommandRunner, CommandSpec};
use crate::acquisition::tools::{self, ToolKind};

pub const DEFAULT_MODEL: &str = "base";

/// Long recordings on CPU take a while
pub const DEFAULT_TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: String,
}

pub struct WhisperCliEngine {
    binary: PathBuf,
    model: String,
    language: Option<String>,
    timeout: Duration,
    runner: CommandRunner,
}

impl WhisperCliEngine {
    pub fn new(
        binary: impl Into<PathBuf>,
        model: impl Into<String>,
        runner: CommandRunner,
    ) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            language: None,
            timeout: DEFAULT_TRANSCRIBE_TIMEOUT,
            runner,
        }
    }

    /// Engine using the discovered `whisper` binary
    pub fn discover(
        model: impl Into<String>,
        runner: CommandRunner,
    ) -> Result<Self, TranscriptionError> {
        let binary = tools::locate(ToolKind::Whisper).ok_or_else(|| {
            TranscriptionError::Unavailable("whisper binary not found".to_string())
        })?;
        Ok(Self::new(binary, model, runner))
    }

    /// Force a language instead of auto-detection
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, audio: &Path, output_dir: &Path) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.binary)
            .arg(audio)
            .args(["--model", self.model.as_str()])
            .arg("--output_dir")
            .arg(output_dir)
            .args(["--output_format", "json", "--verbose", "False", "--fp16", "False"]);
        if let Some(language) = &self.language {
            spec = spec.args(["--language", language.as_str()]);
        }
        spec
    }
}

#[async_trait]
impl TranscriptionEngine for WhisperCliEngine {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn transcribe(&self, audio: &Path) -> Result<Transcript, TranscriptionError> {
        let scratch = tempfile::tempdir()?;
        let spec = self.command(audio, scratch.path());

        info!(audio = %audio.display(), model = %self.model, "transcribing");
        let output = self
            .runner
            .run(&spec, self.timeout, &CancellationToken::new())
            .await?;

        if !output.success() {
            return Err(TranscriptionError::Failed {
                program: spec.program_name(),
                code: output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                stderr: output.stderr_tail(8),
            });
        }

        let stem = audio.file_stem().unwrap_or_default().to_string_lossy();
        let json_path = scratch.path().join(format!("{}.json", stem));
        let content = match tokio::fs::read_to_string(&json_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TranscriptionError::MissingOutput(json_path))
            }
            Err(e) => return Err(e.into()),
        };

        let whisper: WhisperOutput =
            serde_json::from_str(&content).map_err(TranscriptionError::Parse)?;
        debug!(segments = whisper.segments.len(), "parsed whisper output");

        Ok(Transcript {
            text: whisper.text.trim().to_string(),
            language: whisper.language.filter(|l| !l.is_empty()),
            segments: whisper
                .segments
                .into_iter()
                .map(|s| Segment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::write_script;

    const FAKE_WHISPER: &str = r#"audio="$1"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--output_dir" ]; then out="$2"; fi
  shift
done
stem=$(basename "$audio")
stem="${stem%.*}"
cat > "$out/$stem.json" <<'EOF'
{"text": " Hello there. General Kenobi.", "language": "en",
 "segments": [
   {"id": 0, "start": 0.0, "end": 1.5, "text": " Hello there."},
   {"id": 1, "start": 1.5, "end": 3.25, "text": " General Kenobi."}
 ]}
EOF"#;

    #[tokio::test]
    async fn parses_json_output() {
        let tools = tempfile::tempdir().unwrap();
        let whisper = write_script(tools.path(), "whisper", FAKE_WHISPER);
        let audio = tools.path().join("clip.mp3");
        std::fs::write(&audio, b"fake").unwrap();

        let engine = WhisperCliEngine::new(whisper, "tiny", CommandRunner::new());
        let transcript = engine.transcribe(&audio).await.unwrap();

        assert_eq!(transcript.text, "Hello there. General Kenobi.");
        assert_eq!(transcript.language.as_deref(), Some("en"));
        assert_eq!(transcript.segments.len(), 2);
        assert_eq!(transcript.segments[1].text, "General Kenobi.");
        assert_eq!(transcript.duration_seconds(), 3.25);
        assert_eq!(engine.model_name(), "tiny");
    }

    #[tokio::test]
    async fn engine_failure_is_reported() {
        let tools = tempfile::tempdir().unwrap();
        let whisper = write_script(
            tools.path(),
            "whisper",
            "echo 'RuntimeError: failed to load audio' >&2\nexit 1",
        );

        let engine = WhisperCliEngine::new(whisper, "base", CommandRunner::new());
        let err = engine
            .transcribe(Path::new("/tmp/missing.mp3"))
            .await
            .unwrap_err();

        match err {
            TranscriptionError::Failed { code, stderr, .. } => {
                assert_eq!(code, "1");
                assert!(stderr.contains("failed to load audio"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_json_is_an_error() {
        let tools = tempfile::tempdir().unwrap();
        let whisper = write_script(tools.path(), "whisper", "exit 0");

        let engine = WhisperCliEngine::new(whisper, "base", CommandRunner::new());
        let err = engine.transcribe(Path::new("/tmp/a.mp3")).await.unwrap_err();
        assert!(matches!(err, TranscriptionError::MissingOutput(_)));
    }

    #[test]
    fn language_is_optional() {
        let engine = WhisperCliEngine::new("/usr/bin/whisper", "small", CommandRunner::new());
        let spec = engine.command(Path::new("/a/b.mp3"), Path::new("/out"));
        assert_eq!(
            spec.to_string(),
            "/usr/bin/whisper /a/b.mp3 --model small --output_dir /out \
             --output_format json --verbose False --fp16 False"
        );

        let spec = engine
            .with_language("de")
            .command(Path::new("/a/b.mp3"), Path::new("/out"));
        assert!(spec.to_string().ends_with("--language de"));
    }
}
