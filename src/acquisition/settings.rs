// Settings shared by the standard strategies

use std::path::PathBuf;
use std::time::Duration;

use super::transport::TransportConfig;

/// Default deadline for a single external command (download + transcode)
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Metadata endpoint queried by the direct HTTP fallback; `{id}` is replaced
pub const DEFAULT_METADATA_ENDPOINT: &str =
    "https://www.youtube.com/get_video_info?video_id={id}&el=detailpage";

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub transport: TransportConfig,

    /// Deadline per external command
    pub command_timeout: Duration,

    /// Target audio codec ("mp3")
    pub audio_format: String,

    /// Target bitrate in kbps
    pub audio_quality_kbps: u32,

    /// Explicit interpreter, otherwise discovered
    pub python_path: Option<PathBuf>,

    /// Explicit yt-dlp binary, otherwise discovered
    pub ytdlp_path: Option<PathBuf>,

    /// Explicit ffmpeg binary, otherwise discovered
    pub ffmpeg_path: Option<PathBuf>,

    pub metadata_endpoint: String,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            audio_format: "mp3".to_string(),
            audio_quality_kbps: 192,
            python_path: None,
            ytdlp_path: None,
            ffmpeg_path: None,
            metadata_endpoint: DEFAULT_METADATA_ENDPOINT.to_string(),
        }
    }
}

impl ExtractorSettings {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            ..Self::default()
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_audio_format(mut self, format: impl Into<String>) -> Self {
        self.audio_format = format.into();
        self
    }

    pub fn with_audio_quality(mut self, kbps: u32) -> Self {
        self.audio_quality_kbps = kbps;
        self
    }

    pub fn with_python(mut self, path: impl Into<PathBuf>) -> Self {
        self.python_path = Some(path.into());
        self
    }

    pub fn with_ytdlp(mut self, path: impl Into<PathBuf>) -> Self {
        self.ytdlp_path = Some(path.into());
        self
    }

    pub fn with_ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    pub fn with_metadata_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metadata_endpoint = endpoint.into();
        self
    }

    /// Metadata URL for a given video ID
    pub fn metadata_url(&self, video_id: &str) -> String {
        self.metadata_endpoint.replace("{id}", video_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_url_substitutes_id() {
        let settings = ExtractorSettings::default();
        assert_eq!(
            settings.metadata_url("abc123DEF45"),
            "https://www.youtube.com/get_video_info?video_id=abc123DEF45&el=detailpage"
        );
    }

    #[test]
    fn builders_override_defaults() {
        let settings = ExtractorSettings::default()
            .with_command_timeout(Duration::from_secs(5))
            .with_audio_quality(128)
            .with_metadata_endpoint("http://127.0.0.1:9/info/{id}");

        assert_eq!(settings.command_timeout, Duration::from_secs(5));
        assert_eq!(settings.audio_quality_kbps, 128);
        assert_eq!(settings.metadata_url("x"), "http://127.0.0.1:9/info/x");
        assert_eq!(settings.audio_format, "mp3");
    }
}
