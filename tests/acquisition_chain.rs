// End-to-end behaviour of the strategy chain with stand-in strategies

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tubescribe::acquisition::{
    AcquisitionError, AcquisitionOutcome, AcquisitionRequest, AcquisitionStrategy,
    DirectHttpFallback, ExtractorSettings, FailureKind, ResultValidator, StrategyChain,
    StrategyFailure, StrategyKind, TransportConfig, WorkspaceManager,
};

/// Writes `bytes` bytes of audio, or fails when `bytes` is `None`
struct Scripted {
    kind: StrategyKind,
    bytes: Option<usize>,
    calls: Arc<AtomicUsize>,
}

impl Scripted {
    fn writes(kind: StrategyKind, bytes: usize) -> Self {
        Self {
            kind,
            bytes: Some(bytes),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn fails(kind: StrategyKind) -> Self {
        Self {
            kind,
            bytes: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl AcquisitionStrategy for Scripted {
    fn kind(&self) -> StrategyKind {
        self.kind
    }

    async fn check_precondition(&self, _request: &AcquisitionRequest) -> Result<(), String> {
        Ok(())
    }

    async fn attempt(
        &self,
        request: &AcquisitionRequest,
        _cancel: &CancellationToken,
    ) -> AcquisitionOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.bytes {
            Some(bytes) => {
                let target = request.audio_target("mp3");
                tokio::fs::write(&target, vec![0u8; bytes]).await.unwrap();
                Ok(target)
            }
            None => Err(StrategyFailure::external_process(
                self.kind,
                format!("{} gave up", self.kind),
            )),
        }
    }
}

fn direct_http(server: &MockServer) -> DirectHttpFallback {
    let settings = ExtractorSettings::new(TransportConfig::default().with_force_ipv4(false))
        .with_metadata_endpoint(format!("{}/get_video_info?video_id={{id}}", server.uri()));
    DirectHttpFallback::with_client(settings, reqwest::Client::new())
}

fn chain(root: &Path) -> StrategyChain {
    StrategyChain::new(WorkspaceManager::new(root), ResultValidator::default())
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

#[tokio::test]
async fn url_without_video_id_skips_direct_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 8192]))
        .expect(0)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let chain = chain(root.path())
        .with_strategy(Scripted::fails(StrategyKind::Library))
        .with_strategy(Scripted::fails(StrategyKind::Cli))
        .with_strategy(Scripted::fails(StrategyKind::AlternateLibrary))
        .with_strategy(direct_http(&server));

    let err = chain
        .acquire("https://example.com/some/page", None, &CancellationToken::new())
        .await
        .unwrap_err();

    let attempts = err.attempts();
    assert_eq!(attempts.len(), 4);
    assert_eq!(attempts[3].strategy, StrategyKind::DirectHttp);
    assert_eq!(attempts[3].kind, FailureKind::PreconditionUnmet);
    match err {
        AcquisitionError::Exhausted(aggregated) => assert_eq!(aggregated.attempted_count(), 3),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn empty_artifact_falls_through_to_next_strategy() {
    let root = tempfile::tempdir().unwrap();
    let second = Scripted::writes(StrategyKind::Cli, 64 * 1024);
    let calls = second.calls.clone();
    let chain = chain(root.path())
        .with_strategy(Scripted::writes(StrategyKind::Library, 0))
        .with_strategy(second);

    let audio = chain
        .acquire(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            None,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(audio.strategy(), StrategyKind::Cli);
    assert_eq!(audio.size_bytes(), 64 * 1024);
    assert_eq!(audio.video_id(), Some("dQw4w9WgXcQ"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(audio.failed_attempts().len(), 1);
    assert_eq!(audio.failed_attempts()[0].kind, FailureKind::Validation);

    let path = audio.path().to_path_buf();
    assert!(path.is_file());
    drop(audio);
    assert!(!path.exists());
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn all_failures_report_the_last_strategy_as_primary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/get_video_info"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let root = tempfile::tempdir().unwrap();
    let chain = chain(root.path())
        .with_strategy(direct_http(&server))
        .with_strategy(Scripted::fails(StrategyKind::AlternateLibrary))
        .with_strategy(Scripted::fails(StrategyKind::Cli))
        .with_strategy(Scripted::fails(StrategyKind::Library));

    let err = chain
        .acquire("https://youtu.be/dQw4w9WgXcQ", None, &CancellationToken::new())
        .await
        .unwrap_err();

    let AcquisitionError::Exhausted(aggregated) = err else {
        panic!("expected an exhausted chain");
    };
    let order: Vec<_> = aggregated.attempts().iter().map(|a| a.strategy).collect();
    assert_eq!(order, StrategyKind::ORDER.to_vec());

    let primary = aggregated.primary();
    assert_eq!(primary.strategy, StrategyKind::DirectHttp);
    assert_eq!(primary.kind, FailureKind::Transport);
    assert!(primary.message.contains("403"), "{}", primary.message);
    assert_eq!(entries(root.path()), 0);
}

#[tokio::test]
async fn output_path_receives_the_artifact() {
    let root = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let output = out_dir.path().join("nested").join("song.mp3");

    let chain = chain(root.path()).with_strategy(Scripted::writes(StrategyKind::Library, 5000));
    let audio = chain
        .acquire("https://youtu.be/dQw4w9WgXcQ", Some(&output), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(audio.path(), output.as_path());
    drop(audio);
    assert_eq!(std::fs::metadata(&output).unwrap().len(), 5000);
    assert_eq!(entries(root.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn hung_cli_extractor_times_out() {
    use std::os::unix::fs::PermissionsExt;
    use tubescribe::acquisition::{CliExtractor, CommandRunner};

    let bin = tempfile::tempdir().unwrap();
    let ytdlp = bin.path().join("yt-dlp");
    std::fs::write(&ytdlp, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&ytdlp, std::fs::Permissions::from_mode(0o755)).unwrap();

    let settings = ExtractorSettings::new(TransportConfig::default())
        .with_ytdlp(&ytdlp)
        .with_command_timeout(Duration::from_millis(300));

    let root = tempfile::tempdir().unwrap();
    let chain =
        chain(root.path()).with_strategy(CliExtractor::new(settings, CommandRunner::default()));

    let started = std::time::Instant::now();
    let err = chain
        .acquire("https://youtu.be/dQw4w9WgXcQ", None, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));

    let attempts = err.attempts();
    assert_eq!(attempts.len(), 1);
    assert!(
        attempts[0].message.contains("execution timed out"),
        "{}",
        attempts[0].message
    );
    assert_eq!(entries(root.path()), 0);
}
