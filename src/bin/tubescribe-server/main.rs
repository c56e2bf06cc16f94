use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use tubescribe::acquisition::CommandRunner;
use tubescribe::config::{AcquisitionArgs, WhisperArgs};
use tubescribe::service::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "tubescribe-server")]
#[command(about = "HTTP service that downloads and transcribes video audio")]
struct Params {
    /// Host interface to bind to.
    #[arg(long = "host", env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port to listen on.
    #[arg(long = "port", env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Origins allowed to call the API from a browser; `*` allows any.
    #[arg(
        long = "cors-origins",
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "*"
    )]
    cors_origins: Vec<String>,

    /// Transcriptions allowed to run at the same time.
    #[arg(long = "max-concurrent-transcriptions", default_value_t = 1)]
    max_concurrent_transcriptions: usize,

    #[command(flatten)]
    acquisition: AcquisitionArgs,

    #[command(flatten)]
    whisper: WhisperArgs,
}

#[tokio::main]
async fn main() {
    tubescribe::logging::init();

    if let Err(err) = run().await {
        error!(error = ?err, "tubescribe-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Values from .env never override the real environment
    dotenvy::dotenv().ok();
    let params = Params::parse();

    let addr: SocketAddr = format!("{}:{}", params.host, params.port)
        .parse()
        .context("invalid host/port bind address")?;

    let runner = CommandRunner::default();
    let chain = params
        .acquisition
        .build_chain(runner.clone())
        .context("failed to configure http transport")?;
    let engine = params
        .whisper
        .build_engine(runner.clone())
        .context("failed to initialize transcription engine")?;

    info!(
        strategies = ?chain.order(),
        workspace_root = %chain.workspaces().root().display(),
        model = %params.whisper.model,
        "acquisition chain ready"
    );
    if !chain.workspaces().root().exists() {
        if let Err(err) = tokio::fs::create_dir_all(chain.workspaces().root()).await {
            warn!(error = %err, "cannot create workspace root yet");
        }
    }

    let state = AppState::new(
        chain,
        Arc::new(engine),
        params.max_concurrent_transcriptions,
        runner,
    )
    .with_cors_origins(params.cors_origins);
    let app = router(state);

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
