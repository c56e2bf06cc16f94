use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tubescribe::acquisition::{tools, video_id, AcquisitionError, CommandRunner};
use tubescribe::config::AcquisitionArgs;

#[derive(Parser, Debug)]
#[command(name = "tubescribe-fetch")]
#[command(about = "Download the audio track of a video URL through the strategy chain")]
struct Params {
    /// Video URL.
    #[arg(required_unless_present = "check_tools")]
    url: Option<String>,

    /// Destination file; defaults to the user's download directory.
    output: Option<PathBuf>,

    /// Print the external tool inventory and exit.
    #[arg(long = "check-tools")]
    check_tools: bool,

    #[command(flatten)]
    acquisition: AcquisitionArgs,
}

#[tokio::main]
async fn main() {
    tubescribe::logging::init();

    match run().await {
        Ok(()) => {}
        Err(err) => {
            if let Some(acquisition) = err.downcast_ref::<AcquisitionError>() {
                for (n, attempt) in acquisition.attempts().iter().enumerate() {
                    eprintln!("  {}. [{}] {}", n + 1, attempt.kind, attempt);
                    if let Some(hint) = attempt.hint() {
                        eprintln!("     hint: {}", hint);
                    }
                }
            }
            eprintln!("error: {:#}", err);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let params = Params::parse();
    let runner = CommandRunner::default();

    if params.check_tools {
        let report = tools::report(&runner).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let url = params.url.context("a url is required")?;
    let output = match params.output {
        Some(path) => path,
        None => default_output(&url)?,
    };

    let chain = params
        .acquisition
        .build_chain(runner)
        .context("failed to configure http transport")?;

    // Ctrl-C stops the running strategy and kills its process group
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling acquisition");
            on_signal.cancel();
        }
    });

    let audio = chain.acquire(&url, Some(&output), &cancel).await?;
    info!(
        strategy = %audio.strategy(),
        bytes = audio.size_bytes(),
        skipped_or_failed = audio.failed_attempts().len(),
        "audio saved"
    );
    println!("{}", audio.path().display());
    Ok(())
}

fn default_output(url: &str) -> Result<PathBuf> {
    let dir = dirs::download_dir()
        .or_else(dirs::home_dir)
        .context("no download directory; pass an output path")?;
    let name = match video_id::derive_from_str(url) {
        Some(id) => format!("youtube_audio_{}.mp3", id),
        None => "youtube_audio.mp3".to_string(),
    };
    Ok(dir.join(name))
}
