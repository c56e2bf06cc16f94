use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize structured JSON logging on stderr.
///
/// Defaults to `info` unless overridden by `TUBESCRIBE_LOG`
/// (e.g. `TUBESCRIBE_LOG=tubescribe=debug,tower_http=info`).
pub fn init() {
    let filter = EnvFilter::builder()
        .with_env_var("TUBESCRIBE_LOG")
        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
