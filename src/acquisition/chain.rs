// Strategy chain - ordered fallback over every acquisition strategy
//
// Strategies run strictly in priority order (library, binary, alternate
// library, direct HTTP). The first candidate that passes validation is moved
// out of the workspace and returned; every failure is recorded. The
// workspace is released before `acquire` returns on every path.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use super::errors::{AcquisitionError, AggregatedFailure, StrategyFailure};
use super::models::{AcquiredAudio, AcquisitionRequest, StrategyKind};
use super::runner::CommandRunner;
use super::settings::ExtractorSettings;
use super::strategies::{
    AcquisitionStrategy, AlternateLibraryExtractor, CliExtractor, DirectHttpFallback,
    LibraryExtractor,
};
use super::transport::TransportError;
use super::validator::ResultValidator;
use super::video_id::parse_source_url;
use super::workspace::{Workspace, WorkspaceManager};

pub struct StrategyChain {
    strategies: Vec<Box<dyn AcquisitionStrategy>>,
    workspaces: WorkspaceManager,
    validator: ResultValidator,
}

impl StrategyChain {
    /// Empty chain; add strategies with [`with_strategy`](Self::with_strategy)
    pub fn new(workspaces: WorkspaceManager, validator: ResultValidator) -> Self {
        Self {
            strategies: Vec::new(),
            workspaces,
            validator,
        }
    }

    /// The four built-in strategies
    pub fn standard(
        workspaces: WorkspaceManager,
        validator: ResultValidator,
        settings: ExtractorSettings,
        runner: CommandRunner,
    ) -> Result<Self, TransportError> {
        let direct = DirectHttpFallback::new(settings.clone())?;

        Ok(Self::new(workspaces, validator)
            .with_strategy(LibraryExtractor::new(settings.clone(), runner.clone()))
            .with_strategy(CliExtractor::new(settings.clone(), runner.clone()))
            .with_strategy(AlternateLibraryExtractor::new(settings, runner))
            .with_strategy(direct))
    }

    pub fn with_strategy(mut self, strategy: impl AcquisitionStrategy + 'static) -> Self {
        self.add_strategy(Box::new(strategy));
        self
    }

    /// Insert a strategy at its priority slot. Insertion order never changes
    /// the attempt order.
    pub fn add_strategy(&mut self, strategy: Box<dyn AcquisitionStrategy>) {
        self.strategies.push(strategy);
        self.strategies.sort_by_key(|s| s.kind().priority());
    }

    /// Attempt order
    pub fn order(&self) -> Vec<StrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn validator(&self) -> &ResultValidator {
        &self.validator
    }

    /// Acquire audio for `url`.
    ///
    /// With `output` the artifact is moved there and kept. Without it the
    /// artifact lands next to the workspace root and is deleted when the
    /// returned handle is dropped, unless [`AcquiredAudio::keep`] is called.
    pub async fn acquire(
        &self,
        url: &str,
        output: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<AcquiredAudio, AcquisitionError> {
        let source = parse_source_url(url)?;
        if self.strategies.is_empty() {
            return Err(AcquisitionError::NoStrategies);
        }

        let workspace = self
            .workspaces
            .allocate()
            .await
            .map_err(AcquisitionError::Workspace)?;
        let request = AcquisitionRequest::new(source.as_str(), workspace.path());

        let span = info_span!(
            "acquire",
            url = %request.source_url,
            workspace = %workspace.id(),
        );
        let result = self
            .run_strategies(&request, &workspace, output, cancel)
            .instrument(span)
            .await;

        workspace.release().await;
        result
    }

    async fn run_strategies(
        &self,
        request: &AcquisitionRequest,
        workspace: &Workspace,
        output: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<AcquiredAudio, AcquisitionError> {
        let mut failures: Vec<StrategyFailure> = Vec::new();

        for strategy in &self.strategies {
            let kind = strategy.kind();
            if cancel.is_cancelled() {
                info!(recorded = failures.len(), "acquisition cancelled");
                return Err(AcquisitionError::Cancelled { attempts: failures });
            }

            if let Err(reason) = strategy.check_precondition(request).await {
                let failure = StrategyFailure::precondition(kind, reason);
                info!(strategy = %kind, reason = %failure.message, "skipping strategy");
                failures.push(failure);
                continue;
            }

            info!(strategy = %kind, "attempting strategy");
            let failure = match strategy.attempt(request, cancel).await {
                Ok(candidate) => match self.validator.inspect(&candidate).await {
                    Ok(size) => {
                        return self
                            .hand_over(workspace, request, kind, candidate, size, output, failures)
                            .await;
                    }
                    Err(e) => StrategyFailure::validation(kind, &e),
                },
                Err(failure) => failure,
            };

            warn!(
                strategy = %kind,
                kind = %failure.kind,
                error = %failure.message,
                hint = failure.hint().unwrap_or(""),
                "strategy failed"
            );
            failures.push(failure);

            match workspace.clear().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "cleared partial files"),
                Err(e) => warn!(error = %e, "failed to clear workspace"),
            }

            if cancel.is_cancelled() {
                info!(recorded = failures.len(), "acquisition cancelled");
                return Err(AcquisitionError::Cancelled { attempts: failures });
            }
        }

        match AggregatedFailure::from_attempts(failures) {
            Some(aggregated) => {
                warn!(
                    attempted = aggregated.attempted_count(),
                    error = %aggregated.primary(),
                    "all strategies failed"
                );
                Err(AcquisitionError::Exhausted(aggregated))
            }
            None => Err(AcquisitionError::NoStrategies),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn hand_over(
        &self,
        workspace: &Workspace,
        request: &AcquisitionRequest,
        kind: StrategyKind,
        candidate: PathBuf,
        size: u64,
        output: Option<&Path>,
        failures: Vec<StrategyFailure>,
    ) -> Result<AcquiredAudio, AcquisitionError> {
        let destination = match output {
            Some(path) => path.to_path_buf(),
            None => {
                let extension = candidate
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("mp3");
                workspace.sibling_path(extension)
            }
        };

        if let Err(source) = workspace.relocate(&candidate, &destination).await {
            return Err(AcquisitionError::Handover {
                path: destination,
                source,
                attempts: failures,
            });
        }

        info!(
            strategy = %kind,
            size_bytes = size,
            path = %destination.display(),
            "acquired audio"
        );

        let video_id = request.video_id.clone();
        Ok(match output {
            Some(_) => AcquiredAudio::persistent(destination, size, kind, video_id, failures),
            None => AcquiredAudio::temporary(destination, size, kind, video_id, failures),
        })
    }
}
