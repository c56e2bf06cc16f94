// Error types for the acquisition chain

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use super::diagnostics::{diagnose_error, BlockingReason};
use super::models::StrategyKind;
use super::runner::{CommandOutput, RunError};
use super::validator::ValidationError;

/// Why a single strategy did not produce an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Strategy was skipped; its requirements are not available for this request
    PreconditionUnmet,
    /// Network, certificate or timeout problem
    Transport,
    /// External program exited non-zero or produced no output file
    ExternalProcess,
    /// A file was produced but rejected by the result validator
    Validation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreconditionUnmet => write!(f, "precondition unmet"),
            Self::Transport => write!(f, "transport failure"),
            Self::ExternalProcess => write!(f, "external process failure"),
            Self::Validation => write!(f, "validation failure"),
        }
    }
}

/// One recorded failure of one strategy
#[derive(Debug, Clone, Serialize, Error)]
#[error("{strategy}: {message}")]
pub struct StrategyFailure {
    pub strategy: StrategyKind,
    pub kind: FailureKind,
    pub message: String,
    /// Blocking reason recognised in the error text, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking: Option<BlockingReason>,
}

impl StrategyFailure {
    fn new(strategy: StrategyKind, kind: FailureKind, message: String) -> Self {
        let blocking = match kind {
            FailureKind::PreconditionUnmet | FailureKind::Validation => None,
            FailureKind::Transport | FailureKind::ExternalProcess => diagnose_error(&message),
        };

        Self {
            strategy,
            kind,
            message,
            blocking,
        }
    }

    pub fn precondition(strategy: StrategyKind, reason: impl fmt::Display) -> Self {
        Self::new(
            strategy,
            FailureKind::PreconditionUnmet,
            format!("precondition not met: {}", reason),
        )
    }

    pub fn transport(strategy: StrategyKind, message: impl Into<String>) -> Self {
        Self::new(strategy, FailureKind::Transport, message.into())
    }

    pub fn external_process(strategy: StrategyKind, message: impl Into<String>) -> Self {
        Self::new(strategy, FailureKind::ExternalProcess, message.into())
    }

    pub fn validation(strategy: StrategyKind, err: &ValidationError) -> Self {
        Self::new(
            strategy,
            FailureKind::Validation,
            format!("artifact rejected: {}", err),
        )
    }

    /// Map a command runner error. Timeouts and cancellation are transport
    /// problems, never exit-code failures.
    pub fn from_run_error(strategy: StrategyKind, err: &RunError) -> Self {
        match err {
            RunError::TimedOut { .. } | RunError::Cancelled { .. } => {
                Self::transport(strategy, err.to_string())
            }
            RunError::Spawn { .. } | RunError::Io { .. } => {
                Self::external_process(strategy, err.to_string())
            }
        }
    }

    /// Build a failure from a finished command with a non-zero exit code
    pub fn from_exit(strategy: StrategyKind, program: &str, output: &CommandOutput) -> Self {
        let code = output
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr = output.stderr_tail(12);

        let message = if stderr.is_empty() {
            format!("{} exited with code {}", program, code)
        } else {
            format!("{} exited with code {}: {}", program, code, stderr)
        };

        Self::external_process(strategy, message)
    }

    /// Whether the strategy was skipped instead of attempted
    pub fn is_skip(&self) -> bool {
        self.kind == FailureKind::PreconditionUnmet
    }

    /// Short remediation hint for the recognised blocking reason
    pub fn hint(&self) -> Option<&'static str> {
        self.blocking.map(|reason| reason.hint())
    }
}

/// Every failure recorded by an exhausted chain, in attempt order.
///
/// Never empty: the last entry is the primary cause shown to callers.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedFailure {
    attempts: Vec<StrategyFailure>,
}

impl AggregatedFailure {
    /// Returns `None` when no failure was recorded
    pub fn from_attempts(attempts: Vec<StrategyFailure>) -> Option<Self> {
        if attempts.is_empty() {
            None
        } else {
            Some(Self { attempts })
        }
    }

    pub fn primary(&self) -> &StrategyFailure {
        // from_attempts guarantees at least one entry
        &self.attempts[self.attempts.len() - 1]
    }

    pub fn attempts(&self) -> &[StrategyFailure] {
        &self.attempts
    }

    pub fn into_attempts(self) -> Vec<StrategyFailure> {
        self.attempts
    }

    /// Number of strategies that actually ran (not skipped by precondition)
    pub fn attempted_count(&self) -> usize {
        self.attempts.iter().filter(|f| !f.is_skip()).count()
    }
}

impl fmt::Display for AggregatedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "all {} acquisition strategies failed; last error from {}",
            self.attempts.len(),
            self.primary()
        )
    }
}

impl StdError for AggregatedFailure {}

/// Error returned by [`StrategyChain`](super::StrategyChain)
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("invalid source url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to hand over artifact to {path}: {source}")]
    Handover {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        /// Failures recorded before the winning strategy
        attempts: Vec<StrategyFailure>,
    },

    #[error("no acquisition strategies configured")]
    NoStrategies,

    #[error("acquisition cancelled after {} recorded attempt(s)", .attempts.len())]
    Cancelled { attempts: Vec<StrategyFailure> },

    #[error(transparent)]
    Exhausted(#[from] AggregatedFailure),
}

impl AcquisitionError {
    /// Whether the caller supplied bad input (maps to HTTP 400)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidUrl { .. })
    }

    /// Per-strategy history, empty when no strategy was reached
    pub fn attempts(&self) -> &[StrategyFailure] {
        match self {
            Self::Cancelled { attempts } | Self::Handover { attempts, .. } => attempts,
            Self::Exhausted(aggregated) => aggregated.attempts(),
            _ => &[],
        }
    }
}

/// Render an error with its whole source chain ("a: b: c")
pub fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
