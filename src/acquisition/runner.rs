// Command runner - executes external tools with a hard deadline
//
// Every child runs in its own process group. On timeout, cancellation or
// even after a normal exit the whole group is killed, so helpers spawned by
// the tool (ffmpeg under yt-dlp, for example) never outlive the attempt.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default deadline for tool probes (`--version` and friends)
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Description of one external command
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.envs
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (key, value) in vars {
            self = self.env(key, value);
        }
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Short program name used in messages ("yt-dlp", "python3")
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    fn to_command(&self) -> TokioCommand {
        let mut command = TokioCommand::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Last `lines` non-empty lines of stderr
    pub fn stderr_tail(&self, lines: usize) -> String {
        let stderr = self.stderr_lossy();
        let kept: Vec<&str> = stderr
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .collect();
        let start = kept.len().saturating_sub(lines);
        kept[start..].join("\n")
    }

    fn from_parts(status: ExitStatus, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            exit_code: status.code(),
            stdout,
            stderr,
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("execution timed out after {after:?} ({program})")]
    TimedOut { program: String, after: Duration },

    #[error("{program} was cancelled")]
    Cancelled { program: String },

    #[error("i/o error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

enum Waited {
    Exited(io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Kills the child's process group when asked or when dropped
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            // SAFETY: kill(2) with a negative pid signals the process group.
            let rc = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
            if rc != 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ESRCH) {
                    warn!(pgid, error = %err, "failed to kill process group");
                }
            }
        }
    }

    /// Kill members left behind after the leader has been reaped. The pgid
    /// is only reserved while the group has members, so an empty group is
    /// never signalled by number.
    #[cfg(unix)]
    fn kill_stragglers(&mut self) {
        if let Some(pgid) = self.pgid {
            // SAFETY: signal 0 only checks that the group exists.
            let rc = unsafe { libc::kill(-(pgid as libc::pid_t), 0) };
            if rc != 0 {
                self.pgid = None;
                return;
            }
        }
        self.kill();
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }

    #[cfg(not(unix))]
    fn kill_stragglers(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Runs external commands with a deadline and a cancellation token
#[derive(Debug, Clone, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `spec` to completion, or kill it when `limit` elapses or `cancel`
    /// fires. The child is always reaped before this returns.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        limit: Duration,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, RunError> {
        let program = spec.program_name();
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled { program });
        }

        let mut command = spec.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        debug!(command = %spec, timeout = ?limit, "spawning");
        let mut child = command.spawn().map_err(|source| RunError::Spawn {
            program: program.clone(),
            source,
        })?;
        let mut group = ProcessGroup::new(child.id());

        let stdout_task = match child.stdout.take() {
            Some(pipe) => drain(pipe),
            None => tokio::spawn(async { Ok(Vec::new()) }),
        };
        let stderr_task = match child.stderr.take() {
            Some(pipe) => drain(pipe),
            None => tokio::spawn(async { Ok(Vec::new()) }),
        };

        let waited = tokio::select! {
            res = timeout(limit, child.wait()) => match res {
                Ok(status) => Waited::Exited(status),
                Err(_) => Waited::TimedOut,
            },
            _ = cancel.cancelled() => Waited::Cancelled,
        };

        // Helpers left behind by the tool would keep the pipes open
        match waited {
            Waited::Exited(_) => group.kill_stragglers(),
            Waited::TimedOut | Waited::Cancelled => group.kill(),
        }

        let status = match waited {
            Waited::Exited(Ok(status)) => status,
            Waited::Exited(Err(source)) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(RunError::Io { program, source });
            }
            Waited::TimedOut => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                warn!(program = %program, timeout = ?limit, "command timed out, killed");
                return Err(RunError::TimedOut {
                    program,
                    after: limit,
                });
            }
            Waited::Cancelled => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                debug!(program = %program, "command cancelled, killed");
                return Err(RunError::Cancelled { program });
            }
        };

        let stdout = join_pipe(&program, stdout_task).await?;
        let stderr = join_pipe(&program, stderr_task).await?;
        let output = CommandOutput::from_parts(status, stdout, stderr);
        debug!(program = %program, exit_code = ?output.exit_code, "command finished");
        Ok(output)
    }

    /// Run a short probe and return the first stdout line on success
    pub async fn probe(&self, spec: &CommandSpec) -> Option<String> {
        let output = self
            .run(spec, PROBE_TIMEOUT, &CancellationToken::new())
            .await
            .ok()?;
        if !output.success() {
            return None;
        }
        let stdout = output.stdout_lossy();
        let first = stdout.lines().next().unwrap_or("").trim().to_string();
        Some(first)
    }
}

fn drain<R>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).await?;
        Ok(buf)
    })
}

async fn join_pipe(
    program: &str,
    task: JoinHandle<io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, RunError> {
    match task.await {
        Ok(Ok(buf)) => Ok(buf),
        Ok(Err(source)) => Err(RunError::Io {
            program: program.to_string(),
            source,
        }),
        Err(join) => Err(RunError::Io {
            program: program.to_string(),
            source: io::Error::new(io::ErrorKind::Other, join),
        }),
    }
}
