// Python host - runs library-based strategies inside an interpreter
//
// yt_dlp and pytube are Python libraries. We drive them by running a short
// script in a child interpreter through the command runner, so they get the
// same timeout, cancellation and process-group handling as any binary.

use std::path::{Path, PathBuf};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::acquisition::runner::{CommandRunner, CommandSpec};
use crate::acquisition::tools;

pub struct PythonHost {
    interpreter: Option<PathBuf>,
    module: &'static str,
    runner: CommandRunner,
    // Set after the first successful import check; failures are retried
    module_check: OnceCell<()>,
}

impl PythonHost {
    pub fn new(interpreter: Option<PathBuf>, module: &'static str, runner: CommandRunner) -> Self {
        Self {
            interpreter,
            module,
            runner,
            module_check: OnceCell::new(),
        }
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn interpreter(&self) -> Option<&Path> {
        self.interpreter.as_deref()
    }

    /// Interpreter path once the module is known to be importable
    pub async fn ensure_module(&self) -> Result<&Path, String> {
        let interpreter = self
            .interpreter
            .as_deref()
            .ok_or_else(|| "python interpreter not found".to_string())?;

        self.module_check
            .get_or_try_init(|| async {
                match tools::python_module_version(&self.runner, interpreter, self.module).await {
                    Some(version) => {
                        debug!(module = self.module, version = %version, "python module available");
                        Ok(())
                    }
                    None => Err(format!(
                        "python module '{}' is not importable by {}",
                        self.module,
                        interpreter.display()
                    )),
                }
            })
            .await?;

        Ok(interpreter)
    }

    /// `python -c <script>` with unbuffered UTF-8 output
    pub fn script(interpreter: &Path, script: &str) -> CommandSpec {
        CommandSpec::new(interpreter)
            .arg("-c")
            .arg(script)
            .env("PYTHONUNBUFFERED", "1")
            .env("PYTHONIOENCODING", "utf-8")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::write_script;

    #[tokio::test]
    async fn module_check_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("calls.log");
        let python = write_script(
            dir.path(),
            "python3",
            &format!("echo \"$3\" >> {}\necho 2025.01.01", log.display()),
        );

        let host = PythonHost::new(Some(python.clone()), "yt_dlp", CommandRunner::new());
        assert_eq!(host.ensure_module().await, Ok(python.as_path()));
        assert_eq!(host.ensure_module().await, Ok(python.as_path()));

        let calls = std::fs::read_to_string(&log).unwrap();
        assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["yt_dlp"]);
    }

    #[tokio::test]
    async fn missing_module_fails_the_check() {
        let dir = tempfile::tempdir().unwrap();
        let python = write_script(
            dir.path(),
            "python3",
            "echo \"ModuleNotFoundError: No module named '$3'\" >&2\nexit 1",
        );

        let host = PythonHost::new(Some(python), "pytube", CommandRunner::new());
        let err = host.ensure_module().await.unwrap_err();
        assert!(err.contains("'pytube' is not importable"));
    }

    #[tokio::test]
    async fn failed_check_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("installed");
        let python = write_script(
            dir.path(),
            "python3",
            &format!("[ -f {} ] || exit 1\necho 15.0.0", marker.display()),
        );

        let host = PythonHost::new(Some(python.clone()), "pytube", CommandRunner::new());
        assert!(host.ensure_module().await.is_err());

        std::fs::write(&marker, b"").unwrap();
        assert_eq!(host.ensure_module().await, Ok(python.as_path()));

        // a success is cached
        std::fs::remove_file(&marker).unwrap();
        assert_eq!(host.ensure_module().await, Ok(python.as_path()));
    }

    #[tokio::test]
    async fn missing_interpreter_fails_the_check() {
        let host = PythonHost::new(None, "yt_dlp", CommandRunner::new());
        assert_eq!(
            host.ensure_module().await,
            Err("python interpreter not found".to_string())
        );
    }
}
