// Tool inventory - finds the external programs the strategies depend on

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::runner::{CommandRunner, CommandSpec};

/// Python modules the library strategies host
pub const PYTHON_MODULES: [&str; 2] = ["yt_dlp", "pytube"];

const COMMON_DIRS: [&str; 3] = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

// Prints the module version (or an empty line) when the import succeeds
const MODULE_VERSION_SCRIPT: &str = "import importlib, sys\n\
m = importlib.import_module(sys.argv[1])\n\
v = getattr(m, '__version__', None) or getattr(getattr(m, 'version', None), '__version__', '')\n\
print(v)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    YtDlp,
    Ffmpeg,
    Python,
    Whisper,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::YtDlp,
        ToolKind::Ffmpeg,
        ToolKind::Python,
        ToolKind::Whisper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::YtDlp => "yt-dlp",
            ToolKind::Ffmpeg => "ffmpeg",
            ToolKind::Python => "python",
            ToolKind::Whisper => "whisper",
        }
    }

    /// Environment variables that pin the binary, checked in order
    fn env_overrides(&self) -> &'static [&'static str] {
        match self {
            ToolKind::YtDlp => &["TUBESCRIBE_YTDLP"],
            ToolKind::Ffmpeg => &["TUBESCRIBE_FFMPEG"],
            ToolKind::Python => &["TUBESCRIBE_PYTHON", "YTDLP_PYTHON"],
            ToolKind::Whisper => &["TUBESCRIBE_WHISPER", "WHISPER_PATH"],
        }
    }

    fn binary_names(&self) -> &'static [&'static str] {
        match self {
            ToolKind::YtDlp => &["yt-dlp"],
            ToolKind::Ffmpeg => &["ffmpeg"],
            ToolKind::Python => &["python3", "python"],
            ToolKind::Whisper => &["whisper"],
        }
    }

    fn version_args(&self) -> Option<&'static [&'static str]> {
        match self {
            ToolKind::YtDlp => Some(&["--version"]),
            ToolKind::Ffmpeg => Some(&["-version"]),
            ToolKind::Python => Some(&["--version"]),
            // whisper has no version flag
            ToolKind::Whisper => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub kind: ToolKind,
    pub path: Option<PathBuf>,
    pub version: Option<String>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub version: Option<String>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolReport {
    pub tools: Vec<ToolInfo>,
    pub python_modules: Vec<ModuleInfo>,
}

impl ToolReport {
    pub fn tool(&self, kind: ToolKind) -> Option<&ToolInfo> {
        self.tools.iter().find(|t| t.kind == kind)
    }
}

/// Locate a tool using the process environment and `PATH`
pub fn locate(kind: ToolKind) -> Option<PathBuf> {
    locate_with(kind, |key| std::env::var(key).ok())
}

/// Locate a tool: explicit env override, then `PATH`, then common install dirs
pub fn locate_with<F>(kind: ToolKind, lookup: F) -> Option<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    for key in kind.env_overrides() {
        if let Some(custom) = lookup(key).filter(|v| !v.trim().is_empty()) {
            return Some(PathBuf::from(custom.trim()));
        }
    }

    for name in kind.binary_names() {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    for dir in COMMON_DIRS {
        for name in kind.binary_names() {
            let candidate = Path::new(dir).join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    None
}

/// Resolve an explicit path or fall back to discovery
pub fn resolve(explicit: Option<&Path>, kind: ToolKind) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => locate(kind),
    }
}

pub async fn inspect(runner: &CommandRunner, kind: ToolKind) -> ToolInfo {
    inspect_at(runner, kind, locate(kind)).await
}

pub async fn inspect_at(runner: &CommandRunner, kind: ToolKind, path: Option<PathBuf>) -> ToolInfo {
    let version = match (&path, kind.version_args()) {
        (Some(path), Some(args)) => runner.probe(&CommandSpec::new(path).args(args)).await,
        _ => None,
    };
    let is_available = match kind.version_args() {
        Some(_) => version.is_some(),
        None => path.as_deref().map_or(false, Path::is_file),
    };

    ToolInfo {
        name: kind.as_str().to_string(),
        kind,
        path,
        version: version.filter(|v| !v.is_empty()),
        is_available,
    }
}

/// Version of an importable Python module, `None` when the import fails
pub async fn python_module_version(
    runner: &CommandRunner,
    python: &Path,
    module: &str,
) -> Option<String> {
    let spec = CommandSpec::new(python)
        .arg("-c")
        .arg(MODULE_VERSION_SCRIPT)
        .arg(module);
    runner.probe(&spec).await
}

/// Inventory of every tool and Python module
pub async fn report(runner: &CommandRunner) -> ToolReport {
    let mut tools = Vec::with_capacity(ToolKind::ALL.len());
    for kind in ToolKind::ALL {
        tools.push(inspect(runner, kind).await);
    }

    let python = tools
        .iter()
        .find(|t| t.kind == ToolKind::Python && t.is_available)
        .and_then(|t| t.path.clone());

    let mut python_modules = Vec::with_capacity(PYTHON_MODULES.len());
    for module in PYTHON_MODULES {
        let version = match &python {
            Some(python) => python_module_version(runner, python, module).await,
            None => None,
        };
        python_modules.push(ModuleInfo {
            name: module.to_string(),
            is_available: version.is_some(),
            version: version.filter(|v| !v.is_empty()),
        });
    }

    ToolReport {
        tools,
        python_modules,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        let path = locate_with(ToolKind::YtDlp, |key| {
            (key == "TUBESCRIBE_YTDLP").then(|| "/custom/yt-dlp".to_string())
        });
        assert_eq!(path, Some(PathBuf::from("/custom/yt-dlp")));
    }

    #[test]
    fn legacy_python_override_is_honoured() {
        let path = locate_with(ToolKind::Python, |key| {
            (key == "YTDLP_PYTHON").then(|| "/venv/bin/python".to_string())
        });
        assert_eq!(path, Some(PathBuf::from("/venv/bin/python")));
    }

    #[test]
    fn explicit_path_skips_discovery() {
        assert_eq!(
            resolve(Some(Path::new("/x/ffmpeg")), ToolKind::Ffmpeg),
            Some(PathBuf::from("/x/ffmpeg"))
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn inspect_reads_version_from_fake_binary() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("yt-dlp");
        std::fs::write(&fake, "#!/bin/sh\necho 2025.01.15\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let info = inspect_at(&CommandRunner::new(), ToolKind::YtDlp, Some(fake.clone())).await;
        assert!(info.is_available);
        assert_eq!(info.version.as_deref(), Some("2025.01.15"));
        assert_eq!(info.path, Some(fake));
    }

    #[tokio::test]
    async fn missing_tool_is_unavailable() {
        let info = inspect_at(&CommandRunner::new(), ToolKind::Ffmpeg, None).await;
        assert!(!info.is_available);
        assert!(info.version.is_none());
    }
}
