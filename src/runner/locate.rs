//! Executable resolution and setup diagnostics

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Models smaller than this are probably truncated downloads
pub const MIN_MODEL_BYTES: u64 = 100 * 1024 * 1024;

const FALLBACK_NAME: &str = "llama-main";

/// Find the llama.cpp executable among the candidates, then on PATH
pub fn locate_executable(candidates: &[PathBuf]) -> Option<PathBuf> {
    for candidate in candidates {
        if is_bare_name(candidate) {
            if let Some(found) = search_path(candidate) {
                debug!(path = %found.display(), "Found llama.cpp on PATH");
                return Some(found);
            }
        } else if is_executable(candidate) {
            debug!(path = %candidate.display(), "Found llama.cpp");
            return Some(candidate.clone());
        }
    }

    search_path(Path::new(FALLBACK_NAME))
}

fn is_bare_name(path: &Path) -> bool {
    path.components().count() == 1 && !path.is_absolute()
}

fn search_path(name: &Path) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Problems found by [`diagnose`]
#[derive(Debug, Clone, PartialEq)]
pub enum SetupIssue {
    ModelPathUnset,
    ModelMissing(PathBuf),
    ModelTooSmall { path: PathBuf, bytes: u64 },
    ModelUnreadable { path: PathBuf, error: String },
    ExecutableMissing,
    ExecutableBroken { path: PathBuf, error: String },
}

impl SetupIssue {
    /// Warnings do not stop the server from starting
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            SetupIssue::ModelTooSmall { .. }
                | SetupIssue::ExecutableMissing
                | SetupIssue::ExecutableBroken { .. }
        )
    }
}

/// True when any issue is more than a warning
pub fn has_blocking(issues: &[SetupIssue]) -> bool {
    issues.iter().any(|issue| !issue.is_warning())
}

impl fmt::Display for SetupIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupIssue::ModelPathUnset => write!(f, "MODEL_PATH environment variable not set"),
            SetupIssue::ModelMissing(path) => {
                write!(f, "Model file not found: {}", path.display())
            }
            SetupIssue::ModelTooSmall { bytes, .. } => {
                write!(f, "Model file seems too small: {} bytes", bytes)
            }
            SetupIssue::ModelUnreadable { error, .. } => {
                write!(f, "Cannot access model file: {}", error)
            }
            SetupIssue::ExecutableMissing => write!(f, "llama.cpp executable not found"),
            SetupIssue::ExecutableBroken { error, .. } => {
                write!(f, "Cannot execute llama.cpp: {}", error)
            }
        }
    }
}

/// Check the model file and the executable, probing the latter with `--help`
pub async fn diagnose(model_path: Option<&Path>, candidates: &[PathBuf]) -> Vec<SetupIssue> {
    let mut issues = Vec::new();

    match model_path {
        None => issues.push(SetupIssue::ModelPathUnset),
        Some(path) if !path.exists() => issues.push(SetupIssue::ModelMissing(path.to_path_buf())),
        Some(path) => match std::fs::metadata(path) {
            Ok(meta) if meta.len() < MIN_MODEL_BYTES => issues.push(SetupIssue::ModelTooSmall {
                path: path.to_path_buf(),
                bytes: meta.len(),
            }),
            Ok(_) => {}
            Err(e) => issues.push(SetupIssue::ModelUnreadable {
                path: path.to_path_buf(),
                error: e.to_string(),
            }),
        },
    }

    match locate_executable(candidates) {
        None => issues.push(SetupIssue::ExecutableMissing),
        Some(path) => {
            if let Err(error) = probe_executable(&path).await {
                issues.push(SetupIssue::ExecutableBroken { path, error });
            }
        }
    }

    issues
}

async fn probe_executable(path: &Path) -> Result<(), String> {
    let mut command = Command::new(path);
    command
        .arg("--help")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(Duration::from_secs(5), command.status()).await {
        Ok(Ok(status)) if status.success() => Ok(()),
        Ok(Ok(_)) => Err("executable doesn't run properly".to_string()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("--help did not return within 5s".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_name_detection() {
        assert!(is_bare_name(Path::new("llama-main")));
        assert!(!is_bare_name(Path::new("/usr/local/bin/llama-main")));
        assert!(!is_bare_name(Path::new("build/bin/main")));
    }

    #[test]
    fn test_missing_candidates() {
        let candidates = vec![PathBuf::from("/nonexistent/llama.cpp/main")];
        let found = locate_executable(&candidates);
        // Only a PATH-installed llama-main could satisfy this
        if let Some(path) = found {
            assert!(path.ends_with(FALLBACK_NAME));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_locates_first_executable_candidate() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let not_exec = dir.path().join("plain");
        let exec = dir.path().join("main");
        std::fs::write(&not_exec, "data").unwrap();
        std::fs::write(&exec, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&exec, std::fs::Permissions::from_mode(0o755)).unwrap();

        let candidates = vec![
            dir.path().join("missing"),
            not_exec,
            exec.clone(),
        ];
        assert_eq!(locate_executable(&candidates), Some(exec));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_diagnose_small_model() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("tiny.gguf");
        std::fs::write(&model, vec![0u8; 1024]).unwrap();
        let exec = dir.path().join("main");
        std::fs::write(&exec, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&exec, std::fs::Permissions::from_mode(0o755)).unwrap();

        let issues = diagnose(Some(&model), &[exec]).await;
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], SetupIssue::ModelTooSmall { bytes: 1024, .. }));
        assert!(issues[0].is_warning());
        assert!(!has_blocking(&issues));
    }

    #[tokio::test]
    async fn test_diagnose_unset_model() {
        let issues = diagnose(None, &[]).await;
        assert_eq!(issues[0], SetupIssue::ModelPathUnset);
        assert!(!issues[0].is_warning());
        assert!(has_blocking(&issues));
    }

    #[test]
    fn test_blocking_mix() {
        let issues = vec![
            SetupIssue::ModelTooSmall {
                path: PathBuf::from("/models/tiny.gguf"),
                bytes: 10,
            },
            SetupIssue::ExecutableMissing,
        ];
        assert!(!has_blocking(&issues));
        assert!(!has_blocking(&[]));

        let issues = vec![
            SetupIssue::ExecutableMissing,
            SetupIssue::ModelMissing(PathBuf::from("/models/gone.gguf")),
        ];
        assert!(has_blocking(&issues));
    }
}
