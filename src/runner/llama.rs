//! llama.cpp CLI runner

use super::{locate_executable, InferenceInvocation, InferenceOutcome, ModelRunner};
use crate::{AgentConfig, InferenceConfig};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Runs one llama.cpp process per prompt
pub struct LlamaCppRunner {
    model_path: PathBuf,
    settings: InferenceConfig,
    name: String,
}

impl LlamaCppRunner {
    pub fn new(model_path: impl Into<PathBuf>, settings: InferenceConfig) -> Self {
        let model_path = model_path.into();
        let name = format!(
            "llama.cpp:{}",
            model_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        );

        Self {
            model_path,
            settings,
            name,
        }
    }

    /// Build from server config; `None` when MODEL_PATH is unset
    pub fn from_config(config: &AgentConfig) -> Option<Self> {
        config
            .model_path
            .as_ref()
            .map(|path| Self::new(path, config.inference.clone()))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.settings.timeout_secs)
    }
}

#[async_trait]
impl ModelRunner for LlamaCppRunner {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> InferenceOutcome {
        if !self.model_path.exists() {
            warn!(model = %self.model_path.display(), "Model file not found");
            return InferenceOutcome::ModelNotFound;
        }

        let Some(executable) = locate_executable(&self.settings.executable_paths) else {
            warn!(
                searched = ?self.settings.executable_paths,
                "llama.cpp executable not found"
            );
            return InferenceOutcome::ExecutableNotFound;
        };

        let invocation = InferenceInvocation {
            executable,
            model: self.model_path.clone(),
            prompt: prompt.to_string(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            context_size: self.settings.context_size,
            batch_size: self.settings.batch_size,
            threads: self.settings.threads,
        };

        invoke(&invocation, self.timeout()).await
    }
}

/// Spawn the executable once and classify how it ended
///
/// The child is spawned with `kill_on_drop`, so hitting the timeout (or the
/// caller dropping this future) kills it rather than leaving it running.
pub async fn invoke(invocation: &InferenceInvocation, timeout: Duration) -> InferenceOutcome {
    if !invocation.model.exists() {
        return InferenceOutcome::ModelNotFound;
    }

    info!(
        executable = %invocation.executable.display(),
        model = %invocation.model.display(),
        prompt_chars = invocation.prompt.chars().count(),
        "Running llama.cpp"
    );

    let mut command = Command::new(&invocation.executable);
    command
        .args(invocation.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                executable = %invocation.executable.display(),
                "Executable vanished before spawn"
            );
            return InferenceOutcome::ExecutableNotFound;
        }
        Err(e) => {
            warn!(error = %e, "Failed to spawn llama.cpp");
            return InferenceOutcome::ProcessError {
                exit_code: None,
                stderr: e.to_string(),
            };
        }
    };

    let start = Instant::now();
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(error = %e, "Failed waiting on llama.cpp");
            return InferenceOutcome::ProcessError {
                exit_code: None,
                stderr: e.to_string(),
            };
        }
        Err(_) => {
            warn!(timeout_secs = timeout.as_secs(), "llama.cpp timed out, child killed");
            return InferenceOutcome::Timeout;
        }
    };

    let elapsed_ms = start.elapsed().as_millis() as u64;

    if output.status.success() {
        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(elapsed_ms, output_chars = text.chars().count(), "llama.cpp finished");
        if text.is_empty() {
            InferenceOutcome::Empty
        } else {
            InferenceOutcome::Success(text)
        }
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            "Unknown error".to_string()
        } else {
            stderr
        };
        warn!(elapsed_ms, exit_code = ?output.status.code(), "llama.cpp exited with error");
        InferenceOutcome::ProcessError {
            exit_code: output.status.code(),
            stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_creation() {
        let runner = LlamaCppRunner::new("/models/phi-3-mini.gguf", InferenceConfig::default());
        assert_eq!(runner.name(), "llama.cpp:phi-3-mini.gguf");
        assert_eq!(runner.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_config_requires_model() {
        assert!(LlamaCppRunner::from_config(&AgentConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_missing_model() {
        let runner = LlamaCppRunner::new("/nonexistent/model.gguf", InferenceConfig::default());
        assert_eq!(runner.generate("hi").await, InferenceOutcome::ModelNotFound);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        /// Fake llama.cpp: a shell script plus a dummy model file
        fn fake_runner(script: &str, timeout_secs: u64) -> (TempDir, LlamaCppRunner) {
            let dir = tempfile::tempdir().unwrap();
            let exec = dir.path().join("main");
            std::fs::write(&exec, format!("#!/bin/sh\n{}\n", script)).unwrap();
            std::fs::set_permissions(&exec, std::fs::Permissions::from_mode(0o755)).unwrap();
            let model = dir.path().join("model.gguf");
            std::fs::write(&model, b"gguf").unwrap();

            let settings = InferenceConfig {
                executable_paths: vec![exec],
                timeout_secs,
                ..InferenceConfig::default()
            };
            let runner = LlamaCppRunner::new(model, settings);
            (dir, runner)
        }

        #[tokio::test]
        async fn test_success_is_trimmed() {
            let (_dir, runner) = fake_runner("echo '  Hello there!  '", 10);
            assert_eq!(
                runner.generate("hi").await,
                InferenceOutcome::Success("Hello there!".to_string())
            );
        }

        #[tokio::test]
        async fn test_prompt_is_passed_after_p_flag() {
            // Prints the argument following -p
            let (_dir, runner) = fake_runner(
                r#"while [ "$#" -gt 0 ]; do if [ "$1" = "-p" ]; then echo "$2"; fi; shift; done"#,
                10,
            );
            assert_eq!(
                runner.generate("what is rust?").await,
                InferenceOutcome::Success("what is rust?".to_string())
            );
        }

        #[tokio::test]
        async fn test_blank_output_is_empty() {
            let (_dir, runner) = fake_runner("echo '   '", 10);
            assert_eq!(runner.generate("hi").await, InferenceOutcome::Empty);
        }

        #[tokio::test]
        async fn test_nonzero_exit() {
            let (_dir, runner) = fake_runner("echo 'failed to load model' >&2; exit 3", 10);
            assert_eq!(
                runner.generate("hi").await,
                InferenceOutcome::ProcessError {
                    exit_code: Some(3),
                    stderr: "failed to load model".to_string(),
                }
            );
        }

        #[tokio::test]
        async fn test_nonzero_exit_without_stderr() {
            let (_dir, runner) = fake_runner("exit 1", 10);
            assert_eq!(
                runner.generate("hi").await,
                InferenceOutcome::ProcessError {
                    exit_code: Some(1),
                    stderr: "Unknown error".to_string(),
                }
            );
        }

        #[tokio::test]
        async fn test_no_executable_candidate() {
            let dir = tempfile::tempdir().unwrap();
            let model = dir.path().join("model.gguf");
            std::fs::write(&model, b"gguf").unwrap();

            let settings = InferenceConfig {
                executable_paths: vec![dir.path().join("nope")],
                ..InferenceConfig::default()
            };
            let runner = LlamaCppRunner::new(model, settings);
            let outcome = runner.generate("hi").await;

            // A PATH-installed llama-main would be picked up instead
            if locate_executable(&[dir.path().join("nope")]).is_none() {
                assert_eq!(outcome, InferenceOutcome::ExecutableNotFound);
            }
        }

        #[tokio::test]
        async fn test_invoke_missing_executable() {
            let dir = tempfile::tempdir().unwrap();
            let model = dir.path().join("model.gguf");
            std::fs::write(&model, b"gguf").unwrap();

            let invocation = InferenceInvocation {
                executable: dir.path().join("gone"),
                model,
                prompt: "hi".to_string(),
                max_tokens: 16,
                temperature: 0.7,
                context_size: 2048,
                batch_size: 1,
                threads: 1,
            };
            assert_eq!(
                invoke(&invocation, Duration::from_secs(5)).await,
                InferenceOutcome::ExecutableNotFound
            );
        }

        #[tokio::test]
        async fn test_timeout_is_bounded() {
            let (_dir, runner) = fake_runner("sleep 30", 1);
            let start = Instant::now();
            assert_eq!(runner.generate("hi").await, InferenceOutcome::Timeout);
            assert!(start.elapsed() < Duration::from_secs(10));
        }
    }
}
