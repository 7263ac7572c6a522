//! Model runner abstraction and the llama.cpp process invoker

mod llama;
mod locate;

pub use llama::{invoke, LlamaCppRunner};
pub use locate::{diagnose, has_blocking, locate_executable, SetupIssue, MIN_MODEL_BYTES};

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// Parameters for one call of the inference executable
#[derive(Debug, Clone)]
pub struct InferenceInvocation {
    pub executable: PathBuf,
    pub model: PathBuf,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub context_size: u32,
    pub batch_size: u32,
    pub threads: u32,
}

impl InferenceInvocation {
    /// Argument vector passed to the executable
    pub fn args(&self) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.model.display().to_string(),
            "-p".to_string(),
            self.prompt.clone(),
            "-n".to_string(),
            self.max_tokens.to_string(),
            "--temp".to_string(),
            self.temperature.to_string(),
            "-c".to_string(),
            self.context_size.to_string(),
            "--no-display-prompt".to_string(),
            "-b".to_string(),
            self.batch_size.to_string(),
            "-t".to_string(),
            self.threads.to_string(),
            "--silent-prompt".to_string(),
        ]
    }
}

/// Classified result of one inference call
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    /// Exit 0 with output (trimmed)
    Success(String),
    /// Exit 0 but nothing on stdout
    Empty,
    /// Wall-clock limit hit; the child was killed
    Timeout,
    /// Non-zero exit, or a spawn failure other than a missing executable
    ProcessError {
        exit_code: Option<i32>,
        stderr: String,
    },
    ExecutableNotFound,
    ModelNotFound,
}

impl InferenceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, InferenceOutcome::Success(_))
    }
}

impl fmt::Display for InferenceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferenceOutcome::Success(text) => {
                write!(f, "{} chars of output", text.chars().count())
            }
            InferenceOutcome::Empty => write!(f, "LLM produced no output"),
            InferenceOutcome::Timeout => write!(f, "LLM request timed out"),
            InferenceOutcome::ProcessError {
                exit_code: Some(code),
                stderr,
            } => write!(f, "llama.cpp exited with code {}: {}", code, stderr),
            InferenceOutcome::ProcessError {
                exit_code: None,
                stderr,
            } => write!(f, "llama.cpp failed: {}", stderr),
            InferenceOutcome::ExecutableNotFound => write!(f, "llama.cpp executable not found"),
            InferenceOutcome::ModelNotFound => write!(f, "model file not found"),
        }
    }
}

/// Trait for anything that turns a prompt into model output
#[async_trait]
pub trait ModelRunner: Send + Sync {
    /// Runner name for logging/identification
    fn name(&self) -> &str;

    /// Run one inference call
    async fn generate(&self, prompt: &str) -> InferenceOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_order() {
        let invocation = InferenceInvocation {
            executable: PathBuf::from("/usr/local/bin/llama-main"),
            model: PathBuf::from("/models/m.gguf"),
            prompt: "Hello".to_string(),
            max_tokens: 512,
            temperature: 0.7,
            context_size: 2048,
            batch_size: 1,
            threads: 4,
        };

        assert_eq!(
            invocation.args(),
            vec![
                "-m", "/models/m.gguf", "-p", "Hello", "-n", "512", "--temp", "0.7", "-c",
                "2048", "--no-display-prompt", "-b", "1", "-t", "4", "--silent-prompt",
            ]
        );
    }

    #[test]
    fn test_outcome_display() {
        let outcome = InferenceOutcome::ProcessError {
            exit_code: Some(2),
            stderr: "bad model".to_string(),
        };
        assert_eq!(outcome.to_string(), "llama.cpp exited with code 2: bad model");
        assert!(!outcome.is_success());
        assert!(InferenceOutcome::Success("hi".to_string()).is_success());
        assert_eq!(
            InferenceOutcome::Success("héllo".to_string()).to_string(),
            "5 chars of output"
        );
    }
}
