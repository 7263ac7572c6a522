//! Execution gate for extracted directives
//!
//! The policy is static. With [`ExecutionPolicy::Disabled`] (the default) the
//! gate never runs anything. The enabled path runs the command through
//! `sh -c` with no sandbox, whitelist or privilege drop; it exists for
//! compatibility with older deployments and should stay off.

use crate::extract::CommandCandidate;
use crate::ExecutionPolicy;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

/// Reported in place of a command result when execution is disabled
pub const EXECUTION_DISABLED: &str = "Command execution disabled for security";

/// Output of a command the gate actually ran
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub command: String,
    /// stdout on success, an error description otherwise
    pub output: String,
    pub exit_code: Option<i32>,
}

/// Decides whether an extracted command is run
#[derive(Debug, Clone)]
pub struct ExecutionGate {
    policy: ExecutionPolicy,
    timeout: Duration,
}

impl ExecutionGate {
    pub fn new(policy: ExecutionPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    pub fn disabled() -> Self {
        Self::new(ExecutionPolicy::Disabled, Duration::from_secs(30))
    }

    pub fn policy(&self) -> ExecutionPolicy {
        self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.policy == ExecutionPolicy::Enabled
    }

    /// Run the candidate if policy allows and a valid command was extracted
    pub async fn maybe_execute(&self, candidate: &CommandCandidate) -> Option<ExecutionResult> {
        let command = candidate.command.as_deref()?;

        if !self.is_enabled() {
            info!(command, "Command found but execution is disabled");
            return None;
        }

        warn!(command, "Executing model-provided shell command");
        Some(self.run_shell(command).await)
    }

    async fn run_shell(&self, command: &str) -> ExecutionResult {
        let mut shell = Command::new("sh");
        shell
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match shell.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult {
                    command: command.to_string(),
                    output: format!("An unexpected error occurred: {}", e),
                    exit_code: None,
                };
            }
        };

        let (output, exit_code) =
            match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
                Ok(Ok(out)) if out.status.success() => (
                    String::from_utf8_lossy(&out.stdout).into_owned(),
                    out.status.code(),
                ),
                Ok(Ok(out)) => (
                    format!(
                        "Error executing command: {}",
                        String::from_utf8_lossy(&out.stderr)
                    ),
                    out.status.code(),
                ),
                Ok(Err(e)) => (format!("An unexpected error occurred: {}", e), None),
                Err(_) => (
                    format!("Command timed out after {}s", self.timeout.as_secs()),
                    None,
                ),
            };

        ExecutionResult {
            command: command.to_string(),
            output,
            exit_code,
        }
    }
}

impl Default for ExecutionGate {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{extract, wrap};

    fn enabled() -> ExecutionGate {
        ExecutionGate::new(ExecutionPolicy::Enabled, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_disabled_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let candidate = extract(&wrap(&format!("touch {}", marker.display())));
        assert!(candidate.is_present());

        let gate = ExecutionGate::default();
        assert_eq!(gate.policy(), ExecutionPolicy::Disabled);
        assert!(gate.maybe_execute(&candidate).await.is_none());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_absent_candidate() {
        assert!(enabled().maybe_execute(&CommandCandidate::none()).await.is_none());
        let rejected = extract(&wrap("placeholder"));
        assert!(enabled().maybe_execute(&rejected).await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enabled_captures_stdout() {
        let result = enabled()
            .maybe_execute(&extract(&wrap("printf hello")))
            .await
            .unwrap();
        assert_eq!(result.command, "printf hello");
        assert_eq!(result.output, "hello");
        assert_eq!(result.exit_code, Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enabled_nonzero_exit_is_a_result() {
        let result = enabled()
            .maybe_execute(&extract(&wrap("echo oops >&2; exit 4")))
            .await
            .unwrap();
        assert_eq!(result.exit_code, Some(4));
        assert_eq!(result.output, "Error executing command: oops\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_enabled_timeout() {
        let gate = ExecutionGate::new(ExecutionPolicy::Enabled, Duration::from_secs(1));
        let result = gate
            .maybe_execute(&extract(&wrap("sleep 20")))
            .await
            .unwrap();
        assert_eq!(result.output, "Command timed out after 1s");
        assert_eq!(result.exit_code, None);
    }
}
