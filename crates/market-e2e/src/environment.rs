//! Deployment lifecycle via docker compose.
//!
//! The controller only runs compose commands. It returns once a bring-up
//! command has succeeded and never waits for readiness itself; that is the
//! prober's job.

use crate::config::HarnessConfig;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Maximum stderr kept in error messages.
const MAX_STDERR_LEN: usize = 2048;

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Brings the compose deployment up and down.
#[derive(Debug, Clone)]
pub struct EnvironmentController {
    program: String,
    leading_args: Vec<String>,
    compose_file: PathBuf,
}

impl EnvironmentController {
    pub fn new(config: &HarnessConfig) -> Self {
        let mut command = config.compose_command.iter().cloned();
        // compose_command is validated non-empty by HarnessConfig
        let program = command.next().unwrap_or_default();

        Self {
            program,
            leading_args: command.collect(),
            compose_file: config.compose_file.clone(),
        }
    }

    /// Full argument list for a compose action.
    pub fn compose_args(&self, action: &[&str]) -> Vec<String> {
        let mut args = self.leading_args.clone();
        args.push("-f".to_string());
        args.push(self.compose_file.display().to_string());
        args.extend(action.iter().map(|a| a.to_string()));
        args
    }

    fn describe(&self, args: &[String]) -> String {
        std::iter::once(self.program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run a compose action with output streamed to the terminal.
    async fn run_streaming(&self, action: &[&str]) -> Result<(), EnvironmentError> {
        let args = self.compose_args(action);
        let command = self.describe(&args);

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| EnvironmentError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(EnvironmentError::CommandFailed {
                command,
                status: status.to_string(),
                stderr: String::new(),
            });
        }

        Ok(())
    }

    /// Run a compose action with output captured.
    async fn run_captured(&self, action: &[&str]) -> Result<(), EnvironmentError> {
        let args = self.compose_args(action);
        let command = self.describe(&args);

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| EnvironmentError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail_start = stderr
                .char_indices()
                .rev()
                .nth(MAX_STDERR_LEN)
                .map(|(i, _)| i)
                .unwrap_or(0);

            return Err(EnvironmentError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: stderr.get(tail_start..).unwrap_or_default().to_string(),
            });
        }

        Ok(())
    }

    /// Remove any leftover deployment, ignoring failures.
    async fn clear_leftovers(&self) {
        if let Err(e) = self.run_captured(&["down", "-v"]).await {
            info!(target: "e2e.environment", error = %e, "No leftover deployment removed");
        }
    }

    /// Tear down leftovers, then bring up the whole deployment.
    pub async fn start(&self) -> Result<(), EnvironmentError> {
        self.clear_leftovers().await;
        self.launch().await
    }

    /// Tear down leftovers, then bring up a single service.
    ///
    /// First half of a staged bring-up; call [`launch`](Self::launch) once the
    /// service is healthy.
    pub async fn start_service(&self, service: &str) -> Result<(), EnvironmentError> {
        self.clear_leftovers().await;

        info!(target: "e2e.environment", service, "Starting prerequisite service");
        self.run_streaming(&["up", "-d", "--build", service]).await
    }

    /// Bring up every service. Already-running services are left alone.
    pub async fn launch(&self) -> Result<(), EnvironmentError> {
        info!(
            target: "e2e.environment",
            compose_file = %self.compose_file.display(),
            "Starting deployment"
        );
        self.run_streaming(&["up", "-d", "--build"]).await?;
        info!(target: "e2e.environment", "Deployment launch command succeeded");
        Ok(())
    }

    /// Tear down the deployment and its volumes. Failures are logged, never
    /// returned, so teardown cannot mask a test failure.
    pub async fn stop(&self) {
        match self.run_captured(&["down", "-v"]).await {
            Ok(()) => info!(target: "e2e.environment", "Deployment stopped"),
            Err(e) => warn!(target: "e2e.environment", error = %e, "Deployment teardown failed"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn controller(command: &str) -> EnvironmentController {
        let vars = HashMap::from([
            ("E2E_COMPOSE_COMMAND".to_string(), command.to_string()),
            ("E2E_COMPOSE_FILE".to_string(), "stack/compose.yml".to_string()),
        ]);
        EnvironmentController::new(&HarnessConfig::from_vars(&vars).unwrap())
    }

    #[test]
    fn test_compose_args_for_plugin_style_command() {
        let controller = controller("docker compose");

        assert_eq!(
            controller.compose_args(&["down", "-v"]),
            vec!["compose", "-f", "stack/compose.yml", "down", "-v"]
        );
        assert_eq!(
            controller.describe(&controller.compose_args(&["up", "-d", "--build"])),
            "docker compose -f stack/compose.yml up -d --build"
        );
    }

    #[test]
    fn test_compose_args_for_standalone_binary() {
        let controller = controller("docker-compose");

        assert_eq!(
            controller.compose_args(&["up", "-d", "--build", "config-server"]),
            vec!["-f", "stack/compose.yml", "up", "-d", "--build", "config-server"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_succeeds_when_launch_succeeds() {
        controller("true").start().await.expect("start should succeed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_fails_when_launch_fails() {
        let result = controller("false").start().await;

        assert!(matches!(
            result,
            Err(EnvironmentError::CommandFailed { command, .. }) if command.contains("up -d --build")
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_clears_leftovers_before_launch() {
        let dir = tempfile::tempdir().unwrap();
        let (command, log) = recording::recording_compose(dir.path());

        controller(&command).start().await.expect("start should succeed");

        assert_eq!(
            recording::recorded(&log),
            vec![
                "-f stack/compose.yml down -v",
                "-f stack/compose.yml up -d --build",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_service_clears_leftovers_first() {
        let dir = tempfile::tempdir().unwrap();
        let (command, log) = recording::recording_compose(dir.path());

        controller(&command)
            .start_service("config-server")
            .await
            .expect("start_service should succeed");

        assert_eq!(
            recording::recorded(&log),
            vec![
                "-f stack/compose.yml down -v",
                "-f stack/compose.yml up -d --build config-server",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_swallows_failures() {
        // Completes without error even though the command fails
        controller("false").stop().await;
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let result = controller("definitely-not-a-compose-binary-e2e").launch().await;
        assert!(matches!(result, Err(EnvironmentError::Spawn { .. })));
    }
}
