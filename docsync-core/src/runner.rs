//! Subprocess execution for `git` and `gh`, bounded by a per-call timeout.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::{CommandError, CommandOutput, CommandRunner};

/// Runs real processes. The child is killed when its future is dropped, so a
/// timeout or cancellation never leaves it running.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        ProcessRunner { timeout }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
    ) -> Result<CommandOutput, CommandError> {
        debug!(program, ?args, cwd = %cwd.display(), "Launching command");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                error!(program, secs = self.timeout.as_secs(), "Command timed out");
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    secs: self.timeout.as_secs(),
                });
            }
            Ok(Err(source)) => {
                error!(program, error = %source, "Failed to launch command");
                return Err(CommandError::Spawn {
                    program: program.to_string(),
                    source,
                });
            }
            Ok(Ok(output)) => output,
        };

        let result = CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        info!(program, status = result.status, "Command finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let err = runner
            .run("docsync-no-such-program", &[], Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_status_and_output() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let out = runner
            .run("sh", &["-c".into(), "echo hi; exit 3".into()], Path::new("."))
            .await
            .unwrap();
        assert_eq!(out.status, 3);
        assert_eq!(out.stdout, "hi\n");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = ProcessRunner::new(Duration::from_millis(100));
        let err = runner
            .run("sleep", &["5".into()], Path::new("."))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }
}
