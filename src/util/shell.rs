//! Shell command invocation with bounded output capture.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{FloodgateError, Result};

/// Default time allowed for a command to produce its first line of output.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Options for [`execute`].
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// How long to wait for the first line of output.
    pub timeout: Duration,
    /// Treat missing output as an error instead of `Ok(None)`.
    pub expect_output: bool,
    /// Working directory override for the command.
    pub cwd: Option<PathBuf>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            expect_output: false,
            cwd: None,
        }
    }
}

/// Run a command through the platform shell and capture its first line of
/// stdout.
///
/// The child is killed when abandoned, so a command that keeps running
/// past the timeout does not outlive the call. Commands that finish
/// without producing output yield `Ok(None)` unless
/// [`ExecOptions::expect_output`] is set, in which case the absence is an
/// error.
pub async fn execute(cmd: &str, options: &ExecOptions) -> Result<Option<String>> {
    let cmd = cmd.trim();
    debug!(cmd, timeout = ?options.timeout, "Executing shell command");

    let mut command = shell_command(cmd);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &options.cwd {
        command.current_dir(cwd);
    }

    let mut child = command.spawn()?;
    let stdout = child.stdout.take().ok_or_else(|| {
        FloodgateError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "child stdout was not captured",
        ))
    })?;

    let mut lines = BufReader::new(stdout).lines();
    match timeout(options.timeout, lines.next_line()).await {
        Ok(Ok(Some(line))) => Ok(Some(line)),
        // The command exited without writing anything.
        Ok(Ok(None)) if options.expect_output => Err(FloodgateError::CommandTimeout {
            timeout: options.timeout,
        }),
        Ok(Ok(None)) => Ok(None),
        Ok(Err(e)) => Err(e.into()),
        Err(_) if options.expect_output => Err(FloodgateError::CommandTimeout {
            timeout: options.timeout,
        }),
        Err(_) => {
            debug!(cmd, "Command produced no output in time, ignoring");
            Ok(None)
        }
    }
}

#[cfg(unix)]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(not(unix))]
fn shell_command(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_first_line() {
        let output = execute("echo hello; echo world", &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(output.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_silent_command_yields_none() {
        let output = execute("true", &ExecOptions::default()).await.unwrap();
        assert_eq!(output, None);
    }

    #[tokio::test]
    async fn test_silent_command_with_expected_output_fails() {
        let options = ExecOptions {
            expect_output: true,
            ..ExecOptions::default()
        };
        let result = execute("true", &options).await;
        assert!(matches!(result, Err(FloodgateError::CommandTimeout { .. })));
    }

    #[tokio::test]
    async fn test_slow_command_times_out() {
        let options = ExecOptions {
            timeout: Duration::from_millis(100),
            ..ExecOptions::default()
        };
        let output = execute("sleep 5; echo late", &options).await.unwrap();
        assert_eq!(output, None);
    }

    #[tokio::test]
    async fn test_working_directory_override() {
        let dir = std::env::temp_dir();
        let options = ExecOptions {
            cwd: Some(dir.clone()),
            ..ExecOptions::default()
        };
        let output = execute("pwd", &options).await.unwrap().unwrap();
        assert_eq!(
            PathBuf::from(output).canonicalize().unwrap(),
            dir.canonicalize().unwrap()
        );
    }
}
