//! Bounded execution of the OS wireless tools
//!
//! Every query is a short-lived child process with a hard time limit. A tool
//! that hangs (a wedged NetworkManager, a slow `netsh`) is killed rather than
//! allowed to stall the presence cycle.

use anyhow::{anyhow, Context, Result};
use process_control::{ChildExt, Control};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

/// Default time limit for a single tool query
pub const DEFAULT_QUERY_LIMIT: Duration = Duration::from_secs(3);

/// Captured output of a finished tool
#[derive(Debug)]
pub struct ToolOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i64>,
}

pub struct ToolRunner;

impl ToolRunner {
    /// Runs `program args..`, killing it once `limit` elapses
    pub fn run(program: &str, args: &[&str], limit: Duration) -> Result<ToolOutput> {
        debug!("Running {} {:?} (limit: {:?})", program, args, limit);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", program))?;

        let output = child
            .controlled_with_output()
            .time_limit(limit)
            .terminate_for_timeout()
            .wait()
            .with_context(|| format!("Failed to wait for {}", program))?
            .ok_or_else(|| anyhow!("{} timed out after {:?}", program, limit))?;

        Ok(ToolOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }

    /// Stdout of a tool that must exit successfully
    pub fn stdout(program: &str, args: &[&str], limit: Duration) -> Result<String> {
        let output = Self::run(program, args, limit)?;
        if !output.success {
            return Err(anyhow!(
                "{} exited with {:?}: {}",
                program,
                output.exit_code,
                output.stderr.trim()
            ));
        }
        Ok(output.stdout)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_captures_stdout() {
        let output = ToolRunner::run("sh", &["-c", "echo officeNet"], DEFAULT_QUERY_LIMIT).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "officeNet");
    }

    #[test]
    fn test_failure_is_an_error() {
        let result = ToolRunner::stdout("sh", &["-c", "echo nope >&2; exit 3"], DEFAULT_QUERY_LIMIT);
        let message = result.unwrap_err().to_string();
        assert!(message.contains("nope"));
    }

    #[test]
    fn test_time_limit_kills_hung_tool() {
        let start = Instant::now();
        let result = ToolRunner::run("sleep", &["5"], Duration::from_millis(200));
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_missing_tool() {
        assert!(ToolRunner::run("officetrack-no-such-tool", &[], DEFAULT_QUERY_LIMIT).is_err());
    }
}
