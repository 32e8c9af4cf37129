// Runs one read-only table query and captures its output

use crate::error::{AppError, AppResult};
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Captured result of a finished command
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

/// Execute `program` with `args` once and capture both output streams.
///
/// A non-zero exit status is not an error here; callers decide what a failed
/// query means for their table. A missing program is `CommandExecution`;
/// any other spawn failure surfaces as `Io`.
pub async fn capture(program: &str, args: &[&str]) -> AppResult<CommandOutput> {
    tracing::debug!("Executing {} {}", program, args.join(" "));

    let output = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("Failed to execute {}: {}", program, e);
            return Err(AppError::CommandExecution(program.to_string()));
        }
        Err(e) => return Err(e.into()),
    };

    let captured = CommandOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    tracing::debug!("{} exited with {}:\n{}", program, captured.status, captured.stdout);
    if !captured.stderr.is_empty() {
        tracing::debug!("{} stderr: {}", program, captured.stderr.trim_end());
    }

    Ok(captured)
}
