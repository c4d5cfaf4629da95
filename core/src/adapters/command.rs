//! Structured external command execution.
//!
//! Commands are built from a program path and discrete arguments and are
//! never passed through a shell, so no argument can inject another command.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{Error, Result};

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Display form used in logs and outcomes. Not executed.
    pub fn display(&self) -> String {
        let name = self
            .program
            .file_name()
            .unwrap_or_else(|| OsStr::new("?"))
            .to_string_lossy();
        std::iter::once(name.into_owned())
            .chain(self.args.iter().map(|a| {
                if a.contains(char::is_whitespace) {
                    format!("'{}'", a)
                } else {
                    a.clone()
                }
            }))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    /// Trimmed stdout followed by trimmed stderr.
    pub text: String,
}

/// Runs commands with an optional sudo prefix and a time budget.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    sudo: bool,
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(sudo: bool, timeout: Duration) -> Self {
        Self { sudo, timeout }
    }

    /// Run `spec` and capture its output, whatever the exit status.
    ///
    /// Only a failure to start or an exceeded time budget is an error.
    pub async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut command = if self.sudo {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(spec.program());
            c
        } else {
            Command::new(spec.program())
        };
        command
            .args(spec.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(command = %spec.display(), "running external command");

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => {
                return Err(Error::Timeout {
                    command: spec.display(),
                    secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) => {
                return Err(Error::ExternalCommand {
                    command: spec.display(),
                    reason: format!("failed to start: {}", e),
                })
            }
            Ok(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let text = [stdout.trim(), stderr.trim()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");

        Ok(CommandOutput {
            success: output.status.success(),
            text,
        })
    }

    /// Run `spec` and turn a non-zero exit status into an error.
    pub async fn run_checked(&self, spec: &CommandSpec) -> Result<String> {
        let output = self.run(spec).await?;
        if output.success {
            Ok(output.text)
        } else {
            Err(Error::ExternalCommand {
                command: spec.display(),
                reason: if output.text.is_empty() {
                    "exited with a non-zero status".to_string()
                } else {
                    output.text
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_quotes_spaced_args() {
        let spec = CommandSpec::new("/usr/sbin/ufw")
            .args(["deny", "out", "to", "1.2.3.4", "comment"])
            .arg("Blocked example.com");
        assert_eq!(
            spec.display(),
            "ufw deny out to 1.2.3.4 comment 'Blocked example.com'"
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_external_error() {
        let runner = CommandRunner::new(false, Duration::from_secs(2));
        let spec = CommandSpec::new("/nonexistent/hostwall-test-binary");
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, Error::ExternalCommand { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output_and_status() {
        let runner = CommandRunner::new(false, Duration::from_secs(5));

        let ok = runner
            .run(&CommandSpec::new("/bin/sh").args(["-c", "echo hello"]))
            .await
            .unwrap();
        assert!(ok.success);
        assert_eq!(ok.text, "hello");

        let failed = runner
            .run_checked(&CommandSpec::new("/bin/sh").args(["-c", "echo nope >&2; exit 3"]))
            .await
            .unwrap_err();
        assert!(failed.to_string().contains("nope"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let runner = CommandRunner::new(false, Duration::from_millis(100));
        let err = runner
            .run(&CommandSpec::new("/bin/sh").args(["-c", "sleep 5"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
