//! Bounded subprocess execution.
//!
//! Every external tool kgrid drives (`aws`, `kubectl`, `kots`,
//! `support-bundle`) goes through [`CommandSpec::run`]: stdout and stderr are
//! captured, optional stdin is fed, and the child is killed once the deadline
//! passes. A timed-out run reports whatever stdout had arrived so far.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{command} failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("timed out after {timeout:?} running {command}. received stdout: {stdout}")]
    TimedOut {
        command: String,
        timeout: Duration,
        stdout: String,
    },

    #[error("i/o error running {command}: {source}")]
    Io {
        command: String,
        source: std::io::Error,
    },
}

impl ProcessError {
    /// Stdout captured before the failure, if any.
    pub fn stdout(&self) -> &str {
        match self {
            ProcessError::Failed { stdout, .. } | ProcessError::TimedOut { stdout, .. } => stdout,
            _ => "",
        }
    }

    /// Stderr of a non-zero exit, empty otherwise.
    pub fn stderr(&self) -> &str {
        match self {
            ProcessError::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

/// A program invocation with arguments, extra environment, optional stdin and a deadline.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    env: Vec<(String, String)>,
    stdin: Option<Vec<u8>>,
    timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            timeout: Duration::from_secs(120),
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments joined for logs and error messages.
    ///
    /// Environment values are never included; they carry credentials.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    /// Run to completion and return stdout.
    pub async fn run(&self) -> Result<String, ProcessError> {
        let command = self.display();
        debug!(%command, timeout = ?self.timeout, "running command");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            command: command.clone(),
            source,
        })?;

        let stdin_pipe = child.stdin.take();
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let input = self.stdin.clone();

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        let work = async {
            let feed = async move {
                if let (Some(mut pipe), Some(data)) = (stdin_pipe, input) {
                    pipe.write_all(&data).await?;
                    pipe.shutdown().await?;
                }
                Ok::<_, std::io::Error>(())
            };
            let (fed, out, err, status) = tokio::join!(
                feed,
                drain(stdout_pipe, &mut stdout),
                drain(stderr_pipe, &mut stderr),
                child.wait()
            );
            fed?;
            out?;
            err?;
            status
        };
        let result = tokio::time::timeout(self.timeout, work).await;

        match result {
            Ok(Ok(status)) if status.success() => Ok(String::from_utf8_lossy(&stdout).into_owned()),
            Ok(Ok(status)) => Err(ProcessError::Failed {
                command,
                status: status.to_string(),
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            }),
            Ok(Err(source)) => Err(ProcessError::Io { command, source }),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(%command, error = %e, "failed to kill timed out command");
                }
                Err(ProcessError::TimedOut {
                    command,
                    timeout: self.timeout,
                    stdout: String::from_utf8_lossy(&stdout).into_owned(),
                })
            }
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(buf).await?;
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn captures_stdout() {
        let out = sh("echo hello").run().await.unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn passes_env_and_stdin() {
        let out = sh("printf '%s:' \"$KGRID_TEST_VALUE\"; cat")
            .env("KGRID_TEST_VALUE", "abc")
            .stdin("from-stdin")
            .run()
            .await
            .unwrap();
        assert_eq!(out, "abc:from-stdin");
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr() {
        let err = sh("echo oops >&2; exit 3").run().await.unwrap_err();
        assert!(matches!(err, ProcessError::Failed { .. }));
        assert_eq!(err.stderr(), "oops");
        assert!(err.to_string().contains("oops"), "{err}");
    }

    #[tokio::test]
    async fn timeout_kills_and_keeps_partial_stdout() {
        let err = sh("echo partial; sleep 10")
            .timeout(Duration::from_millis(500))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::TimedOut { .. }), "{err}");
        assert!(err.to_string().contains("timed out"));
        assert_eq!(err.stdout().trim(), "partial");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = CommandSpec::new("/nonexistent/kgrid-test-binary")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[test]
    fn display_omits_env() {
        let spec = CommandSpec::new("aws")
            .args(["eks", "describe-cluster"])
            .env("AWS_SECRET_ACCESS_KEY", "hunter2");
        assert_eq!(spec.display(), "aws eks describe-cluster");
    }
}
