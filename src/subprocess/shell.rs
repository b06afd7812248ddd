use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{ProcessCommandBuilder, ProcessRunner};
use crate::error::{BurrowError, Result};
use crate::output::OutputSwitch;

/// Runs configured command strings through `sh -c`.
///
/// Output is echoed line by line through the [`OutputSwitch`] while it is
/// captured, so a failing hook reports what it printed even when the
/// switch is suspended.
#[derive(Clone)]
pub struct ShellExecutor {
    runner: Arc<dyn ProcessRunner>,
    output: OutputSwitch,
}

enum Line {
    Out(String),
    Err(String),
}

impl ShellExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, output: OutputSwitch) -> Self {
        Self { runner, output }
    }

    pub fn output(&self) -> &OutputSwitch {
        &self.output
    }

    /// Run `script` to completion in `dir`, streaming its output.
    ///
    /// Returns the combined output on success and a command failure carrying it otherwise.
    pub async fn run_streamed(
        &self,
        script: &str,
        dir: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut builder = ProcessCommandBuilder::shell(script).cancel_on(cancel);
        if let Some(dir) = dir {
            builder = builder.current_dir(dir);
        }

        let stream = self.runner.run_streaming(builder.build()).await?;
        let stdout = stream.stdout.map(|line| line.map(Line::Out));
        let stderr = stream.stderr.map(|line| line.map(Line::Err));
        let mut lines = futures::stream::select(stdout, stderr);

        let out = self.output.stdout();
        let err = self.output.stderr();
        let mut captured = String::new();

        let pump = async {
            while let Some(line) = lines.next().await {
                match line {
                    Ok(Line::Out(text)) => {
                        out.line(&text);
                        captured.push_str(&text);
                        captured.push('\n');
                    }
                    Ok(Line::Err(text)) => {
                        err.line(&text);
                        captured.push_str(&text);
                        captured.push('\n');
                    }
                    Err(e) => {
                        tracing::debug!("Dropped unreadable output from `{}`: {}", script, e);
                    }
                }
            }
        };

        let pumped = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = pump => true,
        };
        if !pumped {
            return Err(BurrowError::cancelled(script));
        }

        let status = stream.status.await?;
        if status.success() {
            Ok(captured)
        } else {
            Err(BurrowError::command_failed(script, status.code(), captured))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CaptureBuffer;
    use crate::subprocess::{MockProcessRunner, TokioProcessRunner};

    fn executor(runner: Arc<dyn ProcessRunner>) -> (ShellExecutor, CaptureBuffer, CaptureBuffer) {
        let out = CaptureBuffer::new();
        let err = CaptureBuffer::new();
        let switch = OutputSwitch::new(out.clone(), err.clone());
        (ShellExecutor::new(runner, switch), out, err)
    }

    #[tokio::test]
    async fn test_streams_output_through_switch() {
        let (shell, out, err) = executor(Arc::new(TokioProcessRunner));
        let captured = shell
            .run_streamed("echo hello; echo oops >&2", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.contents(), "hello\n");
        assert_eq!(err.contents(), "oops\n");
        assert!(captured.contains("hello"));
        assert!(captured.contains("oops"));
    }

    #[tokio::test]
    async fn test_failure_carries_output() {
        let (shell, _out, _err) = executor(Arc::new(TokioProcessRunner));
        let err = shell
            .run_streamed("echo broken; exit 4", None, &CancellationToken::new())
            .await
            .unwrap_err();

        match &err {
            BurrowError::Execution {
                command, exit_code, ..
            } => {
                assert_eq!(command.as_deref(), Some("echo broken; exit 4"));
                assert_eq!(*exit_code, Some(4));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.command_output(), Some("broken\n"));
    }

    #[tokio::test]
    async fn test_runs_in_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let (shell, out, _err) = executor(Arc::new(TokioProcessRunner));
        let listing = shell
            .run_streamed("ls", Some(dir.path()), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(listing, "marker.txt\n");
        assert_eq!(out.contents(), "marker.txt\n");
    }

    #[tokio::test]
    async fn test_suspended_switch_still_captures() {
        let mock = MockProcessRunner::new();
        mock.expect_shell("make").returns_stdout("built\n").finish();
        let (shell, out, _err) = executor(Arc::new(mock));

        let guard = shell.output().suspend();
        let captured = shell
            .run_streamed("make", None, &CancellationToken::new())
            .await
            .unwrap();
        drop(guard);

        assert_eq!(captured, "built\n");
        assert_eq!(out.contents(), "");
    }

    #[tokio::test]
    async fn test_cancel_stops_command() {
        let (shell, _out, _err) = executor(Arc::new(TokioProcessRunner));
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = shell.run_streamed("sleep 30", None, &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
