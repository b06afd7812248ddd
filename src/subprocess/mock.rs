use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, ProcessStream};

/// Scripted [`ProcessRunner`] for tests.
///
/// Expectations are matched in registration order on program name plus an
/// optional argument predicate. Every call is recorded, matched or not.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
    permissive: bool,
}

struct MockExpectation {
    program: String,
    #[allow(clippy::type_complexity)]
    args_matcher: Option<Box<dyn Fn(&[String]) -> bool + Send + Sync>>,
    response: ProcessOutput,
    times_called: usize,
    expected_times: Option<usize>,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn success_output() -> ProcessOutput {
    ProcessOutput {
        status: ExitStatus::Success,
        stdout: String::new(),
        stderr: String::new(),
        duration: Duration::from_millis(1),
    }
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unmatched commands succeed with empty output instead of failing
    pub fn permissive() -> Self {
        Self {
            permissive: true,
            ..Self::default()
        }
    }

    pub fn expect_command(&self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                program: program.to_string(),
                args_matcher: None,
                response: success_output(),
                times_called: 0,
                expected_times: None,
            },
        }
    }

    /// Shorthand for a `sh -c` expectation whose script contains `fragment`
    pub fn expect_shell(&self, fragment: &str) -> MockCommandConfig {
        let fragment = fragment.to_string();
        self.expect_command("sh")
            .with_args(move |args| args.get(1).is_some_and(|script| script.contains(&fragment)))
    }

    pub fn verify_called(&self, program: &str, times: usize) -> bool {
        let history = lock(&self.call_history);
        let count = history.iter().filter(|cmd| cmd.program == program).count();
        count == times
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        lock(&self.call_history).clone()
    }

    /// The scripts passed to `sh -c`, in call order
    pub fn shell_scripts(&self) -> Vec<String> {
        lock(&self.call_history)
            .iter()
            .filter(|cmd| cmd.program == "sh")
            .filter_map(|cmd| cmd.args.get(1).cloned())
            .collect()
    }

    pub fn reset(&self) {
        lock(&self.expectations).clear();
        lock(&self.call_history).clear();
    }

    fn respond(&self, command: &ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        lock(&self.call_history).push(command.clone());

        if command.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(ProcessError::Cancelled(command.display()));
        }

        let mut expectations = lock(&self.expectations);
        for expectation in expectations.iter_mut() {
            if expectation.program != command.program {
                continue;
            }

            if let Some(ref args_matcher) = expectation.args_matcher {
                if !(args_matcher)(&command.args) {
                    continue;
                }
            }

            if let Some(expected) = expectation.expected_times {
                if expectation.times_called >= expected {
                    continue;
                }
            }

            expectation.times_called += 1;
            return Ok(expectation.response.clone());
        }

        if self.permissive {
            return Ok(success_output());
        }

        Err(ProcessError::MockExpectationNotMet(format!(
            "No expectation found for command: {} {:?}",
            command.program, command.args
        )))
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.respond(&command)
    }

    async fn run_streaming(&self, command: ProcessCommand) -> Result<ProcessStream, ProcessError> {
        let output = self.respond(&command)?;

        let lines = |text: &str| -> Vec<Result<String, ProcessError>> {
            text.lines().map(|line| Ok(line.to_string())).collect()
        };
        let stdout = lines(&output.stdout);
        let stderr = lines(&output.stderr);
        let status = output.status;

        Ok(ProcessStream {
            stdout: Box::pin(futures::stream::iter(stdout)),
            stderr: Box::pin(futures::stream::iter(stderr)),
            status: Box::pin(async move { Ok(status) }),
        })
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args_matcher = Some(Box::new(matcher));
        self
    }

    pub fn returns_stdout(mut self, stdout: &str) -> Self {
        self.expectation.response.stdout = stdout.to_string();
        self
    }

    pub fn returns_stderr(mut self, stderr: &str) -> Self {
        self.expectation.response.stderr = stderr.to_string();
        self
    }

    pub fn returns_exit_code(mut self, code: i32) -> Self {
        self.expectation.response.status = if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        };
        self
    }

    /// Match at most `n` calls, later calls fall through to the next expectation
    pub fn times(mut self, n: usize) -> Self {
        self.expectation.expected_times = Some(n);
        self
    }

    pub fn finish(self) {
        lock(&self.runner.expectations).push(self.expectation);
    }
}
