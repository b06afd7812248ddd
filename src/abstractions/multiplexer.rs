//! Terminal multiplexer abstraction
//!
//! The engine hands over fully rendered windows; the client decides how to
//! lay them out. [`Tmux`] is the production client.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::error::{BurrowError, ErrorCode, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};

/// A rendered window
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Window {
    pub name: String,
    /// Typed into the window's shell once it starts
    pub command: Option<String>,
    /// Falls back to the session directory
    pub dir: Option<PathBuf>,
    pub focus: bool,
}

#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// Create a detached session holding `windows`. Either all windows exist
    /// afterwards or the session does not.
    async fn create_session(
        &self,
        name: &str,
        dir: &Path,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Attach to `name`, creating it with `windows` first if it is not running
    /// and restoring any of `windows` that were closed if it is. Selects
    /// `target_window` when given.
    async fn open_session(
        &self,
        name: &str,
        dir: &Path,
        windows: &[Window],
        target_window: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Append `windows` to a running session
    async fn add_windows(
        &self,
        name: &str,
        dir: &Path,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Attach from a plain terminal, or switch the current client when already inside one
    async fn attach_or_switch(&self, name: &str, cancel: &CancellationToken) -> Result<()>;

    async fn kill_session(&self, name: &str, cancel: &CancellationToken) -> Result<()>;

    async fn has_session(&self, name: &str, cancel: &CancellationToken) -> Result<bool>;
}

/// tmux client
pub struct Tmux {
    runner: Arc<dyn ProcessRunner>,
}

impl Tmux {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    fn inside_tmux() -> bool {
        std::env::var_os("TMUX").is_some_and(|v| !v.is_empty())
    }

    /// `session:window` target; the trailing colon addresses the session itself
    fn target(session: &str, window: Option<&str>) -> String {
        match window {
            Some(window) => format!("={session}:{window}"),
            None => format!("={session}:"),
        }
    }

    async fn tmux(&self, args: &[&str], cancel: &CancellationToken) -> Result<String> {
        let command = ProcessCommandBuilder::new("tmux")
            .args(args)
            .cancel_on(cancel)
            .build();
        let display = command.display();
        let output = self.runner.run(command).await?;
        if output.status.success() {
            Ok(output.stdout.trim().to_string())
        } else {
            Err(BurrowError::command_failed(
                display,
                output.status.code(),
                output.combined(),
            ))
        }
    }

    fn window_dir<'a>(window: &'a Window, dir: &'a Path) -> String {
        window.dir.as_deref().unwrap_or(dir).to_string_lossy().into_owned()
    }

    async fn send_command(
        &self,
        session: &str,
        window: &Window,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(command) = window.command.as_deref().filter(|c| !c.trim().is_empty()) {
            let target = Self::target(session, Some(&window.name));
            self.tmux(&["send-keys", "-t", target.as_str(), command, "Enter"], cancel)
                .await?;
        }
        Ok(())
    }

    async fn new_window(
        &self,
        session: &str,
        dir: &Path,
        window: &Window,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let window_dir = Self::window_dir(window, dir);
        let target = Self::target(session, None);
        let args = [
            "new-window",
            "-d",
            "-t",
            target.as_str(),
            "-n",
            window.name.as_str(),
            "-c",
            window_dir.as_str(),
        ];
        self.tmux(&args, cancel).await?;
        self.send_command(session, window, cancel).await
    }

    async fn select_window(
        &self,
        session: &str,
        window: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let target = Self::target(session, Some(window));
        self.tmux(&["select-window", "-t", target.as_str()], cancel)
            .await
            .map(drop)
    }

    async fn focus(&self, session: &str, windows: &[Window], cancel: &CancellationToken) -> Result<()> {
        if let Some(focused) = windows.iter().rev().find(|w| w.focus) {
            self.select_window(session, &focused.name, cancel).await?;
        }
        Ok(())
    }

    async fn window_names(&self, session: &str, cancel: &CancellationToken) -> Result<Vec<String>> {
        let target = Self::target(session, None);
        let listing = self
            .tmux(
                &["list-windows", "-t", target.as_str(), "-F", "#{window_name}"],
                cancel,
            )
            .await?;
        Ok(listing.lines().map(str::to_string).collect())
    }

    async fn build_session(
        &self,
        name: &str,
        dir: &Path,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let first_dir = match windows.first() {
            Some(first) => Self::window_dir(first, dir),
            None => dir.to_string_lossy().into_owned(),
        };
        let mut args: Vec<&str> = vec!["new-session", "-d", "-s", name];
        if let Some(first) = windows.first() {
            args.extend(["-n", first.name.as_str()]);
        }
        args.extend(["-c", first_dir.as_str()]);
        self.tmux(&args, cancel).await?;

        if let Some(first) = windows.first() {
            self.send_command(name, first, cancel).await?;
        }
        for window in windows.iter().skip(1) {
            self.new_window(name, dir, window, cancel).await?;
        }
        self.focus(name, windows, cancel).await
    }
}

#[async_trait]
impl Multiplexer for Tmux {
    async fn create_session(
        &self,
        name: &str,
        dir: &Path,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::debug!("Creating tmux session {} with {} windows", name, windows.len());
        if let Err(e) = self.build_session(name, dir, windows, cancel).await {
            if !e.is_cancelled() && self.has_session(name, cancel).await.unwrap_or(false) {
                if let Err(kill_err) = self.kill_session(name, cancel).await {
                    tracing::warn!("Failed to clean up partial tmux session {}: {}", name, kill_err);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    async fn open_session(
        &self,
        name: &str,
        dir: &Path,
        windows: &[Window],
        target_window: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if self.has_session(name, cancel).await? {
            let open = self.window_names(name, cancel).await?;
            let closed: Vec<Window> = windows
                .iter()
                .filter(|w| !open.contains(&w.name))
                .cloned()
                .collect();
            if !closed.is_empty() {
                tracing::debug!("Restoring {} closed windows in {}", closed.len(), name);
                self.add_windows(name, dir, &closed, cancel).await?;
            }
        } else {
            self.create_session(name, dir, windows, cancel).await?;
        }
        if let Some(window) = target_window {
            self.select_window(name, window, cancel).await?;
        }
        self.attach_or_switch(name, cancel).await
    }

    async fn add_windows(
        &self,
        name: &str,
        dir: &Path,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<()> {
        for window in windows {
            self.new_window(name, dir, window, cancel).await?;
        }
        self.focus(name, windows, cancel).await
    }

    async fn attach_or_switch(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        let target = Self::target(name, None);
        if Self::inside_tmux() {
            return self
                .tmux(&["switch-client", "-t", target.as_str()], cancel)
                .await
                .map(drop);
        }

        let command = ProcessCommandBuilder::new("tmux")
            .args(["attach-session", "-t", target.as_str()])
            .interactive()
            .cancel_on(cancel)
            .build();
        let display = command.display();
        let output = self.runner.run(command).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BurrowError::command_failed(display, output.status.code(), String::new()))
        }
    }

    async fn kill_session(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        let target = Self::target(name, None);
        self.tmux(&["kill-session", "-t", target.as_str()], cancel)
            .await
            .map(drop)
    }

    async fn has_session(&self, name: &str, cancel: &CancellationToken) -> Result<bool> {
        let target = format!("={name}");
        let command = ProcessCommandBuilder::new("tmux")
            .args(["has-session", "-t", target.as_str()])
            .suppress_stderr()
            .cancel_on(cancel)
            .build();
        match self.runner.run(command).await {
            Ok(output) => Ok(output.status.success()),
            // no tmux binary means no sessions
            Err(crate::subprocess::ProcessError::CommandNotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Recorded call on [`MockMultiplexer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MuxCall {
    Create { name: String, dir: PathBuf, windows: Vec<Window> },
    Open { name: String, windows: Vec<Window>, target_window: Option<String> },
    AddWindows { name: String, windows: Vec<Window> },
    Attach { name: String },
    Kill { name: String },
}

#[derive(Default)]
struct MockMuxState {
    calls: Vec<MuxCall>,
    running: Vec<String>,
    fail_create: bool,
}

/// In-memory multiplexer that tracks running session names.
///
/// Creating a name that is already running and killing an unknown one both
/// fail, like they do in tmux.
#[derive(Clone, Default)]
pub struct MockMultiplexer {
    state: Arc<Mutex<MockMuxState>>,
}

impl MockMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockMuxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_create(&self, fail: bool) {
        self.state().fail_create = fail;
    }

    pub fn calls(&self) -> Vec<MuxCall> {
        self.state().calls.clone()
    }

    pub fn running(&self) -> Vec<String> {
        self.state().running.clone()
    }

    fn check(cancel: &CancellationToken, operation: &str) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BurrowError::cancelled(operation));
        }
        Ok(())
    }
}

#[async_trait]
impl Multiplexer for MockMultiplexer {
    async fn create_session(
        &self,
        name: &str,
        dir: &Path,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check(cancel, "create session")?;
        let mut state = self.state();
        state.calls.push(MuxCall::Create {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            windows: windows.to_vec(),
        });
        if state.fail_create || state.running.iter().any(|n| n == name) {
            return Err(BurrowError::execution_with_code(
                ErrorCode::EXEC_SUBPROCESS_FAILED,
                format!("duplicate session: {name}"),
                Some("tmux new-session".to_string()),
            ));
        }
        state.running.push(name.to_string());
        Ok(())
    }

    async fn open_session(
        &self,
        name: &str,
        _dir: &Path,
        windows: &[Window],
        target_window: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check(cancel, "open session")?;
        let mut state = self.state();
        state.calls.push(MuxCall::Open {
            name: name.to_string(),
            windows: windows.to_vec(),
            target_window: target_window.map(str::to_string),
        });
        if !state.running.iter().any(|n| n == name) {
            state.running.push(name.to_string());
        }
        Ok(())
    }

    async fn add_windows(
        &self,
        name: &str,
        _dir: &Path,
        windows: &[Window],
        cancel: &CancellationToken,
    ) -> Result<()> {
        Self::check(cancel, "add windows")?;
        self.state().calls.push(MuxCall::AddWindows {
            name: name.to_string(),
            windows: windows.to_vec(),
        });
        Ok(())
    }

    async fn attach_or_switch(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        Self::check(cancel, "attach")?;
        self.state().calls.push(MuxCall::Attach {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn kill_session(&self, name: &str, cancel: &CancellationToken) -> Result<()> {
        Self::check(cancel, "kill session")?;
        let mut state = self.state();
        state.calls.push(MuxCall::Kill {
            name: name.to_string(),
        });
        let before = state.running.len();
        state.running.retain(|n| n != name);
        if state.running.len() == before {
            return Err(BurrowError::command_failed(
                format!("tmux kill-session -t {name}"),
                Some(1),
                format!("can't find session: {name}\n"),
            ));
        }
        Ok(())
    }

    async fn has_session(&self, name: &str, cancel: &CancellationToken) -> Result<bool> {
        Self::check(cancel, "has session")?;
        Ok(self.state().running.iter().any(|n| n == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::MockProcessRunner;

    fn window(name: &str, command: Option<&str>, focus: bool) -> Window {
        Window {
            name: name.to_string(),
            command: command.map(str::to_string),
            dir: None,
            focus,
        }
    }

    #[tokio::test]
    async fn test_create_session_issues_tmux_commands() {
        let runner = MockProcessRunner::permissive();
        let tmux = Tmux::new(Arc::new(runner.clone()));
        let windows = vec![
            window("agent", Some("claude"), false),
            window("shell", None, true),
        ];

        tmux.create_session("fix-login", Path::new("/work/api-x"), &windows, &CancellationToken::new())
            .await
            .unwrap();

        let calls: Vec<Vec<String>> = runner
            .get_call_history()
            .into_iter()
            .map(|c| c.args)
            .collect();
        assert_eq!(
            calls[0],
            vec!["new-session", "-d", "-s", "fix-login", "-n", "agent", "-c", "/work/api-x"]
        );
        assert_eq!(calls[1], vec!["send-keys", "-t", "=fix-login:agent", "claude", "Enter"]);
        assert_eq!(
            calls[2],
            vec!["new-window", "-d", "-t", "=fix-login:", "-n", "shell", "-c", "/work/api-x"]
        );
        assert_eq!(calls[3], vec!["select-window", "-t", "=fix-login:shell"]);
        assert_eq!(calls.len(), 4);
    }

    #[tokio::test]
    async fn test_partial_create_is_killed() {
        let runner = MockProcessRunner::new();
        runner
            .expect_command("tmux")
            .with_args(|a| a[0] == "new-session")
            .finish();
        runner
            .expect_command("tmux")
            .with_args(|a| a[0] == "new-window")
            .returns_exit_code(1)
            .returns_stderr("bad window")
            .finish();
        runner
            .expect_command("tmux")
            .with_args(|a| a[0] == "has-session")
            .finish();
        runner
            .expect_command("tmux")
            .with_args(|a| a[0] == "kill-session")
            .finish();
        let tmux = Tmux::new(Arc::new(runner.clone()));

        let windows = vec![window("a", None, false), window("b", None, false)];
        let err = tmux
            .create_session("s", Path::new("/w"), &windows, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.command_output(), Some("bad window"));
        assert!(runner
            .get_call_history()
            .iter()
            .any(|c| c.args[0] == "kill-session"));
    }

    #[tokio::test]
    async fn test_has_session_without_tmux_binary() {
        let tmux = Tmux::new(Arc::new(crate::subprocess::TokioProcessRunner));
        // a name no real server would hold
        let found = tmux
            .has_session("burrow-test-no-such-session-1b2c", &CancellationToken::new())
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn test_open_running_session_restores_closed_windows() {
        let runner = MockProcessRunner::permissive();
        runner
            .expect_command("tmux")
            .with_args(|a| a[0] == "list-windows")
            .returns_stdout("agent\n")
            .finish();
        let tmux = Tmux::new(Arc::new(runner.clone()));
        let windows = vec![window("agent", Some("claude"), true), window("logs", None, false)];

        tmux.open_session(
            "fix-login",
            Path::new("/work/api-x"),
            &windows,
            Some("logs"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let calls: Vec<Vec<String>> = runner
            .get_call_history()
            .into_iter()
            .map(|c| c.args)
            .collect();
        assert!(!calls.iter().any(|c| c[0] == "new-session"));
        let added: Vec<&Vec<String>> = calls.iter().filter(|c| c[0] == "new-window").collect();
        assert_eq!(
            added,
            vec![&vec!["new-window", "-d", "-t", "=fix-login:", "-n", "logs", "-c", "/work/api-x"]]
        );
        assert!(calls.contains(&vec![
            "select-window".to_string(),
            "-t".to_string(),
            "=fix-login:logs".to_string()
        ]));
    }

    #[tokio::test]
    async fn test_mock_rejects_duplicate_create() {
        let mux = MockMultiplexer::new();
        let cancel = CancellationToken::new();
        mux.create_session("s", Path::new("/w"), &[], &cancel).await.unwrap();
        assert!(mux.create_session("s", Path::new("/w"), &[], &cancel).await.is_err());
        assert_eq!(mux.running(), vec!["s"]);
    }

    #[tokio::test]
    async fn test_mock_kill_unknown_fails() {
        let mux = MockMultiplexer::new();
        let cancel = CancellationToken::new();
        assert!(mux.kill_session("nope", &cancel).await.is_err());

        mux.create_session("s", Path::new("/w"), &[], &cancel).await.unwrap();
        assert!(mux.has_session("s", &cancel).await.unwrap());
        mux.kill_session("s", &cancel).await.unwrap();
        assert!(mux.running().is_empty());
    }
}
