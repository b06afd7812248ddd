//! Git operations abstraction layer
//!
//! Provides trait-based abstraction for the git commands the lifecycle
//! engine needs, so it can be tested without network or real repositories.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

use crate::error::{BurrowError, ErrorCode, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};

/// Version-control capability used by the lifecycle engine
#[async_trait]
pub trait GitOperations: Send + Sync {
    /// Full clone of `remote` into `dest`
    async fn clone_repo(&self, remote: &str, dest: &Path, cancel: &CancellationToken)
        -> Result<()>;

    /// Bare mirror of `remote` at `dest`
    async fn clone_bare(&self, remote: &str, dest: &Path, cancel: &CancellationToken)
        -> Result<()>;

    /// Bring a bare mirror's branches up to date
    async fn fetch(&self, bare_dir: &Path, cancel: &CancellationToken) -> Result<()>;

    async fn pull(&self, path: &Path, cancel: &CancellationToken) -> Result<()>;

    /// Check out a new worktree at `path` on `branch`, starting from the mirror's HEAD
    async fn worktree_add(
        &self,
        bare_dir: &Path,
        path: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Remove the worktree at `path` and delete `branch`
    async fn worktree_remove(
        &self,
        bare_dir: &Path,
        path: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()>;

    /// Branch `origin/HEAD` points at
    async fn default_branch(&self, path: &Path, cancel: &CancellationToken) -> Result<String>;

    /// Succeeds when `path` is a usable work tree
    async fn is_valid_repo(&self, path: &Path, cancel: &CancellationToken) -> Result<()>;

    /// URL of `origin`
    async fn remote_url(&self, path: &Path, cancel: &CancellationToken) -> Result<String>;
}

/// [`GitOperations`] implemented with the `git` binary
pub struct GitCli {
    runner: Arc<dyn ProcessRunner>,
}

enum Target<'a> {
    WorkTree(&'a Path),
    GitDir(&'a Path),
    None,
}

impl GitCli {
    pub fn new(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }

    async fn git(
        &self,
        target: Target<'_>,
        args: &[&str],
        operation: &str,
        code: u16,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut builder = ProcessCommandBuilder::new("git").cancel_on(cancel);
        builder = match target {
            Target::WorkTree(dir) => builder.arg("-C").arg(&dir.to_string_lossy()),
            Target::GitDir(dir) => builder.arg("--git-dir").arg(&dir.to_string_lossy()),
            Target::None => builder,
        };
        let command = builder.args(args).env("GIT_TERMINAL_PROMPT", "0").build();

        let output = self.runner.run(command).await.map_err(|e| {
            let err: BurrowError = e.into();
            if err.is_cancelled() {
                err
            } else {
                BurrowError::git(code, operation, err.to_string()).with_source(err)
            }
        })?;

        if output.status.success() {
            Ok(output.stdout.trim().to_string())
        } else {
            let detail = output.stderr.trim();
            let detail = if detail.is_empty() {
                format!("git {} exited with {:?}", args.join(" "), output.status)
            } else {
                detail.to_string()
            };
            Err(BurrowError::git(code, operation, detail))
        }
    }
}

#[async_trait]
impl GitOperations for GitCli {
    async fn clone_repo(
        &self,
        remote: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::debug!("Cloning {} into {}", remote, dest.display());
        let dest = dest.to_string_lossy();
        self.git(
            Target::None,
            &["clone", "--", remote, &*dest],
            "clone",
            ErrorCode::GIT_CLONE_FAILED,
            cancel,
        )
        .await
        .map(drop)
    }

    async fn clone_bare(
        &self,
        remote: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::debug!("Creating bare mirror of {} at {}", remote, dest.display());
        let dest = dest.to_string_lossy();
        // a bare clone keeps the remote's branches under refs/heads and its
        // HEAD on the remote default branch, which is what worktrees start from
        self.git(
            Target::None,
            &["clone", "--bare", "--", remote, &*dest],
            "clone",
            ErrorCode::GIT_CLONE_FAILED,
            cancel,
        )
        .await
        .map(drop)
    }

    async fn fetch(&self, bare_dir: &Path, cancel: &CancellationToken) -> Result<()> {
        // Local worktree branches live only in the mirror, so no --prune here
        self.git(
            Target::GitDir(bare_dir),
            &["fetch", "origin", "+refs/heads/*:refs/heads/*"],
            "fetch",
            ErrorCode::GIT_PULL_FAILED,
            cancel,
        )
        .await
        .map(drop)
    }

    async fn pull(&self, path: &Path, cancel: &CancellationToken) -> Result<()> {
        self.git(
            Target::WorkTree(path),
            &["pull", "--ff-only"],
            "pull",
            ErrorCode::GIT_PULL_FAILED,
            cancel,
        )
        .await
        .map(drop)
    }

    async fn worktree_add(
        &self,
        bare_dir: &Path,
        path: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path = path.to_string_lossy();
        // prune first so a stale registration for a reused path does not block the add
        self.git(
            Target::GitDir(bare_dir),
            &["worktree", "prune"],
            "worktree add",
            ErrorCode::GIT_WORKTREE_FAILED,
            cancel,
        )
        .await?;
        self.git(
            Target::GitDir(bare_dir),
            &["worktree", "add", "-B", branch, &*path, "HEAD"],
            "worktree add",
            ErrorCode::GIT_WORKTREE_FAILED,
            cancel,
        )
        .await
        .map(drop)
    }

    async fn worktree_remove(
        &self,
        bare_dir: &Path,
        path: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let path_str = path.to_string_lossy();
        let removed = self
            .git(
                Target::GitDir(bare_dir),
                &["worktree", "remove", "--force", &*path_str],
                "worktree remove",
                ErrorCode::GIT_WORKTREE_FAILED,
                cancel,
            )
            .await;
        if removed.is_err() {
            self.git(
                Target::GitDir(bare_dir),
                &["worktree", "prune"],
                "worktree remove",
                ErrorCode::GIT_WORKTREE_FAILED,
                cancel,
            )
            .await?;
        }

        let branch_deleted = self
            .git(
                Target::GitDir(bare_dir),
                &["branch", "-D", branch],
                "worktree remove",
                ErrorCode::GIT_WORKTREE_FAILED,
                cancel,
            )
            .await
            .map(drop);

        removed.map(drop).and(branch_deleted)
    }

    async fn default_branch(&self, path: &Path, cancel: &CancellationToken) -> Result<String> {
        let head = self
            .git(
                Target::WorkTree(path),
                &["symbolic-ref", "--short", "refs/remotes/origin/HEAD"],
                "default branch",
                ErrorCode::GIT_GENERIC,
                cancel,
            )
            .await?;
        let branch = head.strip_prefix("origin/").unwrap_or(&head).to_string();
        if branch.is_empty() {
            return Err(BurrowError::git(
                ErrorCode::GIT_GENERIC,
                "default branch",
                "origin/HEAD is not set",
            ));
        }
        Ok(branch)
    }

    async fn is_valid_repo(&self, path: &Path, cancel: &CancellationToken) -> Result<()> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(BurrowError::git(
                ErrorCode::GIT_NOT_REPO,
                "validate",
                format!("{} does not exist", path.display()),
            ));
        }
        let inside = self
            .git(
                Target::WorkTree(path),
                &["rev-parse", "--is-inside-work-tree"],
                "validate",
                ErrorCode::GIT_NOT_REPO,
                cancel,
            )
            .await?;
        if inside != "true" {
            return Err(BurrowError::git(
                ErrorCode::GIT_NOT_REPO,
                "validate",
                format!("{} is not a work tree", path.display()),
            ));
        }
        Ok(())
    }

    async fn remote_url(&self, path: &Path, cancel: &CancellationToken) -> Result<String> {
        self.git(
            Target::WorkTree(path),
            &["remote", "get-url", "origin"],
            "remote url",
            ErrorCode::GIT_NOT_REPO,
            cancel,
        )
        .await
    }
}

/// Recorded call on [`MockGitOperations`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Clone { remote: String, dest: PathBuf },
    CloneBare { remote: String, dest: PathBuf },
    Fetch { bare_dir: PathBuf },
    Pull { path: PathBuf },
    WorktreeAdd { bare_dir: PathBuf, path: PathBuf, branch: String },
    WorktreeRemove { bare_dir: PathBuf, path: PathBuf, branch: String },
    DefaultBranch { path: PathBuf },
    IsValidRepo { path: PathBuf },
    RemoteUrl { path: PathBuf },
}

impl GitCall {
    pub fn operation(&self) -> &'static str {
        match self {
            GitCall::Clone { .. } => "clone",
            GitCall::CloneBare { .. } => "clone_bare",
            GitCall::Fetch { .. } => "fetch",
            GitCall::Pull { .. } => "pull",
            GitCall::WorktreeAdd { .. } => "worktree_add",
            GitCall::WorktreeRemove { .. } => "worktree_remove",
            GitCall::DefaultBranch { .. } => "default_branch",
            GitCall::IsValidRepo { .. } => "is_valid_repo",
            GitCall::RemoteUrl { .. } => "remote_url",
        }
    }
}

#[derive(Default)]
struct MockGitState {
    calls: Vec<GitCall>,
    failing: HashSet<&'static str>,
    invalid: HashSet<PathBuf>,
    default_branch: Option<String>,
    remote_url: Option<String>,
}

/// Filesystem-backed fake.
///
/// Clones and worktree adds create their target directory (with a `.git`
/// entry), worktree removes delete it, and a path is a valid repository
/// while it exists and has not been marked invalid.
#[derive(Clone, Default)]
pub struct MockGitOperations {
    state: Arc<Mutex<MockGitState>>,
}

impl MockGitOperations {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockGitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every call of `operation` (as named by [`GitCall::operation`]) fail
    pub fn fail_on(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    pub fn mark_invalid(&self, path: &Path) {
        self.state().invalid.insert(path.to_path_buf());
    }

    pub fn set_default_branch(&self, branch: &str) {
        self.state().default_branch = Some(branch.to_string());
    }

    pub fn set_remote_url(&self, url: &str) {
        self.state().remote_url = Some(url.to_string());
    }

    pub fn calls(&self) -> Vec<GitCall> {
        self.state().calls.clone()
    }

    pub fn calls_for(&self, operation: &str) -> Vec<GitCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation() == operation)
            .collect()
    }

    fn record(&self, call: GitCall, cancel: &CancellationToken) -> Result<()> {
        let operation = call.operation();
        let mut state = self.state();
        state.calls.push(call);
        if cancel.is_cancelled() {
            return Err(BurrowError::cancelled(operation));
        }
        if state.failing.contains(operation) {
            return Err(BurrowError::git(
                ErrorCode::GIT_GENERIC,
                operation,
                "simulated failure",
            ));
        }
        Ok(())
    }

    fn materialize(path: &Path, git_dir: bool) -> Result<()> {
        let marker = if git_dir { path.join(".git") } else { path.to_path_buf() };
        std::fs::create_dir_all(&marker).map_err(|e| BurrowError::io("create", &marker, e))
    }
}

#[async_trait]
impl GitOperations for MockGitOperations {
    async fn clone_repo(
        &self,
        remote: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.record(
            GitCall::Clone {
                remote: remote.to_string(),
                dest: dest.to_path_buf(),
            },
            cancel,
        )?;
        Self::materialize(dest, true)
    }

    async fn clone_bare(
        &self,
        remote: &str,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let recorded = self.record(
            GitCall::CloneBare {
                remote: remote.to_string(),
                dest: dest.to_path_buf(),
            },
            cancel,
        );
        // a clone that fails partway leaves its directory behind
        Self::materialize(dest, false)?;
        recorded
    }

    async fn fetch(&self, bare_dir: &Path, cancel: &CancellationToken) -> Result<()> {
        self.record(
            GitCall::Fetch {
                bare_dir: bare_dir.to_path_buf(),
            },
            cancel,
        )
    }

    async fn pull(&self, path: &Path, cancel: &CancellationToken) -> Result<()> {
        self.record(
            GitCall::Pull {
                path: path.to_path_buf(),
            },
            cancel,
        )
    }

    async fn worktree_add(
        &self,
        bare_dir: &Path,
        path: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.record(
            GitCall::WorktreeAdd {
                bare_dir: bare_dir.to_path_buf(),
                path: path.to_path_buf(),
                branch: branch.to_string(),
            },
            cancel,
        )?;
        Self::materialize(path, true)
    }

    async fn worktree_remove(
        &self,
        bare_dir: &Path,
        path: &Path,
        branch: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.record(
            GitCall::WorktreeRemove {
                bare_dir: bare_dir.to_path_buf(),
                path: path.to_path_buf(),
                branch: branch.to_string(),
            },
            cancel,
        )?;
        if path.exists() {
            std::fs::remove_dir_all(path).map_err(|e| BurrowError::io("remove", path, e))?;
        }
        Ok(())
    }

    async fn default_branch(&self, path: &Path, cancel: &CancellationToken) -> Result<String> {
        self.record(
            GitCall::DefaultBranch {
                path: path.to_path_buf(),
            },
            cancel,
        )?;
        Ok(self
            .state()
            .default_branch
            .clone()
            .unwrap_or_else(|| "main".to_string()))
    }

    async fn is_valid_repo(&self, path: &Path, cancel: &CancellationToken) -> Result<()> {
        self.record(
            GitCall::IsValidRepo {
                path: path.to_path_buf(),
            },
            cancel,
        )?;
        if self.state().invalid.contains(path) || !path.exists() {
            return Err(BurrowError::git(
                ErrorCode::GIT_NOT_REPO,
                "validate",
                format!("{} is not a repository", path.display()),
            ));
        }
        Ok(())
    }

    async fn remote_url(&self, path: &Path, cancel: &CancellationToken) -> Result<String> {
        self.record(
            GitCall::RemoteUrl {
                path: path.to_path_buf(),
            },
            cancel,
        )?;
        self.state().remote_url.clone().ok_or_else(|| {
            BurrowError::git(ErrorCode::GIT_NOT_REPO, "remote url", "no origin remote")
        })
    }
}
