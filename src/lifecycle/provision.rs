//! Workspace and mirror locations

use rand::Rng;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{BurrowError, Result};
use crate::rules::repo_name;
use crate::session::{CloneStrategy, SessionId};

const SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 6;
const MAX_PATH_ATTEMPTS: usize = 32;

pub const MIRRORS_DIR: &str = ".mirrors";

pub fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SUFFIX_LEN)
        .map(|_| SUFFIX_CHARSET[rng.random_range(0..SUFFIX_CHARSET.len())] as char)
        .collect()
}

/// Directory name for a fresh workspace. Never derived from the display name,
/// which can change after creation.
pub fn workspace_dir_name(repo: &str, strategy: CloneStrategy, suffix: &str) -> String {
    match strategy {
        CloneStrategy::Full => format!("{repo}-{suffix}"),
        CloneStrategy::Worktree => format!("{repo}-wt-{suffix}"),
    }
}

/// An unused workspace path under `repos_dir`
pub fn new_workspace_path(repos_dir: &Path, remote: &str, strategy: CloneStrategy) -> Result<PathBuf> {
    let repo = repo_name(remote);
    for _ in 0..MAX_PATH_ATTEMPTS {
        let candidate = repos_dir.join(workspace_dir_name(&repo, strategy, &random_suffix()));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(BurrowError::other(format!(
        "could not find a free workspace directory for {repo} in {}",
        repos_dir.display()
    )))
}

/// The bare mirror shared by every worktree session of `remote`
pub fn mirror_path(repos_dir: &Path, remote: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(remote.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    repos_dir
        .join(MIRRORS_DIR)
        .join(format!("{}-{}.git", repo_name(remote), &digest[..8]))
}

/// Branch a worktree session is checked out on
pub fn worktree_branch(slug: &str, id: &SessionId) -> String {
    format!("burrow/{slug}-{id}")
}
