//! Returning workspaces to a clean, reusable state

use tokio_util::sync::CancellationToken;

use super::manager::{remove_dir_quietly, SessionManager};
use super::{hooks, provision};
use crate::error::{BurrowError, Result};
use crate::session::{CloneStrategy, Session, SessionEvent, SessionId, SessionState};
use crate::template::TemplateData;

impl SessionManager {
    /// Reset an active session's workspace and mark it recycled.
    ///
    /// Full clones are validated and reset in place with the recycle command
    /// set; an invalid clone is marked corrupted and reported. Worktrees are
    /// removed from the mirror. Quota is enforced for the remote afterwards.
    pub async fn recycle_session(
        &self,
        id: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        let mut session = self.store.get(id).await?;
        if session.state != SessionState::Active {
            return Err(BurrowError::invalid_state(
                id.as_str(),
                session.state,
                "active",
            ));
        }

        match session.clone_strategy {
            CloneStrategy::Full => self.reset_clone(&mut session, cancel).await?,
            CloneStrategy::Worktree => self.release_worktree(&session, cancel).await,
        }
        self.kill_mux_quietly(&session, cancel).await;

        session.mark_recycled()?;
        self.store
            .save(&session)
            .await
            .map_err(|e| e.with_context(format!("recycle {id}")))?;
        tracing::info!("Session {} recycled", session.id);
        self.events
            .publish(SessionEvent::Recycled {
                session: session.clone(),
            })
            .await;

        if let Err(e) = self.enforce_quota(Some(&session.remote), cancel).await {
            tracing::warn!("Quota enforcement for {} failed: {}", session.remote, e);
        }
        Ok(session)
    }

    async fn reset_clone(&self, session: &mut Session, cancel: &CancellationToken) -> Result<()> {
        if let Err(e) = self.git.is_valid_repo(&session.path, cancel).await {
            if e.is_cancelled() {
                return Err(e);
            }
            session.mark_corrupted()?;
            self.store
                .save(session)
                .await
                .map_err(|e| e.with_context("mark session corrupted"))?;
            self.events
                .publish(SessionEvent::Corrupted {
                    session: session.clone(),
                })
                .await;
            return Err(BurrowError::corrupted(session.id.as_str(), e.to_string()));
        }

        let branch = match self.git.default_branch(&session.path, cancel).await {
            Ok(branch) => branch,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::debug!(
                    "Falling back to {} for {}: {}",
                    self.config.default_branch,
                    session.id,
                    e
                );
                self.config.default_branch.clone()
            }
        };

        let data = TemplateData::for_session(session, None, None).with("default_branch", branch);
        hooks::run_commands(
            &self.shell,
            self.renderer.as_ref(),
            &self.config.commands.recycle,
            &session.path,
            &data,
            cancel,
        )
        .await
        .map_err(|e| e.with_context(format!("recycle {}", session.id)))
    }

    /// Remove a worktree and its branch from the mirror. Failures are logged;
    /// the directory is gone afterwards either way.
    pub(super) async fn release_worktree(&self, session: &Session, cancel: &CancellationToken) {
        let mirror = provision::mirror_path(&self.config.repos_dir, &session.remote);
        let branch = session
            .worktree_branch()
            .map(str::to_string)
            .unwrap_or_else(|| provision::worktree_branch(&session.slug, &session.id));

        if let Err(e) = self
            .git
            .worktree_remove(&mirror, &session.path, &branch, cancel)
            .await
        {
            tracing::warn!("Failed to remove worktree {}: {}", session.path.display(), e);
        }
        remove_dir_quietly(&session.path).await;
    }

    /// Absence of the multiplexer session is expected, so errors are only logged
    pub(super) async fn kill_mux_quietly(&self, session: &Session, cancel: &CancellationToken) {
        let name = session.mux_session_name();
        if let Err(e) = self.mux.kill_session(&name, cancel).await {
            tracing::debug!("No multiplexer session {} to kill: {}", name, e);
        }
    }
}
