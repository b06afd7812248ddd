//! Deletion, pruning, and quota enforcement

use tokio_util::sync::CancellationToken;

use super::manager::{check_cancel, SessionManager};
use super::quota;
use crate::error::{BurrowError, Result};
use crate::session::{CloneStrategy, Session, SessionEvent, SessionId, SessionState};

impl SessionManager {
    pub async fn delete_session(&self, id: &SessionId, cancel: &CancellationToken) -> Result<()> {
        let session = self.store.get(id).await?;
        self.remove_session(&session, cancel).await
    }

    /// Directory first, record second. A directory that cannot be removed
    /// leaves the record in place.
    pub(super) async fn remove_session(
        &self,
        session: &Session,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if session.clone_strategy == CloneStrategy::Worktree && session.path.exists() {
            self.release_worktree(session, cancel).await;
        }
        if session.state == SessionState::Active {
            self.kill_mux_quietly(session, cancel).await;
        }

        match tokio::fs::symlink_metadata(&session.path).await {
            Ok(_) => {
                tokio::fs::remove_dir_all(&session.path)
                    .await
                    .map_err(|e| {
                        BurrowError::io("remove workspace", &session.path, e)
                            .with_context(format!("delete {}", session.id))
                    })?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BurrowError::io("inspect workspace", &session.path, e)
                    .with_context(format!("delete {}", session.id)));
            }
        }

        self.store
            .delete(&session.id)
            .await
            .map_err(|e| e.with_context(format!("delete {}", session.id)))?;
        tracing::info!("Session {} deleted", session.id);
        self.events
            .publish(SessionEvent::Deleted {
                session: session.clone(),
            })
            .await;
        Ok(())
    }

    /// Delete every corrupted session, then every recycled one when `all` is
    /// set or the quota excess otherwise. Returns how many were deleted.
    pub async fn prune(&self, all: bool, cancel: &CancellationToken) -> Result<usize> {
        let sessions = self
            .store
            .list()
            .await
            .map_err(|e| e.with_context("prune"))?;

        let targets: Vec<Session> = sessions
            .into_iter()
            .filter(|s| {
                s.state == SessionState::Corrupted || (all && s.state == SessionState::Recycled)
            })
            .collect();
        let mut removed = self.remove_each(targets, cancel).await?;

        if !all {
            removed += self.enforce_quota(None, cancel).await?;
        }
        Ok(removed)
    }

    /// Delete the oldest recycled sessions beyond each remote's quota
    pub async fn enforce_quota(
        &self,
        remote: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let sessions = self
            .store
            .list()
            .await
            .map_err(|e| e.with_context("enforce quota"))?;
        let evictions =
            quota::select_evictions(sessions, &self.matcher, self.config.max_recycled, remote);
        self.remove_each(evictions, cancel).await
    }

    /// Individual failures are logged and skipped; cancellation stops the loop
    async fn remove_each(&self, sessions: Vec<Session>, cancel: &CancellationToken) -> Result<usize> {
        let mut removed = 0;
        for session in sessions {
            check_cancel(cancel, "prune")?;
            match self.remove_session(&session, cancel).await {
                Ok(()) => removed += 1,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => tracing::error!("Failed to delete session {}: {}", session.id, e),
            }
        }
        Ok(removed)
    }
}
