use tokio_util::sync::CancellationToken;

use super::manager::SessionManager;
use super::spawner;
use crate::config::WindowSpec;
use crate::error::{BurrowError, Result};
use crate::session::{Session, SessionEvent, SessionId, SessionState};
use crate::template::TemplateData;

const DEFAULT_WINDOW: &str = "main";

impl SessionManager {
    /// All sessions, oldest first
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.store.list().await
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<Session> {
        self.store.get(id).await
    }

    /// Changes the display name and slug; the workspace path stays put
    pub async fn rename_session(&self, id: &SessionId, name: &str) -> Result<Session> {
        let mut session = self.store.get(id).await?;
        let old_name = session.name.clone();
        session.rename(name)?;
        self.store
            .save(&session)
            .await
            .map_err(|e| e.with_context(format!("rename {id}")))?;
        tracing::info!("Session {} renamed from {} to {}", id, old_name, session.name);
        self.events
            .publish(SessionEvent::Renamed {
                session: session.clone(),
                old_name,
            })
            .await;
        Ok(session)
    }

    /// Attach to the session's multiplexer session, creating it from the
    /// configured windows if it is not running
    pub async fn open_session(
        &self,
        id: &SessionId,
        target_window: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let session = self.store.get(id).await?;
        if session.state != SessionState::Active {
            return Err(BurrowError::invalid_state(
                id.as_str(),
                session.state,
                "active",
            ));
        }

        let mut specs = self
            .matcher
            .windows(&session.remote, &self.config.windows);
        if specs.is_empty() {
            specs.push(WindowSpec {
                name: DEFAULT_WINDOW.to_string(),
                ..Default::default()
            });
        }
        let data = TemplateData::for_session(&session, None, None);
        let windows =
            spawner::render_windows(self.renderer.as_ref(), &specs, &session.path, &data)?;

        self.mux
            .open_session(
                &session.mux_session_name(),
                &session.path,
                &windows,
                target_window,
                cancel,
            )
            .await
    }
}
