use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{copier, hooks, provision, spawner};
use crate::abstractions::{GitOperations, Multiplexer};
use crate::config::Config;
use crate::error::{BurrowError, Result};
use crate::output::OutputSwitch;
use crate::rules::{RuleMatcher, SpawnSpec};
use crate::session::{
    validate_name, CloneStrategy, EventPublisher, Session, SessionEvent, SessionId, SessionStore,
    MUX_SESSION_KEY, WORKTREE_BRANCH_KEY,
};
use crate::subprocess::ShellExecutor;
use crate::template::{TemplateData, TemplateRenderer};

/// Request for a new (or reactivated) session
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub name: String,
    /// Skips reuse of recycled workspaces when set
    pub id: Option<SessionId>,
    pub prompt: Option<String>,
    /// Detected from the current directory when absent
    pub remote: Option<String>,
    /// Copy rules read from here; no copies without it
    pub source_dir: Option<PathBuf>,
    pub strategy: Option<CloneStrategy>,
    pub batch: bool,
    pub no_spawn: bool,
}

impl CreateOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    pub fn with_strategy(mut self, strategy: CloneStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_id(mut self, id: SessionId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn batch(mut self) -> Self {
        self.batch = true;
        self
    }

    pub fn no_spawn(mut self) -> Self {
        self.no_spawn = true;
        self
    }
}

pub(super) fn check_cancel(cancel: &CancellationToken, operation: &str) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(BurrowError::cancelled(operation));
    }
    Ok(())
}

/// The session lifecycle engine.
///
/// Every public operation runs as one sequential pipeline of store calls and
/// subprocesses. Construct it with [`super::SessionManagerBuilder`].
pub struct SessionManager {
    pub(super) config: Config,
    pub(super) matcher: RuleMatcher,
    pub(super) store: Arc<dyn SessionStore>,
    pub(super) git: Arc<dyn GitOperations>,
    pub(super) mux: Arc<dyn Multiplexer>,
    pub(super) renderer: Arc<dyn TemplateRenderer>,
    pub(super) events: Arc<dyn EventPublisher>,
    pub(super) shell: ShellExecutor,
}

impl SessionManager {
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Output switch every hook, recycle, and spawn command writes through
    pub fn output(&self) -> &OutputSwitch {
        self.shell.output()
    }

    /// Create a session, reactivating a recycled workspace for the same
    /// remote and strategy when one is usable.
    ///
    /// Nothing is persisted unless provisioning and rule application succeed.
    /// A spawn failure is returned after the record has been saved.
    pub async fn create_session(
        &self,
        options: CreateOptions,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        validate_name(&options.name)?;
        let remote = self.resolve_remote(options.remote.as_deref(), cancel).await?;
        let strategy = options.strategy.unwrap_or_else(|| {
            self.matcher
                .clone_strategy(&remote, self.config.clone_strategy)
        });
        let spawn_spec = if options.no_spawn {
            None
        } else {
            Some(self.spawn_spec(&remote, options.batch)?)
        };

        if let Some(id) = &options.id {
            match self.store.get(id).await {
                Ok(_) => return Err(BurrowError::already_exists(id.as_str())),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.with_context("create session")),
            }
        }
        check_cancel(cancel, "create session")?;

        let reused = if options.id.is_none() {
            self.try_reuse(&remote, strategy, &options.name, cancel)
                .await?
        } else {
            None
        };
        let fresh = reused.is_none();
        let mut session = match reused {
            Some(session) => session,
            None => {
                self.provision_fresh(&options, &remote, strategy, cancel)
                    .await?
            }
        };
        session
            .metadata
            .insert(MUX_SESSION_KEY.to_string(), session.default_mux_session_name());

        if let Err(e) = self.apply_rules(&session, &options, cancel).await {
            self.discard_workspace(&session, fresh).await;
            return Err(e.with_context(format!("apply rules to {}", session.id)));
        }

        if let Err(e) = self.store.save(&session).await {
            self.discard_workspace(&session, fresh).await;
            return Err(e.with_context("create session"));
        }
        tracing::info!(
            "Session {} ({}) active at {}",
            session.id,
            session.name,
            session.path.display()
        );

        let spawned = match &spawn_spec {
            Some(spec) => self.spawn(&session, spec, &options, cancel).await,
            None => Ok(()),
        };
        self.events
            .publish(SessionEvent::Created {
                session: session.clone(),
            })
            .await;
        spawned.map_err(|e| e.with_context(format!("spawn session {}", session.id)))?;

        Ok(session)
    }

    /// Create with spawning deferred, then run `setup` in the workspace.
    /// A failing setup deletes the session before the error is returned.
    pub async fn create_with_setup(
        &self,
        options: CreateOptions,
        setup: &str,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        validate_name(&options.name)?;
        let remote = self.resolve_remote(options.remote.as_deref(), cancel).await?;
        let spawn_spec = if options.no_spawn {
            None
        } else {
            Some(self.spawn_spec(&remote, options.batch)?)
        };

        let mut deferred = options.clone();
        deferred.remote = Some(remote);
        deferred.no_spawn = true;
        let session = self.create_session(deferred, cancel).await?;

        let data = self.template_data(&session, &options);
        let setup = [setup.to_string()];
        if let Err(e) = hooks::run_commands(
            &self.shell,
            self.renderer.as_ref(),
            &setup,
            &session.path,
            &data,
            cancel,
        )
        .await
        {
            tracing::warn!("Setup failed for {}, rolling back", session.id);
            // compensating delete must run even when `cancel` fired
            if let Err(cleanup) = self
                .remove_session(&session, &CancellationToken::new())
                .await
            {
                tracing::error!("Failed to roll back session {}: {}", session.id, cleanup);
            }
            return Err(e.with_context(format!("setup for session {}", session.id)));
        }

        if let Some(spec) = &spawn_spec {
            self.spawn(&session, spec, &options, cancel)
                .await
                .map_err(|e| e.with_context(format!("spawn session {}", session.id)))?;
        }
        Ok(session)
    }

    pub(super) async fn resolve_remote(
        &self,
        explicit: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if let Some(remote) = explicit.map(str::trim).filter(|r| !r.is_empty()) {
            return Ok(remote.to_string());
        }

        let cwd = std::env::current_dir()
            .map_err(|e| BurrowError::io("read current directory", Path::new("."), e))?;
        match self.git.remote_url(&cwd, cancel).await {
            Ok(remote) => Ok(remote),
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => Err(BurrowError::invalid_input(
                "remote",
                format!("none given and none detected in {}: {e}", cwd.display()),
            )),
        }
    }

    fn spawn_spec(&self, remote: &str, batch: bool) -> Result<SpawnSpec> {
        self.matcher
            .spawn(
                remote,
                batch,
                &self.config.commands,
                &self.config.windows,
            )
            .ok_or_else(|| spawner::no_strategy(remote))
    }

    pub(super) fn template_data(&self, session: &Session, options: &CreateOptions) -> TemplateData {
        TemplateData::for_session(
            session,
            options.prompt.as_deref(),
            options.source_dir.as_deref(),
        )
    }

    async fn try_reuse(
        &self,
        remote: &str,
        strategy: CloneStrategy,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Session>> {
        let Some(candidate) = self
            .store
            .find_recyclable(remote, strategy)
            .await
            .map_err(|e| e.with_context("find recyclable session"))?
        else {
            return Ok(None);
        };

        let mut session = candidate.clone();
        match self.reactivate(&mut session, name, cancel).await {
            Ok(()) => {
                tracing::info!("Reusing recycled workspace {} for {}", session.id, name);
                Ok(Some(session))
            }
            Err(e) if e.is_cancelled() => Err(e),
            Err(e) => {
                tracing::warn!(
                    "Recycled workspace {} is unusable, provisioning fresh: {}",
                    candidate.id,
                    e
                );
                self.quarantine(candidate).await?;
                Ok(None)
            }
        }
    }

    async fn reactivate(
        &self,
        session: &mut Session,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match session.clone_strategy {
            CloneStrategy::Full => {
                self.git.is_valid_repo(&session.path, cancel).await?;
                self.git.pull(&session.path, cancel).await?;
                session.reactivate(name)
            }
            CloneStrategy::Worktree => {
                session.reactivate(name)?;
                self.add_worktree(session, cancel).await
            }
        }
    }

    /// Mark a failed reuse candidate corrupted, deleting it when configured to
    async fn quarantine(&self, mut session: Session) -> Result<()> {
        session.mark_corrupted()?;
        self.store
            .save(&session)
            .await
            .map_err(|e| e.with_context("mark session corrupted"))?;
        tracing::info!("Session {} marked corrupted", session.id);
        self.events
            .publish(SessionEvent::Corrupted {
                session: session.clone(),
            })
            .await;

        if self.config.auto_delete_corrupted {
            if let Err(e) = self
                .remove_session(&session, &CancellationToken::new())
                .await
            {
                tracing::warn!("Could not delete corrupted session {}: {}", session.id, e);
            }
        }
        Ok(())
    }

    /// The shared bare mirror for `remote`, cloned on first use and fetched after
    pub(super) async fn ensure_mirror(
        &self,
        remote: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let mirror = provision::mirror_path(&self.config.repos_dir, remote);
        if mirror.exists() {
            self.git.fetch(&mirror, cancel).await?;
        } else {
            if let Some(parent) = mirror.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BurrowError::io("create mirror directory", parent, e))?;
            }
            tracing::debug!("Creating bare mirror {}", mirror.display());
            if let Err(e) = self.git.clone_bare(remote, &mirror, cancel).await {
                // a half-written mirror would be fetched into on the next create
                remove_dir_quietly(&mirror).await;
                return Err(e);
            }
        }
        Ok(mirror)
    }

    async fn add_worktree(&self, session: &mut Session, cancel: &CancellationToken) -> Result<()> {
        let mirror = self.ensure_mirror(&session.remote, cancel).await?;
        let branch = provision::worktree_branch(&session.slug, &session.id);
        self.git
            .worktree_add(&mirror, &session.path, &branch, cancel)
            .await?;
        session
            .metadata
            .insert(WORKTREE_BRANCH_KEY.to_string(), branch);
        Ok(())
    }

    async fn provision_fresh(
        &self,
        options: &CreateOptions,
        remote: &str,
        strategy: CloneStrategy,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        let repos_dir = &self.config.repos_dir;
        tokio::fs::create_dir_all(repos_dir)
            .await
            .map_err(|e| BurrowError::io("create repos directory", repos_dir, e))?;

        let path = provision::new_workspace_path(repos_dir, remote, strategy)?;
        let id = options.id.clone().unwrap_or_default();
        let mut session = Session::new(id, &options.name, remote, path, strategy)?;
        tracing::debug!(
            "Provisioning {} workspace {} at {}",
            strategy,
            session.id,
            session.path.display()
        );

        let provisioned = match strategy {
            CloneStrategy::Full => self.git.clone_repo(remote, &session.path, cancel).await,
            CloneStrategy::Worktree => self.add_worktree(&mut session, cancel).await,
        };
        if let Err(e) = provisioned {
            remove_dir_quietly(&session.path).await;
            return Err(e.with_context(format!("provision workspace for {remote}")));
        }
        Ok(session)
    }

    async fn apply_rules(
        &self,
        session: &Session,
        options: &CreateOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(source) = &options.source_dir {
            let specs = self.matcher.copy_specs(&session.remote);
            if !specs.is_empty() {
                let copied = copier::copy_specs(source, &session.path, &specs)?;
                tracing::debug!("Copied {} files into {}", copied, session.path.display());
            }
        }
        check_cancel(cancel, "apply rules")?;

        let commands = self.matcher.hook_commands(&session.remote);
        hooks::run_commands(
            &self.shell,
            self.renderer.as_ref(),
            &commands,
            &session.path,
            &self.template_data(session, options),
            cancel,
        )
        .await
    }

    async fn spawn(
        &self,
        session: &Session,
        spec: &SpawnSpec,
        options: &CreateOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let data = self.template_data(session, options);
        let strategy = spawner::resolve(self.renderer.as_ref(), spec, session, &data)?;
        spawner::execute(&strategy, session, &self.shell, self.mux.as_ref(), cancel).await
    }

    /// Undo provisioning for a create that will not be persisted. A reused
    /// record stays recycled, so its worktree goes away again.
    async fn discard_workspace(&self, session: &Session, fresh: bool) {
        if session.clone_strategy == CloneStrategy::Worktree {
            self.release_worktree(session, &CancellationToken::new())
                .await;
        }
        if fresh {
            remove_dir_quietly(&session.path).await;
        }
    }
}

pub(super) async fn remove_dir_quietly(path: &Path) {
    if !path.exists() {
        return;
    }
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        tracing::warn!("Failed to clean up {}: {}", path.display(), e);
    }
}
