//! Session manager construction
//!
//! Every collaborator defaults to its production implementation; tests swap
//! in the in-memory store and the mocks.

use std::sync::Arc;

use super::manager::SessionManager;
use crate::abstractions::{GitCli, GitOperations, Multiplexer, Tmux};
use crate::config::Config;
use crate::error::Result;
use crate::output::OutputSwitch;
use crate::rules::RuleMatcher;
use crate::session::{EventPublisher, JsonFileStore, SessionStore, TracingPublisher};
use crate::subprocess::{ProcessRunner, ShellExecutor, TokioProcessRunner};
use crate::template::{TemplateRenderer, TeraRenderer};

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    config: Config,
    store: Option<Arc<dyn SessionStore>>,
    git: Option<Arc<dyn GitOperations>>,
    mux: Option<Arc<dyn Multiplexer>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    events: Option<Arc<dyn EventPublisher>>,
    runner: Option<Arc<dyn ProcessRunner>>,
    output: Option<OutputSwitch>,
}

impl SessionManagerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: None,
            git: None,
            mux: None,
            renderer: None,
            events: None,
            runner: None,
            output: None,
        }
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn git(mut self, git: Arc<dyn GitOperations>) -> Self {
        self.git = Some(git);
        self
    }

    pub fn multiplexer(mut self, mux: Arc<dyn Multiplexer>) -> Self {
        self.mux = Some(mux);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Runner for hook, recycle, and spawn commands, and for the default
    /// git and tmux clients
    pub fn runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn output(mut self, output: OutputSwitch) -> Self {
        self.output = Some(output);
        self
    }

    /// Fails when the configuration does not validate
    pub fn build(self) -> Result<SessionManager> {
        self.config.validate()?;
        let matcher = RuleMatcher::new(&self.config.rules)?;

        let runner = self
            .runner
            .unwrap_or_else(|| Arc::new(TokioProcessRunner));
        let git = self
            .git
            .unwrap_or_else(|| Arc::new(GitCli::new(Arc::clone(&runner))));
        let mux = self
            .mux
            .unwrap_or_else(|| Arc::new(Tmux::new(Arc::clone(&runner))));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(JsonFileStore::new(self.config.store_path.clone())));
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(TeraRenderer::new()));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingPublisher));
        let shell = ShellExecutor::new(runner, self.output.unwrap_or_else(OutputSwitch::stdio));

        Ok(SessionManager {
            config: self.config,
            matcher,
            store,
            git,
            mux,
            renderer,
            events,
            shell,
        })
    }
}
