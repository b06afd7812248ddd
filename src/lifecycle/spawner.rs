//! Launching the agent's terminal environment

use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::hooks::render_all;
use crate::abstractions::{Multiplexer, Window};
use crate::config::WindowSpec;
use crate::error::{BurrowError, ErrorCode, Result};
use crate::rules::SpawnSpec;
use crate::session::Session;
use crate::subprocess::ShellExecutor;
use crate::template::{TemplateData, TemplateRenderer};

/// A fully rendered spawn plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpawnStrategy {
    Commands(Vec<String>),
    Windows(Vec<Window>),
}

/// Error for a remote with neither spawn commands nor windows configured
pub fn no_strategy(remote: &str) -> BurrowError {
    BurrowError::config_with_code(
        ErrorCode::CONFIG_NO_SPAWN_STRATEGY,
        format!("no spawn commands or windows configured for {remote}"),
    )
}

fn render_optional(
    renderer: &dyn TemplateRenderer,
    value: Option<&str>,
    data: &TemplateData,
) -> Result<Option<String>> {
    value.map(|v| renderer.render(v, data)).transpose()
}

/// Render every window field; relative directories resolve against `base`
pub fn render_windows(
    renderer: &dyn TemplateRenderer,
    specs: &[WindowSpec],
    base: &Path,
    data: &TemplateData,
) -> Result<Vec<Window>> {
    specs
        .iter()
        .map(|spec| {
            let dir = render_optional(renderer, spec.dir.as_deref(), data)?
                .filter(|d| !d.trim().is_empty())
                .map(|d| {
                    let d = PathBuf::from(d);
                    if d.is_absolute() {
                        d
                    } else {
                        base.join(d)
                    }
                });
            Ok(Window {
                name: renderer.render(&spec.name, data)?,
                command: render_optional(renderer, spec.command.as_deref(), data)?,
                dir,
                focus: spec.focus,
            })
        })
        .collect()
}

/// Render a resolved spec. Nothing is executed if any field fails to render.
pub fn resolve(
    renderer: &dyn TemplateRenderer,
    spec: &SpawnSpec,
    session: &Session,
    data: &TemplateData,
) -> Result<SpawnStrategy> {
    match spec {
        SpawnSpec::Commands(commands) => {
            Ok(SpawnStrategy::Commands(render_all(renderer, commands, data)?))
        }
        SpawnSpec::Windows(windows) => Ok(SpawnStrategy::Windows(render_windows(
            renderer,
            windows,
            &session.path,
            data,
        )?)),
    }
}

pub async fn execute(
    strategy: &SpawnStrategy,
    session: &Session,
    shell: &ShellExecutor,
    mux: &dyn Multiplexer,
    cancel: &CancellationToken,
) -> Result<()> {
    match strategy {
        SpawnStrategy::Commands(commands) => {
            for command in commands {
                tracing::debug!("Spawning for {}: {}", session.id, command);
                shell
                    .run_streamed(command, Some(&session.path), cancel)
                    .await?;
            }
            Ok(())
        }
        SpawnStrategy::Windows(windows) => {
            let name = session.mux_session_name();
            tracing::debug!(
                "Creating multiplexer session {} with {} windows",
                name,
                windows.len()
            );
            mux.create_session(&name, &session.path, windows, cancel)
                .await
        }
    }
}
