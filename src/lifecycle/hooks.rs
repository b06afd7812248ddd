use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::subprocess::ShellExecutor;
use crate::template::{TemplateData, TemplateRenderer};

/// Render every command up front so a bad template runs nothing
pub fn render_all(
    renderer: &dyn TemplateRenderer,
    commands: &[String],
    data: &TemplateData,
) -> Result<Vec<String>> {
    commands
        .iter()
        .map(|command| renderer.render(command, data))
        .collect()
}

/// Run `commands` in `dir` one after another; the first failure stops the rest
pub async fn run_commands(
    shell: &ShellExecutor,
    renderer: &dyn TemplateRenderer,
    commands: &[String],
    dir: &Path,
    data: &TemplateData,
    cancel: &CancellationToken,
) -> Result<()> {
    let rendered = render_all(renderer, commands, data)?;
    for command in &rendered {
        tracing::debug!("Running hook in {}: {}", dir.display(), command);
        shell.run_streamed(command, Some(dir), cancel).await?;
    }
    Ok(())
}
