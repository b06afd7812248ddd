use anyhow::Result;
use burrow::config::ConfigLoader;
use burrow::session::{CloneStrategy, Session, SessionId};
use burrow::{BurrowError, CreateOptions, SessionManager, SessionManagerBuilder};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "burrow")]
#[command(about = "Provision, recycle, and retire git workspaces for coding agents", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (defaults to $BURROW_CONFIG, then the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Silence hook, recycle, and spawn command output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a session, reusing a recycled workspace when possible
    New {
        name: String,

        /// Repository to clone (detected from the current directory if omitted)
        #[arg(short, long)]
        remote: Option<String>,

        /// Prompt handed to the spawn commands
        #[arg(short, long)]
        prompt: Option<String>,

        /// Directory copy rules read from
        #[arg(long)]
        source: Option<PathBuf>,

        #[arg(long, value_parser = parse_strategy)]
        strategy: Option<CloneStrategy>,

        /// Use this session id instead of a generated one
        #[arg(long)]
        id: Option<String>,

        /// Use the batch spawn command set
        #[arg(long)]
        batch: bool,

        /// Do not spawn the agent environment
        #[arg(long)]
        no_spawn: bool,

        /// Run this command in the new workspace; the session is deleted if it fails
        #[arg(long)]
        setup: Option<String>,
    },

    /// List sessions
    Ls {
        #[arg(long)]
        json: bool,
    },

    /// Reset a session's workspace for reuse
    Recycle { id: String },

    /// Delete a session and its workspace
    Rm { id: String },

    /// Rename a session (its workspace path does not change)
    Rename { id: String, name: String },

    /// Delete corrupted sessions and recycled ones beyond quota
    Prune {
        /// Delete every recycled session regardless of quota
        #[arg(long)]
        all: bool,
    },

    /// Attach to a session's multiplexer session
    Open {
        id: String,

        /// Window to select
        #[arg(short, long)]
        window: Option<String>,
    },
}

fn parse_strategy(value: &str) -> std::result::Result<CloneStrategy, String> {
    value.parse::<CloneStrategy>()
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("burrow started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    if let Err(e) = run(cli, &cancel).await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        let code = match e.downcast_ref::<BurrowError>() {
            Some(err) => {
                if let Some(output) = err.command_output() {
                    eprintln!("{}", output.trim_end());
                }
                err.exit_code()
            }
            None => 1,
        };
        std::process::exit(code);
    }
}

async fn run(cli: Cli, cancel: &CancellationToken) -> Result<()> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_path(path),
        None => ConfigLoader::new(),
    };
    let config = loader.load().await?;
    let manager = SessionManagerBuilder::new(config).build()?;
    let _quiet = cli.quiet.then(|| manager.output().suspend());

    match cli.command {
        Commands::New {
            name,
            remote,
            prompt,
            source,
            strategy,
            id,
            batch,
            no_spawn,
            setup,
        } => {
            let options = CreateOptions {
                name,
                id: id.map(SessionId::from_string),
                prompt,
                remote,
                source_dir: source,
                strategy,
                batch,
                no_spawn,
            };
            let session = match setup {
                Some(setup) => manager.create_with_setup(options, &setup, cancel).await?,
                None => manager.create_session(options, cancel).await?,
            };
            println!("{}\t{}", session.id, session.path.display());
        }
        Commands::Ls { json } => list(&manager, json).await?,
        Commands::Recycle { id } => {
            let session = manager.recycle_session(&SessionId::from_string(id), cancel).await?;
            println!("Recycled {} ({})", session.id, session.name);
        }
        Commands::Rm { id } => {
            let id = SessionId::from_string(id);
            manager.delete_session(&id, cancel).await?;
            println!("Deleted {id}");
        }
        Commands::Rename { id, name } => {
            let session = manager
                .rename_session(&SessionId::from_string(id), &name)
                .await?;
            println!("Renamed {} to {}", session.id, session.name);
        }
        Commands::Prune { all } => {
            let removed = manager.prune(all, cancel).await?;
            println!("Pruned {removed} session(s)");
        }
        Commands::Open { id, window } => {
            manager
                .open_session(&SessionId::from_string(id), window.as_deref(), cancel)
                .await?;
        }
    }
    Ok(())
}

async fn list(manager: &SessionManager, json: bool) -> Result<()> {
    let sessions = manager.list_sessions().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }
    if sessions.is_empty() {
        println!("No sessions");
        return Ok(());
    }
    for session in &sessions {
        println!("{}", format_row(session));
    }
    Ok(())
}

fn format_row(session: &Session) -> String {
    format!(
        "{:<10}  {:<9}  {:<8}  {:<24}  {}",
        session.id.as_str(),
        session.state.to_string(),
        session.clone_strategy.to_string(),
        session.name,
        session.path.display()
    )
}
