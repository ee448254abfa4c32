mod cmd_diff;
mod cmd_render;
mod cmd_session;
mod cmd_validate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nodegraph::v1::EditorConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "nodegraph")]
#[command(about = "Validate, diff, render, and edit node graph scene documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    /// Editor configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a scene document
    Validate {
        /// Input file
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Print the structural increment between two scene documents
    Diff {
        /// Previous scene file
        old: PathBuf,

        /// Current scene file
        new: PathBuf,
    },
    /// Render scene documents to other formats
    Render {
        #[command(subcommand)]
        format: cmd_render::RenderFormat,
    },
    /// Edit a scene through a persistent session with undo/redo
    Session {
        #[command(subcommand)]
        op: cmd_session::SessionOp,
    },
}

fn load_config(path: Option<&Path>) -> Result<EditorConfig> {
    match path {
        Some(path) => EditorConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EditorConfig::default()),
    }
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate { input } => cmd_validate::run(input),
        Commands::Diff { old, new } => cmd_diff::run(old, new, cli.pretty),
        Commands::Render { format } => cmd_render::run(format),
        Commands::Session { op } => cmd_session::run(op, &config, cli.pretty),
    }
}
