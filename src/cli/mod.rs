//! # Queenbee CLI
//!
//! Command surface over the library crates: author plugins and recipes,
//! resolve and install recipe dependencies, and manage package
//! repositories. Every command is a single well-defined transformation
//! that exits non-zero with a diagnostic on any error.

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

pub mod config;
pub mod plugin;
pub mod recipe;
pub mod repo;

#[derive(Debug, Parser)]
#[command(
    name = "queenbee",
    version,
    about = "Queenbee - workflow authoring and packaging for DAG recipes"
)]
#[clap(arg_required_else_help = true)]
pub struct Args {
    #[command(subcommand)]
    command: Command,

    #[clap(flatten)]
    global_options: GlobalOptions,
}

#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Increase logging verbosity (-v for warnings, -vv for info, -vvv
    /// for debug, -vvvv for trace)
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Author, lint and package plugins
    Plugin(plugin::Args),
    /// Author recipes, manage their dependencies and package them
    Recipe(recipe::Args),
    /// Manage and serve package repositories
    Repo(repo::Args),
    /// View and edit the local configuration
    Config(config::Args),
}

impl Args {
    pub fn init_logging(&self) {
        let level = match self.global_options.verbose {
            0 => LevelFilter::ERROR,
            1 => LevelFilter::WARN,
            2 => LevelFilter::INFO,
            3 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        };
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .init();
    }
}

pub async fn execute(args: Args) -> miette::Result<()> {
    // One token for the whole command; ctrl-c requests cooperative
    // cancellation of in-flight fetches.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    match args.command {
        Command::Plugin(args) => plugin::execute(args).await,
        Command::Recipe(args) => recipe::execute(args, &cancel).await,
        Command::Repo(args) => repo::execute(args, &cancel).await,
        Command::Config(args) => config::execute(args).await,
    }
}
