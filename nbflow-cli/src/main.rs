mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use commands::deploy::DeployArgs;
use commands::env::{InfoArgs, ResumeArgs};
use commands::steps::StepsArgs;

/// Turn notebook cells into pipeline steps and deploy them
#[derive(Parser, Debug)]
#[command(name = "nbflow", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect and edit the step tags of a notebook
    Steps(StepsArgs),

    /// Validate, compile and optionally upload and run a notebook
    Deploy(DeployArgs),

    /// Show the cluster namespace, image, volumes and experiments
    Info(InfoArgs),

    /// Restore the data of a notebook launched to explore a step
    Resume(ResumeArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Steps(args) => commands::steps::execute(args),
        Command::Deploy(args) => commands::deploy::execute(args).await,
        Command::Info(args) => commands::env::info(args).await,
        Command::Resume(args) => commands::env::resume(args).await,
    }
}
