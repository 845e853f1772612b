mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::run::RunArgs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "chanmon",
    about = "Snap channel monitor: test every newly published revision once and track it in Jira",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file
    #[arg(long, global = true, env = "CHANMON_CONFIG", default_value = "chanmon.yaml")]
    config: PathBuf,

    /// Target catalog (.yaml, .yml or .json)
    #[arg(long, global = true, env = "CHANMON_CATALOG", default_value = "monitor.yaml")]
    catalog: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass over the catalog
    Run(RunArgs),

    /// Validate the config and the catalog
    Check,

    /// Show the revision every target currently resolves to
    Revisions,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(&cli.config, &cli.catalog, args, cli.json),
        Commands::Check => cmd::check::run(&cli.config, &cli.catalog, cli.json),
        Commands::Revisions => cmd::revisions::run(&cli.config, &cli.catalog, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
