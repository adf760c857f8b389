use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ls_cli::commands::{fetch, watch};
use ls_cli::{Cli, Commands, Config};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    match command {
        Commands::Watch(args) => runtime.block_on(watch::run(&config, args)),
        Commands::Fetch { formatted, json } => {
            runtime.block_on(fetch::run(&config, *formatted, *json))
        }
    }
}
