use clap::Parser;
use tessera::RuntimeConfig;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod kinds;

use cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("tessera=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            RuntimeConfig::from_file(path)?
        }
        None => RuntimeConfig::default(),
    };

    match cli.command {
        Commands::Diff(args) => commands::diff::run(&args),
        Commands::Render(args) => commands::render::run(&args, config).await,
    }
}
