mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::AnyError;
use targetmux::config::Config;
use targetmux::observability;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    observability::init_tracing(&config.log)?;

    let router = config.router()?;

    match cli.command {
        Commands::Describe => commands::describe(&router).await?,
        Commands::List(args) => commands::list(&router, args).await?,
        Commands::Targets => commands::targets(&router)?,
        Commands::Route(args) => commands::route(&router, args).await?,
    }

    tracing::debug!(metrics = ?router.metrics().snapshot(), "Done");
    Ok(())
}
