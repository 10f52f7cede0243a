mod cli;
mod config;
mod http;
mod provider;
mod serve;

use clap::Parser;
use cli::{Cli, Commands};
use config::AlmanacConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; `log` records from almanac-core are bridged in
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AlmanacConfig::load_or_default(&cli.config);
    config.apply_env();
    if let Some(dir) = cli.data_dir {
        config.server.data_dir = dir;
    }

    match cli.command {
        Commands::Serve => serve::run(config).await,
        Commands::Today(args) => cli::today::run(args, &config).await,
        Commands::Sweep => cli::sweep::run(&config).await,
        Commands::History(args) => cli::history::run(args, &config).await,
        Commands::Stats => cli::stats::run(&config).await,
        Commands::NextUpdate => cli::next_update::run(&config).await,
        Commands::Config(cmd) => cli::config_cmd::run(cmd, &cli.config, &config).await,
    }
}
