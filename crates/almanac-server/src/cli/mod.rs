pub mod config_cmd;
pub mod history;
pub mod next_update;
pub mod stats;
pub mod sweep;
pub mod today;

use crate::config::{mask_api_key, AlmanacConfig};
use crate::provider::ChatCompletionProvider;
use almanac_core::{DailyResolver, RedbStorage};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "almanac")]
#[command(version, about = "One new proverb, poem and medical classic every day")]
pub struct Cli {
    /// Path to almanac.toml
    #[arg(
        long,
        global = true,
        env = "ALMANAC_CONFIG",
        default_value = "almanac.toml"
    )]
    pub config: PathBuf,

    /// Path to data directory (overrides config file)
    #[arg(long, global = true, env = "ALMANAC_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server (and the scheduler when enabled)
    Serve,
    /// Print today's content for one category, generating it if needed
    Today(TodayArgs),
    /// Regenerate every category now, in the foreground
    Sweep,
    /// Show stored content, newest first
    History(HistoryArgs),
    /// Per-category statistics
    Stats,
    /// When the next scheduled sweep will run
    NextUpdate,
    /// Configuration commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct TodayArgs {
    /// english | chinese | tcm
    pub category: String,
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Only this category
    #[arg(long)]
    pub category: Option<String>,
    /// Number of records (default 10, max 100)
    #[arg(long)]
    pub limit: Option<i64>,
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Validate,
    Show,
}

/// Open the database named by the config, creating the data directory.
pub fn open_storage(config: &AlmanacConfig) -> Result<Arc<RedbStorage>> {
    let path = config.db_path();
    let storage = RedbStorage::open(&path)
        .with_context(|| format!("opening database {}", path.display()))?;
    Ok(Arc::new(storage))
}

/// Storage plus the configured chat-completion provider. Fails without an API key.
pub fn build_resolver(config: &AlmanacConfig) -> Result<Arc<DailyResolver<RedbStorage>>> {
    let api_key = config.require_api_key()?;
    info!(
        "Provider: {} (model {}, key {})",
        config.provider.base_url,
        config.provider.model,
        mask_api_key(api_key)
    );
    let provider = Arc::new(ChatCompletionProvider::new(&config.provider, api_key)?);
    Ok(Arc::new(DailyResolver::new(open_storage(config)?, provider)))
}
