use crate::cli::ConfigCommands;
use crate::config::{mask_api_key, AlmanacConfig};
use anyhow::Result;
use std::path::Path;

pub async fn run(cmd: ConfigCommands, config_path: &Path, effective: &AlmanacConfig) -> Result<()> {
    match cmd {
        ConfigCommands::Validate => validate(config_path, effective),
        ConfigCommands::Show => show(effective),
    }
}

fn validate(config_path: &Path, effective: &AlmanacConfig) -> Result<()> {
    if config_path.exists() {
        // Surface parse errors that load_or_default would have swallowed
        AlmanacConfig::load(config_path)?;
    }

    let mut errors = effective.validate();
    if effective.require_api_key().is_err() {
        errors.push("[provider] api_key is not set (ALMANAC_API_KEY)".into());
    }

    if errors.is_empty() {
        println!("✅ configuration is valid ({}).", config_path.display());
        Ok(())
    } else {
        println!("❌ Validation errors:");
        for e in &errors {
            println!("  - {}", e);
        }
        anyhow::bail!("{} configuration error(s)", errors.len())
    }
}

fn show(effective: &AlmanacConfig) -> Result<()> {
    let mut shown = effective.clone();
    shown.provider.api_key = shown.provider.api_key.as_deref().map(mask_api_key);
    match toml::to_string_pretty(&shown) {
        Ok(s) => println!("{}", s),
        Err(e) => anyhow::bail!("Failed to serialize config: {}", e),
    }
    Ok(())
}
