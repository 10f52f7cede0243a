use super::{open_storage, HistoryArgs, OutputFormat};
use crate::config::AlmanacConfig;
use almanac_core::api::normalize_limit;
use almanac_core::{Category, HistoryEntry, RecordFilter, Storage};
use anyhow::Result;

pub async fn run(args: HistoryArgs, config: &AlmanacConfig) -> Result<()> {
    let storage = open_storage(config)?;

    let mut filter = RecordFilter::new().with_limit(normalize_limit(args.limit));
    if let Some(name) = &args.category {
        filter = filter.with_category(name.parse::<Category>()?);
    }
    let entries: Vec<HistoryEntry> = storage
        .list_records(filter)?
        .into_iter()
        .map(HistoryEntry::from)
        .collect();

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No records yet.");
        return Ok(());
    }

    println!();
    for entry in &entries {
        println!("{}  {:8}  {}", entry.date, entry.category.as_str(), entry.content);
    }
    println!();
    Ok(())
}
