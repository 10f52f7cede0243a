use super::open_storage;
use crate::config::AlmanacConfig;
use almanac_core::{Category, Storage};
use anyhow::Result;

pub async fn run(config: &AlmanacConfig) -> Result<()> {
    let storage = open_storage(config)?;
    let by_category = storage.category_stats()?;
    let totals = storage.stats()?;

    let db_mb = totals.db_size_bytes as f64 / 1_048_576.0;

    println!();
    println!("Almanac Overview");
    println!("{}", "─".repeat(50));
    println!("{:32} {:>7} {:>7}", "Category", "Total", "Days");
    for category in Category::ALL {
        let counts = by_category.get(&category).copied().unwrap_or_default();
        println!(
            "{:32} {:>7} {:>7}",
            category.display_name(),
            counts.total_days,
            counts.unique_days
        );
    }
    println!("Records: {:>8}", totals.record_count);
    println!("Seen:    {:>8}", totals.seen_count);
    println!("DB Size: {:>7.1} MB", db_mb);
    println!("{}", "─".repeat(50));
    println!();

    Ok(())
}
