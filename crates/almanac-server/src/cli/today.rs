use super::{build_resolver, OutputFormat, TodayArgs};
use crate::config::AlmanacConfig;
use almanac_core::{Almanac, TodayContent};
use anyhow::Result;

pub async fn run(args: TodayArgs, config: &AlmanacConfig) -> Result<()> {
    let almanac = Almanac::new(build_resolver(config)?);
    let envelope = almanac.today(&args.category).await;

    if args.format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    } else if let Some(data) = &envelope.data {
        print_text(data);
    }

    if !envelope.success {
        anyhow::bail!(
            "{} ({}): {}",
            envelope.message,
            envelope.code().unwrap_or("UNKNOWN"),
            envelope.errors.join("; ")
        );
    }
    Ok(())
}

fn print_text(today: &TodayContent) {
    println!();
    println!("{} · {}", today.type_name, today.date);
    println!("{}", "─".repeat(50));
    println!("{}", today.content);
    println!();
    println!("{}", today.interpretation);
    if !today.key_words.is_empty() {
        println!();
        for point in &today.key_words {
            println!("  • {}", point);
        }
    }
    println!("{}", "─".repeat(50));
    if today.from_cache {
        println!("(served from today's cache)");
    }
    println!();
}
