use crate::config::AlmanacConfig;
use almanac_core::next_midnight_after;
use anyhow::Result;
use chrono::Local;

pub async fn run(config: &AlmanacConfig) -> Result<()> {
    let now = Local::now();
    let next = next_midnight_after(&now);
    let wait = next - now;

    println!(
        "Next update: {} (in {}h {:02}m)",
        next.format("%Y-%m-%d %H:%M:%S %Z"),
        wait.num_hours(),
        wait.num_minutes() % 60
    );
    if !config.scheduler_enabled() {
        println!(
            "Note: the scheduler is disabled in {} unless [scheduler] enabled = true.",
            config.server.environment
        );
    }
    Ok(())
}
