use super::build_resolver;
use crate::config::AlmanacConfig;
use almanac_core::{ContentScheduler, SweepReport};
use anyhow::Result;

pub async fn run(config: &AlmanacConfig) -> Result<()> {
    let scheduler = ContentScheduler::new(build_resolver(config)?, config.scheduler_config());
    let report = scheduler.sweep_now().await;
    print_report(&report);

    if report.succeeded == 0 {
        anyhow::bail!("every category failed");
    }
    Ok(())
}

pub fn print_report(report: &SweepReport) {
    println!();
    println!("Update sweep");
    println!("{}", "─".repeat(50));
    println!("Started:   {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Elapsed:   {:.1}s", report.elapsed.as_secs_f64());
    println!("Succeeded: {}/{}", report.succeeded, report.total());
    for failure in &report.failures {
        println!("  ✗ {:10} {}", failure.category.as_str(), failure.message);
    }
    if report.cancelled {
        println!("(cancelled before every category was tried)");
    }
    println!("{}", "─".repeat(50));
    println!();
}
