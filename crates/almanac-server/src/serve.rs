use crate::cli::build_resolver;
use crate::config::AlmanacConfig;
use crate::http::{create_router, AppState};
use almanac_core::{Almanac, ContentScheduler, ShutdownOutcome, Storage};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub async fn run(config: AlmanacConfig) -> anyhow::Result<()> {
    info!("Starting Almanac server v{}", env!("CARGO_PKG_VERSION"));

    let problems = config.validate();
    if !problems.is_empty() {
        anyhow::bail!("invalid configuration: {}", problems.join("; "));
    }
    let addr = config.http_addr()?;
    info!("HTTP: {}", addr);
    info!("Environment: {}", config.server.environment);
    info!("Data: {:?}", config.server.data_dir);

    // Fails fast without an API key
    let resolver = build_resolver(&config)?;
    let stats = resolver.storage().stats()?;
    info!(
        "Database loaded: {} records, {} seen",
        stats.record_count, stats.seen_count
    );

    let almanac = Arc::new(Almanac::new(resolver.clone()));
    let scheduler = Arc::new(ContentScheduler::new(resolver, config.scheduler_config()));

    if config.scheduler_enabled() {
        scheduler.start();
        info!(
            "Scheduler started; next update at {}",
            scheduler.next_deadline().format("%Y-%m-%d %H:%M:%S")
        );
    } else {
        info!("Scheduler disabled in {}", config.server.environment);
    }

    if config.is_development() {
        info!("Debug routes enabled under /debug");
    }

    let app = create_router(AppState {
        almanac,
        scheduler: scheduler.clone(),
        environment: config.server.environment,
        start_time: Instant::now(),
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Almanac server ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, shutting down scheduler...");
    match scheduler.stop().await {
        ShutdownOutcome::Clean => info!("Shutdown complete"),
        ShutdownOutcome::Forced => warn!("Shutdown forced: background work did not finish in time"),
        ShutdownOutcome::NotRunning => info!("Shutdown complete (scheduler was idle)"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, terminating...");
}
