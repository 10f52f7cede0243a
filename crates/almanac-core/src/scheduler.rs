//! Background regeneration.
//!
//! The scheduler owns one long-lived task. It sleeps until the next local
//! midnight, runs an update sweep, then sweeps again on a fixed interval.
//! Sweeps walk the categories one at a time with a pause in between and
//! never abort because one category failed. Cancellation is cooperative:
//! the token is checked between categories and during every wait, never in
//! the middle of a provider call.

use crate::categories::Category;
use crate::clock::next_midnight_after;
use crate::resolver::DailyResolver;
use crate::storage::Storage;
use chrono::{DateTime, Local};
use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pause between two categories within a sweep.
    pub category_delay: Duration,
    /// Period of the recurring tick after the first midnight.
    pub interval: Duration,
    /// Upper bound on how long `stop` waits for background tasks.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            category_delay: Duration::from_secs(3),
            interval: Duration::from_secs(24 * 3600),
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    WaitingForFirstTick,
    Running,
}

/// How `stop` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every background task exited within the timeout.
    Clean,
    /// The timeout elapsed; remaining tasks were aborted.
    Forced,
    /// Nothing was running.
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub category: Category,
    pub message: String,
}

/// Summary of one update sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Categories the sweep actually tried.
    pub attempted: usize,
    pub succeeded: usize,
    pub failures: Vec<SweepFailure>,
    /// True when cancellation cut the sweep short.
    pub cancelled: bool,
    pub started_at: DateTime<Local>,
    pub elapsed: Duration,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        Category::ALL.len()
    }
}

/// Run one sweep over every category in registry order.
pub async fn run_sweep<S: Storage>(
    resolver: &DailyResolver<S>,
    category_delay: Duration,
    cancel: &CancellationToken,
) -> SweepReport {
    let started_at = resolver.clock().now();
    let timer = Instant::now();
    let mut report = SweepReport {
        attempted: 0,
        succeeded: 0,
        failures: Vec::new(),
        cancelled: false,
        started_at,
        elapsed: Duration::ZERO,
    };

    info!("Starting update sweep over {} categories", Category::ALL.len());

    for (i, category) in Category::ALL.iter().copied().enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        report.attempted += 1;
        match resolver.regenerate(category).await {
            Ok(record) => {
                report.succeeded += 1;
                info!("Sweep refreshed {} ({} chars)", category, record.body.chars().count());
            }
            Err(e) => {
                warn!("Sweep failed for {}: {}", category, e);
                report.failures.push(SweepFailure {
                    category,
                    message: e.to_string(),
                });
            }
        }

        if i + 1 < Category::ALL.len() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                _ = tokio::time::sleep(category_delay) => {}
            }
        }
    }

    report.elapsed = timer.elapsed();
    info!(
        "Update sweep finished: {}/{} succeeded in {:.1}s{}",
        report.succeeded,
        report.total(),
        report.elapsed.as_secs_f64(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    report
}

struct Shared {
    state: Mutex<SchedulerState>,
    last_report: Mutex<Option<SweepReport>>,
}

impl Shared {
    fn set_state(&self, state: SchedulerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn record(&self, report: &SweepReport) {
        *self.last_report.lock().unwrap_or_else(|e| e.into_inner()) = Some(report.clone());
    }
}

struct Control {
    /// Parent of every task token; replaced after each stop.
    cancel: CancellationToken,
    main: Option<JoinHandle<()>>,
    manual: Vec<JoinHandle<()>>,
}

/// Drives daily regeneration in the background.
pub struct ContentScheduler<S: Storage + 'static> {
    resolver: Arc<DailyResolver<S>>,
    config: SchedulerConfig,
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

impl<S: Storage + 'static> ContentScheduler<S> {
    pub fn new(resolver: Arc<DailyResolver<S>>, config: SchedulerConfig) -> Self {
        Self {
            resolver,
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState::Stopped),
                last_report: Mutex::new(None),
            }),
            control: Mutex::new(Control {
                cancel: CancellationToken::new(),
                main: None,
                manual: Vec::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn state(&self) -> SchedulerState {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn last_report(&self) -> Option<SweepReport> {
        self.shared
            .last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The next local midnight strictly after now.
    pub fn next_deadline(&self) -> DateTime<Local> {
        next_midnight_after(&self.resolver.clock().now())
    }

    /// Spawn the background loop. Returns `false` if it was already running.
    pub fn start(&self) -> bool {
        let mut control = self.lock_control();
        if control.main.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        self.shared.set_state(SchedulerState::WaitingForFirstTick);
        let task = run_loop(
            self.resolver.clone(),
            self.config.clone(),
            self.shared.clone(),
            control.cancel.child_token(),
        );
        control.main = Some(tokio::spawn(task));
        true
    }

    /// Fire a sweep now, independent of the timer.
    ///
    /// The receiver yields the sweep's report. `stop` cancels manual sweeps
    /// as well as the main loop.
    pub fn trigger_now(&self) -> oneshot::Receiver<SweepReport> {
        let (tx, rx) = oneshot::channel();
        let mut control = self.lock_control();
        control.manual.retain(|h| !h.is_finished());

        let resolver = self.resolver.clone();
        let shared = self.shared.clone();
        let delay = self.config.category_delay;
        let cancel = control.cancel.child_token();

        control.manual.push(tokio::spawn(async move {
            info!("Manual update sweep triggered");
            let report = run_sweep(&resolver, delay, &cancel).await;
            shared.record(&report);
            let _ = tx.send(report);
        }));
        rx
    }

    /// Run one sweep on the caller's task and record its report.
    pub async fn sweep_now(&self) -> SweepReport {
        let cancel = self.lock_control().cancel.child_token();
        let report = run_sweep(&self.resolver, self.config.category_delay, &cancel).await;
        self.shared.record(&report);
        report
    }

    /// Cancel the loop and any manual sweeps, waiting at most
    /// `shutdown_timeout` for them to exit.
    pub async fn stop(&self) -> ShutdownOutcome {
        let handles: Vec<JoinHandle<()>> = {
            let mut control = self.lock_control();
            control.cancel.cancel();
            control.cancel = CancellationToken::new();
            control
                .main
                .take()
                .into_iter()
                .chain(control.manual.drain(..))
                .filter(|h| !h.is_finished())
                .collect()
        };

        if handles.is_empty() {
            self.shared.set_state(SchedulerState::Stopped);
            return ShutdownOutcome::NotRunning;
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let outcome =
            match tokio::time::timeout(self.config.shutdown_timeout, join_all(handles)).await {
                Ok(_) => {
                    info!("Scheduler stopped cleanly");
                    ShutdownOutcome::Clean
                }
                Err(_) => {
                    warn!(
                        "Scheduler did not stop within {:?}; aborting {} task(s)",
                        self.config.shutdown_timeout,
                        aborts.len()
                    );
                    for abort in &aborts {
                        abort.abort();
                    }
                    ShutdownOutcome::Forced
                }
            };

        self.shared.set_state(SchedulerState::Stopped);
        outcome
    }

    fn lock_control(&self) -> std::sync::MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn run_loop<S: Storage + 'static>(
    resolver: Arc<DailyResolver<S>>,
    config: SchedulerConfig,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let now = resolver.clock().now();
    let deadline = next_midnight_after(&now);
    let wait = (deadline - now).to_std().unwrap_or_default();
    info!(
        "Scheduler armed: first sweep at {} (in {}s)",
        deadline.format("%Y-%m-%d %H:%M:%S"),
        wait.as_secs()
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            info!("Scheduler cancelled before first sweep");
            shared.set_state(SchedulerState::Stopped);
            return;
        }
        _ = tokio::time::sleep(wait) => {}
    }

    shared.set_state(SchedulerState::Running);
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let report = run_sweep(&resolver, config.category_delay, &cancel).await;
        shared.record(&report);
        if report.cancelled {
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
    }

    info!("Scheduler loop exited");
    shared.set_state(SchedulerState::Stopped);
}
