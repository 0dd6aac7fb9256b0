//! Update coordinator: per-account locking and task dispatch
//!
//! Each account moves `Idle -> Locked -> Idle`. [`UpdateCoordinator::trigger_all`]
//! takes the lock with a single conditional update and dispatches one task per
//! account it managed to lock; [`UpdateCoordinator::task`] runs the sync,
//! persists whatever watermark it reached and releases the lock on every exit
//! path, including a panic inside the sync.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::directions::DirectionsClient;
use crate::error::{CitifitErrorTrait, Error, Result};
use crate::models::{Account, AccountId, TripId};
use crate::sinks::build_sinks;
use crate::source::SourceClient;
use crate::storage::AccountRepository;
use crate::sync::{Orchestrator, RunReport};

/// Runs one synchronization for a loaded account
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run(&self, account: Account) -> RunReport;
}

/// Runner wired to the live bike-share site, directions service and sinks
pub struct LiveSyncRunner {
    config: Config,
}

impl LiveSyncRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn orchestrator(&self, account: &Account) -> Result<Orchestrator<SourceClient, DirectionsClient>> {
        let source = SourceClient::new(&self.config.source, account.source.clone())?;
        let directions = DirectionsClient::new(&self.config.directions)?;
        let sinks = build_sinks(&self.config, &account.fitness)?;

        Ok(Orchestrator::new(source, directions, sinks)
            .with_submission_delay(self.config.sync.submission_delay()))
    }
}

#[async_trait]
impl SyncRunner for LiveSyncRunner {
    async fn run(&self, account: Account) -> RunReport {
        match self.orchestrator(&account) {
            Ok(mut orchestrator) => orchestrator.run(account.watermark).await,
            Err(e) => RunReport::new(account.watermark).failed(e),
        }
    }
}

/// Result of one fan-out
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Accounts whose lock was taken and whose task was spawned
    pub dispatched: Vec<AccountId>,
    /// Accounts skipped because a previous task still holds the lock
    pub already_locked: Vec<AccountId>,
    pub handles: Vec<JoinHandle<Result<TripId>>>,
}

impl DispatchReport {
    /// Wait for every dispatched task; returns how many failed
    pub async fn join(self) -> usize {
        join_tasks(self.handles).await
    }
}

async fn join_tasks(handles: Vec<JoinHandle<Result<TripId>>>) -> usize {
    let mut failures = 0;
    for outcome in futures::future::join_all(handles).await {
        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => failures += 1,
            Err(e) => {
                error!(error = %e, "Dispatched task aborted");
                failures += 1;
            }
        }
    }
    failures
}

/// Coordinates synchronizations across accounts
pub struct UpdateCoordinator<R> {
    repo: Arc<R>,
    runner: Arc<dyn SyncRunner>,
}

impl<R> Clone for UpdateCoordinator<R> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl<R: AccountRepository + 'static> UpdateCoordinator<R> {
    pub fn new(repo: Arc<R>, runner: Arc<dyn SyncRunner>) -> Self {
        Self { repo, runner }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Lock and dispatch a task for every idle account
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger_all(&self) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        for account_id in self.repo.list_account_ids()? {
            match self.repo.try_lock(account_id) {
                Ok(true) => {
                    debug!(account_id, "Account locked, dispatching task");
                    let coordinator = self.clone();
                    report
                        .handles
                        .push(tokio::spawn(async move { coordinator.task(account_id).await }));
                    report.dispatched.push(account_id);
                }
                Ok(false) => {
                    info!(account_id, "Account already being synchronized, skipping");
                    report.already_locked.push(account_id);
                }
                Err(e) => {
                    error!(account_id, error = %e, "Failed to lock account");
                }
            }
        }

        info!(
            dispatched = report.dispatched.len(),
            skipped = report.already_locked.len(),
            "Trigger complete"
        );
        Ok(report)
    }

    /// Synchronize one locked account, then release its lock
    pub async fn task(&self, account_id: AccountId) -> Result<TripId> {
        let outcome = self.sync_account(account_id).await;

        if let Err(e) = self.repo.release_lock(account_id) {
            error!(account_id, error = %e, "Failed to release account lock");
        } else {
            debug!(account_id, "Account lock released");
        }

        match &outcome {
            Ok(watermark) => info!(account_id, watermark, "Synchronization finished"),
            Err(e) => error!(
                account_id,
                error = %e,
                category = %e.category(),
                recoverable = e.is_recoverable(),
                "Synchronization failed"
            ),
        }
        outcome
    }

    async fn sync_account(&self, account_id: AccountId) -> Result<TripId> {
        let account = self.repo.load_account(account_id)?;
        let start = account.watermark;

        let runner = Arc::clone(&self.runner);
        let report = tokio::spawn(async move { runner.run(account).await })
            .await
            .map_err(|e| Error::other(format!("synchronization task aborted: {e}")))?;

        if report.watermark != start {
            self.repo.save_watermark(account_id, report.watermark)?;
        }
        info!(
            account_id,
            imported = report.imported,
            skipped = report.skipped,
            watermark = report.watermark,
            "Run complete"
        );
        report.into_result()
    }

    /// Trigger every `interval` until `shutdown` resolves
    ///
    /// Tasks still running at shutdown are awaited, so every lock taken by
    /// this loop is released before it returns. Returns the number of those
    /// tasks that failed.
    pub async fn run_periodic<F>(&self, interval: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut in_flight: Vec<JoinHandle<Result<TripId>>> = Vec::new();
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Finished tasks have already logged their outcome
                    in_flight.retain(|handle| !handle.is_finished());
                    match self.trigger_all() {
                        Ok(report) => in_flight.extend(report.handles),
                        Err(e) => warn!(error = %e, "Trigger failed"),
                    }
                }
                _ = &mut shutdown => {
                    info!(in_flight = in_flight.len(), "Shutdown requested, waiting for running synchronizations");
                    break;
                }
            }
        }

        let failures = join_tasks(in_flight).await;
        info!(failures, "Trigger loop stopped");
        failures
    }
}
