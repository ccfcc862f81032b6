use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_core::config::SchedulerConfig;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::executor::PublishExecutor;

/// Polling loop that claims due schedules and hands them to a bounded pool
/// of workers.
pub struct SchedulerEngine {
    executor: Arc<PublishExecutor>,
    workers: Arc<Semaphore>,
    concurrency: usize,
    poll_interval: Duration,
    batch_size: usize,
    claim_ttl: Duration,
}

impl SchedulerEngine {
    pub fn new(executor: Arc<PublishExecutor>, config: &SchedulerConfig) -> Self {
        let concurrency = config.worker_concurrency.max(1);
        Self {
            executor,
            workers: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            batch_size: config.batch_size.max(1),
            claim_ttl: Duration::from_secs(config.claim_ttl_secs),
        }
    }

    /// Main event loop. Ticks every `poll_interval` until `shutdown`
    /// broadcasts `true`, then waits for in-flight attempts.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_secs = self.poll_interval.as_secs(),
            workers = self.concurrency,
            "scheduler engine started"
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(herald_core::time::now()) {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        // Every permit back means every worker has finished.
        match self.workers.acquire_many(self.concurrency as u32).await {
            Ok(_) => info!("scheduler engine stopped"),
            Err(e) => warn!("worker pool closed during shutdown: {e}"),
        }
    }

    /// Return claims older than the claim TTL to the queue. These are left
    /// by a crashed process or by an attempt whose outcome could not be
    /// written.
    pub fn recover_stale_claims(&self) -> Result<usize> {
        self.recover_stale_claims_at(herald_core::time::now())
    }

    fn recover_stale_claims_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let ttl = chrono::Duration::from_std(self.claim_ttl).unwrap_or(chrono::Duration::zero());
        self.executor
            .schedules()
            .recover_stale_claims(now - ttl, self.executor.policy().max_attempts)
    }

    /// Run a single tick now and wait for its attempts to finish.
    pub async fn run_once(&self) -> Result<usize> {
        self.run_once_at(herald_core::time::now()).await
    }

    /// Run a single tick as if the clock read `now`. Returns the number of
    /// schedules dispatched.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let handles = self.tick(now)?;
        let dispatched = handles.len();
        for joined in futures_util::future::join_all(handles).await {
            if let Err(e) = joined {
                error!("publish worker panicked: {e}");
            }
        }
        Ok(dispatched)
    }

    /// Recover stale claims, then dispatch. A recovery error is logged and
    /// does not block dispatch.
    fn tick(&self, now: DateTime<Utc>) -> Result<Vec<JoinHandle<()>>> {
        if let Err(e) = self.recover_stale_claims_at(now) {
            error!("stale claim recovery failed: {e}");
        }
        self.dispatch(now)
    }

    /// List, claim and spawn. Only as many rows as there are free workers
    /// are listed, so a claimed row never waits for a permit.
    fn dispatch(&self, now: DateTime<Utc>) -> Result<Vec<JoinHandle<()>>> {
        let free = self.workers.available_permits().min(self.batch_size);
        if free == 0 {
            debug!("all workers busy; skipping tick");
            return Ok(Vec::new());
        }

        let due = self.executor.schedules().list_due(now, free)?;
        let mut handles = Vec::with_capacity(due.len());
        for schedule in due {
            let Ok(permit) = Arc::clone(&self.workers).try_acquire_owned() else {
                break;
            };
            let claim_token = Uuid::new_v4().to_string();
            match self.executor.schedules().try_claim(schedule.id, &claim_token) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(schedule_id = schedule.id, "already claimed elsewhere");
                    continue;
                }
                Err(e) => {
                    error!(schedule_id = schedule.id, "claim failed: {e}");
                    continue;
                }
            }

            let executor = Arc::clone(&self.executor);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = executor.execute(&schedule, &claim_token).await {
                    error!(schedule_id = schedule.id, "publish attempt error: {e}");
                }
            }));
        }
        if !handles.is_empty() {
            debug!(count = handles.len(), "schedules dispatched");
        }
        Ok(handles)
    }
}
