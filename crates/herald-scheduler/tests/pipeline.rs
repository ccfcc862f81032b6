use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use herald_content::{AttachmentStore, ContentError, ContentStore, NewContent};
use herald_core::config::SchedulerConfig;
use herald_core::time::now;
use herald_providers::{Provider, ProviderError, ProviderRegistry, PublishRequest, PublishResult};
use herald_scheduler::{
    PublishExecutor, PublishLog, RetryPolicy, ScheduleStatus, ScheduleStore, SchedulerEngine,
    SchedulerError,
};
use rusqlite::Connection;
use tokio::sync::watch;

/// Returns the scripted results in order, then keeps succeeding.
struct ScriptedProvider {
    script: Mutex<VecDeque<PublishResult>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(script: Vec<PublishResult>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn publish(&self, _req: &PublishRequest) -> PublishResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| PublishResult::success(format!("REF-{n}"), "published"))
    }
}

/// Sleeps before succeeding and records peak concurrency.
struct SlowProvider {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl SlowProvider {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Provider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn publish(&self, req: &PublishRequest) -> PublishResult {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        PublishResult::success(format!("SLOW-{}", req.content.id), "published")
    }
}

struct Harness {
    content: Arc<ContentStore>,
    attachments: Arc<AttachmentStore>,
    schedules: Arc<ScheduleStore>,
    log: Arc<PublishLog>,
    scheduler_db: Arc<Mutex<Connection>>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        let content_db = Connection::open_in_memory().unwrap();
        herald_content::db::init_db(&content_db).unwrap();
        let content_db = Arc::new(Mutex::new(content_db));

        let scheduler_db = Connection::open_in_memory().unwrap();
        herald_scheduler::db::init_db(&scheduler_db).unwrap();
        let scheduler_db = Arc::new(Mutex::new(scheduler_db));

        let dir = tempfile::tempdir().unwrap();
        Self {
            content: Arc::new(ContentStore::new(Arc::clone(&content_db), "DEV")),
            attachments: Arc::new(AttachmentStore::new(content_db, dir.path(), 1024 * 1024)),
            schedules: Arc::new(ScheduleStore::new(Arc::clone(&scheduler_db))),
            log: Arc::new(PublishLog::new(Arc::clone(&scheduler_db))),
            scheduler_db,
            _dir: dir,
        }
    }

    fn executor(&self, registry: ProviderRegistry, policy: RetryPolicy) -> Arc<PublishExecutor> {
        Arc::new(
            PublishExecutor::new(
                Arc::clone(&self.schedules),
                Arc::clone(&self.log),
                Arc::clone(&self.content),
                Arc::clone(&self.attachments),
                Arc::new(registry),
            )
            .with_policy(policy),
        )
    }

    fn engine(&self, registry: ProviderRegistry, policy: RetryPolicy) -> SchedulerEngine {
        SchedulerEngine::new(self.executor(registry, policy), &SchedulerConfig::default())
    }

    fn page(&self) -> i64 {
        self.content
            .create(NewContent::page("T", "B", "DEV"))
            .unwrap()
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base: Duration::from_millis(10),
        max: Duration::from_millis(100),
        jitter: 0.0,
    }
}

fn registry_with(name: &str, provider: Arc<dyn Provider>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::with_stubs("stub");
    registry.register(name, provider);
    registry
}

#[tokio::test]
async fn scenario_a_single_success() {
    let h = Harness::new();
    let content_id = h.page();
    assert_eq!(content_id, 1);

    let schedule = h.schedules.create(content_id, "stub", now()).unwrap();
    assert_eq!(schedule.status, ScheduleStatus::Pending);
    assert_eq!(schedule.attempt_count, 0);

    let engine = h.engine(ProviderRegistry::with_stubs("stub"), fast_policy(5));
    assert_eq!(engine.run_once().await.unwrap(), 1);

    let done = h.schedules.get(schedule.id).unwrap();
    assert_eq!(done.status, ScheduleStatus::Published);
    assert_eq!(done.attempt_count, 1);
    assert!(done.external_ref.as_deref().unwrap().starts_with("CONF-"));
    assert!(done.last_error.is_none());

    // Publishing locks the content against new attachments.
    let a = h.attachments.store("a.png", None, b"png", None).unwrap();
    assert!(matches!(
        h.content.attach(content_id, a.id),
        Err(ContentError::Locked { .. })
    ));

    // Terminal rows are never picked up again.
    assert_eq!(engine.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn scenario_b_transient_three_times_then_success() {
    let h = Harness::new();
    let content_id = h.page();
    let provider = ScriptedProvider::new(vec![
        PublishResult::transient("HTTP 503"),
        PublishResult::transient("HTTP 503"),
        PublishResult::transient("timeout"),
    ]);
    let engine = h.engine(registry_with("scripted", provider.clone()), fast_policy(5));
    let schedule = h.schedules.create(content_id, "scripted", now()).unwrap();

    let mut last_count = 0;
    let mut last_eligible = None;
    for round in 1..=3 {
        let failed_at = now();
        engine
            .run_once_at(failed_at + ChronoDuration::hours(round))
            .await
            .unwrap();
        let s = h.schedules.get(schedule.id).unwrap();
        assert_eq!(s.status, ScheduleStatus::Pending);
        assert_eq!(s.attempt_count, round as u32);
        assert!(s.attempt_count > last_count);
        let eligible = s.next_eligible_at.unwrap();
        assert!(eligible > failed_at);
        if let Some(previous) = last_eligible {
            assert!(eligible > previous, "round {round} retries no later than round {}", round - 1);
        }
        assert!(s.last_error.is_some());
        last_count = s.attempt_count;
        last_eligible = Some(eligible);
    }

    engine
        .run_once_at(now() + ChronoDuration::hours(4))
        .await
        .unwrap();
    let done = h.schedules.get(schedule.id).unwrap();
    assert_eq!(done.status, ScheduleStatus::Published);
    assert_eq!(done.attempt_count, 4);
    assert_eq!(done.external_ref.as_deref(), Some("REF-4"));
    assert!(done.last_error.is_none());
    assert_eq!(provider.calls(), 4);

    let outcomes: Vec<String> = h
        .log
        .list_for_content(content_id)
        .unwrap()
        .into_iter()
        .map(|e| e.outcome)
        .collect();
    assert_eq!(
        outcomes,
        vec!["transient_failure", "transient_failure", "transient_failure", "published"]
    );
}

#[tokio::test]
async fn jittered_retries_at_the_cap_keep_moving_later() {
    let h = Harness::new();
    let content_id = h.page();
    let provider = ScriptedProvider::new(vec![PublishResult::transient("HTTP 503"); 6]);
    let policy = RetryPolicy {
        max_attempts: 10,
        base: Duration::from_millis(10),
        max: Duration::from_millis(10),
        jitter: 0.2,
    };
    let engine = h.engine(registry_with("scripted", provider.clone()), policy);
    let schedule = h.schedules.create(content_id, "scripted", now()).unwrap();

    let mut last_eligible = None;
    for round in 1..=6 {
        engine
            .run_once_at(now() + ChronoDuration::hours(round))
            .await
            .unwrap();
        let s = h.schedules.get(schedule.id).unwrap();
        assert_eq!(s.status, ScheduleStatus::Pending);
        let eligible = s.next_eligible_at.unwrap();
        if let Some(previous) = last_eligible {
            assert!(eligible > previous, "round {round} moved the retry earlier");
        }
        last_eligible = Some(eligible);
    }
    assert_eq!(provider.calls(), 6);
}

#[tokio::test]
async fn retry_waits_for_next_eligible_time() {
    let h = Harness::new();
    let content_id = h.page();
    let provider = ScriptedProvider::new(vec![PublishResult::transient("HTTP 502")]);
    let policy = RetryPolicy {
        base: Duration::from_secs(600),
        max: Duration::from_secs(600),
        ..fast_policy(5)
    };
    let engine = h.engine(registry_with("scripted", provider.clone()), policy);
    h.schedules.create(content_id, "scripted", now()).unwrap();

    assert_eq!(engine.run_once().await.unwrap(), 1);
    assert_eq!(engine.run_once().await.unwrap(), 0);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn scenario_c_permanent_failure() {
    let h = Harness::new();
    let content_id = h.page();
    let provider = ScriptedProvider::new(vec![PublishResult::permanent("HTTP 401")]);
    let engine = h.engine(registry_with("scripted", provider), fast_policy(5));
    let schedule = h.schedules.create(content_id, "scripted", now()).unwrap();

    engine.run_once().await.unwrap();
    let failed = h.schedules.get(schedule.id).unwrap();
    assert_eq!(failed.status, ScheduleStatus::Failed);
    assert_eq!(failed.attempt_count, 1);
    assert_eq!(failed.last_error.as_deref(), Some("HTTP 401"));
}

#[tokio::test]
async fn transient_on_last_attempt_fails() {
    let h = Harness::new();
    let content_id = h.page();
    let provider = ScriptedProvider::new(vec![
        PublishResult::transient("HTTP 503"),
        PublishResult::transient("HTTP 503"),
    ]);
    let engine = h.engine(registry_with("scripted", provider.clone()), fast_policy(2));
    let schedule = h.schedules.create(content_id, "scripted", now()).unwrap();

    engine.run_once().await.unwrap();
    engine
        .run_once_at(now() + ChronoDuration::hours(1))
        .await
        .unwrap();

    let failed = h.schedules.get(schedule.id).unwrap();
    assert_eq!(failed.status, ScheduleStatus::Failed);
    assert_eq!(failed.attempt_count, 2);
    assert!(failed.last_error.unwrap().contains("HTTP 503"));

    assert_eq!(
        engine
            .run_once_at(now() + ChronoDuration::days(1))
            .await
            .unwrap(),
        0
    );
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn future_schedule_is_not_dispatched_early() {
    let h = Harness::new();
    let content_id = h.page();
    let at = now() + ChronoDuration::minutes(30);
    let schedule = h.schedules.create(content_id, "stub", at).unwrap();
    let engine = h.engine(ProviderRegistry::with_stubs("stub"), fast_policy(5));

    assert_eq!(engine.run_once().await.unwrap(), 0);
    assert_eq!(
        engine
            .run_once_at(at - ChronoDuration::milliseconds(1))
            .await
            .unwrap(),
        0
    );
    assert_eq!(h.schedules.get(schedule.id).unwrap().status, ScheduleStatus::Pending);

    assert_eq!(engine.run_once_at(at).await.unwrap(), 1);
    assert_eq!(h.schedules.get(schedule.id).unwrap().status, ScheduleStatus::Published);
}

#[tokio::test]
async fn missing_content_and_unknown_target_fail_permanently() {
    let h = Harness::new();
    let content_id = h.page();
    let ghost_target = h.schedules.create(content_id, "mastodon", now()).unwrap();
    let ghost_content = h.schedules.create(999, "stub", now()).unwrap();
    let engine = h.engine(ProviderRegistry::with_stubs("stub"), fast_policy(5));

    assert_eq!(engine.run_once().await.unwrap(), 2);

    let s = h.schedules.get(ghost_target.id).unwrap();
    assert_eq!(s.status, ScheduleStatus::Failed);
    assert!(s.last_error.unwrap().contains("mastodon"));

    let s = h.schedules.get(ghost_content.id).unwrap();
    assert_eq!(s.status, ScheduleStatus::Failed);
    assert!(s.last_error.unwrap().contains("999"));
}

#[tokio::test]
async fn slow_provider_times_out_as_transient() {
    let h = Harness::new();
    let content_id = h.page();
    let provider = SlowProvider::new(Duration::from_secs(5));
    let executor = Arc::new(
        PublishExecutor::new(
            Arc::clone(&h.schedules),
            Arc::clone(&h.log),
            Arc::clone(&h.content),
            Arc::clone(&h.attachments),
            Arc::new(registry_with("slow", provider)),
        )
        .with_policy(fast_policy(5))
        .with_attempt_timeout(Duration::from_millis(50)),
    );
    let engine = SchedulerEngine::new(executor, &SchedulerConfig::default());
    let schedule = h.schedules.create(content_id, "slow", now()).unwrap();

    engine.run_once().await.unwrap();
    let s = h.schedules.get(schedule.id).unwrap();
    assert_eq!(s.status, ScheduleStatus::Pending);
    assert_eq!(s.attempt_count, 1);
    assert_eq!(s.last_error.as_deref(), Some("timeout"));
}

#[tokio::test]
async fn tick_claims_no_more_than_free_workers() {
    let h = Harness::new();
    let provider = SlowProvider::new(Duration::from_millis(50));
    let config = SchedulerConfig {
        worker_concurrency: 2,
        ..SchedulerConfig::default()
    };
    let engine = SchedulerEngine::new(
        h.executor(registry_with("slow", provider.clone()), fast_policy(5)),
        &config,
    );
    for _ in 0..5 {
        let content_id = h.page();
        h.schedules.create(content_id, "slow", now()).unwrap();
    }

    assert_eq!(engine.run_once().await.unwrap(), 2);
    assert_eq!(engine.run_once().await.unwrap(), 2);
    assert_eq!(engine.run_once().await.unwrap(), 1);
    assert_eq!(engine.run_once().await.unwrap(), 0);
    assert!(provider.peak.load(Ordering::SeqCst) <= 2);

    // Nothing was left claimed without a worker.
    assert!(h
        .schedules
        .list()
        .unwrap()
        .iter()
        .all(|s| s.status == ScheduleStatus::Published));
}

#[tokio::test]
async fn scenario_d_concurrent_claims_have_one_winner() {
    let h = Harness::new();
    let content_id = h.page();
    let schedule = h.schedules.create(content_id, "stub", now()).unwrap();

    let a = {
        let store = Arc::clone(&h.schedules);
        tokio::spawn(async move { store.try_claim(schedule.id, "worker-a").unwrap() })
    };
    let b = {
        let store = Arc::clone(&h.schedules);
        tokio::spawn(async move { store.try_claim(schedule.id, "worker-b").unwrap() })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a ^ b, "exactly one claim must win (a={a}, b={b})");
}

#[test]
fn claims_across_connections_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("herald.db");
    let open = || {
        let conn = Connection::open(&path).unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        herald_scheduler::db::init_db(&conn).unwrap();
        Arc::new(ScheduleStore::new(Arc::new(Mutex::new(conn))))
    };
    let first = open();
    let second = open();

    for round in 0..20 {
        let schedule = first.create(round, "stub", now()).unwrap();
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [Arc::clone(&first), Arc::clone(&second)]
            .into_iter()
            .enumerate()
            .map(|(i, store)| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.try_claim(schedule.id, &format!("process-{i}")).unwrap()
                })
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1, "round {round}");
    }
}

#[tokio::test]
async fn run_loop_publishes_and_stops_on_shutdown() {
    let h = Harness::new();
    let content_id = h.page();
    let schedule = h.schedules.create(content_id, "stub", now()).unwrap();
    let config = SchedulerConfig {
        poll_interval_secs: 1,
        ..SchedulerConfig::default()
    };
    let engine = SchedulerEngine::new(
        h.executor(ProviderRegistry::with_stubs("stub"), fast_policy(5)),
        &config,
    );

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(engine.run(rx));

    let mut status = ScheduleStatus::Pending;
    for _ in 0..50 {
        status = h.schedules.get(schedule.id).unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(status, ScheduleStatus::Published);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine should stop")
        .unwrap();
}

#[tokio::test]
async fn startup_recovers_abandoned_claims() {
    let h = Harness::new();
    let content_id = h.page();
    let schedule = h.schedules.create(content_id, "stub", now()).unwrap();
    assert!(h.schedules.try_claim(schedule.id, "crashed-process").unwrap());

    let config = SchedulerConfig {
        claim_ttl_secs: 0,
        ..SchedulerConfig::default()
    };
    let engine = SchedulerEngine::new(
        h.executor(ProviderRegistry::with_stubs("stub"), fast_policy(5)),
        &config,
    );
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(engine.recover_stale_claims().unwrap(), 1);
    assert_eq!(h.schedules.get(schedule.id).unwrap().status, ScheduleStatus::Pending);

    engine.run_once().await.unwrap();
    let done = h.schedules.get(schedule.id).unwrap();
    assert_eq!(done.status, ScheduleStatus::Published);
    assert_eq!(done.attempt_count, 1);
}

#[tokio::test]
async fn publish_now_returns_platform_status_without_schedule() {
    let h = Harness::new();
    let content_id = h.page();
    let executor = h.executor(ProviderRegistry::with_stubs("social-stub"), fast_policy(5));

    let result = executor.publish_now(content_id, None).await.unwrap();
    assert_eq!(result.provider, "social-stub");
    assert_eq!(result.status, "posted");
    assert!(h.schedules.list().unwrap().is_empty());

    let entries = h.log.list_for_content(content_id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].schedule_id, None);
    assert_eq!(entries[0].external_ref.as_deref(), Some(result.external_ref.as_str()));
}

#[tokio::test]
async fn publish_now_surfaces_failures() {
    let h = Harness::new();
    let content_id = h.page();
    let provider = ScriptedProvider::new(vec![PublishResult::transient("HTTP 503")]);
    let executor = h.executor(registry_with("scripted", provider.clone()), fast_policy(5));

    let err = executor
        .publish_now(content_id, Some("scripted"))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::PublishFailed(ref r) if r == "HTTP 503"));
    assert_eq!(provider.calls(), 1, "immediate publish never retries");

    let err = executor
        .publish_now(content_id, Some("mastodon"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::Provider(ProviderError::UnknownProvider { .. })
    ));

    let err = executor.publish_now(404, Some("stub")).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Content(ContentError::NotFound { id: 404 })));
}

/// Makes every write that leaves PUBLISHING fail, as a lost database would.
fn break_outcome_writes(db: &Mutex<Connection>) {
    db.lock()
        .unwrap()
        .execute_batch(
            "CREATE TRIGGER reject_outcome BEFORE UPDATE ON schedules
             WHEN OLD.status = 'publishing'
             BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
        )
        .unwrap();
}

fn restore_outcome_writes(db: &Mutex<Connection>) {
    db.lock()
        .unwrap()
        .execute_batch("DROP TRIGGER reject_outcome")
        .unwrap();
}

#[tokio::test]
async fn unrecorded_outcome_is_recovered_by_a_later_tick() {
    let h = Harness::new();
    let content_id = h.page();
    let schedule = h.schedules.create(content_id, "stub", now()).unwrap();
    let engine = h.engine(ProviderRegistry::with_stubs("stub"), fast_policy(5));

    break_outcome_writes(&h.scheduler_db);
    assert_eq!(engine.run_once().await.unwrap(), 1);
    restore_outcome_writes(&h.scheduler_db);

    let stuck = h.schedules.get(schedule.id).unwrap();
    assert_eq!(stuck.status, ScheduleStatus::Publishing);
    assert_eq!(stuck.attempt_count, 1);

    // Within the claim TTL the row still counts as in flight.
    assert_eq!(engine.run_once().await.unwrap(), 0);
    assert_eq!(
        h.schedules.get(schedule.id).unwrap().status,
        ScheduleStatus::Publishing
    );

    // Once the claim is stale the same tick returns it to the queue and
    // publishes it again.
    let later = now() + ChronoDuration::seconds(SchedulerConfig::default().claim_ttl_secs as i64 + 1);
    assert_eq!(engine.run_once_at(later).await.unwrap(), 1);
    let done = h.schedules.get(schedule.id).unwrap();
    assert_eq!(done.status, ScheduleStatus::Published);
    assert_eq!(done.attempt_count, 2);
    assert!(done.last_error.is_none());
    assert_eq!(h.log.list_for_content(content_id).unwrap().len(), 2);
}

#[tokio::test]
async fn unrecorded_final_attempt_fails_with_reason() {
    let h = Harness::new();
    let content_id = h.page();
    let schedule = h.schedules.create(content_id, "stub", now()).unwrap();
    let engine = h.engine(ProviderRegistry::with_stubs("stub"), fast_policy(1));

    break_outcome_writes(&h.scheduler_db);
    engine.run_once().await.unwrap();
    restore_outcome_writes(&h.scheduler_db);

    let later = now() + ChronoDuration::seconds(SchedulerConfig::default().claim_ttl_secs as i64 + 1);
    assert_eq!(engine.run_once_at(later).await.unwrap(), 0);
    let failed = h.schedules.get(schedule.id).unwrap();
    assert_eq!(failed.status, ScheduleStatus::Failed);
    assert_eq!(failed.attempt_count, 1);
    assert_eq!(failed.last_error.as_deref(), Some("attempt interrupted"));
}
