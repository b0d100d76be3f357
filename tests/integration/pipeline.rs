//! End-to-end pipeline tests against the in-memory bookmaker.
//!
//! Drives the worker directly (queue → resolve → verify → translate →
//! evaluate → size → execute) and the full runner with a scripted feed.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use edgerunner::bookmakers::resolver::MatchResolver;
use edgerunner::bookmakers::Bookmaker;
use edgerunner::engine::executor::BetExecutor;
use edgerunner::engine::queue::GameQueueItem;
use edgerunner::engine::runner::{EdgeRunner, RunnerHandle, RunnerParts};
use edgerunner::engine::worker::{GameWorker, ItemOutcome, WorkerConfig};
use edgerunner::provider::poller::PollerConfig;
use edgerunner::provider::AlertFeed;
use edgerunner::strategy::edge::EvaluatorConfig;
use edgerunner::strategy::kelly::StakeConfig;
use edgerunner::strategy::{Strategy, StrategySettings};
use edgerunner::types::*;

use crate::mock_bookmaker::{barrow_bolton_details, MockBookmaker};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn alert_json(id: u64) -> Value {
    json!({
        "id": id,
        "sportId": "1",
        "lineType": "money_line",
        "outcome": "home",
        "periodNumber": 0,
        "priceHome": 2.0,
        "priceAway": 3.5,
        "priceDraw": 3.0,
        "home": "Barrow",
        "away": "Bolton Wanderers",
    })
}

fn alert(id: u64) -> AlertNotification {
    serde_json::from_value(alert_json(id)).unwrap()
}

fn credentials() -> Credentials {
    Credentials {
        username: "tester".into(),
        password: SecretString::new("secret".into()),
    }
}

fn worker_config() -> WorkerConfig {
    WorkerConfig {
        name: "test".into(),
        throttle: Duration::from_millis(1),
        call_timeout: Duration::from_secs(5),
        store_data: false,
    }
}

fn strategy() -> Strategy {
    Strategy::new(EvaluatorConfig::default(), StakeConfig::default())
}

struct Harness {
    worker: GameWorker,
    settings: watch::Sender<StrategySettings>,
    batches_tx: mpsc::Sender<Vec<AlertNotification>>,
    batches: mpsc::Receiver<Vec<AlertNotification>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown: watch::Receiver<bool>,
}

fn harness(bookmaker: Arc<MockBookmaker>, dry_run: bool) -> Harness {
    let strategy = strategy();
    let (settings, settings_rx) = watch::channel(strategy.settings());
    let (batches_tx, batches) = mpsc::channel(8);
    let (shutdown_tx, shutdown) = watch::channel(false);
    let worker = GameWorker::new(
        worker_config(),
        bookmaker as Arc<dyn Bookmaker>,
        MatchResolver::default(),
        strategy,
        BetExecutor::new(credentials(), dry_run, Duration::from_secs(5)),
        settings_rx,
    );
    Harness {
        worker,
        settings,
        batches_tx,
        batches,
        shutdown_tx,
        shutdown,
    }
}

impl Harness {
    async fn drain(&mut self) -> Result<(), EdgeRunnerError> {
        self.worker.drain(&mut self.batches, &mut self.shutdown).await
    }
}

// ---------------------------------------------------------------------------
// Worker pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_value_bet_placed_and_bankroll_refreshed() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), false);

    h.worker.enqueue(vec![alert(1)]);
    h.drain().await.unwrap();

    let receipts = bm.receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].stake, dec!(10));
    assert!((receipts[0].odds - 2.5).abs() < 1e-9);

    let status = h.worker.status();
    assert_eq!(status.bets_placed, 1);
    assert_eq!(status.processed, 1);
    assert_eq!(status.bankroll, Some(dec!(990)));
    assert_eq!(status.session, SessionHealth::Valid);
    assert!(!status.is_active);
    assert_eq!(h.worker.queue_len(), 0);
}

#[tokio::test]
async fn test_expired_session_reauthenticates_exactly_once() {
    let bm = Arc::new(MockBookmaker::new(dec!(500)));
    bm.expire_next_submits(1);
    let mut h = harness(bm.clone(), false);

    h.worker.enqueue(vec![alert(1)]);
    h.drain().await.unwrap();

    assert_eq!(MockBookmaker::count(&bm.auth_attempts), 1);
    assert_eq!(MockBookmaker::count(&bm.submits), 2);
    assert_eq!(bm.receipts().len(), 1);
    assert_eq!(h.worker.status().session, SessionHealth::Reauthenticated);
}

#[tokio::test]
async fn test_retry_failure_is_final_and_worker_continues() {
    let bm = Arc::new(MockBookmaker::new(dec!(500)));
    // Every placement sees an expired session; re-auth "succeeds" but the
    // retry fails again.
    bm.expire_next_submits(10);
    let mut h = harness(bm.clone(), false);

    h.worker.enqueue(vec![alert(1), alert(2)]);
    h.drain().await.unwrap();

    // One re-auth and one retry per item, never more.
    assert_eq!(MockBookmaker::count(&bm.auth_attempts), 2);
    assert_eq!(MockBookmaker::count(&bm.submits), 4);
    assert!(bm.receipts().is_empty());

    let status = h.worker.status();
    assert_eq!(status.processed, 2);
    assert_eq!(status.bets_placed, 0);
    assert!(status.last_error.is_some());
    assert!(!status.halted);
}

#[tokio::test]
async fn test_refused_reauth_skips_retry() {
    let bm = Arc::new(MockBookmaker::new(dec!(500)));
    let mut h = harness(bm.clone(), false);

    // Establish the bankroll first, then lose the session for good.
    h.worker.establish_bankroll().await.unwrap();
    bm.sign_out();
    bm.refuse_auth();

    h.worker.enqueue(vec![alert(1)]);
    h.drain().await.unwrap();

    assert_eq!(MockBookmaker::count(&bm.auth_attempts), 1);
    assert_eq!(MockBookmaker::count(&bm.submits), 1);
    assert_eq!(h.worker.status().session, SessionHealth::AuthFailed);
}

#[tokio::test]
async fn test_startup_signs_in_once_when_session_missing() {
    let bm = Arc::new(MockBookmaker::new(dec!(750)));
    bm.sign_out();
    let mut h = harness(bm.clone(), false);

    let bankroll = h.worker.establish_bankroll().await.unwrap();
    assert_eq!(bankroll, dec!(750));
    assert_eq!(MockBookmaker::count(&bm.auth_attempts), 1);
    assert_eq!(MockBookmaker::count(&bm.account_reads), 2);
}

#[tokio::test]
async fn test_fatal_startup_halts_worker() {
    let bm = Arc::new(MockBookmaker::new(dec!(750)));
    bm.sign_out();
    bm.refuse_auth();
    let mut h = harness(bm.clone(), false);

    h.worker.enqueue(vec![alert(1), alert(2)]);
    let err = h.drain().await.unwrap_err();
    assert!(err.is_fatal());

    let status = h.worker.status().clone();
    assert!(status.halted);
    assert!(!status.is_active);
    assert_eq!(status.queue_length, 0);
    assert_eq!(MockBookmaker::count(&bm.auth_attempts), 1);
    assert_eq!(MockBookmaker::count(&bm.searches), 0);

    // A halted worker ignores further batches.
    h.worker.enqueue(vec![alert(3)]);
    h.drain().await.unwrap();
    assert_eq!(MockBookmaker::count(&bm.searches), 0);
}

#[tokio::test]
async fn test_duplicate_alert_processed_once() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), false);

    h.worker.enqueue(vec![alert(7)]);
    h.drain().await.unwrap();
    h.worker.enqueue(vec![alert(7)]);
    h.drain().await.unwrap();

    assert_eq!(bm.receipts().len(), 1);
    assert_eq!(h.worker.status().processed, 1);
}

#[tokio::test]
async fn test_batches_arriving_mid_drain_are_picked_up() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), false);

    h.batches_tx.send(vec![alert(2), alert(3)]).await.unwrap();
    h.worker.enqueue(vec![alert(1)]);
    h.drain().await.unwrap();

    assert_eq!(h.worker.status().processed, 3);
    assert_eq!(bm.receipts().len(), 3);
}

#[tokio::test]
async fn test_unmatched_teams_are_skipped() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), false);

    let mut a = alert(1);
    a.home = "Real Madrid".into();
    a.away = "Sevilla".into();
    let outcome = h
        .worker
        .process_item(&GameQueueItem { alert: a, position: 1 })
        .await;

    assert!(matches!(outcome, ItemOutcome::NoMatch(EdgeRunnerError::Resolution(_))));
    // Home search, then away search.
    assert_eq!(MockBookmaker::count(&bm.searches), 2);
    assert_eq!(MockBookmaker::count(&bm.detail_fetches), 0);
}

#[tokio::test]
async fn test_start_time_mismatch_discarded() {
    let kickoff = Utc.with_ymd_and_hms(2026, 10, 18, 15, 0, 0).unwrap();
    let bm = Arc::new(MockBookmaker::with_details(
        dec!(1000),
        barrow_bolton_details(Some(kickoff + ChronoDuration::days(1))),
    ));
    let mut h = harness(bm.clone(), false);

    let mut a = alert(1);
    a.start_time = Some(kickoff);
    let outcome = h
        .worker
        .process_item(&GameQueueItem { alert: a, position: 1 })
        .await;

    assert!(matches!(outcome, ItemOutcome::Mismatch));
    assert_eq!(MockBookmaker::count(&bm.submits), 0);
}

#[tokio::test]
async fn test_unsupported_market_skipped() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), false);

    // Quarter-goal handicap has no venue equivalent.
    let a: AlertNotification = serde_json::from_value(json!({
        "id": 5,
        "sportId": 1,
        "lineType": "spread",
        "outcome": "home",
        "points": -0.25,
        "priceHome": 1.9,
        "priceAway": 1.9,
        "home": "Barrow",
        "away": "Bolton Wanderers",
    }))
    .unwrap();
    let outcome = h
        .worker
        .process_item(&GameQueueItem { alert: a, position: 1 })
        .await;

    assert!(matches!(
        outcome,
        ItemOutcome::Untranslatable(EdgeRunnerError::Translation(_))
    ));
}

#[tokio::test]
async fn test_skipped_alerts_reported_in_status() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), false);

    let mut unmatched = alert(1);
    unmatched.home = "Real Madrid".into();
    unmatched.away = "Sevilla".into();
    h.worker.enqueue(vec![unmatched]);
    h.drain().await.unwrap();

    let status = h.worker.status().clone();
    assert_eq!(status.processed, 1);
    let last = status.last_error.expect("skip should be reported");
    assert!(last.contains("No correlated match"), "{last}");
    assert!(last.contains("Real Madrid vs Sevilla"), "{last}");
    assert_eq!(MockBookmaker::count(&bm.submits), 0);
}

#[tokio::test]
async fn test_settings_update_applies_before_next_item() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), false);

    h.settings.send_replace(StrategySettings {
        fixed_stake_enabled: true,
        fixed_stake: dec!(10),
        stake_fraction: 0.1,
        min_value_pct: 50.0,
    });
    h.worker.enqueue(vec![alert(1)]);
    h.drain().await.unwrap();

    assert!(bm.receipts().is_empty());
    assert_eq!(h.worker.status().processed, 1);
}

#[tokio::test]
async fn test_dry_run_never_submits() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), true);

    h.worker.enqueue(vec![alert(1)]);
    h.drain().await.unwrap();

    assert_eq!(MockBookmaker::count(&bm.submits), 0);
    assert_eq!(h.worker.status().bets_placed, 1);
    assert_eq!(h.worker.status().bankroll, Some(dec!(1000)));
}

#[tokio::test]
async fn test_shutdown_stops_drain_between_items() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let mut h = harness(bm.clone(), false);

    h.shutdown_tx.send_replace(true);
    h.worker.enqueue(vec![alert(1), alert(2)]);
    h.drain().await.unwrap();

    assert_eq!(h.worker.status().processed, 0);
}

// ---------------------------------------------------------------------------
// Full runner
// ---------------------------------------------------------------------------

/// Feed that replays scripted batches, then returns nothing.
struct ScriptedFeed {
    batches: Mutex<VecDeque<Vec<Value>>>,
    cursors: Arc<Mutex<Vec<Option<String>>>>,
}

impl ScriptedFeed {
    fn new(batches: Vec<Vec<Value>>) -> (Self, Arc<Mutex<Vec<Option<String>>>>) {
        let cursors = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                batches: Mutex::new(batches.into()),
                cursors: cursors.clone(),
            },
            cursors,
        )
    }
}

#[async_trait]
impl AlertFeed for ScriptedFeed {
    async fn fetch(
        &self,
        _user_id: &str,
        cursor: Option<String>,
    ) -> Result<Vec<Value>, EdgeRunnerError> {
        self.cursors.lock().unwrap().push(cursor);
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

fn start_runner(feed: ScriptedFeed, bm: Arc<MockBookmaker>) -> RunnerHandle {
    EdgeRunner::start(RunnerParts {
        feed,
        bookmaker: bm as Arc<dyn Bookmaker>,
        credentials: credentials(),
        strategy: strategy(),
        resolver: MatchResolver::default(),
        poller: PollerConfig {
            user_id: "user-1".into(),
            interval: Duration::from_millis(5),
            store_data: false,
        },
        worker: worker_config(),
        dry_run: false,
        store: None,
    })
    .unwrap()
}

async fn wait_until(handle: &RunnerHandle, cond: impl Fn(&RunnerHandle) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond(handle) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_runner_drops_bulk_batch_and_processes_next() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let bulk: Vec<Value> = (1..=250).map(alert_json).collect();
    let (feed, cursors) = ScriptedFeed::new(vec![bulk, vec![alert_json(300)]]);

    let handle = start_runner(feed, bm.clone());
    wait_until(&handle, |h| h.status().worker.bets_placed == 1).await;

    let status = handle.status();
    assert_eq!(status.polling.alerts_found, 251);
    assert_eq!(status.polling.cursor.as_deref(), Some("300"));
    assert_eq!(MockBookmaker::count(&bm.submits), 1);

    let seen = cursors.lock().unwrap().clone();
    assert_eq!(seen[0], None);
    assert_eq!(seen[1].as_deref(), Some("250"));

    handle.stop().await;
}

#[tokio::test]
async fn test_runner_fatal_startup_stops_poller() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    bm.sign_out();
    bm.refuse_auth();
    let (feed, _) = ScriptedFeed::new(vec![vec![alert_json(1)]]);

    let handle = start_runner(feed, bm.clone());
    wait_until(&handle, |h| {
        let s = h.status();
        s.worker.halted && s.polling.phase == PollingPhase::Stopped
    })
    .await;

    assert!(handle.is_stopping());
    assert_eq!(MockBookmaker::count(&bm.submits), 0);
    handle.stop().await;
}

#[tokio::test]
async fn test_runner_update_settings_validates() {
    let bm = Arc::new(MockBookmaker::new(dec!(1000)));
    let (feed, _) = ScriptedFeed::new(vec![]);
    let handle = start_runner(feed, bm);

    let bad = StrategySettings {
        fixed_stake_enabled: false,
        fixed_stake: dec!(10),
        stake_fraction: 2.0,
        min_value_pct: 5.0,
    };
    assert!(handle.update_settings(bad).is_err());

    let good = StrategySettings {
        stake_fraction: 0.25,
        ..handle.status().settings
    };
    handle.update_settings(good.clone()).unwrap();
    assert_eq!(handle.status().settings, good);

    let source = handle.status_source();
    handle.stop().await;
    let after = source.snapshot();
    assert_eq!(after.polling.phase, PollingPhase::Stopped);
    assert!(!after.worker.is_active);
}
