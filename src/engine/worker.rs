//! Queue worker.
//!
//! Single consumer of the poller's batches for one account. Processes one
//! alert at a time, strictly FIFO:
//!
//! resolve → fetch details → verify → translate → evaluate → size → execute
//!
//! followed by an unconditional throttle sleep. Per-item failures are logged
//! and the loop moves on; only a failed bankroll start-up halts the worker.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::executor::BetExecutor;
use super::queue::{GameQueue, GameQueueItem};
use super::with_timeout;
use crate::bookmakers::resolver::MatchResolver;
use crate::bookmakers::{translator, Bookmaker};
use crate::storage::{CorrelatedMatch, DataStore};
use crate::strategy::{Decision, Strategy, StrategySettings};
use crate::types::{AlertNotification, EdgeRunnerError, SessionHealth, WagerReceipt};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Instance (account) name, for logs and status.
    pub name: String,
    /// Sleep after every item, success or failure.
    pub throttle: Duration,
    /// Bound on each outbound bookmaker call.
    pub call_timeout: Duration,
    /// Record each correlated match for auditing.
    pub store_data: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            throttle: Duration::from_secs(10),
            call_timeout: Duration::from_secs(30),
            store_data: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Snapshot published after every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub bankroll: Option<Decimal>,
    pub queue_length: usize,
    pub is_active: bool,
    /// Start-up failed; nothing more will be processed.
    pub halted: bool,
    pub processed: u64,
    pub bets_placed: u64,
    pub session: SessionHealth,
    pub last_error: Option<String>,
}

/// How a single alert ended.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    /// Carries an `EdgeRunnerError::Resolution`.
    NoMatch(EdgeRunnerError),
    /// Correlated event failed verification.
    Mismatch,
    /// Carries an `EdgeRunnerError::Translation`.
    Untranslatable(EdgeRunnerError),
    NoValue,
    ZeroStake,
    Placed(WagerReceipt),
    Failed(EdgeRunnerError),
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct GameWorker {
    config: WorkerConfig,
    bookmaker: Arc<dyn Bookmaker>,
    resolver: MatchResolver,
    strategy: Strategy,
    executor: BetExecutor,
    queue: GameQueue,
    store: Option<DataStore>,
    settings: watch::Receiver<StrategySettings>,
    status_tx: watch::Sender<WorkerStatus>,
    status: WorkerStatus,
}

impl GameWorker {
    pub fn new(
        config: WorkerConfig,
        bookmaker: Arc<dyn Bookmaker>,
        resolver: MatchResolver,
        strategy: Strategy,
        executor: BetExecutor,
        settings: watch::Receiver<StrategySettings>,
    ) -> Self {
        let (status_tx, _) = watch::channel(WorkerStatus::default());
        Self {
            config,
            bookmaker,
            resolver,
            strategy,
            executor,
            queue: GameQueue::new(),
            store: None,
            settings,
            status_tx,
            status: WorkerStatus::default(),
        }
    }

    pub fn with_store(mut self, store: DataStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> &WorkerStatus {
        &self.status
    }

    pub fn bankroll(&self) -> Option<Decimal> {
        self.status.bankroll
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    fn publish(&mut self) {
        self.status.queue_length = self.queue.len();
        self.status_tx.send_replace(self.status.clone());
    }

    /// Queue a delivered batch, skipping already-seen ids.
    pub fn enqueue(&mut self, batch: Vec<AlertNotification>) {
        let received = batch.len();
        let summary = self.queue.enqueue_batch(batch);
        info!(
            instance = %self.config.name,
            received,
            added = summary.added,
            duplicates = summary.duplicates,
            missing_id = summary.missing_id,
            queue_length = self.queue.len(),
            "Alerts received"
        );
        self.publish();
    }

    // -- Bankroll --------------------------------------------------------

    /// Read the starting balance. An expired session gets one sign-in and
    /// one retry; anything else is fatal for the instance.
    pub async fn establish_bankroll(&mut self) -> Result<Decimal, EdgeRunnerError> {
        let timeout = self.config.call_timeout;
        let first = with_timeout(
            timeout,
            "fetch_account_info",
            self.bookmaker.fetch_account_info(),
        )
        .await;

        let info = match first {
            Ok(info) => info,
            Err(e) if e.is_auth() => {
                warn!(instance = %self.config.name, error = %e, "Not signed in, authenticating");
                if let Err(auth) = self.executor.reauthenticate(self.bookmaker.as_ref()).await {
                    self.status.session = SessionHealth::AuthFailed;
                    return Err(EdgeRunnerError::FatalStartup(format!(
                        "could not establish bankroll: {auth}"
                    )));
                }
                self.status.session = SessionHealth::Reauthenticated;
                with_timeout(
                    timeout,
                    "fetch_account_info",
                    self.bookmaker.fetch_account_info(),
                )
                .await
                .map_err(|e| {
                    EdgeRunnerError::FatalStartup(format!("could not establish bankroll: {e}"))
                })?
            }
            Err(e) => {
                return Err(EdgeRunnerError::FatalStartup(format!(
                    "could not establish bankroll: {e}"
                )))
            }
        };

        if self.status.session == SessionHealth::Unknown {
            self.status.session = SessionHealth::Valid;
        }
        self.status.bankroll = Some(info.balance);
        info!(instance = %self.config.name, bankroll = %info.balance, "Bankroll established");
        Ok(info.balance)
    }

    // -- Loop --------------------------------------------------------------

    /// Receive batches until shutdown. Returns an error only when the
    /// worker has halted on a start-up failure.
    pub async fn run(
        mut self,
        mut batches: mpsc::Receiver<Vec<AlertNotification>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), EdgeRunnerError> {
        info!(instance = %self.config.name, "Worker started");
        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            tokio::select! {
                batch = batches.recv() => match batch {
                    Some(batch) => {
                        self.enqueue(batch);
                        if let Err(e) = self.drain(&mut batches, &mut shutdown).await {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                },
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                }
            }
        };

        self.queue.clear();
        self.status.is_active = false;
        self.publish();
        info!(instance = %self.config.name, "Worker stopped");
        result
    }

    /// Process queued alerts until the queue is empty or shutdown is
    /// requested. A call while already draining, or after a halt, is a
    /// no-op.
    pub async fn drain(
        &mut self,
        batches: &mut mpsc::Receiver<Vec<AlertNotification>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), EdgeRunnerError> {
        if self.status.is_active || self.status.halted {
            return Ok(());
        }
        self.status.is_active = true;
        self.publish();

        if self.status.bankroll.is_none() {
            if let Err(e) = self.establish_bankroll().await {
                error!(instance = %self.config.name, error = %e, "Worker halted");
                self.status.halted = true;
                self.status.is_active = false;
                self.status.last_error = Some(e.to_string());
                self.queue.clear();
                self.publish();
                return Err(e);
            }
            self.publish();
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.refresh_settings();
            while let Ok(batch) = batches.try_recv() {
                self.enqueue(batch);
            }

            let Some(item) = self.queue.pop() else {
                break;
            };
            self.publish();

            let outcome = self.process_item(&item).await;
            self.record(&item, outcome);
            self.publish();

            tokio::select! {
                _ = tokio::time::sleep(self.config.throttle) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.status.is_active = false;
        self.publish();
        debug!(instance = %self.config.name, "Queue drained, worker idle");
        Ok(())
    }

    fn refresh_settings(&mut self) {
        if self.settings.has_changed().unwrap_or(false) {
            let settings = self.settings.borrow_and_update().clone();
            self.strategy.apply_settings(&settings);
        }
    }

    fn record(&mut self, item: &GameQueueItem, outcome: ItemOutcome) {
        self.status.processed += 1;
        let id = &item.alert.id;
        match outcome {
            ItemOutcome::Placed(receipt) => {
                self.status.bets_placed += 1;
                info!(instance = %self.config.name, id = %id, receipt = %receipt, "Alert converted to wager");
            }
            ItemOutcome::NoMatch(e) | ItemOutcome::Untranslatable(e) => {
                info!(instance = %self.config.name, id = %id, reason = %e, "Alert skipped");
                self.status.last_error = Some(e.to_string());
            }
            ItemOutcome::Failed(e) => {
                if e.is_auth() {
                    self.status.session = SessionHealth::AuthFailed;
                }
                if e.is_transient() {
                    warn!(instance = %self.config.name, id = %id, error = %e, "Transient failure, alert skipped");
                } else {
                    error!(instance = %self.config.name, id = %id, error = %e, "Alert processing failed");
                }
                self.status.last_error = Some(e.to_string());
            }
            other => {
                debug!(instance = %self.config.name, id = %id, outcome = ?other, "Alert finished without wager");
            }
        }
    }

    // -- Pipeline ----------------------------------------------------------

    /// Run one alert through the full pipeline.
    pub async fn process_item(&mut self, item: &GameQueueItem) -> ItemOutcome {
        let alert = &item.alert;
        let timeout = self.config.call_timeout;
        debug!(
            instance = %self.config.name,
            position = item.position,
            alert = %alert,
            "Processing alert"
        );

        let candidate = match with_timeout(
            timeout,
            "resolve",
            self.resolver
                .resolve(self.bookmaker.as_ref(), &alert.home, &alert.away),
        )
        .await
        {
            Ok(Some(c)) => c,
            Ok(None) => {
                return ItemOutcome::NoMatch(EdgeRunnerError::Resolution(format!(
                    "no venue event for {}",
                    alert.matchup()
                )));
            }
            Err(e) => return ItemOutcome::Failed(e),
        };

        let details = match with_timeout(
            timeout,
            "fetch_match_details",
            self.bookmaker
                .fetch_match_details(&candidate.event_id, &candidate.event_name),
        )
        .await
        {
            Ok(d) => d,
            Err(e) => return ItemOutcome::Failed(e),
        };

        if !self.bookmaker.verify_match(&details, alert).await {
            warn!(
                id = %alert.id,
                event = %details.name,
                venue_start = ?details.event_date,
                provider_start = ?alert.start_time,
                "Start times disagree, discarding"
            );
            return ItemOutcome::Mismatch;
        }

        if self.config.store_data {
            if let Some(store) = &self.store {
                let record = CorrelatedMatch {
                    account: self.config.name.clone(),
                    alert: alert.clone(),
                    candidate: candidate.clone(),
                    details: details.clone(),
                    recorded_at: Utc::now(),
                };
                if let Err(e) = store.save_correlated_match(&record) {
                    warn!(error = %e, "Failed to save correlated match");
                }
            }
        }

        let Some(query) = translator::translate(alert) else {
            return ItemOutcome::Untranslatable(EdgeRunnerError::Translation(format!(
                "{} {} {}",
                alert.sport, alert.line_type, alert.outcome
            )));
        };

        let bankroll = self.status.bankroll.unwrap_or(Decimal::ZERO);
        let (candidate, stake) = match self.strategy.decide(&details, alert, &query, bankroll) {
            Decision::NoValue => return ItemOutcome::NoValue,
            Decision::ZeroStake { candidate } => {
                info!(id = %alert.id, candidate = %candidate, "Value found but no stake");
                return ItemOutcome::ZeroStake;
            }
            Decision::Bet { candidate, stake } => (candidate, stake),
        };

        info!(
            instance = %self.config.name,
            event = %details.name,
            candidate = %candidate,
            stake = %stake.amount,
            mode = ?stake.mode,
            bankroll = %bankroll,
            "Value bet constructed"
        );

        match self
            .executor
            .execute(self.bookmaker.as_ref(), &details, &candidate, stake.amount, alert)
            .await
        {
            Ok(report) => {
                if report.reauthenticated {
                    self.status.session = SessionHealth::Reauthenticated;
                }
                if let Some(balance) = report.new_bankroll {
                    self.status.bankroll = Some(balance);
                    info!(instance = %self.config.name, bankroll = %balance, "Bankroll updated");
                }
                ItemOutcome::Placed(report.receipt)
            }
            Err(e) => ItemOutcome::Failed(e),
        }
    }
}
