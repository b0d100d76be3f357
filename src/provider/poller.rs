//! Alert poller.
//!
//! One per account instance. Fetches new alerts after the cursor, advances
//! the cursor, and hands decoded batches to the worker over a bounded
//! channel. Its `PollingState` is owned by the loop and published through a
//! `watch` channel; readers only ever see snapshots.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::AlertFeed;
use crate::storage::DataStore;
use crate::types::{AlertNotification, EdgeRunnerError, PollingPhase, PollingState};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// A batch of exactly this size is the feed's bulk re-sync, not fresh
/// movement. The cursor still advances past it.
pub const BULK_RESYNC_BATCH_SIZE: usize = 250;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Provider account the alerts are subscribed under.
    pub user_id: String,
    /// Sleep between polls.
    pub interval: Duration,
    /// Dump each non-empty raw batch for auditing.
    pub store_data: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            interval: Duration::from_secs(20),
            store_data: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Poll outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Alerts handed to the worker.
    Delivered(usize),
    /// Nothing after the cursor.
    Empty,
    /// Bulk re-sync batch, discarded.
    BulkResyncDropped,
    /// Feed or transport failure; retried at the next interval.
    Failed(String),
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct AlertPoller<F: AlertFeed> {
    feed: F,
    config: PollerConfig,
    state: PollingState,
    state_tx: watch::Sender<PollingState>,
    batches: mpsc::Sender<Vec<AlertNotification>>,
    store: Option<DataStore>,
}

impl<F: AlertFeed + 'static> AlertPoller<F> {
    pub fn new(
        feed: F,
        config: PollerConfig,
        batches: mpsc::Sender<Vec<AlertNotification>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(PollingState::default());
        Self {
            feed,
            config,
            state: PollingState::default(),
            state_tx,
            batches,
            store: None,
        }
    }

    /// Dump raw batches into `store` when `store_data` is on.
    pub fn with_store(mut self, store: DataStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Read-only view of the polling state.
    pub fn subscribe(&self) -> watch::Receiver<PollingState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> &PollingState {
        &self.state
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }

    /// Spawn the polling loop. Without a user id nothing is spawned and the
    /// error is reflected in the published status.
    pub fn start(
        mut self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, EdgeRunnerError> {
        if self.config.user_id.trim().is_empty() {
            let err = EdgeRunnerError::Validation("provider user id not set".into());
            self.state.status_message = format!("ERROR: {err}");
            self.publish();
            warn!("Provider user id not set, polling cannot start");
            return Err(err);
        }

        self.state.phase = PollingPhase::Polling;
        self.state.status_message = "Polling started".to_string();
        self.publish();
        info!(
            user_id = %self.config.user_id,
            interval_secs = self.config.interval.as_secs(),
            "Alert polling started"
        );

        Ok(tokio::spawn(async move { self.run(shutdown).await }))
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        while !*shutdown.borrow() {
            self.poll_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.state.phase = PollingPhase::Stopped;
        self.state.status_message = "Stopped".to_string();
        self.publish();
        info!(user_id = %self.config.user_id, "Alert polling stopped");
    }

    /// One fetch → cursor update → hand-off cycle.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let outcome = match self
            .feed
            .fetch(&self.config.user_id, self.state.cursor.clone())
            .await
        {
            Ok(raw) => self.handle_batch(raw).await,
            Err(e) => {
                self.state.status_message = format!("ERROR: {e}");
                warn!(error = %e, "Alert poll failed");
                PollOutcome::Failed(e.to_string())
            }
        };

        self.state.last_checked = Some(Utc::now());
        self.publish();
        debug!(
            status = %self.state.status_message,
            cursor = ?self.state.cursor,
            "Poll complete"
        );
        outcome
    }

    async fn handle_batch(&mut self, raw: Vec<serde_json::Value>) -> PollOutcome {
        if raw.is_empty() {
            self.state.status_message = "STATUS: No new notifications.".to_string();
            return PollOutcome::Empty;
        }

        if let Some(cursor) = raw.iter().rev().find_map(raw_alert_id) {
            self.state.cursor = Some(cursor);
        }
        self.state.alerts_found += raw.len() as u64;
        self.state.status_message = format!("SUCCESS: Received {} new alerts.", raw.len());

        if self.config.store_data {
            if let Some(store) = &self.store {
                if let Err(e) = store.dump_notifications(&raw) {
                    warn!(error = %e, "Failed to dump provider batch");
                }
            }
        }

        if raw.len() == BULK_RESYNC_BATCH_SIZE {
            info!(count = raw.len(), "Skipping bulk re-sync batch");
            return PollOutcome::BulkResyncDropped;
        }

        let alerts = decode_alerts(raw);
        let count = alerts.len();
        if count == 0 {
            return PollOutcome::Delivered(0);
        }

        if self.batches.send(alerts).await.is_err() {
            warn!(count, "Worker channel closed, batch discarded");
            return PollOutcome::Failed("worker channel closed".into());
        }
        info!(count, "Alerts handed to worker");
        PollOutcome::Delivered(count)
    }
}

/// Decode each element on its own; malformed ones are logged and skipped.
pub fn decode_alerts(raw: Vec<serde_json::Value>) -> Vec<AlertNotification> {
    raw.into_iter()
        .filter_map(|value| {
            let id = raw_alert_id(&value);
            match serde_json::from_value::<AlertNotification>(value) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!(id = ?id, error = %e, "Skipping undecodable alert");
                    None
                }
            }
        })
        .collect()
}

/// Alert id as a string, whether the feed sent a string or a number.
/// Normalized the same way the decoded `AlertNotification::id` is.
fn raw_alert_id(value: &serde_json::Value) -> Option<String> {
    match value.get("id")? {
        serde_json::Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(|i| i.to_string())
            .or_else(|| n.as_f64().map(|f| f.to_string())),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
