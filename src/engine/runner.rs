//! Account instance.
//!
//! One `EdgeRunner` per account: its own poller task, worker task, queue,
//! bankroll and bookmaker session. Nothing is shared between instances.
//! The returned `RunnerHandle` is the in-process control surface.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::executor::BetExecutor;
use super::worker::{GameWorker, WorkerConfig, WorkerStatus};
use crate::bookmakers::resolver::MatchResolver;
use crate::bookmakers::Bookmaker;
use crate::provider::poller::{AlertPoller, PollerConfig};
use crate::provider::AlertFeed;
use crate::storage::DataStore;
use crate::strategy::{Strategy, StrategySettings};
use crate::types::{Credentials, EdgeRunnerError, PollingState};

/// Bounded poller → worker channel capacity, in batches.
pub const BATCH_CHANNEL_CAPACITY: usize = 32;

/// Everything needed to assemble one instance.
pub struct RunnerParts<F: AlertFeed> {
    pub feed: F,
    pub bookmaker: Arc<dyn Bookmaker>,
    pub credentials: Credentials,
    pub strategy: Strategy,
    pub resolver: MatchResolver,
    pub poller: PollerConfig,
    pub worker: WorkerConfig,
    pub dry_run: bool,
    pub store: Option<DataStore>,
}

/// Combined status of one instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub name: String,
    pub polling: PollingState,
    pub worker: WorkerStatus,
    pub settings: StrategySettings,
}

pub struct EdgeRunner;

impl EdgeRunner {
    /// Start polling and the worker for one account.
    ///
    /// Fails without spawning anything when the poller cannot start.
    pub fn start<F: AlertFeed + 'static>(
        parts: RunnerParts<F>,
    ) -> Result<RunnerHandle, EdgeRunnerError> {
        let name = parts.worker.name.clone();
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);
        let (settings_tx, settings_rx) = watch::channel(parts.strategy.settings());

        let mut poller = AlertPoller::new(parts.feed, parts.poller, batch_tx);
        if let Some(store) = parts.store.clone() {
            poller = poller.with_store(store);
        }
        let polling = poller.subscribe();

        let executor = BetExecutor::new(
            parts.credentials,
            parts.dry_run,
            parts.worker.call_timeout,
        );
        let mut worker = GameWorker::new(
            parts.worker,
            parts.bookmaker,
            parts.resolver,
            parts.strategy,
            executor,
            settings_rx,
        );
        if let Some(store) = parts.store {
            worker = worker.with_store(store);
        }
        let worker_status = worker.subscribe();

        let poller_task = poller.start(shutdown_rx.clone())?;

        let fatal_tx = shutdown_tx.clone();
        let worker_name = name.clone();
        let worker_task = tokio::spawn(async move {
            if let Err(e) = worker.run(batch_rx, shutdown_rx).await {
                error!(instance = %worker_name, error = %e, "Instance halted, stopping poller");
                fatal_tx.send_replace(true);
            }
        });

        info!(instance = %name, dry_run = parts.dry_run, "Instance started");

        Ok(RunnerHandle {
            name,
            shutdown: shutdown_tx,
            settings: settings_tx,
            polling,
            worker: worker_status,
            tasks: vec![poller_task, worker_task],
        })
    }
}

/// Control surface for a running instance.
pub struct RunnerHandle {
    name: String,
    shutdown: Arc<watch::Sender<bool>>,
    settings: watch::Sender<StrategySettings>,
    polling: watch::Receiver<PollingState>,
    worker: watch::Receiver<WorkerStatus>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunnerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> InstanceStatus {
        InstanceStatus {
            name: self.name.clone(),
            polling: self.polling.borrow().clone(),
            worker: self.worker.borrow().clone(),
            settings: self.settings.borrow().clone(),
        }
    }

    /// Lightweight view for the dashboard, detached from the handle.
    pub fn status_source(&self) -> StatusSource {
        StatusSource {
            name: self.name.clone(),
            polling: self.polling.clone(),
            worker: self.worker.clone(),
            settings: self.settings.subscribe(),
        }
    }

    /// New parameters take effect before the worker's next item.
    pub fn update_settings(&self, settings: StrategySettings) -> Result<(), EdgeRunnerError> {
        if !(settings.stake_fraction > 0.0 && settings.stake_fraction <= 1.0) {
            return Err(EdgeRunnerError::Validation(format!(
                "stake fraction must be in (0, 1], got {}",
                settings.stake_fraction
            )));
        }
        if settings.fixed_stake.is_sign_negative() {
            return Err(EdgeRunnerError::Validation(
                "fixed stake must not be negative".into(),
            ));
        }
        if settings.min_value_pct < 0.0 {
            return Err(EdgeRunnerError::Validation(
                "min value percentage must not be negative".into(),
            ));
        }
        self.settings.send_replace(settings);
        info!(instance = %self.name, "Settings update queued");
        Ok(())
    }

    /// Whether shutdown has been requested (by `stop` or a worker halt).
    pub fn is_stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Signal shutdown and wait for both tasks to finish. Pending alerts
    /// and seen ids are discarded.
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(instance = %self.name, error = %e, "Instance task ended abnormally");
            }
        }
        info!(instance = %self.name, "Instance stopped");
    }
}

/// Read-only status feed, clonable into the dashboard.
#[derive(Clone)]
pub struct StatusSource {
    name: String,
    polling: watch::Receiver<PollingState>,
    worker: watch::Receiver<WorkerStatus>,
    settings: watch::Receiver<StrategySettings>,
}

impl StatusSource {
    pub fn new(
        name: impl Into<String>,
        polling: watch::Receiver<PollingState>,
        worker: watch::Receiver<WorkerStatus>,
        settings: watch::Receiver<StrategySettings>,
    ) -> Self {
        Self {
            name: name.into(),
            polling,
            worker,
            settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> InstanceStatus {
        InstanceStatus {
            name: self.name.clone(),
            polling: self.polling.borrow().clone(),
            worker: self.worker.borrow().clone(),
            settings: self.settings.borrow().clone(),
        }
    }
}
