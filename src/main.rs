//! EDGERUNNER: odds-alert driven value betting agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! starts one independent instance per configured account, optionally
//! serves the status dashboard, and shuts everything down on Ctrl+C.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use edgerunner::bookmakers::betking::BetKingClient;
use edgerunner::bookmakers::resolver::MatchResolver;
use edgerunner::config::{self, AccountConfig, AppConfig};
use edgerunner::dashboard::{self, routes::DashboardState};
use edgerunner::engine::runner::{EdgeRunner, RunnerHandle, RunnerParts};
use edgerunner::provider::HttpAlertFeed;
use edgerunner::storage::DataStore;
use edgerunner::strategy::Strategy;

const BANNER: &str = r#"
 _____ ____   ____ _____ ____  _   _ _   _ _   _ _____ ____
| ____|  _ \ / ___| ____|  _ \| | | | \ | | \ | | ____|  _ \
|  _| | | | | |  _|  _| | |_) | | | |  \| |  \| |  _| | |_) |
| |___| |_| | |_| | |___|  _ <| |_| | |\  | |\  | |___|  _ <
|_____|____/ \____|_____|_| \_\\___/|_| \_|_| \_|_____|_| \_\

  Odds-alert value betting agent
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    cfg.validate().context("Invalid configuration")?;
    info!(
        agent_name = %cfg.agent.name,
        accounts = cfg.accounts.len(),
        dry_run = cfg.agent.dry_run,
        bookmaker = %cfg.bookmaker.name,
        "EDGERUNNER starting up"
    );
    if cfg.bookmaker.name != "betking" {
        warn!(bookmaker = %cfg.bookmaker.name, "Unknown bookmaker, using BetKing client");
    }

    let dashboard_state = Arc::new(DashboardState::new());
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port).await?;
    }

    // -- Start one instance per account ------------------------------------

    let mut handles: Vec<RunnerHandle> = Vec::new();
    for account in &cfg.accounts {
        match start_instance(&cfg, account) {
            Ok(handle) => {
                dashboard_state.register(handle.status_source()).await;
                handles.push(handle);
            }
            Err(e) => error!(account = %account.name, error = %e, "Failed to start instance"),
        }
    }

    if handles.is_empty() {
        anyhow::bail!("No instance could be started");
    }

    info!(instances = handles.len(), "Running. Press Ctrl+C to stop.");

    // -- Wait for Ctrl+C, logging halted instances along the way -----------

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_secs(60));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for handle in &handles {
                    let status = handle.status();
                    info!(
                        instance = %status.name,
                        polling = %status.polling.status_message,
                        alerts = status.polling.alerts_found,
                        queue = status.worker.queue_length,
                        bankroll = ?status.worker.bankroll,
                        bets = status.worker.bets_placed,
                        session = %status.worker.session,
                        halted = status.worker.halted,
                        "Instance status"
                    );
                }
                if handles.iter().all(RunnerHandle::is_stopping) {
                    warn!("Every instance has halted. Shutting down.");
                    break;
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    for handle in handles {
        handle.stop().await;
    }
    info!("EDGERUNNER shut down cleanly.");

    Ok(())
}

/// Assemble and start one account instance.
fn start_instance(cfg: &AppConfig, account: &AccountConfig) -> Result<RunnerHandle> {
    let credentials = account.credentials()?;
    let feed = HttpAlertFeed::new(
        &cfg.provider.alerts_url,
        Duration::from_secs(cfg.provider.request_timeout_secs),
    )?;
    let bookmaker = Arc::new(BetKingClient::new(cfg.betking_config())?);

    let parts = RunnerParts {
        feed,
        bookmaker,
        credentials,
        strategy: Strategy::new(cfg.evaluator_config(), cfg.stake_config()),
        resolver: MatchResolver::new(cfg.resolver_config()),
        poller: cfg.poller_config(account),
        worker: cfg.worker_config(account),
        dry_run: cfg.agent.dry_run,
        store: cfg
            .agent
            .store_data
            .then(|| DataStore::new(cfg.agent.data_dir.clone())),
    };

    EdgeRunner::start(parts)
        .with_context(|| format!("Instance '{}' did not start", account.name))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("edgerunner=info"));

    let json_logging = std::env::var("EDGERUNNER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
