//! Bet executor.
//!
//! Builds and submits the wager for a sized value bet. An expired session
//! gets exactly one re-authentication and one retry; a second failure is
//! final for that item. After a successful placement the bankroll is
//! refreshed from the venue.

use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

use super::with_timeout;
use crate::bookmakers::Bookmaker;
use crate::types::{
    AlertNotification, Credentials, EdgeRunnerError, MatchDetails, ValueBetCandidate,
    WagerReceipt,
};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub receipt: WagerReceipt,
    /// Balance read back after placement; `None` if the refresh failed or
    /// this was a dry run.
    pub new_bankroll: Option<Decimal>,
    /// The session had to be renewed to place this wager.
    pub reauthenticated: bool,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct BetExecutor {
    credentials: Credentials,
    dry_run: bool,
    call_timeout: Duration,
}

impl BetExecutor {
    pub fn new(credentials: Credentials, dry_run: bool, call_timeout: Duration) -> Self {
        Self {
            credentials,
            dry_run,
            call_timeout,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Place `stake` on `candidate`.
    ///
    /// In dry-run mode the payload is still built (so venue-side validation
    /// runs) but nothing is submitted.
    pub async fn execute(
        &self,
        bookmaker: &dyn Bookmaker,
        details: &MatchDetails,
        candidate: &ValueBetCandidate,
        stake: Decimal,
        alert: &AlertNotification,
    ) -> Result<ExecutionReport, EdgeRunnerError> {
        let payload = bookmaker.build_wager_payload(details, candidate, stake, alert)?;

        if self.dry_run {
            info!(
                event = %details.name,
                market = %candidate.market.name,
                selection = %candidate.selection.name,
                odds = format!("{:.2}", payload.odds),
                stake = %payload.stake,
                edge = format!("{:.2}%", candidate.edge_pct),
                "[DRY RUN] Would place bet"
            );
            return Ok(ExecutionReport {
                receipt: WagerReceipt::dry_run(payload.stake, payload.odds),
                new_bankroll: None,
                reauthenticated: false,
            });
        }

        let mut reauthenticated = false;
        let receipt = match with_timeout(
            self.call_timeout,
            "submit_wager",
            bookmaker.submit_wager(&payload),
        )
        .await
        {
            Ok(receipt) => receipt,
            Err(e) if e.is_auth() => {
                warn!(error = %e, "Session expired during placement, re-authenticating");
                self.reauthenticate(bookmaker).await?;
                reauthenticated = true;
                info!("Re-authenticated, retrying placement");
                with_timeout(
                    self.call_timeout,
                    "submit_wager",
                    bookmaker.submit_wager(&payload),
                )
                .await?
            }
            Err(e) => return Err(e),
        };

        info!(
            event = %details.name,
            market = %candidate.market.name,
            selection = %candidate.selection.name,
            receipt = %receipt,
            "Bet placed"
        );

        let new_bankroll = match with_timeout(
            self.call_timeout,
            "fetch_account_info",
            bookmaker.fetch_account_info(),
        )
        .await
        {
            Ok(info) => Some(info.balance),
            Err(e) => {
                warn!(error = %e, "Bankroll refresh failed after placement");
                None
            }
        };

        Ok(ExecutionReport {
            receipt,
            new_bankroll,
            reauthenticated,
        })
    }

    /// One sign-in attempt. Failure is reported as an authentication error.
    pub async fn reauthenticate(&self, bookmaker: &dyn Bookmaker) -> Result<(), EdgeRunnerError> {
        let outcome = with_timeout(self.call_timeout, "authenticate", async {
            Ok(bookmaker.authenticate(&self.credentials).await)
        })
        .await?;

        if outcome.success {
            Ok(())
        } else {
            let reason = outcome.error.unwrap_or_else(|| "unknown reason".into());
            warn!(username = %self.credentials.username, reason = %reason, "Re-authentication failed");
            Err(EdgeRunnerError::Authentication(format!(
                "re-authentication failed: {reason}"
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
