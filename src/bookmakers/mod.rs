//! Bookmaker integrations.
//!
//! Defines the `Bookmaker` trait the pipeline talks to, plus:
//! - `betking`: the BetKing venue client (reqwest, cookie session)
//! - `resolver`: fuzzy correlation of provider teams to venue events
//! - `translator`: provider line → venue market vocabulary

pub mod betking;
pub mod resolver;
pub mod translator;

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;

use crate::types::{
    AccountInfo, AlertNotification, AuthOutcome, Credentials, EdgeRunnerError, EventSearchHit,
    MatchDetails, ValueBetCandidate, WagerPayload, WagerReceipt,
};

/// Default allowed drift between the alert's start time and the venue's.
pub const DEFAULT_START_TOLERANCE_MINUTES: i64 = 60;

/// Abstraction over a wagering venue, scoped to one account session.
///
/// Every fallible call reports `EdgeRunnerError::Authentication` when the
/// session has expired so callers can run their single re-auth cycle.
#[async_trait]
pub trait Bookmaker: Send + Sync {
    /// Venue name for logging and identification.
    fn name(&self) -> &str;

    /// Free-text event search.
    async fn search_events(&self, term: &str) -> Result<Vec<EventSearchHit>, EdgeRunnerError>;

    /// Full market details for one event. Extraction failures surface as
    /// `Parse` errors; the pipeline never sees the page internals.
    async fn fetch_match_details(
        &self,
        event_id: &str,
        event_name: &str,
    ) -> Result<MatchDetails, EdgeRunnerError>;

    /// Whether the fetched event is really the alerted fixture.
    async fn verify_match(&self, details: &MatchDetails, alert: &AlertNotification) -> bool {
        start_times_consistent(
            details,
            alert,
            Duration::minutes(DEFAULT_START_TOLERANCE_MINUTES),
        )
    }

    fn build_wager_payload(
        &self,
        details: &MatchDetails,
        candidate: &ValueBetCandidate,
        stake: Decimal,
        alert: &AlertNotification,
    ) -> Result<WagerPayload, EdgeRunnerError>;

    async fn submit_wager(&self, payload: &WagerPayload) -> Result<WagerReceipt, EdgeRunnerError>;

    async fn fetch_account_info(&self) -> Result<AccountInfo, EdgeRunnerError>;

    /// Sign in. Never errors; failure is reported in the outcome.
    async fn authenticate(&self, credentials: &Credentials) -> AuthOutcome;
}

/// Start times agree within `tolerance`. Missing times on either side are
/// accepted, since not every feed carries them.
pub fn start_times_consistent(
    details: &MatchDetails,
    alert: &AlertNotification,
    tolerance: Duration,
) -> bool {
    match (details.event_date, alert.start_time) {
        (Some(venue), Some(provider)) => (venue - provider).abs() <= tolerance,
        _ => true,
    }
}
