//! Mock bookmaker for integration testing.
//!
//! Deterministic in-memory `Bookmaker`: fixed search hits and event
//! details, a balance that shrinks as wagers are accepted, and a session
//! that tests can expire or refuse to renew.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use edgerunner::bookmakers::Bookmaker;
use edgerunner::types::*;

pub struct MockBookmaker {
    hits: Vec<EventSearchHit>,
    details: MatchDetails,
    balance: Mutex<Decimal>,
    signed_in: Mutex<bool>,
    auth_succeeds: Mutex<bool>,
    /// Upcoming submissions that fail with an expired session.
    expire_next_submits: Mutex<usize>,
    receipts: Mutex<Vec<WagerReceipt>>,
    pub searches: AtomicUsize,
    pub detail_fetches: AtomicUsize,
    pub submits: AtomicUsize,
    pub auth_attempts: AtomicUsize,
    pub account_reads: AtomicUsize,
}

impl MockBookmaker {
    /// Signed-in venue listing "Barrow - Bolton Wanderers" with a 1x2 market
    /// where home is priced at 2.50.
    pub fn new(balance: Decimal) -> Self {
        Self::with_details(balance, barrow_bolton_details(None))
    }

    pub fn with_details(balance: Decimal, details: MatchDetails) -> Self {
        Self {
            hits: vec![EventSearchHit {
                event_id: details.id.clone(),
                event_name: details.name.clone(),
                team_home: "Barrow AFC".into(),
                team_away: "Bolton Wanderers".into(),
                event_date: details.event_date,
            }],
            details,
            balance: Mutex::new(balance),
            signed_in: Mutex::new(true),
            auth_succeeds: Mutex::new(true),
            expire_next_submits: Mutex::new(0),
            receipts: Mutex::new(Vec::new()),
            searches: AtomicUsize::new(0),
            detail_fetches: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
            auth_attempts: AtomicUsize::new(0),
            account_reads: AtomicUsize::new(0),
        }
    }

    pub fn sign_out(&self) {
        *self.signed_in.lock().unwrap() = false;
    }

    pub fn refuse_auth(&self) {
        *self.auth_succeeds.lock().unwrap() = false;
    }

    pub fn expire_next_submits(&self, n: usize) {
        *self.expire_next_submits.lock().unwrap() = n;
    }

    pub fn balance(&self) -> Decimal {
        *self.balance.lock().unwrap()
    }

    pub fn receipts(&self) -> Vec<WagerReceipt> {
        self.receipts.lock().unwrap().clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn session_ok(&self) -> Result<(), EdgeRunnerError> {
        if *self.signed_in.lock().unwrap() {
            Ok(())
        } else {
            Err(EdgeRunnerError::Authentication("session expired".into()))
        }
    }
}

#[async_trait]
impl Bookmaker for MockBookmaker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn search_events(&self, term: &str) -> Result<Vec<EventSearchHit>, EdgeRunnerError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let needle = term.to_lowercase();
        Ok(self
            .hits
            .iter()
            .filter(|h| {
                h.team_home.to_lowercase().contains(&needle)
                    || h.team_away.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn fetch_match_details(
        &self,
        event_id: &str,
        _event_name: &str,
    ) -> Result<MatchDetails, EdgeRunnerError> {
        self.detail_fetches.fetch_add(1, Ordering::SeqCst);
        if event_id == self.details.id {
            Ok(self.details.clone())
        } else {
            Err(EdgeRunnerError::Parse(format!("unknown event {event_id}")))
        }
    }

    fn build_wager_payload(
        &self,
        details: &MatchDetails,
        candidate: &ValueBetCandidate,
        stake: Decimal,
        alert: &AlertNotification,
    ) -> Result<WagerPayload, EdgeRunnerError> {
        Ok(WagerPayload {
            stake,
            odds: candidate.venue_odds,
            body: serde_json::json!({
                "eventId": details.id,
                "selectionId": candidate.selection.id,
                "alertId": alert.id,
                "stake": stake.to_string(),
            }),
        })
    }

    async fn submit_wager(&self, payload: &WagerPayload) -> Result<WagerReceipt, EdgeRunnerError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        {
            let mut pending = self.expire_next_submits.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                *self.signed_in.lock().unwrap() = false;
                return Err(EdgeRunnerError::Authentication("session expired".into()));
            }
        }
        self.session_ok()?;

        *self.balance.lock().unwrap() -= payload.stake;
        let receipt = WagerReceipt {
            reference: format!("mock-{}", Uuid::new_v4()),
            stake: payload.stake,
            odds: payload.odds,
            placed_at: Utc::now(),
            dry_run: false,
        };
        self.receipts.lock().unwrap().push(receipt.clone());
        Ok(receipt)
    }

    async fn fetch_account_info(&self) -> Result<AccountInfo, EdgeRunnerError> {
        self.account_reads.fetch_add(1, Ordering::SeqCst);
        self.session_ok()?;
        Ok(AccountInfo {
            balance: self.balance(),
        })
    }

    async fn authenticate(&self, _credentials: &Credentials) -> AuthOutcome {
        self.auth_attempts.fetch_add(1, Ordering::SeqCst);
        if *self.auth_succeeds.lock().unwrap() {
            *self.signed_in.lock().unwrap() = true;
            AuthOutcome::ok()
        } else {
            AuthOutcome::failed("invalid credentials")
        }
    }
}

/// Venue event with a single football 1x2 market.
pub fn barrow_bolton_details(event_date: Option<DateTime<Utc>>) -> MatchDetails {
    serde_json::from_value(serde_json::json!({
        "id": 9001,
        "name": "Barrow - Bolton Wanderers",
        "eventDate": event_date.map(|d| d.to_rfc3339()),
        "markets": [
            {
                "id": 1,
                "name": "1x2",
                "selections": [
                    { "id": 11, "name": "1", "status": "VALID", "odd": { "value": 2.5 } },
                    { "id": 12, "name": "X", "status": "VALID", "odd": { "value": 3.3 } },
                    { "id": 13, "name": "2", "status": "VALID", "odd": { "value": 3.0 } }
                ]
            }
        ]
    }))
    .unwrap()
}
