//! BetKing integration.
//!
//! Fixed-odds sportsbook reached over plain HTTP with a cookie session.
//!
//! - Search: public JSON feed (`/api/feeds/prematch/Search/lang/en?search=`)
//! - Match details: prematch event page; the market tree is embedded in the
//!   page's `window.__remixContext` JSON and extracted in one place
//!   (`parse_match_details`)
//! - Sign-in: form post, session carried by the `accessToken` cookie
//! - Wagers: form-encoded `data=<json>` PUT to the place-bet action
//!
//! Session expiry surfaces as `EdgeRunnerError::Authentication` so the
//! worker can run its single re-authentication cycle.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode, Url};
use rust_decimal::prelude::*;
use secrecy::ExposeSecret;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{start_times_consistent, Bookmaker, DEFAULT_START_TOLERANCE_MINUTES};
use crate::types::{
    AccountInfo, AlertNotification, AuthOutcome, Credentials, EdgeRunnerError, EventSearchHit,
    MatchDetails, ValueBetCandidate, WagerPayload, WagerReceipt,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const VENUE_NAME: &str = "betking";

const DEFAULT_SEARCH_URL: &str =
    "https://sportsapicdn-mobile.betking.com/api/feeds/prematch/Search/lang/en";
const DEFAULT_SITE_URL: &str = "https://m.betking.com";

const LOGIN_PATH: &str = "/my-accounts/login?urlAfterLogin=/";
const BALANCE_PATH: &str =
    "/my-accounts/balance?_data=routes%2F%28%24locale%29.my-accounts.balance";
const PLACE_BET_PATH: &str =
    "/sports/action/placebet?_data=routes%2F%28%24locale%29.sports.action.placebet";
const BETSLIP_PATH: &str = "/sports/betslip";

/// Loader route that carries the event on the prematch page.
const DETAILS_ROUTE_KEY: &str = "routes/($locale).sports.prematch.$matchId.$eventName.($areaId)._index";
const REMIX_CONTEXT_MARKER: &str = "window.__remixContext";
const SESSION_COOKIE: &str = "accessToken";

#[derive(Debug, Clone)]
pub struct BetKingConfig {
    pub search_url: String,
    pub site_url: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// Allowed drift between provider and venue start times.
    pub start_tolerance: chrono::Duration,
}

impl Default for BetKingConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            start_tolerance: chrono::Duration::minutes(DEFAULT_START_TOLERANCE_MINUTES),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct SessionState {
    signed_in: bool,
    /// Expiry of the `accessToken` cookie when the server sent one.
    expires_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn check(&self) -> Result<(), EdgeRunnerError> {
        if !self.signed_in {
            return Err(EdgeRunnerError::Authentication("not signed in".into()));
        }
        match self.expires_at {
            Some(exp) if exp <= Utc::now() => Err(EdgeRunnerError::Authentication(format!(
                "session cookie expired at {exp}"
            ))),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// BetKing client for one account. Owns its cookie jar, so sessions never
/// leak between account instances.
pub struct BetKingClient {
    http: Client,
    jar: Arc<Jar>,
    config: BetKingConfig,
    site: Url,
    session: RwLock<SessionState>,
}

impl BetKingClient {
    pub fn new(config: BetKingConfig) -> anyhow::Result<Self> {
        let jar = Arc::new(Jar::default());
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent("EDGERUNNER/0.1.0 (value-betting-agent)")
            .cookie_provider(jar.clone())
            .build()
            .context("Failed to build HTTP client for BetKing")?;

        let site = Url::parse(&config.site_url)
            .with_context(|| format!("Invalid BetKing site URL: {}", config.site_url))?;

        Ok(Self {
            http,
            jar,
            config,
            site,
            session: RwLock::new(SessionState::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.site_url.trim_end_matches('/'), path)
    }

    fn ensure_session(&self) -> Result<(), EdgeRunnerError> {
        self.session
            .read()
            .map_err(|_| EdgeRunnerError::Authentication("session lock poisoned".into()))?
            .check()
    }

    fn set_session(&self, state: SessionState) {
        if let Ok(mut guard) = self.session.write() {
            *guard = state;
        }
    }

    fn clear_session(&self) {
        self.set_session(SessionState::default());
    }

    fn has_session_cookie(&self) -> bool {
        self.jar
            .cookies(&self.site)
            .and_then(|v| v.to_str().map(|s| s.to_string()).ok())
            .map(|s| {
                s.split(';')
                    .any(|c| c.trim().starts_with(&format!("{SESSION_COOKIE}=")))
            })
            .unwrap_or(false)
    }

    /// Map an auth-looking response to `Authentication`, clearing the session.
    fn auth_failure(&self, status: StatusCode, final_url: &Url) -> Option<EdgeRunnerError> {
        let redirected_to_login = final_url.path().contains("/login");
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || redirected_to_login {
            self.clear_session();
            warn!(%status, url = %final_url, "BetKing session rejected");
            return Some(EdgeRunnerError::Authentication(format!(
                "BetKing rejected session ({status})"
            )));
        }
        None
    }
}

#[async_trait]
impl Bookmaker for BetKingClient {
    fn name(&self) -> &str {
        VENUE_NAME
    }

    async fn search_events(&self, term: &str) -> Result<Vec<EventSearchHit>, EdgeRunnerError> {
        let url = format!(
            "{}?search={}",
            self.config.search_url,
            urlencoding::encode(term.trim())
        );
        debug!(url = %url, "BetKing search request");

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(EdgeRunnerError::Network(format!(
                "BetKing search error {status}: {body}"
            )));
        }

        let value: serde_json::Value = resp.json().await?;
        let hits = parse_search_hits(value);
        debug!(term, hits = hits.len(), "BetKing search complete");
        Ok(hits)
    }

    async fn fetch_match_details(
        &self,
        event_id: &str,
        event_name: &str,
    ) -> Result<MatchDetails, EdgeRunnerError> {
        if event_id.is_empty() || event_name.is_empty() {
            return Err(EdgeRunnerError::Validation(
                "event id and name are required".into(),
            ));
        }

        let url = self.url(&format!("/sports/prematch/{event_id}/{}", event_slug(event_name)));
        debug!(url = %url, "BetKing match details request");

        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(EdgeRunnerError::Network(format!(
                "BetKing match page error {status}"
            )));
        }

        let html = resp.text().await?;
        parse_match_details(&html, event_id)
    }

    async fn verify_match(&self, details: &MatchDetails, alert: &AlertNotification) -> bool {
        start_times_consistent(details, alert, self.config.start_tolerance)
    }

    fn build_wager_payload(
        &self,
        details: &MatchDetails,
        candidate: &ValueBetCandidate,
        stake: Decimal,
        alert: &AlertNotification,
    ) -> Result<WagerPayload, EdgeRunnerError> {
        build_payload(details, candidate, stake, alert)
    }

    async fn submit_wager(&self, payload: &WagerPayload) -> Result<WagerReceipt, EdgeRunnerError> {
        self.ensure_session()?;

        let data = serde_json::to_string(&payload.body)?;
        let resp = self
            .http
            .put(self.url(PLACE_BET_PATH))
            .header("Referer", self.url(BETSLIP_PATH))
            .form(&[("data", data.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if let Some(err) = self.auth_failure(status, resp.url()) {
            return Err(err);
        }
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(EdgeRunnerError::Network(format!(
                "Bet placement failed with status {status}: {text}"
            )));
        }
        if text.trim().is_empty() {
            return Err(EdgeRunnerError::Parse(
                "Server returned an empty successful response".into(),
            ));
        }

        let value: serde_json::Value = serde_json::from_str(&text)?;
        let reference = interpret_place_bet_response(&value)?;

        info!(
            reference = %reference,
            stake = %payload.stake,
            odds = payload.odds,
            "BetKing wager placed"
        );

        Ok(WagerReceipt {
            reference,
            stake: payload.stake,
            odds: payload.odds,
            placed_at: Utc::now(),
            dry_run: false,
        })
    }

    async fn fetch_account_info(&self) -> Result<AccountInfo, EdgeRunnerError> {
        self.ensure_session()?;

        let resp = self.http.get(self.url(BALANCE_PATH)).send().await?;
        let status = resp.status();
        if let Some(err) = self.auth_failure(status, resp.url()) {
            return Err(err);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EdgeRunnerError::Network(format!(
                "BetKing balance error {status}: {body}"
            )));
        }

        let value: serde_json::Value = resp.json().await?;
        let balance = parse_balance(&value)
            .ok_or_else(|| EdgeRunnerError::Parse("no balance in account response".into()))?;
        Ok(AccountInfo { balance })
    }

    async fn authenticate(&self, credentials: &Credentials) -> AuthOutcome {
        info!(username = %credentials.username, "Signing in to BetKing...");
        self.clear_session();

        let form = [
            ("__rvfInternalFormId", "signIn"),
            ("anonymousId", ""),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.expose_secret().as_str()),
            ("location", "/"),
            ("action", ""),
        ];

        let resp = match self.http.post(self.url(LOGIN_PATH)).form(&form).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "BetKing sign-in request failed");
                return AuthOutcome::failed(format!("sign-in request failed: {e}"));
            }
        };

        if !resp.status().is_success() && !resp.status().is_redirection() {
            let status = resp.status();
            return AuthOutcome::failed(format!("sign-in rejected with status {status}"));
        }

        let expires_at = resp
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE)
            .and_then(|c| c.expires())
            .map(DateTime::<Utc>::from);

        if !self.has_session_cookie() {
            warn!(username = %credentials.username, "BetKing sign-in returned no session cookie");
            return AuthOutcome::failed("login failed: no session cookie issued");
        }

        self.set_session(SessionState {
            signed_in: true,
            expires_at,
        });
        info!(
            username = %credentials.username,
            expires_at = ?expires_at,
            "BetKing sign-in successful"
        );
        AuthOutcome::ok()
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// URL slug for an event name: `"Barrow & Bolton"` → `"barrow-and-bolton"`.
pub fn event_slug(name: &str) -> String {
    let lowered = name.to_lowercase().replace(" & ", " and ");
    let kept: String = lowered
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();
    let dashed: String = kept.split_whitespace().collect::<Vec<_>>().join("-");
    dashed
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// The search feed returns a bare array, or wraps it in `matches`/`results`.
/// Entries that don't decode are skipped.
pub fn parse_search_hits(value: serde_json::Value) -> Vec<EventSearchHit> {
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut obj) => match obj
            .remove("matches")
            .or_else(|| obj.remove("results"))
        {
            Some(serde_json::Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<EventSearchHit>(item) {
            Ok(hit) => Some(hit),
            Err(e) => {
                debug!(error = %e, "Skipping undecodable search hit");
                None
            }
        })
        .collect()
}

/// Extract the event from the prematch page's embedded Remix context and
/// check it is the event that was asked for.
pub fn parse_match_details(html: &str, expected_id: &str) -> Result<MatchDetails, EdgeRunnerError> {
    let marker = html
        .find(REMIX_CONTEXT_MARKER)
        .ok_or_else(|| EdgeRunnerError::Parse("page has no __remixContext".into()))?;
    let context = first_json_object(&html[marker..])?;
    let event = context
        .pointer("/state/loaderData")
        .and_then(|data| data.get(DETAILS_ROUTE_KEY))
        .and_then(|route| route.get("event"))
        .cloned()
        .ok_or_else(|| EdgeRunnerError::Parse("event missing from loader data".into()))?;

    let details: MatchDetails = serde_json::from_value(event)?;
    if details.id != expected_id {
        return Err(EdgeRunnerError::Parse(format!(
            "event id mismatch: asked for {expected_id}, page has {}",
            details.id
        )));
    }
    Ok(details)
}

/// Decode the first JSON object in `text`; anything after it is ignored.
fn first_json_object(text: &str) -> Result<serde_json::Value, EdgeRunnerError> {
    let start = text
        .find('{')
        .ok_or_else(|| EdgeRunnerError::Parse("__remixContext has no object".into()))?;
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<serde_json::Value>()
        .next()
        .ok_or_else(|| EdgeRunnerError::Parse("__remixContext object is empty".into()))?
        .map_err(|e| EdgeRunnerError::Parse(format!("__remixContext: {e}")))
}

/// `responseStatus == 1` and an empty/absent `errorsList` means accepted.
pub fn interpret_place_bet_response(value: &serde_json::Value) -> Result<String, EdgeRunnerError> {
    let status = value.get("responseStatus").and_then(|v| v.as_i64());
    let errors = value
        .get("errorsList")
        .filter(|e| !e.is_null() && e.as_array().map_or(true, |a| !a.is_empty()));

    if status != Some(1) || errors.is_some() {
        let detail = errors
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown reason".to_string());
        return Err(EdgeRunnerError::Rejected(format!(
            "status {}, errors: {detail}",
            status.map(|s| s.to_string()).unwrap_or_else(|| "missing".into())
        )));
    }

    let reference = ["couponCode", "betId", "ticketId"]
        .iter()
        .find_map(|k| value.get(*k))
        .and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    Ok(reference)
}

/// Balance as a number or numeric string under a few known keys.
fn parse_balance(value: &serde_json::Value) -> Option<Decimal> {
    let candidates = ["/balance", "/availableBalance", "/user/balance", "/data/balance"];
    candidates.iter().find_map(|p| match value.pointer(p)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .and_then(Decimal::from_f64)
            .map(|d| d.round_dp(2)),
        serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    })
}

fn build_payload(
    details: &MatchDetails,
    candidate: &ValueBetCandidate,
    stake: Decimal,
    alert: &AlertNotification,
) -> Result<WagerPayload, EdgeRunnerError> {
    if stake <= Decimal::ZERO {
        return Err(EdgeRunnerError::Validation(format!("stake must be positive, got {stake}")));
    }
    if candidate.venue_odds <= 1.0 {
        return Err(EdgeRunnerError::Validation(format!(
            "odds must be > 1, got {}",
            candidate.venue_odds
        )));
    }

    let body = serde_json::json!({
        "eventId": details.id,
        "eventName": details.name,
        "sportId": alert.sport.provider_id(),
        "marketId": candidate.market.id,
        "marketName": candidate.market.name,
        "specialValue": candidate.market.special_value,
        "selectionId": candidate.selection.id,
        "selectionName": candidate.selection.name,
        "odds": candidate.venue_odds,
        "stake": stake.to_f64().unwrap_or(0.0),
        "acceptOddsChanges": false,
    });

    Ok(WagerPayload {
        stake,
        odds: candidate.venue_odds,
        body,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
