//! Shared types for the EDGERUNNER agent.
//!
//! These types form the data model used across all modules: provider
//! alerts, venue markets, value-bet candidates, stake decisions and the
//! domain error enum. They are kept free of I/O so the provider, bookmaker,
//! strategy and engine modules can depend on them without cycles.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Lenient field decoding
// ---------------------------------------------------------------------------

/// Ids and codes arrive as either JSON strings or numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s.trim().to_string(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
        }
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(Scalar::into_string)
}

fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?
        .map(Scalar::into_string)
        .filter(|s| !s.is_empty()))
}

/// Prices and points: numbers, numeric strings, `null` or garbage.
/// Anything that doesn't parse to a finite number is treated as absent.
fn de_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|x| x.is_finite()))
}

/// RFC 3339 strings or epoch milliseconds.
fn de_lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }))
}

// ---------------------------------------------------------------------------
// Provider alert vocabulary
// ---------------------------------------------------------------------------

/// Sport as identified by the alert provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Sport {
    /// Provider sport id `1`.
    Football,
    /// Provider sport id `3`.
    Basketball,
    /// Any other provider sport id (generic translation only).
    Other(String),
    #[default]
    Unknown,
}

impl Sport {
    pub fn from_provider_id(id: &str) -> Self {
        match id.trim() {
            "1" => Sport::Football,
            "3" => Sport::Basketball,
            "" => Sport::Unknown,
            other => Sport::Other(other.to_string()),
        }
    }

    pub fn provider_id(&self) -> &str {
        match self {
            Sport::Football => "1",
            Sport::Basketball => "3",
            Sport::Other(id) => id,
            Sport::Unknown => "",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sport::Football => write!(f, "Football"),
            Sport::Basketball => write!(f, "Basketball"),
            Sport::Other(id) => write!(f, "Sport#{id}"),
            Sport::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Serialize for Sport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.provider_id())
    }
}

impl<'de> Deserialize<'de> for Sport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = de_id(deserializer)?;
        Ok(Sport::from_provider_id(&id))
    }
}

/// Category of wager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum LineType {
    MoneyLine,
    Total,
    Spread,
}

impl LineType {
    /// Outcomes that together make up a complete market for this line.
    pub fn outcomes(&self) -> &'static [Outcome] {
        match self {
            LineType::MoneyLine => &[Outcome::Home, Outcome::Away, Outcome::Draw],
            LineType::Total => &[Outcome::Over, Outcome::Under],
            LineType::Spread => &[Outcome::Home, Outcome::Away],
        }
    }
}

impl TryFrom<String> for LineType {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim().to_lowercase().as_str() {
            "money_line" | "moneyline" => Ok(LineType::MoneyLine),
            "total" | "totals" => Ok(LineType::Total),
            "spread" | "handicap" => Ok(LineType::Spread),
            other => Err(format!("unknown line type: {other}")),
        }
    }
}

impl fmt::Display for LineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineType::MoneyLine => write!(f, "money_line"),
            LineType::Total => write!(f, "total"),
            LineType::Spread => write!(f, "spread"),
        }
    }
}

/// Provider outcome token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Outcome {
    Home,
    Away,
    Draw,
    Over,
    Under,
}

impl TryFrom<String> for Outcome {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim().to_lowercase().as_str() {
            "home" => Ok(Outcome::Home),
            "away" => Ok(Outcome::Away),
            "draw" => Ok(Outcome::Draw),
            "over" => Ok(Outcome::Over),
            "under" => Ok(Outcome::Under),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Home => write!(f, "home"),
            Outcome::Away => write!(f, "away"),
            Outcome::Draw => write!(f, "draw"),
            Outcome::Over => write!(f, "over"),
            Outcome::Under => write!(f, "under"),
        }
    }
}

// ---------------------------------------------------------------------------
// Alert notification
// ---------------------------------------------------------------------------

/// An odds-movement alert from the provider feed. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(rename = "sportId", default)]
    pub sport: Sport,
    pub line_type: LineType,
    pub outcome: Outcome,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub points: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub period_number: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub price_home: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub price_away: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub price_draw: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub price_over: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub price_under: Option<f64>,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub away: String,
    /// Scheduled kick-off / tip-off, when the feed provides it.
    #[serde(default, alias = "starts", deserialize_with = "de_lenient_datetime")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_lenient_datetime")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl AlertNotification {
    /// Raw provider price for a single outcome.
    pub fn price_for(&self, outcome: Outcome) -> Option<f64> {
        match outcome {
            Outcome::Home => self.price_home,
            Outcome::Away => self.price_away,
            Outcome::Draw => self.price_draw,
            Outcome::Over => self.price_over,
            Outcome::Under => self.price_under,
        }
    }

    /// Prices for every outcome of this line, or `None` if any is missing.
    pub fn market_prices(&self) -> Option<Vec<(Outcome, f64)>> {
        self.line_type
            .outcomes()
            .iter()
            .map(|o| self.price_for(*o).map(|p| (*o, p)))
            .collect()
    }

    /// Period code; absent means full game (`"0"`).
    pub fn period(&self) -> &str {
        self.period_number.as_deref().unwrap_or("0")
    }

    pub fn is_full_game(&self) -> bool {
        self.period() == "0"
    }

    pub fn matchup(&self) -> String {
        format!("{} vs {}", self.home, self.away)
    }

    /// Helper to build a test/sample alert with sensible defaults.
    #[cfg(test)]
    pub fn sample(line_type: LineType, outcome: Outcome) -> Self {
        AlertNotification {
            id: "alert-001".to_string(),
            sport: Sport::Football,
            line_type,
            outcome,
            points: None,
            period_number: Some("0".to_string()),
            price_home: Some(2.0),
            price_away: Some(3.5),
            price_draw: Some(3.0),
            price_over: Some(2.0),
            price_under: Some(1.8),
            home: "Barrow".to_string(),
            away: "Bolton Wanderers".to_string(),
            start_time: None,
            timestamp: None,
        }
    }
}

impl fmt::Display for AlertNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | {} {} {}",
            self.id,
            self.matchup(),
            self.line_type,
            self.outcome,
            self.points.map(|p| p.to_string()).unwrap_or_default(),
        )
    }
}

// ---------------------------------------------------------------------------
// Polling state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PollingPhase {
    #[default]
    Idle,
    Polling,
    Stopped,
}

/// Alert poller state. Mutated only by the poller's own loop; everyone
/// else sees published snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingState {
    pub phase: PollingPhase,
    pub status_message: String,
    /// Id of the last alert received. Only ever moves forward.
    pub cursor: Option<String>,
    pub last_checked: Option<DateTime<Utc>>,
    pub alerts_found: u64,
}

impl Default for PollingState {
    fn default() -> Self {
        Self {
            phase: PollingPhase::Idle,
            status_message: "Idle".to_string(),
            cursor: None,
            last_checked: None,
            alerts_found: 0,
        }
    }
}

impl PollingState {
    pub fn is_running(&self) -> bool {
        self.phase == PollingPhase::Polling
    }
}

// ---------------------------------------------------------------------------
// Venue (bookmaker) data
// ---------------------------------------------------------------------------

/// One hit from the venue's event search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSearchHit {
    #[serde(rename = "IDEvent", alias = "id", deserialize_with = "de_id")]
    pub event_id: String,
    #[serde(rename = "EventName", alias = "eventName", default)]
    pub event_name: String,
    #[serde(rename = "TeamHome", alias = "teamHome", default)]
    pub team_home: String,
    #[serde(rename = "TeamAway", alias = "teamAway", default)]
    pub team_away: String,
    #[serde(
        rename = "EventDate",
        alias = "eventDate",
        default,
        deserialize_with = "de_lenient_datetime"
    )]
    pub event_date: Option<DateTime<Utc>>,
}

/// A venue event correlated with a provider alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub event_id: String,
    pub event_name: String,
    /// Normalized venue home team.
    pub home: String,
    /// Normalized venue away team.
    pub away: String,
    /// Combined fuzzy score (0.0 = perfect).
    pub score: f64,
    /// True when provider home matched the venue's away side.
    pub swapped: bool,
}

/// Full market details for a venue event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetails {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        alias = "date",
        alias = "startDate",
        deserialize_with = "de_lenient_datetime"
    )]
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub markets: Vec<VenueMarket>,
}

impl MatchDetails {
    /// Markets in list order, with nested spread lines following their parent.
    pub fn all_markets(&self) -> Vec<&VenueMarket> {
        let mut out = Vec::with_capacity(self.markets.len());
        for market in &self.markets {
            out.push(market);
            out.extend(market.spread_markets.iter());
        }
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueMarket {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    pub special_value: Option<String>,
    #[serde(default)]
    pub selections: Vec<VenueSelection>,
    #[serde(default)]
    pub spread_markets: Vec<VenueMarket>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueSelection {
    #[serde(default, deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    pub odd: VenueOdd,
}

impl VenueSelection {
    pub fn is_valid(&self) -> bool {
        self.status.eq_ignore_ascii_case("VALID")
    }

    pub fn price(&self) -> f64 {
        self.odd.value
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VenueOdd {
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Pipeline values
// ---------------------------------------------------------------------------

/// A provider line expressed in the venue's vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatedQuery {
    pub market_name: String,
    pub selection_name: String,
    pub special_value: Option<String>,
    pub source_point: Option<f64>,
}

/// Where the reference price for an edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceSource {
    NoVig,
    Raw,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceSource::NoVig => write!(f, "No-Vig"),
            PriceSource::Raw => write!(f, "Original"),
        }
    }
}

/// A venue selection that cleared the edge threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueBetCandidate {
    pub market: VenueMarket,
    pub selection: VenueSelection,
    pub reference_odds: f64,
    pub venue_odds: f64,
    pub edge_pct: f64,
    pub price_source: PriceSource,
}

impl fmt::Display for ValueBetCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} @ {:.2} (ref {:.2} {}, edge {:.2}%)",
            self.market.name,
            self.selection.name,
            self.venue_odds,
            self.reference_odds,
            self.price_source,
            self.edge_pct,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StakeMode {
    Fixed,
    Kelly,
}

/// Stake to place. Zero means "do not bet".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StakeDecision {
    pub amount: Decimal,
    pub mode: StakeMode,
}

impl StakeDecision {
    pub fn none(mode: StakeMode) -> Self {
        Self {
            amount: Decimal::ZERO,
            mode,
        }
    }

    pub fn is_bet(&self) -> bool {
        self.amount > Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Account / session
// ---------------------------------------------------------------------------

/// Venue-specific wager body plus the numbers the core cares about.
#[derive(Debug, Clone, Serialize)]
pub struct WagerPayload {
    pub stake: Decimal,
    pub odds: f64,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WagerReceipt {
    pub reference: String,
    pub stake: Decimal,
    pub odds: f64,
    pub placed_at: DateTime<Utc>,
    pub dry_run: bool,
}

impl WagerReceipt {
    /// Create a dry-run receipt (no real execution).
    pub fn dry_run(stake: Decimal, odds: f64) -> Self {
        Self {
            reference: format!("dry-run-{}", uuid::Uuid::new_v4()),
            stake,
            odds,
            placed_at: Utc::now(),
            dry_run: true,
        }
    }
}

impl fmt::Display for WagerReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | stake={} @ {:.2}{}",
            self.reference,
            self.stake,
            self.odds,
            if self.dry_run { " [DRY RUN]" } else { "" },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub balance: Decimal,
}

/// Bookmaker login for one account instance.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub error: Option<String>,
}

impl AuthOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(reason.into()),
        }
    }
}

/// Last observed state of the bookmaker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SessionHealth {
    #[default]
    Unknown,
    Valid,
    Reauthenticated,
    AuthFailed,
}

impl fmt::Display for SessionHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionHealth::Unknown => write!(f, "unknown"),
            SessionHealth::Valid => write!(f, "valid"),
            SessionHealth::Reauthenticated => write!(f, "re-authenticated"),
            SessionHealth::AuthFailed => write!(f, "auth-failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error kinds. Only `FatalStartup` stops an instance.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EdgeRunnerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("No correlated match: {0}")]
    Resolution(String),

    #[error("Unsupported market: {0}")]
    Translation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Wager rejected: {0}")]
    Rejected(String),

    #[error("Fatal start-up error: {0}")]
    FatalStartup(String),
}

impl EdgeRunnerError {
    pub fn is_auth(&self) -> bool {
        matches!(self, EdgeRunnerError::Authentication(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, EdgeRunnerError::FatalStartup(_))
    }

    /// Transient failures: skip the item, no backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EdgeRunnerError::Network(_) | EdgeRunnerError::Timeout(_)
        )
    }
}

impl From<reqwest::Error> for EdgeRunnerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EdgeRunnerError::Timeout(e.to_string())
        } else if e.is_decode() {
            EdgeRunnerError::Parse(e.to_string())
        } else {
            EdgeRunnerError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for EdgeRunnerError {
    fn from(e: serde_json::Error) -> Self {
        EdgeRunnerError::Parse(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
