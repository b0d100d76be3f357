//! Value detection.
//!
//! Compares the provider's fair (de-vigged) price against the venue's live
//! price for the translated selection and decides whether the edge clears
//! the configured minimum.

use tracing::debug;

use super::devig::{devig_detailed, DevigMethod};
use crate::types::{
    AlertNotification, LineType, MatchDetails, PriceSource, TranslatedQuery, ValueBetCandidate,
    VenueMarket,
};

// ---------------------------------------------------------------------------
// Configuration (defaults, overridden by config.toml at runtime)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Edge must strictly exceed this percentage.
    pub min_value_pct: f64,
    /// Venue odds window. `None` disables the bound.
    pub min_odds: Option<f64>,
    pub max_odds: Option<f64>,
    pub devig_method: DevigMethod,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            min_value_pct: 6.0,
            min_odds: Some(1.45),
            max_odds: Some(4.00),
            devig_method: DevigMethod::Power,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Reference price for an alert's outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferencePrice {
    pub odds: f64,
    pub source: PriceSource,
}

pub struct ValueEvaluator {
    config: EvaluatorConfig,
}

impl ValueEvaluator {
    pub fn new(config: EvaluatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn set_min_value_pct(&mut self, pct: f64) {
        self.config.min_value_pct = pct;
    }

    /// De-vigged price for the alerted outcome, falling back to the raw
    /// provider price when the market can't be de-vigged.
    pub fn reference_price(&self, alert: &AlertNotification) -> Option<ReferencePrice> {
        if let Some(prices) = alert.market_prices() {
            let odds: Vec<f64> = prices.iter().map(|(_, p)| *p).collect();
            if let Some(result) = devig_detailed(&odds, self.config.devig_method) {
                let fair = prices
                    .iter()
                    .position(|(o, _)| *o == alert.outcome)
                    .map(|idx| result.fair_odds[idx]);
                if let Some(fair) = fair {
                    debug!(
                        alert_id = %alert.id,
                        method = %result.applied,
                        raw = ?odds,
                        fair = format!("{fair:.3}"),
                        "De-vigged provider prices"
                    );
                    return Some(ReferencePrice {
                        odds: fair,
                        source: PriceSource::NoVig,
                    });
                }
            }
        }

        alert
            .price_for(alert.outcome)
            .filter(|p| *p > 1.0)
            .map(|odds| ReferencePrice {
                odds,
                source: PriceSource::Raw,
            })
    }

    /// Scan the venue markets for the first selection that matches the
    /// translated query and clears the edge threshold.
    ///
    /// Markets and selections are scanned in list order; the first
    /// qualifying selection wins, not the best one.
    pub fn evaluate(
        &self,
        details: &MatchDetails,
        alert: &AlertNotification,
        query: &TranslatedQuery,
    ) -> Option<ValueBetCandidate> {
        let Some(reference) = self.reference_price(alert) else {
            debug!(alert_id = %alert.id, "No usable reference price");
            return None;
        };

        for market in details.all_markets() {
            if !market_matches(alert.line_type, market, query) {
                continue;
            }

            for selection in &market.selections {
                if !selection.is_valid()
                    || !selection.name.eq_ignore_ascii_case(&query.selection_name)
                {
                    continue;
                }

                let venue_odds = selection.price();
                if !self.within_odds_window(venue_odds) {
                    debug!(
                        market = %market.name,
                        selection = %selection.name,
                        venue_odds,
                        "Venue odds outside configured window"
                    );
                    continue;
                }

                let edge_pct = edge_percent(venue_odds, reference.odds);
                debug!(
                    market = %market.name,
                    selection = %selection.name,
                    venue_odds,
                    reference = format!("{:.3}", reference.odds),
                    edge = format!("{edge_pct:.2}%"),
                    "Selection evaluated"
                );

                if edge_pct > self.config.min_value_pct {
                    return Some(ValueBetCandidate {
                        market: market.clone(),
                        selection: selection.clone(),
                        reference_odds: reference.odds,
                        venue_odds,
                        edge_pct,
                        price_source: reference.source,
                    });
                }
            }
        }

        None
    }

    fn within_odds_window(&self, odds: f64) -> bool {
        self.config.min_odds.map_or(true, |min| odds >= min)
            && self.config.max_odds.map_or(true, |max| odds <= max)
    }
}

/// (venue / reference − 1) × 100.
pub fn edge_percent(venue_odds: f64, reference_odds: f64) -> f64 {
    (venue_odds / reference_odds - 1.0) * 100.0
}

// ---------------------------------------------------------------------------
// Market matching rules
// ---------------------------------------------------------------------------

fn market_matches(line_type: LineType, market: &VenueMarket, query: &TranslatedQuery) -> bool {
    let name = market.name.to_lowercase();
    match line_type {
        LineType::MoneyLine => name.starts_with(&query.market_name.to_lowercase()),
        LineType::Total => {
            let base = strip_trailing_number(&query.market_name).to_lowercase();
            name.starts_with(&base) && total_line_matches(market, query)
        }
        LineType::Spread => {
            name.starts_with(&query.market_name.to_lowercase())
                && special_values_match(market.special_value.as_deref(), query.special_value.as_deref())
        }
    }
}

/// Integer points also accept the half-point line above.
fn total_line_matches(market: &VenueMarket, query: &TranslatedQuery) -> bool {
    let Some(points) = query
        .source_point
        .or_else(|| query.special_value.as_deref().and_then(|s| s.trim().parse().ok()))
    else {
        return false;
    };
    let Some(line) = market
        .special_value
        .as_deref()
        .and_then(|s| s.trim().parse::<f64>().ok())
    else {
        return false;
    };

    if approx_eq(line, points) {
        return true;
    }
    points.fract() == 0.0 && approx_eq(line, points + 0.5)
}

/// Whitespace-insensitive comparison. A market without a special value
/// counts as `"0"` (DNB / double chance lines).
fn special_values_match(market: Option<&str>, query: Option<&str>) -> bool {
    let normalize = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    let market = market.map(normalize).unwrap_or_else(|| "0".to_string());
    let query = query.map(normalize).unwrap_or_else(|| "0".to_string());
    market == query
}

/// `"Total Goals 2.5"` → `"Total Goals"`.
fn strip_trailing_number(name: &str) -> &str {
    match name.trim_end().rsplit_once(' ') {
        Some((head, tail)) if tail.parse::<f64>().is_ok() => head.trim_end(),
        _ => name.trim_end(),
    }
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
