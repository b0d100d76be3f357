//! Provider line → venue market vocabulary.
//!
//! Pure and sport-aware. Every unsupported combination yields `None` so the
//! worker can skip the alert without treating it as a failure.

use tracing::debug;

use crate::types::{AlertNotification, LineType, Outcome, Sport, TranslatedQuery};

const MONEYLINE_MARKET: &str = "1x2";
const TOTAL_MARKET: &str = "Total";
const SPREAD_MARKET: &str = "Handicap";

const FOOTBALL_TOTAL: &str = "Total Goals";
const FOOTBALL_DNB: &str = "Draw No Bet";
const FOOTBALL_DOUBLE_CHANCE: &str = "Double Chance";

const BASKETBALL_TOTAL: &str = "Total (Incl. Overtime)";
const BASKETBALL_HANDICAP: &str = "Handicap (Incl. Overtime)";
const BASKETBALL_DNB: &str = "DNB RT";

/// Generic market name and selection label for a line/outcome pair.
fn base_mapping(line_type: LineType, outcome: Outcome) -> Option<(&'static str, &'static str)> {
    let label = match (line_type, outcome) {
        (LineType::MoneyLine, Outcome::Home) => "1",
        (LineType::MoneyLine, Outcome::Draw) => "x",
        (LineType::MoneyLine, Outcome::Away) => "2",
        (LineType::Total, Outcome::Over) => "Over",
        (LineType::Total, Outcome::Under) => "Under",
        (LineType::Spread, Outcome::Home) => "Home",
        (LineType::Spread, Outcome::Away) => "Away",
        _ => return None,
    };
    let market = match line_type {
        LineType::MoneyLine => MONEYLINE_MARKET,
        LineType::Total => TOTAL_MARKET,
        LineType::Spread => SPREAD_MARKET,
    };
    Some((market, label))
}

/// Translate an alert's line into the venue's market/selection names.
pub fn translate(alert: &AlertNotification) -> Option<TranslatedQuery> {
    let Some((market, label)) = base_mapping(alert.line_type, alert.outcome) else {
        debug!(alert_id = %alert.id, line = %alert.line_type, outcome = %alert.outcome, "Outcome not valid for line type");
        return None;
    };

    if alert.price_for(alert.outcome).filter(|p| *p > 0.0).is_none() {
        debug!(alert_id = %alert.id, outcome = %alert.outcome, "No usable provider price for outcome");
        return None;
    }

    let translated = match &alert.sport {
        Sport::Football => football(alert, market, label),
        Sport::Basketball => basketball(alert),
        Sport::Other(_) | Sport::Unknown => Some(TranslatedQuery {
            market_name: market.to_string(),
            selection_name: label.to_string(),
            special_value: None,
            source_point: alert.points,
        }),
    };

    match &translated {
        Some(q) => debug!(
            alert_id = %alert.id,
            sport = %alert.sport,
            market = %q.market_name,
            selection = %q.selection_name,
            special_value = q.special_value.as_deref().unwrap_or("-"),
            "Translated provider line"
        ),
        None => debug!(
            alert_id = %alert.id,
            sport = %alert.sport,
            line = %alert.line_type,
            points = ?alert.points,
            period = alert.period(),
            "Provider line not supported"
        ),
    }

    translated
}

fn football(alert: &AlertNotification, market: &str, label: &str) -> Option<TranslatedQuery> {
    match alert.line_type {
        LineType::MoneyLine => Some(TranslatedQuery {
            market_name: market.to_string(),
            selection_name: label.to_string(),
            special_value: None,
            source_point: alert.points,
        }),
        LineType::Total => {
            let points = alert.points?;
            Some(TranslatedQuery {
                market_name: format!("{FOOTBALL_TOTAL} {points}"),
                selection_name: label.to_string(),
                special_value: Some(points.to_string()),
                source_point: Some(points),
            })
        }
        LineType::Spread => football_spread(alert.outcome, alert.points?),
    }
}

fn football_spread(outcome: Outcome, points: f64) -> Option<TranslatedQuery> {
    let home = outcome == Outcome::Home;

    let (market_name, selection, special_value) = if points == 0.0 {
        (FOOTBALL_DNB.to_string(), if home { "1 DNB" } else { "2 DNB" }, "0".to_string())
    } else if points == 0.5 {
        (FOOTBALL_DOUBLE_CHANCE.to_string(), if home { "1X" } else { "X2" }, "0".to_string())
    } else if points.fract() == 0.0 {
        let n = points.abs();
        // Home side gets the points on the left; a negative line flips it.
        let special_value = match (home, points < 0.0) {
            (true, true) | (false, false) => format!("0:{n}"),
            (true, false) | (false, true) => format!("{n}:0"),
        };
        (
            format!("{SPREAD_MARKET} {points}"),
            if home { "Home" } else { "Away" },
            special_value,
        )
    } else {
        // Quarter and other fractional goal lines.
        return None;
    };

    Some(TranslatedQuery {
        market_name,
        selection_name: selection.to_string(),
        special_value: Some(special_value),
        source_point: Some(points),
    })
}

fn basketball(alert: &AlertNotification) -> Option<TranslatedQuery> {
    if !alert.is_full_game() {
        return None;
    }

    match alert.line_type {
        LineType::MoneyLine => None,
        LineType::Total => {
            let points = alert.points?;
            let label = if alert.outcome == Outcome::Over { "Over" } else { "Under" };
            Some(TranslatedQuery {
                market_name: format!("{BASKETBALL_TOTAL} {points}"),
                selection_name: label.to_string(),
                special_value: Some(points.to_string()),
                source_point: Some(points),
            })
        }
        LineType::Spread => {
            let points = alert.points?;
            let home = alert.outcome == Outcome::Home;

            if points == 0.0 {
                return Some(TranslatedQuery {
                    market_name: BASKETBALL_DNB.to_string(),
                    selection_name: if home { "1 DNB" } else { "2 DNB" }.to_string(),
                    special_value: Some("0".to_string()),
                    source_point: Some(points),
                });
            }

            let n = points.abs();
            let special_value = match (home, points < 0.0) {
                (true, true) | (false, false) => format!("0 : {n}"),
                (true, false) | (false, true) => format!("{n} : 0"),
            };
            Some(TranslatedQuery {
                market_name: format!("{BASKETBALL_HANDICAP} {points}"),
                selection_name: if home { "1 AH" } else { "2 AH" }.to_string(),
                special_value: Some(special_value),
                source_point: Some(points),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
