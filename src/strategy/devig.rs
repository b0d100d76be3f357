//! De-vigging: vig-inclusive odds → fair odds.
//!
//! Three methods are supported. All of them are pure: identical inputs
//! always give identical outputs, and invalid inputs give `None` rather
//! than an error so the pipeline stays total.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Lower bound of the power-method exponent search.
const POWER_K_MIN: f64 = 1.0;
/// Upper bound of the power-method exponent search.
const POWER_K_MAX: f64 = 4.0;
const POWER_TOLERANCE: f64 = 1e-7;
const POWER_MAX_ITERATIONS: usize = 100;

/// Margin-removal method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DevigMethod {
    Multiplicative,
    Additive,
    #[default]
    Power,
}

/// The method that actually produced a result. Differs from the requested
/// method when additive falls back, or when the market carries no margin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AppliedMethod {
    Multiplicative,
    Additive,
    /// Additive produced a non-positive probability.
    AdditiveFallback,
    Power,
    /// Total implied probability ≤ 1, raw odds returned unchanged.
    NoMargin,
}

impl fmt::Display for AppliedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppliedMethod::Multiplicative => write!(f, "multiplicative"),
            AppliedMethod::Additive => write!(f, "additive"),
            AppliedMethod::AdditiveFallback => write!(f, "additive->multiplicative"),
            AppliedMethod::Power => write!(f, "power"),
            AppliedMethod::NoMargin => write!(f, "none (no margin)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DevigResult {
    /// Fair odds, same order as the input.
    pub fair_odds: Vec<f64>,
    pub applied: AppliedMethod,
}

/// Remove the margin from `odds` using `method`.
///
/// Returns `None` for fewer than two odds or any odd that is not a finite
/// number strictly greater than 1.
pub fn devig(odds: &[f64], method: DevigMethod) -> Option<Vec<f64>> {
    devig_detailed(odds, method).map(|r| r.fair_odds)
}

/// Same as [`devig`], also reporting which method actually ran.
pub fn devig_detailed(odds: &[f64], method: DevigMethod) -> Option<DevigResult> {
    if odds.len() < 2 || odds.iter().any(|o| !o.is_finite() || *o <= 1.0) {
        debug!(?odds, "Devig rejected: need at least two odds, each > 1");
        return None;
    }

    let implied: Vec<f64> = odds.iter().map(|o| 1.0 / o).collect();
    let total: f64 = implied.iter().sum();

    if total <= 1.0 {
        return Some(DevigResult {
            fair_odds: odds.to_vec(),
            applied: AppliedMethod::NoMargin,
        });
    }

    let (probs, applied) = match method {
        DevigMethod::Multiplicative => (multiplicative(&implied, total), AppliedMethod::Multiplicative),
        DevigMethod::Additive => match additive(&implied, total) {
            Some(p) => (p, AppliedMethod::Additive),
            None => {
                debug!(total, "Additive devig went non-positive, using multiplicative");
                (multiplicative(&implied, total), AppliedMethod::AdditiveFallback)
            }
        },
        DevigMethod::Power => (power(&implied), AppliedMethod::Power),
    };

    Some(DevigResult {
        fair_odds: probs.iter().map(|p| 1.0 / p).collect(),
        applied,
    })
}

fn multiplicative(implied: &[f64], total: f64) -> Vec<f64> {
    implied.iter().map(|p| p / total).collect()
}

fn additive(implied: &[f64], total: f64) -> Option<Vec<f64>> {
    let share = (total - 1.0) / implied.len() as f64;
    let probs: Vec<f64> = implied.iter().map(|p| p - share).collect();
    if probs.iter().any(|p| *p <= 0.0) {
        None
    } else {
        Some(probs)
    }
}

/// Binary search k in [1, 4] so that Σ p_i^k ≈ 1, then renormalize.
fn power(implied: &[f64]) -> Vec<f64> {
    let k = solve_power_exponent(implied);
    let raised: Vec<f64> = implied.iter().map(|p| p.powf(k)).collect();
    let sum: f64 = raised.iter().sum();
    raised.iter().map(|p| p / sum).collect()
}

fn solve_power_exponent(implied: &[f64]) -> f64 {
    let mut low = POWER_K_MIN;
    let mut high = POWER_K_MAX;
    let mut k = (low + high) / 2.0;

    for _ in 0..POWER_MAX_ITERATIONS {
        k = (low + high) / 2.0;
        let sum: f64 = implied.iter().map(|p| p.powf(k)).sum();
        if (sum - 1.0).abs() < POWER_TOLERANCE {
            break;
        }
        // Probabilities are < 1, so the sum falls as k grows.
        if sum > 1.0 {
            low = k;
        } else {
            high = k;
        }
    }
    k
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
