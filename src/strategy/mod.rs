//! Strategy engine: de-vigging, value detection, and stake sizing.

pub mod devig;
pub mod edge;
pub mod kelly;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{
    AlertNotification, MatchDetails, StakeDecision, TranslatedQuery, ValueBetCandidate,
};
use edge::{EvaluatorConfig, ValueEvaluator};
use kelly::{StakeConfig, StakeSizer};

// ---------------------------------------------------------------------------
// Runtime settings
// ---------------------------------------------------------------------------

/// The subset of strategy parameters that can change while an instance runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySettings {
    pub fixed_stake_enabled: bool,
    pub fixed_stake: Decimal,
    pub stake_fraction: f64,
    pub min_value_pct: f64,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Outcome of evaluating one alert against its venue event.
#[derive(Debug, Clone)]
pub enum Decision {
    /// No selection cleared the edge threshold.
    NoValue,
    /// Value found but the sizer returned zero.
    ZeroStake { candidate: ValueBetCandidate },
    /// Value found and sized.
    Bet {
        candidate: ValueBetCandidate,
        stake: StakeDecision,
    },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Value evaluation → stake sizing for a single alert.
pub struct Strategy {
    evaluator: ValueEvaluator,
    sizer: StakeSizer,
}

impl Strategy {
    pub fn new(evaluator: EvaluatorConfig, sizer: StakeConfig) -> Self {
        Self {
            evaluator: ValueEvaluator::new(evaluator),
            sizer: StakeSizer::new(sizer),
        }
    }

    pub fn evaluator(&self) -> &ValueEvaluator {
        &self.evaluator
    }

    pub fn sizer(&self) -> &StakeSizer {
        &self.sizer
    }

    pub fn settings(&self) -> StrategySettings {
        let stake = self.sizer.config();
        StrategySettings {
            fixed_stake_enabled: stake.fixed_enabled,
            fixed_stake: stake.fixed_stake,
            stake_fraction: stake.stake_fraction,
            min_value_pct: self.evaluator.config().min_value_pct,
        }
    }

    pub fn apply_settings(&mut self, settings: &StrategySettings) {
        self.sizer.set_config(StakeConfig {
            fixed_enabled: settings.fixed_stake_enabled,
            fixed_stake: settings.fixed_stake,
            stake_fraction: settings.stake_fraction,
        });
        self.evaluator.set_min_value_pct(settings.min_value_pct);
        info!(
            fixed = settings.fixed_stake_enabled,
            fixed_stake = %settings.fixed_stake,
            stake_fraction = settings.stake_fraction,
            min_value_pct = settings.min_value_pct,
            "Strategy settings updated"
        );
    }

    /// Evaluate the venue event for `alert` and size any value found.
    pub fn decide(
        &self,
        details: &MatchDetails,
        alert: &AlertNotification,
        query: &TranslatedQuery,
        bankroll: Decimal,
    ) -> Decision {
        let Some(candidate) = self.evaluator.evaluate(details, alert, query) else {
            return Decision::NoValue;
        };

        let stake = self
            .sizer
            .size(bankroll, candidate.venue_odds, candidate.reference_odds);

        if !stake.is_bet() {
            debug!(candidate = %candidate, "Stake sized to zero");
            return Decision::ZeroStake { candidate };
        }

        Decision::Bet { candidate, stake }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
