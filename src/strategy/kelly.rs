//! Stake sizing.
//!
//! Either a fixed stake or a fractional-Kelly stake computed from the
//! venue price and the fair price. Amounts are truncated (not rounded) to
//! two decimal places.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::{StakeDecision, StakeMode};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Stake sizing configuration.
#[derive(Debug, Clone)]
pub struct StakeConfig {
    /// Use `fixed_stake` instead of Kelly.
    pub fixed_enabled: bool,
    pub fixed_stake: Decimal,
    /// Fractional Kelly multiplier (0.1 = tenth-Kelly).
    pub stake_fraction: f64,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            fixed_enabled: true,
            fixed_stake: dec!(10), // currency units
            stake_fraction: 0.1,   // tenth-Kelly
        }
    }
}

// ---------------------------------------------------------------------------
// Stake sizer
// ---------------------------------------------------------------------------

pub struct StakeSizer {
    config: StakeConfig,
}

impl StakeSizer {
    pub fn new(config: StakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StakeConfig {
        &self.config
    }

    /// Replace the sizing parameters (runtime settings update).
    pub fn set_config(&mut self, config: StakeConfig) {
        self.config = config;
    }

    /// Decide the stake for a bet at `venue_odds` whose fair price is
    /// `fair_odds`. A zero amount means "do not bet".
    pub fn size(&self, bankroll: Decimal, venue_odds: f64, fair_odds: f64) -> StakeDecision {
        if self.config.fixed_enabled {
            return StakeDecision {
                amount: self.config.fixed_stake.max(Decimal::ZERO),
                mode: StakeMode::Fixed,
            };
        }
        self.kelly(bankroll, venue_odds, fair_odds)
    }

    /// Kelly: f* = (b·p − q) / b, with b = odds − 1, p = 1/fair, q = 1 − p.
    fn kelly(&self, bankroll: Decimal, venue_odds: f64, fair_odds: f64) -> StakeDecision {
        let none = StakeDecision::none(StakeMode::Kelly);

        if bankroll <= Decimal::ZERO || venue_odds <= 1.0 || fair_odds <= 1.0 {
            return none;
        }

        let b = venue_odds - 1.0;
        let p = 1.0 / fair_odds;
        let q = 1.0 - p;
        let numerator = b * p - q;

        if numerator <= 0.0 {
            debug!(venue_odds, fair_odds, numerator, "Negative Kelly, no bet");
            return none;
        }

        let fraction = numerator / b * self.config.stake_fraction;
        let Some(fraction) = Decimal::from_f64(fraction) else {
            return none;
        };

        let amount = (bankroll * fraction).round_dp_with_strategy(2, RoundingStrategy::ToZero);

        debug!(
            raw_kelly = format!("{:.2}%", numerator / b * 100.0),
            fraction = self.config.stake_fraction,
            bankroll = %bankroll,
            stake = %amount,
            "Bet sized"
        );

        StakeDecision {
            amount: amount.max(Decimal::ZERO),
            mode: StakeMode::Kelly,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn kelly_sizer(fraction: f64) -> StakeSizer {
        StakeSizer::new(StakeConfig {
            fixed_enabled: false,
            stake_fraction: fraction,
            ..Default::default()
        })
    }

    #[test]
    fn test_kelly_worked_example() {
        // fair 2.20, venue 2.50, bankroll 1000, tenth-Kelly → 9.09
        let decision = kelly_sizer(0.10).size(dec!(1000), 2.50, 2.20);
        assert_eq!(decision.mode, StakeMode::Kelly);
        assert_eq!(decision.amount, dec!(9.09));
    }

    #[test]
    fn test_kelly_truncates_not_rounds() {
        // Full Kelly on the same example is 90.909..., truncated to 90.90.
        let decision = kelly_sizer(1.0).size(dec!(1000), 2.50, 2.20);
        assert_eq!(decision.amount, dec!(90.90));
    }

    #[test]
    fn test_kelly_no_edge_is_zero() {
        // Venue price below fair price: negative numerator.
        let decision = kelly_sizer(0.1).size(dec!(1000), 2.0, 2.2);
        assert!(!decision.is_bet());
        assert_eq!(decision.amount, Decimal::ZERO);
    }

    #[test]
    fn test_kelly_break_even_is_zero() {
        let decision = kelly_sizer(0.1).size(dec!(1000), 2.0, 2.0);
        assert!(!decision.is_bet());
    }

    #[test]
    fn test_kelly_zero_bankroll() {
        let decision = kelly_sizer(0.1).size(Decimal::ZERO, 2.5, 2.2);
        assert!(!decision.is_bet());
    }

    #[test]
    fn test_fixed_mode_ignores_prices() {
        let sizer = StakeSizer::new(StakeConfig {
            fixed_enabled: true,
            fixed_stake: dec!(25),
            stake_fraction: 0.1,
        });
        let decision = sizer.size(dec!(1000), 2.0, 2.5);
        assert_eq!(decision.mode, StakeMode::Fixed);
        assert_eq!(decision.amount, dec!(25));
    }

    #[test]
    fn test_set_config_switches_mode() {
        let mut sizer = StakeSizer::new(StakeConfig::default());
        assert_eq!(sizer.size(dec!(1000), 2.5, 2.2).mode, StakeMode::Fixed);
        sizer.set_config(StakeConfig {
            fixed_enabled: false,
            ..StakeConfig::default()
        });
        assert_eq!(sizer.size(dec!(1000), 2.5, 2.2).amount, dec!(9.09));
    }
}
