//! Staking reward calculation

use strata_core::{Amount, RewardConfig};

/// Strategy for computing the reward owed to a staker
pub trait RewardCalculator: Send + Sync {
    /// Reward for staking `staked_amount` for `staked_duration_secs` while the
    /// chain supply is `current_supply`. Never exceeds the remaining supply.
    fn calculate(
        &self,
        staked_duration_secs: u64,
        staked_amount: Amount,
        current_supply: Amount,
    ) -> Amount;
}

/// Supply-cap based calculator.
///
/// The consumption rate grows linearly with the staking duration from
/// `min_consumption_rate` to `max_consumption_rate` over one minting period,
/// and is applied to the supply still mintable under the cap, scaled by the
/// staker's share of the current supply.
#[derive(Debug, Clone)]
pub struct Calculator {
    config: RewardConfig,
}

impl Calculator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }
}

impl RewardCalculator for Calculator {
    fn calculate(
        &self,
        staked_duration_secs: u64,
        staked_amount: Amount,
        current_supply: Amount,
    ) -> Amount {
        let remaining = self.config.supply_cap.0.saturating_sub(current_supply.0);
        let period = self.config.minting_period_secs as u128;
        if remaining == 0 || current_supply.0 == 0 || period == 0 {
            return Amount::ZERO;
        }

        let duration = staked_duration_secs as u128;
        let max_rate = self.config.max_consumption_rate as u128;
        let min_rate = self.config.min_consumption_rate as u128;
        let rate = min_rate + max_rate.saturating_sub(min_rate) * duration / period;

        let reward = (remaining as u128)
            .checked_mul(staked_amount.0 as u128)
            .map(|r| r / current_supply.0 as u128)
            .and_then(|r| r.checked_mul(rate))
            .map(|r| r / RewardConfig::PERCENT_DENOMINATOR as u128)
            .and_then(|r| r.checked_mul(duration))
            .map(|r| r / period);

        match reward {
            Some(r) if r < remaining as u128 => Amount::new(r as u64),
            _ => Amount::new(remaining),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: u64 = 365 * 24 * 60 * 60;

    fn calculator(cap_units: u64) -> Calculator {
        Calculator::new(RewardConfig {
            max_consumption_rate: 120_000,
            min_consumption_rate: 100_000,
            minting_period_secs: YEAR,
            supply_cap: Amount::from_units(cap_units),
        })
    }

    #[test]
    fn test_full_period_reward() {
        let calc = calculator(720_000_000);
        let reward = calc.calculate(
            YEAR,
            Amount::from_units(2_000),
            Amount::from_units(360_000_000),
        );
        // 2000 / 360M of the 360M remaining at 12%
        assert_eq!(reward, Amount::from_units(240));
    }

    #[test]
    fn test_shorter_stake_earns_less() {
        let calc = calculator(720_000_000);
        let supply = Amount::from_units(360_000_000);
        let stake = Amount::from_units(2_000);
        let half = calc.calculate(YEAR / 2, stake, supply);
        let full = calc.calculate(YEAR, stake, supply);
        assert!(half < full);
        assert!(half > Amount::ZERO);
    }

    #[test]
    fn test_no_reward_at_cap() {
        let calc = calculator(1);
        let reward = calc.calculate(YEAR, Amount::new(100), Amount::from_units(1));
        assert_eq!(reward, Amount::ZERO);
    }

    #[test]
    fn test_reward_bounded_by_remaining_supply() {
        let calc = calculator(1_000);
        let supply = Amount::from_units(999);
        let reward = calc.calculate(YEAR * 100, Amount::from_units(999), supply);
        assert_eq!(reward, Amount::from_units(1));
    }

    #[test]
    fn test_zero_supply_yields_zero() {
        let calc = calculator(1_000);
        assert_eq!(calc.calculate(YEAR, Amount::new(10), Amount::ZERO), Amount::ZERO);
    }
}
