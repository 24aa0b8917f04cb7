//! Reward-per-credit accumulator
//!
//! Distributes income to a changing set of credit holders in O(1) per
//! distribution. Each holder keeps a snapshot of the accumulator taken at
//! its last interaction; the difference times its credit is what it has
//! earned since. Any credit change harvests first, so a holder never earns
//! income that arrived before its credit existed.

use std::collections::BTreeMap;

use aegis_common::error::MathError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fixed-point scale of `reward_per_credit` (1e12)
pub const REWARD_SCALE: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

/// Per-holder position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPosition {
    pub credit: Decimal,
    /// Accumulator value at the last harvest
    pub reward_debt: Decimal,
}

/// Generic reward-debt ledger keyed by holder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "K: Ord + Serialize",
    deserialize = "K: Ord + Deserialize<'de>"
))]
pub struct RewardAccumulator<K> {
    total_credit: Decimal,
    /// Monotonic, scaled by [`REWARD_SCALE`]
    reward_per_credit: Decimal,
    positions: BTreeMap<K, CreditPosition>,
    /// Income that arrived while no credit existed
    unattributed: Decimal,
}

impl<K: Ord> Default for RewardAccumulator<K> {
    fn default() -> Self {
        Self {
            total_credit: Decimal::ZERO,
            reward_per_credit: Decimal::ZERO,
            positions: BTreeMap::new(),
            unattributed: Decimal::ZERO,
        }
    }
}

impl<K: Ord + Clone> RewardAccumulator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_credit(&self) -> Decimal {
        self.total_credit
    }

    pub fn reward_per_credit(&self) -> Decimal {
        self.reward_per_credit
    }

    pub fn unattributed(&self) -> Decimal {
        self.unattributed
    }

    pub fn credit_of(&self, holder: &K) -> Decimal {
        self.positions
            .get(holder)
            .map_or(Decimal::ZERO, |p| p.credit)
    }

    pub fn position(&self, holder: &K) -> Option<&CreditPosition> {
        self.positions.get(holder)
    }

    /// Holders with a non-zero credit, in key order
    pub fn holders(&self) -> impl Iterator<Item = (&K, &CreditPosition)> {
        self.positions.iter().filter(|(_, p)| !p.credit.is_zero())
    }

    /// Income earned by `holder` since its last harvest, rounded down
    pub fn pending(&self, holder: &K) -> Decimal {
        match self.positions.get(holder) {
            Some(p) if !p.credit.is_zero() => {
                let delta = self.reward_per_credit - p.reward_debt;
                (p.credit * delta / REWARD_SCALE).floor()
            }
            _ => Decimal::ZERO,
        }
    }

    /// Spread `amount` over the current credit.
    ///
    /// Returns `false` when no credit exists; the amount is then kept as
    /// unattributed surplus.
    pub fn distribute(&mut self, amount: Decimal) -> Result<bool, MathError> {
        if amount.is_zero() {
            return Ok(true);
        }
        if self.total_credit.is_zero() {
            self.unattributed += amount;
            return Ok(false);
        }
        let increment = amount
            .checked_mul(REWARD_SCALE)
            .ok_or(MathError::Overflow)?
            .checked_div(self.total_credit)
            .ok_or(MathError::Overflow)?
            .floor();
        self.reward_per_credit += increment;
        Ok(true)
    }

    /// Collect pending income and reset the snapshot
    pub fn harvest(&mut self, holder: &K) -> Decimal {
        let pending = self.pending(holder);
        if let Some(p) = self.positions.get_mut(holder) {
            p.reward_debt = self.reward_per_credit;
        }
        pending
    }

    /// Harvest, then add `amount` of credit. Returns the harvested income.
    pub fn deposit(&mut self, holder: &K, amount: Decimal) -> Decimal {
        let pending = self.harvest(holder);
        let rpc = self.reward_per_credit;
        let position = self
            .positions
            .entry(holder.clone())
            .or_insert(CreditPosition {
                credit: Decimal::ZERO,
                reward_debt: rpc,
            });
        position.credit += amount;
        self.total_credit += amount;
        pending
    }

    /// Harvest, then remove `amount` of credit. Returns the harvested income.
    pub fn withdraw(&mut self, holder: &K, amount: Decimal) -> Result<Decimal, MathError> {
        if self.credit_of(holder) < amount {
            return Err(MathError::Underflow);
        }
        let pending = self.harvest(holder);
        if let Some(p) = self.positions.get_mut(holder) {
            p.credit -= amount;
            if p.credit.is_zero() {
                self.positions.remove(holder);
            }
        }
        self.total_credit -= amount;
        Ok(pending)
    }

    /// Hand the unattributed surplus to the caller
    pub fn take_unattributed(&mut self) -> Decimal {
        std::mem::take(&mut self.unattributed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reward_scale() {
        assert_eq!(REWARD_SCALE, dec!(1000000000000));
    }

    #[test]
    fn test_single_holder_gets_everything() {
        let mut acc = RewardAccumulator::new();
        acc.deposit(&"a", dec!(1000));
        acc.distribute(dec!(50)).unwrap();

        assert_eq!(acc.pending(&"a"), dec!(50));
        assert_eq!(acc.harvest(&"a"), dec!(50));
        assert_eq!(acc.pending(&"a"), Decimal::ZERO);
    }

    #[test]
    fn test_late_holder_does_not_earn_past_income() {
        let mut acc = RewardAccumulator::new();
        acc.deposit(&"early", dec!(1000));
        acc.distribute(dec!(100)).unwrap();

        acc.deposit(&"late", dec!(1000));
        assert_eq!(acc.pending(&"late"), Decimal::ZERO);

        acc.distribute(dec!(100)).unwrap();
        assert_eq!(acc.pending(&"early"), dec!(150));
        assert_eq!(acc.pending(&"late"), dec!(50));
    }

    #[test]
    fn test_deposit_harvests_first() {
        let mut acc = RewardAccumulator::new();
        acc.deposit(&"a", dec!(100));
        acc.distribute(dec!(10)).unwrap();

        let harvested = acc.deposit(&"a", dec!(100));
        assert_eq!(harvested, dec!(10));
        assert_eq!(acc.credit_of(&"a"), dec!(200));
        assert_eq!(acc.pending(&"a"), Decimal::ZERO);
    }

    #[test]
    fn test_withdraw_more_than_credit() {
        let mut acc = RewardAccumulator::new();
        acc.deposit(&"a", dec!(100));
        assert_eq!(acc.withdraw(&"a", dec!(101)), Err(MathError::Underflow));
        assert_eq!(acc.withdraw(&"a", dec!(100)), Ok(Decimal::ZERO));
        assert_eq!(acc.total_credit(), Decimal::ZERO);
        assert_eq!(acc.holders().count(), 0);
    }

    #[test]
    fn test_income_without_credit_is_held() {
        let mut acc: RewardAccumulator<&str> = RewardAccumulator::new();
        assert!(!acc.distribute(dec!(7)).unwrap());
        assert_eq!(acc.unattributed(), dec!(7));
        assert_eq!(acc.take_unattributed(), dec!(7));
        assert_eq!(acc.unattributed(), Decimal::ZERO);
    }

    #[test]
    fn test_pending_never_exceeds_distributed() {
        let mut acc = RewardAccumulator::new();
        acc.deposit(&"a", dec!(3));
        acc.deposit(&"b", dec!(3));
        acc.deposit(&"c", dec!(3));
        acc.distribute(dec!(10)).unwrap();

        let total: Decimal = ["a", "b", "c"].iter().map(|h| acc.pending(h)).sum();
        assert!(total <= dec!(10));
        assert!(total >= dec!(8));
    }
}
