//! Rebalancing plan of an aggregator
//!
//! Pure function from the aggregator's liquidity and a snapshot of each
//! listed pool to a list of credit moves. Each pass partitions pools into:
//! 1. settling pools (reporting or payout): untouched, and their credit is
//!    taken out of the leverage budget
//! 2. paused pools: every withdrawable unit of credit is released
//! 3. trading pools: moved towards their weighted target when outside the
//!    slack band
//!
//! Targets round down; the last trading pool with a non-zero weight takes
//! the remainder. Withdrawals are planned before allocations.

use aegis_common::error::MathError;
use aegis_common::{mul_div_floor, IndexParameters, PoolId, Result};
use rust_decimal::Decimal;

/// How the aggregator may treat a pool this pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolClass {
    Trading,
    Settling,
    Paused,
}

/// State of one listed pool, as seen by the aggregator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSnapshot {
    pub pool: PoolId,
    pub alloc_point: u64,
    pub class: PoolClass,
    /// Credit the aggregator currently allocates to the pool
    pub current_credit: Decimal,
    /// Credit that can be withdrawn right now
    pub withdrawable_credit: Decimal,
    /// Room under the pool's credit ceiling, if it has one
    pub capacity: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Withdraw,
    /// Withdraw as much as the pool allows
    Release,
    Allocate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditMove {
    pub pool: PoolId,
    pub kind: MoveKind,
    pub amount: Decimal,
}

/// Outcome of a planning pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllocationPlan {
    /// Withdrawals and releases first, then allocations
    pub moves: Vec<CreditMove>,
    /// `liquidity * target_leverage`, rounded down
    pub leverage_target: Decimal,
    /// Leverage target minus settling credit, spread over trading pools
    pub trading_budget: Decimal,
}

/// Plan the moves that bring allocations back to target
pub fn plan(
    params: &IndexParameters,
    liquidity: Decimal,
    pools: &[PoolSnapshot],
) -> Result<AllocationPlan> {
    let leverage_target = liquidity
        .checked_mul(params.target_leverage)
        .ok_or(MathError::Overflow)?
        .floor();
    let settling_credit: Decimal = pools
        .iter()
        .filter(|p| p.class == PoolClass::Settling)
        .map(|p| p.current_credit)
        .sum();
    let trading_budget = (leverage_target - settling_credit).max(Decimal::ZERO);

    let targets = trading_targets(trading_budget, pools)?;
    let mut credit_after: Vec<Decimal> = pools.iter().map(|p| p.current_credit).collect();
    let mut moves = Vec::new();

    // Withdrawals and releases
    for (i, pool) in pools.iter().enumerate() {
        match pool.class {
            PoolClass::Settling => {}
            PoolClass::Paused => {
                if !pool.withdrawable_credit.is_zero() {
                    moves.push(CreditMove {
                        pool: pool.pool,
                        kind: MoveKind::Release,
                        amount: pool.withdrawable_credit,
                    });
                    credit_after[i] -= pool.withdrawable_credit;
                }
            }
            PoolClass::Trading => {
                let target = targets[i];
                let ceiling = target * (Decimal::ONE + params.upper_slack);
                if pool.current_credit > ceiling {
                    let amount = (pool.current_credit - target).min(pool.withdrawable_credit);
                    if !amount.is_zero() {
                        moves.push(CreditMove {
                            pool: pool.pool,
                            kind: MoveKind::Withdraw,
                            amount,
                        });
                        credit_after[i] -= amount;
                    }
                }
            }
        }
    }

    // Allocations, bounded by what is left of the leverage target
    let allocated: Decimal = credit_after.iter().copied().sum();
    let mut budget = (leverage_target - allocated).max(Decimal::ZERO);
    for (i, pool) in pools.iter().enumerate() {
        if pool.class != PoolClass::Trading || budget.is_zero() {
            continue;
        }
        let target = targets[i];
        let floor = target * (Decimal::ONE - params.lower_slack);
        if credit_after[i] >= floor || credit_after[i] >= target {
            continue;
        }
        let mut amount = (target - credit_after[i]).min(budget);
        if let Some(room) = pool.capacity {
            amount = amount.min(room);
        }
        if amount.is_zero() {
            continue;
        }
        moves.push(CreditMove {
            pool: pool.pool,
            kind: MoveKind::Allocate,
            amount,
        });
        credit_after[i] += amount;
        budget -= amount;
    }

    Ok(AllocationPlan {
        moves,
        leverage_target,
        trading_budget,
    })
}

/// Weighted share of `budget` for every trading pool; zero for the others
fn trading_targets(budget: Decimal, pools: &[PoolSnapshot]) -> Result<Vec<Decimal>> {
    let points: Decimal = pools
        .iter()
        .filter(|p| p.class == PoolClass::Trading)
        .map(|p| Decimal::from(p.alloc_point))
        .sum();
    let last = pools
        .iter()
        .rposition(|p| p.class == PoolClass::Trading && p.alloc_point > 0);

    let mut targets = vec![Decimal::ZERO; pools.len()];
    let Some(last) = last else {
        return Ok(targets);
    };

    let mut assigned = Decimal::ZERO;
    for (i, pool) in pools.iter().enumerate() {
        if pool.class != PoolClass::Trading || pool.alloc_point == 0 {
            continue;
        }
        let target = if i == last {
            budget - assigned
        } else {
            mul_div_floor(budget, Decimal::from(pool.alloc_point), points)?
        };
        assigned += target;
        targets[i] = target;
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn params() -> IndexParameters {
        IndexParameters {
            target_leverage: dec!(2),
            upper_slack: dec!(0.05),
            lower_slack: dec!(0.05),
            ..IndexParameters::default()
        }
    }

    fn snapshot(alloc_point: u64, current: Decimal) -> PoolSnapshot {
        PoolSnapshot {
            pool: PoolId::new(),
            alloc_point,
            class: PoolClass::Trading,
            current_credit: current,
            withdrawable_credit: current,
            capacity: None,
        }
    }

    fn allocated(plan: &AllocationPlan) -> Decimal {
        plan.moves
            .iter()
            .filter(|m| m.kind == MoveKind::Allocate)
            .map(|m| m.amount)
            .sum()
    }

    #[test]
    fn test_fresh_allocation_hits_target_exactly() {
        let pools = [
            snapshot(1, Decimal::ZERO),
            snapshot(1, Decimal::ZERO),
            snapshot(1, Decimal::ZERO),
        ];
        let plan = plan(&params(), dec!(1000), &pools).unwrap();

        assert_eq!(plan.leverage_target, dec!(2000));
        let amounts: Vec<_> = plan.moves.iter().map(|m| m.amount).collect();
        assert_eq!(amounts, vec![dec!(666), dec!(666), dec!(668)]);
        assert_eq!(allocated(&plan), dec!(2000));
    }

    #[test]
    fn test_slack_band_suppresses_small_drift() {
        let pools = [snapshot(1, dec!(1000)), snapshot(1, dec!(1000))];
        // 1% more liquidity: targets move to 1010, inside the 5% band
        let plan = plan(&params(), dec!(1010), &pools).unwrap();
        assert!(plan.moves.is_empty());
    }

    #[test]
    fn test_over_allocated_pool_is_withdrawn_before_allocating() {
        let pools = [snapshot(1, dec!(1500)), snapshot(1, dec!(500))];
        let plan = plan(&params(), dec!(1000), &pools).unwrap();

        assert_eq!(plan.moves.len(), 2);
        assert_eq!(plan.moves[0].kind, MoveKind::Withdraw);
        assert_eq!(plan.moves[0].amount, dec!(500));
        assert_eq!(plan.moves[1].kind, MoveKind::Allocate);
        assert_eq!(plan.moves[1].amount, dec!(500));
    }

    #[test]
    fn test_locked_credit_limits_withdrawal_and_budget() {
        let mut heavy = snapshot(1, dec!(1500));
        heavy.withdrawable_credit = dec!(200);
        let pools = [heavy, snapshot(1, dec!(500))];
        let plan = plan(&params(), dec!(1000), &pools).unwrap();

        assert_eq!(plan.moves[0].amount, dec!(200));
        // 1300 + 500 allocated, only 200 of budget left
        assert_eq!(allocated(&plan), dec!(200));
    }

    #[test]
    fn test_settling_credit_is_not_double_counted() {
        let mut settling = snapshot(1, dec!(800));
        settling.class = PoolClass::Settling;
        let pools = [settling, snapshot(1, Decimal::ZERO)];
        let plan = plan(&params(), dec!(1000), &pools).unwrap();

        assert_eq!(plan.trading_budget, dec!(1200));
        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.moves[0].amount, dec!(1200));
    }

    #[test]
    fn test_paused_pool_is_released_and_excluded() {
        let mut paused = snapshot(1, dec!(1000));
        paused.class = PoolClass::Paused;
        let pools = [paused, snapshot(1, dec!(1000))];
        let plan = plan(&params(), dec!(1000), &pools).unwrap();

        assert_eq!(plan.moves[0].kind, MoveKind::Release);
        assert_eq!(plan.moves[0].amount, dec!(1000));
        assert_eq!(plan.moves[1].kind, MoveKind::Allocate);
        assert_eq!(plan.moves[1].amount, dec!(1000));
    }

    #[test]
    fn test_capacity_caps_allocation() {
        let mut capped = snapshot(1, Decimal::ZERO);
        capped.capacity = Some(dec!(300));
        let pools = [capped, snapshot(1, Decimal::ZERO)];
        let plan = plan(&params(), dec!(1000), &pools).unwrap();

        assert_eq!(plan.moves[0].amount, dec!(300));
        assert_eq!(plan.moves[1].amount, dec!(1000));
        assert_eq!(allocated(&plan), dec!(1300));
    }

    #[test]
    fn test_zero_weight_pool_is_drained() {
        let pools = [snapshot(0, dec!(400)), snapshot(1, Decimal::ZERO)];
        let plan = plan(&params(), dec!(1000), &pools).unwrap();

        assert_eq!(plan.moves[0].kind, MoveKind::Withdraw);
        assert_eq!(plan.moves[0].amount, dec!(400));
        assert_eq!(plan.moves[1].amount, dec!(2000));
    }

    #[test]
    fn test_weights_near_u64_max_split_without_overflow() {
        let pools = [
            snapshot(u64::MAX, Decimal::ZERO),
            snapshot(u64::MAX, Decimal::ZERO),
        ];
        let plan = plan(&params(), dec!(1000), &pools).unwrap();

        let amounts: Vec<_> = plan.moves.iter().map(|m| m.amount).collect();
        assert_eq!(amounts, vec![dec!(1000), dec!(1000)]);
    }
}
