//! Aggregator operations: deposits, pool list management and rebalancing

use aegis_common::error::{IndexError, LedgerError};
use aegis_common::{mul_div_ceil, mul_div_floor, Holder, IndexId, PoolId, Result};
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::pool_ops::pay_harvest;
use super::{ensure_positive, Env, MarketState};
use crate::index::{plan, AllocationPlan, MoveKind, PoolClass, PoolSnapshot};
use crate::pool::MarketStatus;
use crate::reserve::CompensationBackstop;

impl MarketState {
    // ----- views -----

    /// Vault value of the aggregator plus premium not yet harvested
    pub fn index_liquidity(&self, index_id: IndexId) -> Result<Decimal> {
        let holder = Holder::Index(index_id);
        let mut liquidity = self.vault.value_of(&holder)?;
        for pool in self.pools.values() {
            liquidity += pool.pending_premium(&holder, &self.vault)?;
        }
        Ok(liquidity)
    }

    /// Unharvested premium across every pool, in underlying value
    pub fn index_pending_premium(&self, index_id: IndexId) -> Result<Decimal> {
        let holder = Holder::Index(index_id);
        let mut pending = Decimal::ZERO;
        for pool in self.pools.values() {
            pending += pool.pending_premium(&holder, &self.vault)?;
        }
        Ok(pending)
    }

    /// Liquidity not backing locked coverage.
    ///
    /// Each pool locks the aggregator's credit in proportion to its own
    /// utilization.
    pub fn index_withdrawable(&self, index_id: IndexId) -> Result<Decimal> {
        let holder = Holder::Index(index_id);
        let liquidity = self.index_liquidity(index_id)?;
        let mut locked = Decimal::ZERO;
        for pool in self.pools.values() {
            let credit = pool.credit_of(&holder);
            if credit.is_zero() {
                continue;
            }
            let total = pool.total_liquidity(&self.vault)?;
            if total.is_zero() {
                locked += credit;
            } else {
                locked += mul_div_ceil(pool.locked_amount(), credit, total)?.min(credit);
            }
        }
        Ok((liquidity - locked).max(Decimal::ZERO))
    }

    /// Allocated credit over liquidity; zero without liquidity
    pub fn index_leverage(&self, index_id: IndexId) -> Result<Decimal> {
        let liquidity = self.index_liquidity(index_id)?;
        if liquidity.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Ok(self.index(index_id)?.total_allocated_credit / liquidity)
    }

    /// Liquidity per share; `None` before the first deposit
    pub fn index_rate(&self, index_id: IndexId) -> Result<Option<Decimal>> {
        let supply = self.index(index_id)?.total_supply();
        if supply.is_zero() {
            return Ok(None);
        }
        Ok(Some(self.index_liquidity(index_id)? / supply))
    }

    pub fn index_value_of_underlying(&self, index_id: IndexId, holder: &Holder) -> Result<Decimal> {
        let index = self.index(index_id)?;
        let supply = index.total_supply();
        let shares = index.shares_of(holder);
        if supply.is_zero() || shares.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Ok(mul_div_floor(shares, self.index_liquidity(index_id)?, supply)?)
    }

    // ----- depositors -----

    /// Deposit underlying into an aggregator and rebalance; returns the
    /// shares minted
    #[instrument(skip_all, fields(index = %index_id, depositor = %depositor, %amount))]
    pub fn index_deposit(
        &mut self,
        env: &Env<'_>,
        index_id: IndexId,
        depositor: &Holder,
        amount: Decimal,
    ) -> Result<Decimal> {
        ensure_positive(amount)?;
        let index = self.index(index_id)?;
        index.ensure_accepting("deposit")?;

        let supply = index.total_supply();
        let minted = if supply.is_zero() {
            amount
        } else {
            let liquidity = self.index_liquidity(index_id)?;
            if liquidity.is_zero() {
                return Err(IndexError::InvalidState {
                    operation: "deposit",
                    reason: "aggregator is insolvent".to_string(),
                }
                .into());
            }
            mul_div_floor(amount, supply, liquidity)?
        };

        let holder = Holder::Index(index_id);
        self.vault.add_value(&holder, amount, depositor, &holder)?;
        self.index_mut(index_id)?.shares.mint(depositor, minted);
        info!(%minted, "Aggregator deposit");

        self.adjust_alloc(env, index_id)?;
        Ok(minted)
    }

    pub fn index_request_withdraw(
        &mut self,
        env: &Env<'_>,
        index_id: IndexId,
        holder: &Holder,
        shares: Decimal,
    ) -> Result<()> {
        ensure_positive(shares)?;
        let index = self.index_mut(index_id)?;
        if let Some((required, held)) = index.shares.shortfall(holder, shares) {
            return Err(IndexError::InsufficientShares { required, held }.into());
        }
        let lockup = index.params.lockup_secs;
        index.shares.request_withdraw(holder, shares, env.now, lockup);
        Ok(())
    }

    /// Burn requested shares, harvest, and pay out their value; returns the
    /// value
    #[instrument(skip_all, fields(index = %index_id, holder = %holder, %shares))]
    pub fn index_withdraw(
        &mut self,
        env: &Env<'_>,
        index_id: IndexId,
        holder: &Holder,
        shares: Decimal,
    ) -> Result<Decimal> {
        ensure_positive(shares)?;
        let index = self.index(index_id)?;
        index.ensure_unlocked("withdraw")?;
        if let Some((required, held)) = index.shares.shortfall(holder, shares) {
            return Err(IndexError::InsufficientShares { required, held }.into());
        }
        index
            .shares
            .check_withdraw(holder, shares, env.now, index.params.withdrawable_secs)?;

        let supply = index.total_supply();
        let value = mul_div_floor(shares, self.index_liquidity(index_id)?, supply)?;
        let withdrawable = self.index_withdrawable(index_id)?;
        if value > withdrawable {
            return Err(IndexError::WithdrawLimit {
                requested: value,
                withdrawable,
            }
            .into());
        }

        self.index_mut(index_id)?.shares.burn(holder, shares);
        self.harvest_all(index_id)?;
        if !value.is_zero() {
            self.vault
                .withdraw_value(&Holder::Index(index_id), value, holder)?;
        }
        info!(%value, "Aggregator withdrawal");

        self.adjust_alloc(env, index_id)?;
        Ok(value)
    }

    pub fn index_transfer_shares(
        &mut self,
        index_id: IndexId,
        from: &Holder,
        to: &Holder,
        shares: Decimal,
    ) -> Result<()> {
        ensure_positive(shares)?;
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(to.clone()).into());
        }
        let index = self.index_mut(index_id)?;
        if let Some((required, held)) = index.shares.shortfall(from, shares) {
            return Err(IndexError::InsufficientShares { required, held }.into());
        }
        index.shares.transfer(from, to, shares);
        Ok(())
    }

    // ----- pool list -----

    /// Add, re-weight, replace or remove the pool in `slot`.
    ///
    /// `expected_alloc_point` must match the slot's current weight (zero for
    /// the slot one past the end). `None` with zero points removes the slot;
    /// the last slot moves into its place.
    #[instrument(skip_all, fields(index = %index_id, slot, expected_alloc_point, alloc_point))]
    pub fn set_index_pool(
        &mut self,
        env: &Env<'_>,
        index_id: IndexId,
        slot: usize,
        expected_alloc_point: u64,
        pool: Option<PoolId>,
        alloc_point: u64,
    ) -> Result<()> {
        let index = self.index(index_id)?;
        index.slots.check(slot, expected_alloc_point)?;
        let len = index.slots.len();
        let occupant = index.slots.get(slot).map(|s| s.pool);

        match pool {
            None => {
                if alloc_point != 0 {
                    return Err(IndexError::InvalidState {
                        operation: "set",
                        reason: "removing a pool requires zero allocation points".to_string(),
                    }
                    .into());
                }
                let current = occupant.ok_or(IndexError::SlotOutOfRange { slot, len })?;
                self.withdraw_all_credit(env, index_id, current)?;
                let removed = self.index_mut(index_id)?.slots.swap_remove(slot)?;
                info!(pool = %removed.pool, "Pool removed from aggregator");
            }
            Some(pool_id) => {
                self.pool(pool_id)?;
                if let Some(listed) = index.slots.position(&pool_id) {
                    if listed != slot {
                        return Err(IndexError::DuplicatePool(pool_id.to_string()).into());
                    }
                }
                match occupant {
                    None => {
                        self.index_mut(index_id)?.slots.push(pool_id, alloc_point)?;
                        info!(pool = %pool_id, alloc_point, "Pool added to aggregator");
                    }
                    Some(current) => {
                        if current != pool_id {
                            self.withdraw_all_credit(env, index_id, current)?;
                        }
                        self.index_mut(index_id)?
                            .slots
                            .replace(slot, pool_id, alloc_point)?;
                        debug!(pool = %pool_id, alloc_point, "Aggregator slot updated");
                    }
                }
            }
        }

        self.adjust_alloc(env, index_id)?;
        Ok(())
    }

    fn withdraw_all_credit(&mut self, env: &Env<'_>, index_id: IndexId, pool_id: PoolId) -> Result<()> {
        let holder = Holder::Index(index_id);
        let credit = self.pool(pool_id)?.credit_of(&holder);
        if credit.is_zero() {
            self.harvest_credit(pool_id, &holder)?;
        } else {
            self.withdraw_credit(env, pool_id, &holder, credit)?;
        }
        Ok(())
    }

    // ----- rebalancing -----

    /// Bring every listed pool back to its weighted share of
    /// `liquidity * target_leverage`
    pub fn adjust_alloc(&mut self, env: &Env<'_>, index_id: IndexId) -> Result<AllocationPlan> {
        let holder = Holder::Index(index_id);
        let liquidity = self.index_liquidity(index_id)?;
        let index = self.index(index_id)?;

        let mut snapshots = Vec::with_capacity(index.slots.len());
        for slot in index.slots.iter() {
            let pool = self.pool(slot.pool)?;
            let class = if pool.status_at(env.now) != MarketStatus::Trading {
                PoolClass::Settling
            } else if pool.is_paused() {
                PoolClass::Paused
            } else {
                PoolClass::Trading
            };
            snapshots.push(PoolSnapshot {
                pool: slot.pool,
                alloc_point: slot.alloc_point,
                class,
                current_credit: pool.credit_of(&holder),
                withdrawable_credit: pool.withdrawable_credit(&holder, &self.vault)?,
                capacity: pool.credit_room(),
            });
        }
        let plan = plan(&index.params, liquidity, &snapshots)?;

        for mv in &plan.moves {
            match mv.kind {
                MoveKind::Withdraw => {
                    // Harvests in earlier moves can shift availability by a unit
                    let now_withdrawable = self
                        .pool(mv.pool)?
                        .withdrawable_credit(&holder, &self.vault)?;
                    let amount = mv.amount.min(now_withdrawable);
                    if !amount.is_zero() {
                        self.withdraw_credit(env, mv.pool, &holder, amount)?;
                    }
                }
                MoveKind::Release => {
                    self.unlock_credit(env, mv.pool, &holder)?;
                }
                MoveKind::Allocate => {
                    self.allocate_credit(env, mv.pool, &holder, mv.amount)?;
                }
            }
        }

        let index = self.index(index_id)?;
        let mut allocated = Decimal::ZERO;
        for pool_id in index.slots.pools() {
            allocated += self.pool(pool_id)?.credit_of(&holder);
        }
        self.index_mut(index_id)?.total_allocated_credit = allocated;

        debug!(
            index = %index_id,
            %liquidity,
            %allocated,
            moves = plan.moves.len(),
            "Aggregator rebalanced"
        );
        Ok(plan)
    }

    /// Collect pending premium from every pool the aggregator earns in
    pub fn harvest_all(&mut self, index_id: IndexId) -> Result<Decimal> {
        let holder = Holder::Index(index_id);
        let mut harvested = Decimal::ZERO;
        for pool in self.pools.values_mut() {
            let pending = pool.credit.harvest(&holder);
            pay_harvest(&mut self.vault, pool, &holder, pending)?;
            harvested += pending;
        }
        Ok(harvested)
    }

    // ----- settlement -----

    /// Pay `amount` of `pool_id`'s claim debt on behalf of the aggregator.
    ///
    /// Harvests first when the aggregator's value is short, then asks the
    /// reserve for the rest. Returns the debt actually offset.
    #[instrument(skip_all, fields(index = %index_id, pool = %pool_id, %amount))]
    pub(crate) fn compensate(
        &mut self,
        _env: &Env<'_>,
        index_id: IndexId,
        amount: Decimal,
        pool_id: PoolId,
    ) -> Result<Decimal> {
        let holder = Holder::Index(index_id);
        let pool_holder = Holder::Pool(pool_id);

        let mut value = self.vault.value_of(&holder)?;
        if value < amount {
            self.harvest_all(index_id)?;
            value = self.vault.value_of(&holder)?;
        }
        if value < amount {
            let shortage = amount - value;
            let covered = self.reserve.compensate(&mut self.vault, shortage, &holder)?;
            if covered < shortage {
                warn!(%shortage, %covered, "Reserve could not cover aggregator shortfall");
            }
            value = self.vault.value_of(&holder)?;
        }

        let owed = self.vault.debt_of(&pool_holder);
        let paid = amount.min(value).min(owed);
        if !paid.is_zero() {
            self.vault.offset_debt(&holder, paid, &pool_holder)?;
        }
        info!(%paid, "Aggregator compensated pool");
        Ok(paid)
    }

    /// Unlock and rebalance the aggregator unless a listed pool is still
    /// settling; returns whether it is unlocked
    pub(crate) fn try_resume_index(&mut self, env: &Env<'_>, index_id: IndexId) -> Result<bool> {
        let index = self.index(index_id)?;
        let settling = index.slots.pools().any(|pool_id| {
            self.pools
                .get(&pool_id)
                .is_some_and(|p| p.status_at(env.now) != MarketStatus::Trading)
        });
        if settling {
            return Ok(false);
        }
        if index.is_locked() {
            self.index_mut(index_id)?.set_locked(false);
            info!(index = %index_id, "Aggregator unlocked");
        }
        self.adjust_alloc(env, index_id)?;
        Ok(true)
    }

    /// Unlock a locked aggregator once none of its pools is settling
    pub fn resume_index(&mut self, env: &Env<'_>, index_id: IndexId) -> Result<()> {
        if self.try_resume_index(env, index_id)? {
            Ok(())
        } else {
            Err(IndexError::InvalidState {
                operation: "resume",
                reason: "a listed pool is still settling".to_string(),
            }
            .into())
        }
    }

    // ----- parameters -----

    pub fn set_index_leverage(&mut self, env: &Env<'_>, index_id: IndexId, target: Decimal) -> Result<()> {
        let index = self.index_mut(index_id)?;
        index.set_leverage(target)?;
        let locked = index.is_locked();
        info!(index = %index_id, %target, "Target leverage set");
        if !locked {
            self.adjust_alloc(env, index_id)?;
        }
        Ok(())
    }

    pub fn set_index_slack(&mut self, index_id: IndexId, upper: Decimal, lower: Decimal) -> Result<()> {
        self.index_mut(index_id)?.set_slack(upper, lower)
    }

    pub fn set_index_paused(&mut self, index_id: IndexId, paused: bool) -> Result<()> {
        self.index_mut(index_id)?.set_paused(paused);
        info!(index = %index_id, paused, "Aggregator pause toggled");
        Ok(())
    }
}
