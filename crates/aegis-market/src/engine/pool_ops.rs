//! Risk pool operations: liquidity, policies, credit and claim settlement

use aegis_common::crypto::Hash;
use aegis_common::error::{ClaimError, LedgerError, PoolError};
use aegis_common::{mul_div_floor, split_pro_rata, Holder, PoolId, Result, WEIGHT_BASE};
use aegis_ledger::Vault;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::{ensure_positive, Env, MarketState};
use crate::pool::{Incident, Insurance, InsuranceStatus, MarketStatus, RiskPool};

/// Hand harvested premium (attribution units) from the pool to `source`
pub(super) fn pay_harvest(
    vault: &mut Vault,
    pool: &mut RiskPool,
    source: &Holder,
    pending: Decimal,
) -> Result<()> {
    if pending.is_zero() {
        return Ok(());
    }
    vault.transfer_attribution(&pool.holder(), pending, source)?;
    pool.attribution_debt -= pending;
    Ok(())
}

/// Declared incident parameters, as submitted by governance
#[derive(Debug, Clone)]
pub struct CoverRequest {
    /// Seconds between declaration and the opening of claims
    pub pending_secs: i64,
    pub payout_numerator: u64,
    pub payout_denominator: u64,
    pub incident_timestamp: i64,
    pub merkle_root: Hash,
    pub targets: Vec<String>,
}

impl MarketState {
    // ----- liquidity providers -----

    /// Deposit underlying into a pool; returns the LP shares minted
    #[instrument(skip_all, fields(pool = %pool_id, depositor = %depositor, %amount))]
    pub fn pool_deposit(
        &mut self,
        env: &Env<'_>,
        pool_id: PoolId,
        depositor: &Holder,
        amount: Decimal,
    ) -> Result<Decimal> {
        ensure_positive(amount)?;
        let vault = &mut self.vault;
        let pool = self.pools.get_mut(&pool_id).ok_or_else(|| super::pool_not_found(pool_id))?;
        pool.refresh(env.now);
        pool.ensure_open("deposit")?;

        let original = pool.original_liquidity(vault)?;
        let supply = pool.lp.total_supply();
        let minted = if supply.is_zero() {
            amount
        } else if original.is_zero() {
            return Err(PoolError::InvalidState {
                operation: "deposit",
                status: "insolvent".to_string(),
            }
            .into());
        } else {
            mul_div_floor(amount, supply, original)?
        };

        let pool_holder = pool.holder();
        vault.add_value(&pool_holder, amount, depositor, &pool_holder)?;
        pool.lp.mint(depositor, minted);

        info!(%minted, "Pool deposit");
        Ok(minted)
    }

    /// Stamp a withdrawal request for `shares`
    pub fn pool_request_withdraw(
        &mut self,
        env: &Env<'_>,
        pool_id: PoolId,
        holder: &Holder,
        shares: Decimal,
    ) -> Result<()> {
        ensure_positive(shares)?;
        let pool = self.pool_mut(pool_id)?;
        if let Some((required, held)) = pool.lp.shortfall(holder, shares) {
            return Err(PoolError::InsufficientShares { required, held }.into());
        }
        let lockup = pool.params.lockup_secs;
        let request = pool.lp.request_withdraw(holder, shares, env.now, lockup);

        debug!(pool = %pool_id, holder = %holder, %shares, unlocks_at = request.unlocks_at, "Withdrawal requested");
        Ok(())
    }

    /// Burn requested LP shares and release their value; returns the value
    #[instrument(skip_all, fields(pool = %pool_id, holder = %holder, %shares))]
    pub fn pool_withdraw(
        &mut self,
        env: &Env<'_>,
        pool_id: PoolId,
        holder: &Holder,
        shares: Decimal,
    ) -> Result<Decimal> {
        ensure_positive(shares)?;
        let vault = &mut self.vault;
        let pool = self.pools.get_mut(&pool_id).ok_or_else(|| super::pool_not_found(pool_id))?;
        pool.refresh(env.now);
        pool.ensure_trading("withdraw")?;

        if let Some((required, held)) = pool.lp.shortfall(holder, shares) {
            return Err(PoolError::InsufficientShares { required, held }.into());
        }
        pool.lp
            .check_withdraw(holder, shares, env.now, pool.params.withdrawable_secs)?;

        let value = pool.shares_to_value(shares, vault)?;
        let available = pool.available_balance(vault)?;
        if value > available {
            return Err(PoolError::ExceedsAvailable {
                requested: value,
                available,
            }
            .into());
        }

        pool.lp.burn(holder, shares);
        if !value.is_zero() {
            vault.withdraw_value(&pool.holder(), value, holder)?;
        }

        info!(%value, "Pool withdrawal");
        Ok(value)
    }

    pub fn pool_transfer_shares(
        &mut self,
        pool_id: PoolId,
        from: &Holder,
        to: &Holder,
        shares: Decimal,
    ) -> Result<()> {
        ensure_positive(shares)?;
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(to.clone()).into());
        }
        let pool = self.pool_mut(pool_id)?;
        if let Some((required, held)) = pool.lp.shortfall(from, shares) {
            return Err(PoolError::InsufficientShares { required, held }.into());
        }
        pool.lp.transfer(from, to, shares);
        Ok(())
    }

    // ----- policies -----

    /// Buy coverage; returns the policy id
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(pool = %pool_id, buyer = %buyer, %amount, span_secs))]
    pub fn insure(
        &mut self,
        env: &Env<'_>,
        pool_id: PoolId,
        buyer: &Holder,
        amount: Decimal,
        max_cost: Decimal,
        span_secs: i64,
        target: &str,
        agent: Option<Holder>,
    ) -> Result<u64> {
        let vault = &mut self.vault;
        let pool = self.pools.get_mut(&pool_id).ok_or_else(|| super::pool_not_found(pool_id))?;
        pool.refresh(env.now);
        pool.ensure_open("insure")?;

        let (min, max) = (pool.params.min_span_secs, pool.params.max_span_secs);
        if span_secs < min || span_secs > max {
            return Err(PoolError::SpanOutOfRange {
                span: span_secs,
                min,
                max,
            }
            .into());
        }
        ensure_positive(amount)?;

        let total_liquidity = pool.total_liquidity(vault)?;
        let available = (total_liquidity - pool.locked_amount).max(Decimal::ZERO);
        if amount > available {
            return Err(PoolError::ExceedsAvailable {
                requested: amount,
                available,
            }
            .into());
        }

        let premium = env.premium_model.premium(
            pool_id,
            amount,
            span_secs,
            total_liquidity,
            pool.locked_amount,
        )?;
        if premium > max_cost {
            return Err(PoolError::PremiumExceedsMaxCost { premium, max_cost }.into());
        }

        let id = pool.insurances.len() as u64;
        pool.insurances.push(Insurance {
            id,
            start: env.now,
            end: env.now + span_secs,
            amount,
            premium,
            target: target.to_string(),
            insured: buyer.clone(),
            agent,
            status: InsuranceStatus::Active,
        });
        pool.locked_amount += amount;

        if !premium.is_zero() {
            collect_premium(vault, pool, buyer, premium, total_liquidity)?;
        }

        info!(policy = id, %premium, "Policy sold");
        Ok(id)
    }

    /// Release the capital of an expired policy
    pub fn unlock(&mut self, env: &Env<'_>, pool_id: PoolId, policy_id: u64) -> Result<()> {
        let pool = self.pool_mut(pool_id)?;
        pool.refresh(env.now);

        let status = pool.stored_status();
        let incident_timestamp = pool.incident.as_ref().map(|i| i.incident_timestamp);
        let grace = pool.params.grace_secs;
        let policy = pool.insurance(policy_id)?;
        if !policy.is_active() {
            return Err(PoolError::PolicyInactive(policy_id).into());
        }
        let unlockable_at = policy.end + grace;
        if env.now <= unlockable_at {
            return Err(PoolError::PolicyNotExpired {
                id: policy_id,
                unlockable_at,
            }
            .into());
        }
        // During an incident only policies that ended before it are free
        let unaffected = match incident_timestamp {
            Some(ts) => policy.end < ts,
            None => false,
        };
        if status != MarketStatus::Trading && !unaffected {
            return Err(PoolError::InvalidState {
                operation: "unlock",
                status: status.to_string(),
            }
            .into());
        }

        let amount = policy.amount;
        pool.insurance_mut(policy_id)?.status = InsuranceStatus::Unlocked;
        pool.locked_amount -= amount;

        debug!(pool = %pool_id, policy = policy_id, %amount, "Policy unlocked");
        Ok(())
    }

    pub fn unlock_batch(&mut self, env: &Env<'_>, pool_id: PoolId, policy_ids: &[u64]) -> Result<()> {
        for id in policy_ids {
            self.unlock(env, pool_id, *id)?;
        }
        Ok(())
    }

    /// Hand an active policy to another holder
    pub fn transfer_insurance(
        &mut self,
        pool_id: PoolId,
        caller: &Holder,
        policy_id: u64,
        to: &Holder,
    ) -> Result<()> {
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(to.clone()).into());
        }
        let policy = self.pool_mut(pool_id)?.insurance_mut(policy_id)?;
        if !policy.is_active() {
            return Err(PoolError::PolicyInactive(policy_id).into());
        }
        if &policy.insured != caller {
            return Err(ClaimError::NotInsured {
                policy_id,
                caller: caller.clone(),
            }
            .into());
        }
        policy.insured = to.clone();
        Ok(())
    }

    // ----- incidents -----

    /// Declare an incident: the pool starts reporting and every aggregator
    /// allocating to it is locked
    #[instrument(skip_all, fields(pool = %pool_id))]
    pub fn apply_cover(&mut self, env: &Env<'_>, pool_id: PoolId, request: CoverRequest) -> Result<()> {
        let pool = self.pool_mut(pool_id)?;
        pool.refresh(env.now);
        pool.ensure_trading("apply cover")?;
        if request.payout_denominator == 0 || request.payout_numerator > request.payout_denominator {
            return Err(PoolError::InvalidPayoutRatio {
                numerator: request.payout_numerator,
                denominator: request.payout_denominator,
            }
            .into());
        }
        if request.pending_secs < 0 {
            return Err(PoolError::InvalidState {
                operation: "apply cover",
                status: "negative pending window".to_string(),
            }
            .into());
        }

        let pending_end = env.now + request.pending_secs;
        let claim_end = pending_end + pool.params.claim_window_secs;
        pool.incident = Some(Incident {
            payout_numerator: request.payout_numerator,
            payout_denominator: request.payout_denominator,
            incident_timestamp: request.incident_timestamp,
            merkle_root: request.merkle_root,
            targets: request.targets,
            pending_end,
            claim_end,
        });
        pool.set_status(MarketStatus::Reporting);
        let affected = pool.credit_indices();

        for index_id in &affected {
            if let Some(index) = self.indices.get_mut(index_id) {
                index.set_locked(true);
            }
        }

        info!(pending_end, claim_end, locked_indices = affected.len(), "Incident declared");
        Ok(())
    }

    /// Redeem a claim against an incident; returns the payout
    #[instrument(skip_all, fields(pool = %pool_id, caller = %caller, policy = policy_id, %loss))]
    pub fn redeem(
        &mut self,
        env: &Env<'_>,
        pool_id: PoolId,
        caller: &Holder,
        policy_id: u64,
        loss: Decimal,
        proof: &[Hash],
    ) -> Result<Decimal> {
        let vault = &mut self.vault;
        let pool = self.pools.get_mut(&pool_id).ok_or_else(|| super::pool_not_found(pool_id))?;
        pool.refresh(env.now);

        let status = pool.stored_status();
        let incident = match (&pool.incident, status) {
            (Some(incident), MarketStatus::Payout) => incident.clone(),
            _ => {
                return Err(PoolError::InvalidState {
                    operation: "redeem",
                    status: status.to_string(),
                }
                .into())
            }
        };
        if env.now > incident.claim_end {
            return Err(ClaimError::WindowClosed {
                closed_at: incident.claim_end,
            }
            .into());
        }

        let policy = pool.insurance(policy_id)?;
        if !policy.is_active() {
            return Err(PoolError::PolicyInactive(policy_id).into());
        }
        if &policy.insured != caller {
            return Err(ClaimError::NotInsured {
                policy_id,
                caller: caller.clone(),
            }
            .into());
        }
        ensure_positive(loss)?;
        if !env
            .oracle
            .verify(&incident.merkle_root, policy_id, &policy.insured, loss, proof)
        {
            return Err(ClaimError::Rejected { policy_id }.into());
        }
        if !policy.covers(incident.incident_timestamp) {
            return Err(ClaimError::NotApplicable {
                policy_id,
                reason: "incident outside the coverage window".to_string(),
            }
            .into());
        }
        if !incident.affects(&policy.target) {
            return Err(ClaimError::NotApplicable {
                policy_id,
                reason: format!("target {} not affected", policy.target),
            }
            .into());
        }

        let amount = policy.amount;
        let insured = policy.insured.clone();
        let payout = incident.payout_for(amount, loss)?;

        pool.insurance_mut(policy_id)?.status = InsuranceStatus::Redeemed;
        pool.locked_amount -= payout;
        pool.residual_lock += amount - payout;

        if !payout.is_zero() {
            vault.borrow_value(&pool.holder(), payout, &insured)?;
        }

        info!(%payout, "Claim redeemed");
        Ok(payout)
    }

    /// Close the claim window: settle the pool's debt and return to trading
    #[instrument(skip_all, fields(pool = %pool_id))]
    pub fn resume(&mut self, env: &Env<'_>, pool_id: PoolId) -> Result<()> {
        let pool = self.pool_mut(pool_id)?;
        pool.refresh(env.now);
        let status = pool.stored_status();
        let claim_end = pool.incident.as_ref().map(|i| i.claim_end);
        match claim_end {
            Some(end) if status == MarketStatus::Payout && env.now > end => {}
            _ => {
                return Err(PoolError::InvalidState {
                    operation: "resume",
                    status: status.to_string(),
                }
                .into())
            }
        }

        let debt = self.vault.debt_of(&Holder::Pool(pool_id));
        if !debt.is_zero() {
            self.settle_pool_debt(env, pool_id, debt)?;
        }

        let pool = self.pool_mut(pool_id)?;
        pool.locked_amount -= pool.residual_lock;
        pool.residual_lock = Decimal::ZERO;
        pool.incident = None;
        pool.set_status(MarketStatus::Trading);
        info!(%debt, "Pool resumed");

        let affected: Vec<_> = self
            .indices
            .values()
            .filter(|i| i.is_locked() || i.slots.contains(&pool_id))
            .map(|i| i.id)
            .collect();
        for index_id in affected {
            self.try_resume_index(env, index_id)?;
        }
        Ok(())
    }

    /// Split the pool's claim debt between its credit sources and its LPs.
    ///
    /// Credit sources carry `debt * total_credit / gross_liquidity`, pro rata
    /// to their credit; aggregators fall back on their premium and then on
    /// the reserve. LPs carry the rest up to their liquidity. Whatever is
    /// still owed afterwards is socialized to the system.
    fn settle_pool_debt(&mut self, env: &Env<'_>, pool_id: PoolId, debt: Decimal) -> Result<()> {
        let pool_holder = Holder::Pool(pool_id);
        let pool = self.pool(pool_id)?;
        let gross = pool.gross_liquidity(&self.vault)?;
        let total_credit = pool.total_credit();
        let sources: Vec<(Holder, Decimal)> = pool
            .credit
            .holders()
            .map(|(holder, position)| (holder.clone(), position.credit))
            .collect();

        let credit_part = if gross.is_zero() {
            Decimal::ZERO
        } else {
            mul_div_floor(debt, total_credit, gross)?.min(debt)
        };

        if !credit_part.is_zero() && !sources.is_empty() {
            let weights: Vec<Decimal> = sources.iter().map(|(_, credit)| *credit).collect();
            let shares = split_pro_rata(credit_part, &weights)?;
            for ((source, _), share) in sources.iter().zip(shares) {
                if share.is_zero() {
                    continue;
                }
                let covered = match source.as_index() {
                    Some(index_id) => self.compensate(env, index_id, share, pool_id)?,
                    None => {
                        let value = self.vault.value_of(source)?;
                        let owed = self.vault.debt_of(&pool_holder);
                        let covered = share.min(value).min(owed);
                        if !covered.is_zero() {
                            self.vault.offset_debt(source, covered, &pool_holder)?;
                        }
                        covered
                    }
                };
                if covered < share {
                    warn!(source = %source, %share, %covered, "Credit source could not cover its share");
                }
            }
        }

        let pool_part = debt - credit_part;
        if !pool_part.is_zero() {
            let original = self.pool(pool_id)?.original_liquidity(&self.vault)?;
            let owed = self.vault.debt_of(&pool_holder);
            let covered = pool_part.min(original).min(owed);
            if !covered.is_zero() {
                self.vault.offset_debt(&pool_holder, covered, &pool_holder)?;
            }
        }

        let remaining = self.vault.debt_of(&pool_holder);
        if !remaining.is_zero() {
            self.vault.transfer_debt(&pool_holder, remaining)?;
            warn!(pool = %pool_id, %remaining, "Unpaid claim debt socialized");
        }
        Ok(())
    }

    // ----- credit -----

    /// Add `amount` of credit from `source`; zero only harvests.
    ///
    /// Returns the premium harvested, in attribution units.
    #[instrument(skip_all, fields(pool = %pool_id, source = %source, %amount))]
    pub fn allocate_credit(
        &mut self,
        env: &Env<'_>,
        pool_id: PoolId,
        source: &Holder,
        amount: Decimal,
    ) -> Result<Decimal> {
        self.ensure_credit_source(source)?;
        let direct = self.direct_sources.contains(source);
        let backing_needed = if direct {
            self.credit_across_pools(source) + amount
        } else {
            Decimal::ZERO
        };

        let vault = &mut self.vault;
        let pool = self.pools.get_mut(&pool_id).ok_or_else(|| super::pool_not_found(pool_id))?;
        pool.refresh(env.now);

        if !amount.is_zero() {
            ensure_positive(amount)?;
            pool.ensure_open("allocate credit")?;
            if let Some(room) = pool.credit_room() {
                if amount > room {
                    return Err(PoolError::CreditCeilingReached {
                        requested: amount,
                        room,
                    }
                    .into());
                }
            }
            if direct {
                let backing = vault.value_of(source)?;
                if backing_needed > backing {
                    return Err(PoolError::Unbacked {
                        source_holder: source.clone(),
                        backing,
                    }
                    .into());
                }
            }
        }

        let pending = pool.credit.deposit(source, amount);
        pay_harvest(vault, pool, source, pending)?;

        debug!(%pending, total_credit = %pool.total_credit(), "Credit allocated");
        Ok(pending)
    }

    /// Remove `amount` of credit from `source`; returns the premium harvested
    #[instrument(skip_all, fields(pool = %pool_id, source = %source, %amount))]
    pub fn withdraw_credit(
        &mut self,
        env: &Env<'_>,
        pool_id: PoolId,
        source: &Holder,
        amount: Decimal,
    ) -> Result<Decimal> {
        ensure_positive(amount)?;
        let vault = &mut self.vault;
        let pool = self.pools.get_mut(&pool_id).ok_or_else(|| super::pool_not_found(pool_id))?;
        pool.refresh(env.now);
        pool.ensure_trading("withdraw credit")?;

        let allocated = pool.credit_of(source);
        if allocated < amount {
            return Err(PoolError::InsufficientCredit {
                source_holder: source.clone(),
                required: amount,
                allocated,
            }
            .into());
        }
        let available = pool.available_balance(vault)?;
        if amount > available {
            return Err(PoolError::ExceedsAvailable {
                requested: amount,
                available,
            }
            .into());
        }

        let pending = pool.credit.withdraw(source, amount)?;
        pay_harvest(vault, pool, source, pending)?;

        debug!(%pending, total_credit = %pool.total_credit(), "Credit withdrawn");
        Ok(pending)
    }

    /// Withdraw as much of `source`'s credit as the pool allows; returns the
    /// credit withdrawn
    pub fn unlock_credit(&mut self, env: &Env<'_>, pool_id: PoolId, source: &Holder) -> Result<Decimal> {
        let vault = &self.vault;
        let pool = self.pools.get_mut(&pool_id).ok_or_else(|| super::pool_not_found(pool_id))?;
        pool.refresh(env.now);
        pool.ensure_trading("unlock credit")?;
        let amount = pool.withdrawable_credit(source, vault)?;
        if amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.withdraw_credit(env, pool_id, source, amount)?;
        Ok(amount)
    }

    /// Collect `source`'s pending premium without changing its credit
    pub fn harvest_credit(&mut self, pool_id: PoolId, source: &Holder) -> Result<Decimal> {
        let vault = &mut self.vault;
        let pool = self.pools.get_mut(&pool_id).ok_or_else(|| super::pool_not_found(pool_id))?;
        let pending = pool.credit.harvest(source);
        pay_harvest(vault, pool, source, pending)?;
        Ok(pending)
    }

    /// Pause or unpause a pool; aggregators listing it rebalance
    pub fn set_pool_paused(&mut self, env: &Env<'_>, pool_id: PoolId, paused: bool) -> Result<()> {
        self.pool_mut(pool_id)?.set_paused(paused);
        info!(pool = %pool_id, paused, "Pool pause toggled");

        let listing: Vec<_> = self
            .indices
            .values()
            .filter(|i| !i.is_locked() && i.slots.contains(&pool_id))
            .map(|i| i.id)
            .collect();
        for index_id in listing {
            self.adjust_alloc(env, index_id)?;
        }
        Ok(())
    }
}

/// Route a premium into the vault: the fee to the reserve, the rest to the
/// pool, and the credit side's share to the accumulator.
///
/// The credit share is measured against liquidity before the premium.
fn collect_premium(
    vault: &mut Vault,
    pool: &mut RiskPool,
    buyer: &Holder,
    premium: Decimal,
    liquidity_before: Decimal,
) -> Result<()> {
    let pool_holder = pool.holder();
    if vault.attributions_for(premium)?.is_zero() {
        // Worth less than one unit: every holder gains it pro rata
        vault.add_balance(buyer, premium)?;
        debug!(%premium, "Premium below one attribution unit added to the vault balance");
        return Ok(());
    }
    let fee_weight = pool.params.fee_weight();
    let minted = vault.add_value_batch(
        &pool_holder,
        premium,
        buyer,
        &[Holder::Reserve, pool_holder.clone()],
        &[fee_weight, WEIGHT_BASE - fee_weight],
    )?;
    let to_pool = minted.get(1).copied().unwrap_or(Decimal::ZERO);

    let total_credit = pool.total_credit();
    if total_credit.is_zero() || liquidity_before.is_zero() || to_pool.is_zero() {
        return Ok(());
    }
    let credit_share = mul_div_floor(to_pool, total_credit, liquidity_before)?.min(to_pool);
    if credit_share.is_zero() {
        return Ok(());
    }
    pool.credit.distribute(credit_share)?;
    pool.attribution_debt += credit_share;

    debug!(%to_pool, %credit_share, "Premium collected");
    Ok(())
}
