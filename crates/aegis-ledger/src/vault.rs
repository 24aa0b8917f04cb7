//! Vault ledger
//!
//! Converts the pooled asset into proportional ownership units
//! ("attributions") and tracks debt owed back to the pool.
//!
//! Book-keeping identities, preserved by every operation:
//! - `balance == idle + total_debt`, where `idle` is the vault's own token
//!   balance
//! - `value_all == balance + strategy-held`
//! - `Σ attribution_of == total_attributions`
//!
//! Every operation validates all preconditions before the first mutation, so
//! a failed call leaves the vault untouched.

use std::collections::{BTreeMap, BTreeSet};

use aegis_common::error::LedgerError;
use aegis_common::{
    ensure_amount, mul_div_ceil, mul_div_floor, split_by_weights, AegisError, Holder, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::controller::Controller;
use crate::token::TokenBook;

/// The vault ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vault {
    /// Underlying asset balances of every holder, the vault included
    asset: TokenBook,
    /// Book balance: idle tokens plus outstanding debt receivables
    balance: Decimal,
    total_attributions: Decimal,
    attributions: BTreeMap<Holder, Decimal>,
    total_debt: Decimal,
    debts: BTreeMap<Holder, Decimal>,
    /// Holders allowed to mint, borrow and settle debt
    sources: BTreeSet<Holder>,
    controller: Option<Controller>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    // ----- capital-source registry -----

    /// Allow `holder` to call the source-gated entry points
    pub fn register_source(&mut self, holder: Holder) -> bool {
        let added = self.sources.insert(holder.clone());
        if added {
            info!(source = %holder, "Registered capital source");
        }
        added
    }

    pub fn deregister_source(&mut self, holder: &Holder) -> bool {
        self.sources.remove(holder)
    }

    pub fn is_source(&self, holder: &Holder) -> bool {
        self.sources.contains(holder)
    }

    // ----- views -----

    /// Book balance (idle tokens plus debt receivables)
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Total value backing all attributions
    pub fn value_all(&self) -> Decimal {
        self.balance + self.strategy_held()
    }

    /// Tokens sitting in the vault itself
    pub fn idle(&self) -> Decimal {
        self.asset.balance_of(&Holder::Vault)
    }

    pub fn strategy_held(&self) -> Decimal {
        self.asset.balance_of(&Holder::Strategy)
    }

    pub fn total_attributions(&self) -> Decimal {
        self.total_attributions
    }

    pub fn attribution_of(&self, holder: &Holder) -> Decimal {
        self.attributions.get(holder).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_debt(&self) -> Decimal {
        self.total_debt
    }

    pub fn debt_of(&self, holder: &Holder) -> Decimal {
        self.debts.get(holder).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn attributions(&self) -> impl Iterator<Item = (&Holder, &Decimal)> {
        self.attributions.iter()
    }

    pub fn debts(&self) -> impl Iterator<Item = (&Holder, &Decimal)> {
        self.debts.iter()
    }

    pub fn controller(&self) -> Option<&Controller> {
        self.controller.as_ref()
    }

    /// Underlying asset balances
    pub fn asset(&self) -> &TokenBook {
        &self.asset
    }

    /// Value of `attributions` units at the current rate, rounded down
    pub fn attribution_value(&self, attributions: Decimal) -> Result<Decimal> {
        if self.total_attributions.is_zero() || attributions.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Ok(mul_div_floor(
            attributions,
            self.value_all(),
            self.total_attributions,
        )?)
    }

    /// Attributions a deposit of `amount` would mint now; zero when it is
    /// worth less than one unit
    pub fn attributions_for(&self, amount: Decimal) -> Result<Decimal> {
        if self.total_attributions.is_zero() {
            return Ok(amount);
        }
        Ok(mul_div_floor(amount, self.total_attributions, self.value_all())?)
    }

    /// Underlying value of a holder's attributions
    pub fn value_of(&self, holder: &Holder) -> Result<Decimal> {
        self.attribution_value(self.attribution_of(holder))
    }

    // ----- asset book -----

    /// Bridge fresh tokens to an external holder
    pub fn mint_asset(&mut self, to: &Holder, amount: Decimal) -> Result<()> {
        ensure_external(to)?;
        self.asset.mint(to, amount)?;
        Ok(())
    }

    /// Move tokens between external holders
    pub fn transfer_asset(&mut self, from: &Holder, to: &Holder, amount: Decimal) -> Result<()> {
        ensure_external(from)?;
        ensure_external(to)?;
        self.asset.transfer(from, to, amount)?;
        Ok(())
    }

    pub fn asset_balance_of(&self, holder: &Holder) -> Decimal {
        self.asset.balance_of(holder)
    }

    // ----- attribution operations -----

    /// Pull `amount` from `from` and mint attributions to `to`
    #[instrument(level = "debug", skip_all, fields(caller = %caller, to = %to, %amount))]
    pub fn add_value(
        &mut self,
        caller: &Holder,
        amount: Decimal,
        from: &Holder,
        to: &Holder,
    ) -> Result<Decimal> {
        self.ensure_source(caller)?;
        ensure_positive(amount)?;
        ensure_attribution_recipient(to)?;
        self.asset.check_transfer(from, &Holder::Vault, amount)?;
        let minted = self.mint_for(amount)?;

        self.asset.transfer(from, &Holder::Vault, amount)?;
        self.balance += amount;
        self.credit_attribution(to, minted);

        debug!(%amount, %minted, "Value added");
        Ok(minted)
    }

    /// One mint split across `recipients` by `weights`.
    ///
    /// Shares round down; the remainder goes to the last recipient with a
    /// non-zero weight.
    #[instrument(level = "debug", skip_all, fields(caller = %caller, %amount))]
    pub fn add_value_batch(
        &mut self,
        caller: &Holder,
        amount: Decimal,
        from: &Holder,
        recipients: &[Holder],
        weights: &[u64],
    ) -> Result<Vec<Decimal>> {
        self.ensure_source(caller)?;
        ensure_positive(amount)?;
        if recipients.is_empty() || recipients.len() != weights.len() {
            return Err(LedgerError::BatchMismatch {
                recipients: recipients.len(),
                weights: weights.len(),
            }
            .into());
        }
        for recipient in recipients {
            ensure_attribution_recipient(recipient)?;
        }
        self.asset.check_transfer(from, &Holder::Vault, amount)?;
        let minted = self.mint_for(amount)?;
        let shares = split_by_weights(minted, weights)?;

        self.asset.transfer(from, &Holder::Vault, amount)?;
        self.balance += amount;
        for (recipient, share) in recipients.iter().zip(&shares) {
            if !share.is_zero() {
                self.credit_attribution(recipient, *share);
            }
        }

        debug!(%amount, %minted, recipients = recipients.len(), "Value added in batch");
        Ok(shares)
    }

    /// Burn the caller's attributions worth `amount` and release `amount` to `to`.
    ///
    /// Returns the attributions burned.
    #[instrument(level = "debug", skip_all, fields(caller = %caller, to = %to, %amount))]
    pub fn withdraw_value(&mut self, caller: &Holder, amount: Decimal, to: &Holder) -> Result<Decimal> {
        ensure_positive(amount)?;
        ensure_external(to)?;
        let burn = self.burn_for_value(caller, amount)?;
        self.ensure_liquidity(amount)?;

        self.debit_attribution(caller, burn);
        self.pay_out(to, amount)?;
        self.balance -= amount;

        debug!(%amount, %burn, "Value withdrawn");
        Ok(burn)
    }

    /// Burn exactly `attributions` units and release their value to `to`.
    ///
    /// Returns the value released.
    #[instrument(level = "debug", skip_all, fields(caller = %caller, to = %to, %attributions))]
    pub fn withdraw_attribution(
        &mut self,
        caller: &Holder,
        attributions: Decimal,
        to: &Holder,
    ) -> Result<Decimal> {
        ensure_positive(attributions)?;
        ensure_external(to)?;
        self.ensure_attribution(caller, attributions)?;
        let value = self.attribution_value(attributions)?;
        self.ensure_liquidity(value)?;

        self.debit_attribution(caller, attributions);
        if !value.is_zero() {
            self.pay_out(to, value)?;
            self.balance -= value;
        }

        debug!(%attributions, %value, "Attribution withdrawn");
        Ok(value)
    }

    /// Burn all of the caller's attributions and release their value
    pub fn withdraw_all_attribution(&mut self, caller: &Holder, to: &Holder) -> Result<Decimal> {
        let held = self.attribution_of(caller);
        if held.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.withdraw_attribution(caller, held, to)
    }

    /// Move ownership units between holders
    #[instrument(level = "debug", skip_all, fields(caller = %caller, to = %to, %amount))]
    pub fn transfer_attribution(&mut self, caller: &Holder, amount: Decimal, to: &Holder) -> Result<()> {
        ensure_positive(amount)?;
        ensure_attribution_recipient(to)?;
        self.ensure_attribution(caller, amount)?;

        self.debit_attribution(caller, amount);
        self.credit_attribution(to, amount);
        Ok(())
    }

    /// Move the attributions worth `value` to `to`.
    ///
    /// Returns the attributions moved.
    #[instrument(level = "debug", skip_all, fields(caller = %caller, to = %to, %value))]
    pub fn transfer_value(&mut self, caller: &Holder, value: Decimal, to: &Holder) -> Result<Decimal> {
        ensure_positive(value)?;
        ensure_attribution_recipient(to)?;
        let units = self.burn_for_value(caller, value)?;

        self.debit_attribution(caller, units);
        self.credit_attribution(to, units);
        Ok(units)
    }

    /// Burn units without releasing value; remaining holders absorb it
    #[instrument(level = "debug", skip_all, fields(caller = %caller, %amount))]
    pub fn renounce_attribution(&mut self, caller: &Holder, amount: Decimal) -> Result<()> {
        ensure_positive(amount)?;
        self.ensure_attribution(caller, amount)?;

        self.debit_attribution(caller, amount);
        if self.total_attributions.is_zero() && !self.value_all().is_zero() {
            warn!(value_all = %self.value_all(), "Last attribution renounced; value is unowned");
        }
        Ok(())
    }

    pub fn renounce_all_attribution(&mut self, caller: &Holder) -> Result<Decimal> {
        let held = self.attribution_of(caller);
        if held.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.renounce_attribution(caller, held)?;
        Ok(held)
    }

    /// Raise `value_all` without minting
    #[instrument(level = "debug", skip_all, fields(payer = %payer, %amount))]
    pub fn add_balance(&mut self, payer: &Holder, amount: Decimal) -> Result<Decimal> {
        ensure_positive(amount)?;
        self.asset.check_transfer(payer, &Holder::Vault, amount)?;

        self.asset.transfer(payer, &Holder::Vault, amount)?;
        self.balance += amount;
        Ok(self.value_all())
    }

    // ----- debt operations -----

    /// Pay `amount` out to `to`, recording it as the caller's debt.
    ///
    /// `value_all` is unchanged: the debt is a receivable of the vault.
    #[instrument(level = "debug", skip_all, fields(caller = %caller, to = %to, %amount))]
    pub fn borrow_value(&mut self, caller: &Holder, amount: Decimal, to: &Holder) -> Result<()> {
        self.ensure_source(caller)?;
        ensure_positive(amount)?;
        ensure_external(to)?;
        self.ensure_liquidity(amount)?;

        *self.debts.entry(caller.clone()).or_default() += amount;
        self.total_debt += amount;
        self.pay_out(to, amount)?;

        debug!(%amount, total_debt = %self.total_debt, "Value borrowed");
        Ok(())
    }

    /// Shrink `target`'s debt with fresh tokens from `payer`
    #[instrument(level = "debug", skip_all, fields(payer = %payer, target = %target, %amount))]
    pub fn repay_debt(&mut self, payer: &Holder, amount: Decimal, target: &Holder) -> Result<()> {
        ensure_positive(amount)?;
        self.ensure_debt(target, amount)?;
        self.asset.check_transfer(payer, &Holder::Vault, amount)?;

        self.asset.transfer(payer, &Holder::Vault, amount)?;
        self.debit_debt(target, amount);

        debug!(%amount, total_debt = %self.total_debt, "Debt repaid");
        Ok(())
    }

    /// Burn the caller's attribution value to extinguish `target`'s debt
    #[instrument(level = "debug", skip_all, fields(caller = %caller, target = %target, %amount))]
    pub fn offset_debt(&mut self, caller: &Holder, amount: Decimal, target: &Holder) -> Result<Decimal> {
        self.ensure_source(caller)?;
        ensure_positive(amount)?;
        self.ensure_debt(target, amount)?;
        let burn = self.burn_for_value(caller, amount)?;

        self.debit_attribution(caller, burn);
        self.balance -= amount;
        self.debit_debt(target, amount);

        debug!(%amount, %burn, "Debt offset");
        Ok(burn)
    }

    /// Socialize the caller's debt onto the system sentinel
    #[instrument(level = "debug", skip_all, fields(caller = %caller, %amount))]
    pub fn transfer_debt(&mut self, caller: &Holder, amount: Decimal) -> Result<()> {
        self.ensure_source(caller)?;
        ensure_positive(amount)?;
        self.ensure_debt(caller, amount)?;

        self.debit_debt(caller, amount);
        *self.debts.entry(Holder::System).or_default() += amount;
        self.total_debt += amount;

        warn!(%amount, source = %caller, "Debt socialized to system");
        Ok(())
    }

    // ----- controller -----

    /// Install (or remove) the yield controller, pulling every token back
    /// from the previous strategy first.
    ///
    /// Returns the amount migrated.
    #[instrument(skip(self, controller))]
    pub fn set_controller(&mut self, controller: Option<Controller>) -> Result<Decimal> {
        let migrated = self.strategy_held();
        if !migrated.is_zero() {
            self.asset.transfer(&Holder::Strategy, &Holder::Vault, migrated)?;
            self.balance += migrated;
            if let Some(previous) = self.controller.as_mut() {
                previous.record_recall(migrated);
            }
        }

        info!(
            previous = self.controller.as_ref().map(|c| c.name.as_str()),
            next = controller.as_ref().map(|c| c.name.as_str()),
            %migrated,
            "Controller changed"
        );
        self.controller = controller;
        Ok(migrated)
    }

    /// Deploy all idle tokens to the strategy.
    ///
    /// Returns the amount deployed; zero when no controller is installed.
    pub fn utilize(&mut self) -> Result<Decimal> {
        let amount = self.idle();
        let Some(controller) = self.controller.as_mut() else {
            return Ok(Decimal::ZERO);
        };
        if amount.is_zero() {
            return Ok(Decimal::ZERO);
        }

        controller.record_earn(amount);
        self.asset.transfer(&Holder::Vault, &Holder::Strategy, amount)?;
        self.balance -= amount;

        debug!(%amount, "Idle liquidity deployed");
        Ok(amount)
    }

    /// Credit strategy profit; every attribution gains value pro-rata
    pub fn report_yield(&mut self, amount: Decimal) -> Result<()> {
        let Some(controller) = self.controller.as_mut() else {
            return Err(LedgerError::InvalidRecipient(Holder::Strategy).into());
        };
        ensure_positive(amount)?;
        controller.record_yield(amount);
        self.asset.mint(&Holder::Strategy, amount)?;
        Ok(())
    }

    // ----- internals -----

    fn ensure_source(&self, caller: &Holder) -> Result<()> {
        if self.sources.contains(caller) {
            Ok(())
        } else {
            Err(LedgerError::UnauthorizedSource(caller.clone()).into())
        }
    }

    fn ensure_attribution(&self, holder: &Holder, amount: Decimal) -> Result<()> {
        let held = self.attribution_of(holder);
        if held < amount {
            return Err(LedgerError::InsufficientAttribution {
                holder: holder.clone(),
                required: amount,
                held,
            }
            .into());
        }
        Ok(())
    }

    fn ensure_debt(&self, holder: &Holder, amount: Decimal) -> Result<()> {
        let outstanding = self.debt_of(holder);
        if outstanding < amount {
            return Err(LedgerError::InsufficientDebt {
                holder: holder.clone(),
                required: amount,
                outstanding,
            }
            .into());
        }
        Ok(())
    }

    /// Idle plus strategy tokens must cover a payout
    fn ensure_liquidity(&self, amount: Decimal) -> Result<()> {
        let reachable = self.idle() + self.strategy_held();
        if reachable < amount {
            return Err(LedgerError::InsufficientLiquidity {
                required: amount,
                idle: reachable,
            }
            .into());
        }
        Ok(())
    }

    /// Attributions to mint for a deposit of `amount` at the current rate
    fn mint_for(&self, amount: Decimal) -> Result<Decimal> {
        let minted = self.attributions_for(amount)?;
        if minted.is_zero() {
            return Err(LedgerError::InvalidAmount(amount).into());
        }
        Ok(minted)
    }

    /// Units to burn for `value`, rounded up and capped at the holder's units
    fn burn_for_value(&self, holder: &Holder, value: Decimal) -> Result<Decimal> {
        let available = self.value_of(holder)?;
        if value > available {
            return Err(LedgerError::InsufficientBalance {
                holder: holder.clone(),
                required: value,
                available,
            }
            .into());
        }
        let held = self.attribution_of(holder);
        let units = mul_div_ceil(value, self.total_attributions, self.value_all())?;
        Ok(units.min(held))
    }

    /// Send tokens out of the vault, recalling from the strategy when idle is short
    fn pay_out(&mut self, to: &Holder, amount: Decimal) -> Result<()> {
        let idle = self.idle();
        if idle < amount {
            let shortfall = amount - idle;
            self.asset.transfer(&Holder::Strategy, &Holder::Vault, shortfall)?;
            self.balance += shortfall;
            if let Some(controller) = self.controller.as_mut() {
                controller.record_recall(shortfall);
            }
            debug!(%shortfall, "Recalled liquidity from strategy");
        }
        self.asset.transfer(&Holder::Vault, to, amount)?;
        Ok(())
    }

    fn credit_attribution(&mut self, holder: &Holder, amount: Decimal) {
        *self.attributions.entry(holder.clone()).or_default() += amount;
        self.total_attributions += amount;
    }

    fn debit_attribution(&mut self, holder: &Holder, amount: Decimal) {
        let remaining = self.attribution_of(holder) - amount;
        if remaining.is_zero() {
            self.attributions.remove(holder);
        } else {
            self.attributions.insert(holder.clone(), remaining);
        }
        self.total_attributions -= amount;
    }

    fn debit_debt(&mut self, holder: &Holder, amount: Decimal) {
        let remaining = self.debt_of(holder) - amount;
        if remaining.is_zero() {
            self.debts.remove(holder);
        } else {
            self.debts.insert(holder.clone(), remaining);
        }
        self.total_debt -= amount;
    }
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if ensure_amount(amount) {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount).into())
    }
}

/// Token recipients: anyone but the null account and the engine's own accounts
fn ensure_external(holder: &Holder) -> Result<()> {
    if holder.is_null() || holder.is_internal() {
        return Err(AegisError::Ledger(LedgerError::InvalidRecipient(holder.clone())));
    }
    Ok(())
}

/// Attribution recipients follow the same rule as token recipients
fn ensure_attribution_recipient(holder: &Holder) -> Result<()> {
    ensure_external(holder)
}
