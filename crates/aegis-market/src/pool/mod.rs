//! Risk pools
//!
//! A risk pool is one insurable market. Its capital comes from two sides:
//! - liquidity providers, whose deposits sit in the pool's own vault
//!   attribution (`original_liquidity`)
//! - credit sources (aggregators or registered accounts), whose credit is
//!   counted as capacity without moving any value
//!
//! The credit side earns a share of every premium through a
//! [`RewardAccumulator`]. Earned premium stays in the pool's attribution
//! (tracked as `attribution_debt`) until the source harvests it.
//!
//! Cross-component operations (premium intake, claims, rebalancing) live in
//! [`crate::engine`]; this module holds the pool's own state and views.

pub mod insurance;

use std::fmt;

use aegis_common::error::PoolError;
use aegis_common::{Holder, PoolId, PoolParameters, Result};
use aegis_ledger::Vault;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::accumulator::RewardAccumulator;
use crate::shares::ShareBook;

pub use insurance::{Incident, Insurance, InsuranceStatus};

/// Market status of a risk pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    Trading,
    /// Incident declared; claims open once the pending window ends
    Reporting,
    /// Claims are redeemable until the claim window closes
    Payout,
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketStatus::Trading => write!(f, "trading"),
            MarketStatus::Reporting => write!(f, "reporting"),
            MarketStatus::Payout => write!(f, "payout"),
        }
    }
}

/// One insurable market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskPool {
    pub id: PoolId,
    pub name: String,
    pub params: PoolParameters,
    status: MarketStatus,
    paused: bool,
    /// LP shares over `original_liquidity`
    pub(crate) lp: ShareBook,
    pub(crate) credit: RewardAccumulator<Holder>,
    /// Attributions held for credit sources and not yet harvested
    pub(crate) attribution_debt: Decimal,
    pub(crate) locked_amount: Decimal,
    /// Lock left behind by redeemed policies, released on resume
    pub(crate) residual_lock: Decimal,
    pub(crate) insurances: Vec<Insurance>,
    pub(crate) incident: Option<Incident>,
}

impl RiskPool {
    pub fn new(name: impl Into<String>, params: PoolParameters) -> Self {
        Self {
            id: PoolId::new(),
            name: name.into(),
            params,
            status: MarketStatus::Trading,
            paused: false,
            lp: ShareBook::default(),
            credit: RewardAccumulator::new(),
            attribution_debt: Decimal::ZERO,
            locked_amount: Decimal::ZERO,
            residual_lock: Decimal::ZERO,
            insurances: Vec::new(),
            incident: None,
        }
    }

    /// The pool's identity in the vault
    pub fn holder(&self) -> Holder {
        Holder::Pool(self.id)
    }

    // ----- status -----

    /// Stored status, without applying elapsed windows
    pub fn stored_status(&self) -> MarketStatus {
        self.status
    }

    /// Status as of `now`: a reporting pool enters payout once its pending
    /// window has elapsed
    pub fn status_at(&self, now: i64) -> MarketStatus {
        match (&self.status, &self.incident) {
            (MarketStatus::Reporting, Some(incident)) if now >= incident.pending_end => {
                MarketStatus::Payout
            }
            (status, _) => *status,
        }
    }

    /// Apply elapsed windows to the stored status
    pub(crate) fn refresh(&mut self, now: i64) {
        self.status = self.status_at(now);
    }

    pub(crate) fn set_status(&mut self, status: MarketStatus) {
        self.status = status;
    }

    /// Whether claims are pending or open against the pool
    pub fn is_settling(&self) -> bool {
        self.status != MarketStatus::Trading
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub(crate) fn ensure_trading(&self, operation: &'static str) -> Result<()> {
        if self.status != MarketStatus::Trading {
            return Err(PoolError::InvalidState {
                operation,
                status: self.status.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Trading and not paused
    pub(crate) fn ensure_open(&self, operation: &'static str) -> Result<()> {
        self.ensure_trading(operation)?;
        if self.paused {
            return Err(PoolError::InvalidState {
                operation,
                status: "paused".to_string(),
            }
            .into());
        }
        Ok(())
    }

    // ----- liquidity views -----

    /// LP-side value: the pool's vault value minus premium held for credit
    /// sources
    pub fn original_liquidity(&self, vault: &Vault) -> Result<Decimal> {
        let own = vault.value_of(&self.holder())?;
        let held_for_sources = vault.attribution_value(self.attribution_debt)?;
        Ok((own - held_for_sources).max(Decimal::ZERO))
    }

    /// LP liquidity plus credit, before outstanding claim debt
    pub fn gross_liquidity(&self, vault: &Vault) -> Result<Decimal> {
        Ok(self.original_liquidity(vault)? + self.credit.total_credit())
    }

    /// Capital backing the pool's policies
    pub fn total_liquidity(&self, vault: &Vault) -> Result<Decimal> {
        let debt = vault.debt_of(&self.holder());
        Ok((self.gross_liquidity(vault)? - debt).max(Decimal::ZERO))
    }

    /// Capital not locked against policies
    pub fn available_balance(&self, vault: &Vault) -> Result<Decimal> {
        Ok((self.total_liquidity(vault)? - self.locked_amount).max(Decimal::ZERO))
    }

    pub fn locked_amount(&self) -> Decimal {
        self.locked_amount
    }

    pub fn residual_lock(&self) -> Decimal {
        self.residual_lock
    }

    /// Locked capital over total liquidity
    pub fn utilization_rate(&self, vault: &Vault) -> Result<Decimal> {
        let liquidity = self.total_liquidity(vault)?;
        if liquidity.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Ok(self.locked_amount / liquidity)
    }

    // ----- LP views -----

    pub fn total_supply(&self) -> Decimal {
        self.lp.total_supply()
    }

    pub fn shares_of(&self, holder: &Holder) -> Decimal {
        self.lp.balance_of(holder)
    }

    pub fn shares(&self) -> &ShareBook {
        &self.lp
    }

    /// Underlying value per LP share; `None` before the first deposit
    pub fn rate(&self, vault: &Vault) -> Result<Option<Decimal>> {
        let supply = self.lp.total_supply();
        if supply.is_zero() {
            return Ok(None);
        }
        Ok(Some(self.original_liquidity(vault)? / supply))
    }

    /// Underlying value of a holder's LP shares
    pub fn value_of_underlying(&self, holder: &Holder, vault: &Vault) -> Result<Decimal> {
        self.shares_to_value(self.lp.balance_of(holder), vault)
    }

    pub(crate) fn shares_to_value(&self, shares: Decimal, vault: &Vault) -> Result<Decimal> {
        let supply = self.lp.total_supply();
        if supply.is_zero() || shares.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Ok(aegis_common::mul_div_floor(
            shares,
            self.original_liquidity(vault)?,
            supply,
        )?)
    }

    // ----- credit views -----

    pub fn total_credit(&self) -> Decimal {
        self.credit.total_credit()
    }

    pub fn credit_of(&self, source: &Holder) -> Decimal {
        self.credit.credit_of(source)
    }

    pub fn credit(&self) -> &RewardAccumulator<Holder> {
        &self.credit
    }

    pub fn attribution_debt(&self) -> Decimal {
        self.attribution_debt
    }

    /// Unharvested premium of `source`, in underlying value
    pub fn pending_premium(&self, source: &Holder, vault: &Vault) -> Result<Decimal> {
        vault.attribution_value(self.credit.pending(source))
    }

    /// Credit plus unharvested premium
    pub fn backing_of(&self, source: &Holder, vault: &Vault) -> Result<Decimal> {
        Ok(self.credit.credit_of(source) + self.pending_premium(source, vault)?)
    }

    /// Credit `source` could withdraw right now
    pub fn withdrawable_credit(&self, source: &Holder, vault: &Vault) -> Result<Decimal> {
        Ok(self
            .credit
            .credit_of(source)
            .min(self.available_balance(vault)?))
    }

    /// Room left under the pool's credit ceiling
    pub fn credit_room(&self) -> Option<Decimal> {
        self.params
            .max_credit
            .map(|ceiling| (ceiling - self.credit.total_credit()).max(Decimal::ZERO))
    }

    /// Aggregators currently allocating credit to the pool
    pub fn credit_indices(&self) -> Vec<aegis_common::IndexId> {
        self.credit
            .holders()
            .filter_map(|(holder, _)| holder.as_index())
            .collect()
    }

    // ----- policies -----

    pub fn insurances(&self) -> &[Insurance] {
        &self.insurances
    }

    pub fn insurance(&self, id: u64) -> Result<&Insurance> {
        self.insurances
            .get(id as usize)
            .ok_or_else(|| PoolError::PolicyNotFound(id).into())
    }

    pub(crate) fn insurance_mut(&mut self, id: u64) -> Result<&mut Insurance> {
        self.insurances
            .get_mut(id as usize)
            .ok_or_else(|| PoolError::PolicyNotFound(id).into())
    }

    pub fn incident(&self) -> Option<&Incident> {
        self.incident.as_ref()
    }
}
