//! Aggregators (indices)
//!
//! An aggregator takes deposits on behalf of many depositors, holds them as
//! its own vault attribution, and fans that liquidity out as credit to a
//! weighted list of risk pools at a target leverage.

pub mod allocation;
pub mod slots;

use aegis_common::error::IndexError;
use aegis_common::{Holder, IndexId, IndexParameters, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::shares::ShareBook;

pub use allocation::{plan, AllocationPlan, CreditMove, MoveKind, PoolClass, PoolSnapshot};
pub use slots::{PoolSlots, Slot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub id: IndexId,
    pub name: String,
    pub params: IndexParameters,
    paused: bool,
    /// Set while a listed pool is settling an incident
    locked: bool,
    pub(crate) slots: PoolSlots,
    pub(crate) shares: ShareBook,
    /// Credit allocated across all listed pools after the last rebalance
    pub(crate) total_allocated_credit: Decimal,
}

impl Index {
    pub fn new(name: impl Into<String>, params: IndexParameters) -> Self {
        Self {
            id: IndexId::new(),
            name: name.into(),
            params,
            paused: false,
            locked: false,
            slots: PoolSlots::default(),
            shares: ShareBook::default(),
            total_allocated_credit: Decimal::ZERO,
        }
    }

    /// The aggregator's identity in the vault and in pools
    pub fn holder(&self) -> Holder {
        Holder::Index(self.id)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub(crate) fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    pub(crate) fn ensure_unlocked(&self, operation: &'static str) -> Result<()> {
        if self.locked {
            return Err(IndexError::InvalidState {
                operation,
                reason: "a listed pool is settling claims".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub(crate) fn ensure_accepting(&self, operation: &'static str) -> Result<()> {
        if self.paused {
            return Err(IndexError::InvalidState {
                operation,
                reason: "aggregator is paused".to_string(),
            }
            .into());
        }
        self.ensure_unlocked(operation)
    }

    pub fn slots(&self) -> &PoolSlots {
        &self.slots
    }

    pub fn total_allocated_credit(&self) -> Decimal {
        self.total_allocated_credit
    }

    pub fn total_supply(&self) -> Decimal {
        self.shares.total_supply()
    }

    pub fn shares_of(&self, holder: &Holder) -> Decimal {
        self.shares.balance_of(holder)
    }

    pub fn shares(&self) -> &ShareBook {
        &self.shares
    }

    pub(crate) fn set_leverage(&mut self, target_leverage: Decimal) -> Result<()> {
        if target_leverage < Decimal::ONE {
            return Err(IndexError::InvalidLeverage(format!(
                "target leverage {} is below 1",
                target_leverage
            ))
            .into());
        }
        self.params.target_leverage = target_leverage;
        Ok(())
    }

    pub(crate) fn set_slack(&mut self, upper: Decimal, lower: Decimal) -> Result<()> {
        for slack in [upper, lower] {
            if slack < Decimal::ZERO || slack >= Decimal::ONE {
                return Err(IndexError::InvalidLeverage(format!(
                    "slack {} outside [0, 1)",
                    slack
                ))
                .into());
            }
        }
        self.params.upper_slack = upper;
        self.params.lower_slack = lower;
        Ok(())
    }
}
