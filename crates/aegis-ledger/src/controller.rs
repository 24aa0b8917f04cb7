//! Yield controller
//!
//! Idle vault liquidity can be deployed to an external yield strategy. The
//! strategy's tokens live in the asset book under [`Holder::Strategy`], so
//! `value_all` always reads `balance + strategy-held`.
//!
//! [`Holder::Strategy`]: aegis_common::Holder::Strategy

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Installed yield strategy and its running totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Controller {
    /// Strategy label, for logs
    pub name: String,
    /// Total moved into the strategy by `utilize`
    pub deployed: Decimal,
    /// Total pulled back to cover withdrawals or a migration
    pub recalled: Decimal,
    /// Total yield reported by the strategy
    pub earned: Decimal,
}

impl Controller {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deployed: Decimal::ZERO,
            recalled: Decimal::ZERO,
            earned: Decimal::ZERO,
        }
    }

    pub(crate) fn record_earn(&mut self, amount: Decimal) {
        self.deployed += amount;
    }

    pub(crate) fn record_recall(&mut self, amount: Decimal) {
        self.recalled += amount;
    }

    pub(crate) fn record_yield(&mut self, amount: Decimal) {
        self.earned += amount;
    }
}
