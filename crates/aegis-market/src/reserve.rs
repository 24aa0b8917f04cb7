//! Compensation backstop
//!
//! The reserve collects the governance fee on every premium plus direct
//! deposits, and covers aggregator shortfalls when a pool's losses exceed
//! what the aggregator can pay.

use aegis_common::error::PoolError;
use aegis_common::{ensure_amount, mul_div_floor, Holder, Result};
use aegis_ledger::Vault;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::shares::ShareBook;

/// Last-resort compensation for shortfalls
pub trait CompensationBackstop {
    /// Cover up to `amount` of value for `beneficiary`; returns the amount
    /// covered. Zero is a valid request.
    fn compensate(&mut self, vault: &mut Vault, amount: Decimal, beneficiary: &Holder)
        -> Result<Decimal>;
}

/// Reserve pool backing the protocol
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reserve {
    shares: ShareBook,
    /// Total value handed out through `compensate`
    total_compensated: Decimal,
}

impl Reserve {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder() -> Holder {
        Holder::Reserve
    }

    /// Value held by the reserve in the vault
    pub fn value(&self, vault: &Vault) -> Result<Decimal> {
        vault.value_of(&Holder::Reserve)
    }

    pub fn shares_of(&self, holder: &Holder) -> Decimal {
        self.shares.balance_of(holder)
    }

    pub fn total_supply(&self) -> Decimal {
        self.shares.total_supply()
    }

    pub fn total_compensated(&self) -> Decimal {
        self.total_compensated
    }

    /// Deposit `amount` from `depositor`; returns the reserve shares minted
    pub fn deposit(&mut self, vault: &mut Vault, depositor: &Holder, amount: Decimal) -> Result<Decimal> {
        if !ensure_amount(amount) {
            return Err(aegis_common::error::LedgerError::InvalidAmount(amount).into());
        }
        let value = self.value(vault)?;
        let supply = self.shares.total_supply();
        let minted = if supply.is_zero() {
            amount
        } else if value.is_zero() {
            return Err(PoolError::InvalidState {
                operation: "reserve deposit",
                status: "insolvent".to_string(),
            }
            .into());
        } else {
            mul_div_floor(amount, supply, value)?
        };

        vault.add_value(&Holder::Reserve, amount, depositor, &Holder::Reserve)?;
        self.shares.mint(depositor, minted);

        info!(depositor = %depositor, %amount, %minted, "Reserve deposit");
        Ok(minted)
    }
}

impl CompensationBackstop for Reserve {
    fn compensate(
        &mut self,
        vault: &mut Vault,
        amount: Decimal,
        beneficiary: &Holder,
    ) -> Result<Decimal> {
        if amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        let value = self.value(vault)?;
        let covered = amount.min(value);
        if covered.is_zero() {
            warn!(%amount, beneficiary = %beneficiary, "Reserve is empty");
            return Ok(Decimal::ZERO);
        }

        vault.transfer_value(&Holder::Reserve, covered, beneficiary)?;
        self.total_compensated += covered;

        if covered < amount {
            warn!(%amount, %covered, beneficiary = %beneficiary, "Reserve compensation short");
        } else {
            info!(%covered, beneficiary = %beneficiary, "Reserve compensation");
        }
        Ok(covered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn setup() -> (Vault, Reserve) {
        let mut vault = Vault::new();
        vault.register_source(Holder::Reserve);
        vault.mint_asset(&Holder::account("lp"), dec!(10000)).unwrap();
        (vault, Reserve::new())
    }

    #[test]
    fn test_deposit_mints_shares() {
        let (mut vault, mut reserve) = setup();
        let lp = Holder::account("lp");

        assert_eq!(reserve.deposit(&mut vault, &lp, dec!(1000)).unwrap(), dec!(1000));
        assert_eq!(reserve.value(&vault).unwrap(), dec!(1000));
        assert_eq!(reserve.shares_of(&lp), dec!(1000));
    }

    #[test]
    fn test_compensate_caps_at_value() {
        let (mut vault, mut reserve) = setup();
        let lp = Holder::account("lp");
        let index = Holder::account("index");
        reserve.deposit(&mut vault, &lp, dec!(300)).unwrap();

        assert_eq!(reserve.compensate(&mut vault, Decimal::ZERO, &index).unwrap(), Decimal::ZERO);
        assert_eq!(reserve.compensate(&mut vault, dec!(500), &index).unwrap(), dec!(300));
        assert_eq!(vault.value_of(&index).unwrap(), dec!(300));
        assert_eq!(reserve.value(&vault).unwrap(), Decimal::ZERO);
        assert_eq!(reserve.compensate(&mut vault, dec!(1), &index).unwrap(), Decimal::ZERO);
        assert_eq!(reserve.total_compensated(), dec!(300));
    }
}
