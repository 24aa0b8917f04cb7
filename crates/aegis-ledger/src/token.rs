//! Underlying asset book
//!
//! Per-holder balances of the pooled asset. The vault, its yield strategy
//! and every participant keep their tokens here; the ledger's own books
//! (attributions, debt) sit on top of it.

use aegis_common::error::LedgerError;
use aegis_common::{ensure_amount, Holder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Balances of the underlying asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenBook {
    balances: BTreeMap<Holder, Decimal>,
    total_supply: Decimal,
}

impl TokenBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance held by `holder`
    #[inline]
    pub fn balance_of(&self, holder: &Holder) -> Decimal {
        self.balances.get(holder).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_supply(&self) -> Decimal {
        self.total_supply
    }

    /// Bridge new tokens into the book
    pub fn mint(&mut self, to: &Holder, amount: Decimal) -> Result<(), LedgerError> {
        if !ensure_amount(amount) {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(to.clone()));
        }

        *self.balances.entry(to.clone()).or_default() += amount;
        self.total_supply += amount;
        Ok(())
    }

    /// Check that `from` can send `amount` without moving anything
    pub fn check_transfer(&self, from: &Holder, to: &Holder, amount: Decimal) -> Result<(), LedgerError> {
        if amount.is_sign_negative() || !amount.fract().is_zero() {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if to.is_null() {
            return Err(LedgerError::InvalidRecipient(to.clone()));
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                holder: from.clone(),
                required: amount,
                available,
            });
        }
        Ok(())
    }

    /// Move `amount` from `from` to `to`; zero is a no-op
    pub fn transfer(&mut self, from: &Holder, to: &Holder, amount: Decimal) -> Result<(), LedgerError> {
        self.check_transfer(from, to, amount)?;
        if amount.is_zero() || from == to {
            return Ok(());
        }

        let remaining = self.balance_of(from) - amount;
        if remaining.is_zero() {
            self.balances.remove(from);
        } else {
            self.balances.insert(from.clone(), remaining);
        }
        *self.balances.entry(to.clone()).or_default() += amount;
        Ok(())
    }

    /// Iterate over non-zero balances
    pub fn iter(&self) -> impl Iterator<Item = (&Holder, &Decimal)> {
        self.balances.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_mint_and_transfer() {
        let mut book = TokenBook::new();
        let alice = Holder::account("alice");
        let bob = Holder::account("bob");

        book.mint(&alice, dec!(100)).unwrap();
        book.transfer(&alice, &bob, dec!(40)).unwrap();

        assert_eq!(book.balance_of(&alice), dec!(60));
        assert_eq!(book.balance_of(&bob), dec!(40));
        assert_eq!(book.total_supply(), dec!(100));
    }

    #[test]
    fn test_insufficient_balance() {
        let mut book = TokenBook::new();
        let alice = Holder::account("alice");
        book.mint(&alice, dec!(10)).unwrap();

        let result = book.transfer(&alice, &Holder::Vault, dec!(11));
        assert!(matches!(result, Err(LedgerError::InsufficientBalance { .. })));
        assert_eq!(book.balance_of(&alice), dec!(10));
    }

    #[test]
    fn test_null_recipient_rejected() {
        let mut book = TokenBook::new();
        let alice = Holder::account("alice");
        book.mint(&alice, dec!(10)).unwrap();

        assert!(matches!(
            book.transfer(&alice, &Holder::account(""), dec!(1)),
            Err(LedgerError::InvalidRecipient(_))
        ));
        assert!(book.mint(&Holder::account(""), dec!(1)).is_err());
    }

    #[test]
    fn test_fractional_amounts_rejected() {
        let mut book = TokenBook::new();
        assert!(matches!(
            book.mint(&Holder::account("alice"), dec!(0.5)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }
}
