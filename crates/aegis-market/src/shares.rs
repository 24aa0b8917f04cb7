//! LP share book with a two-phase withdrawal gate
//!
//! Used by risk pools (direct liquidity providers) and aggregators alike.
//! Withdrawing requires a request that matured after the lockup and is still
//! inside its withdrawable window. Share transfers shrink the sender's
//! request in proportion; the receiver gets no request.

use std::collections::BTreeMap;

use aegis_common::error::WithdrawalError;
use aegis_common::{Holder, WithdrawalRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShareBook {
    balances: BTreeMap<Holder, Decimal>,
    total_supply: Decimal,
    requests: BTreeMap<Holder, WithdrawalRequest>,
}

impl ShareBook {
    pub fn balance_of(&self, holder: &Holder) -> Decimal {
        self.balances.get(holder).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn total_supply(&self) -> Decimal {
        self.total_supply
    }

    pub fn request_of(&self, holder: &Holder) -> Option<&WithdrawalRequest> {
        self.requests.get(holder)
    }

    /// `(required, held)` when `holder` has fewer than `amount` shares
    pub fn shortfall(&self, holder: &Holder, amount: Decimal) -> Option<(Decimal, Decimal)> {
        let held = self.balance_of(holder);
        (held < amount).then_some((amount, held))
    }

    pub fn mint(&mut self, to: &Holder, amount: Decimal) {
        *self.balances.entry(to.clone()).or_default() += amount;
        self.total_supply += amount;
    }

    /// Burn shares and consume them from the holder's request
    pub fn burn(&mut self, from: &Holder, amount: Decimal) {
        self.debit(from, amount);
        self.total_supply -= amount;
        if let Some(request) = self.requests.get_mut(from) {
            request.consume(amount);
            if request.amount.is_zero() {
                self.requests.remove(from);
            }
        }
    }

    /// Stamp a new request, replacing any previous one
    pub fn request_withdraw(
        &mut self,
        holder: &Holder,
        amount: Decimal,
        now: i64,
        lockup_secs: i64,
    ) -> WithdrawalRequest {
        let request = WithdrawalRequest::new(now, lockup_secs, amount);
        self.requests.insert(holder.clone(), request);
        request
    }

    pub fn check_withdraw(
        &self,
        holder: &Holder,
        amount: Decimal,
        now: i64,
        window_secs: i64,
    ) -> Result<(), WithdrawalError> {
        self.requests
            .get(holder)
            .ok_or(WithdrawalError::NoRequest)?
            .check(now, window_secs, amount)
    }

    pub fn transfer(&mut self, from: &Holder, to: &Holder, amount: Decimal) {
        let balance = self.balance_of(from);
        if let Some(request) = self.requests.get_mut(from) {
            request.shrink_for_transfer(balance, amount);
            if request.amount.is_zero() {
                self.requests.remove(from);
            }
        }
        self.debit(from, amount);
        *self.balances.entry(to.clone()).or_default() += amount;
    }

    pub fn holders(&self) -> impl Iterator<Item = (&Holder, &Decimal)> {
        self.balances.iter()
    }

    fn debit(&mut self, from: &Holder, amount: Decimal) {
        let remaining = self.balance_of(from) - amount;
        if remaining.is_zero() {
            self.balances.remove(from);
        } else {
            self.balances.insert(from.clone(), remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_request_then_burn() {
        let mut book = ShareBook::default();
        let alice = Holder::account("alice");
        book.mint(&alice, dec!(100));
        book.request_withdraw(&alice, dec!(60), 0, 10);

        assert!(book.check_withdraw(&alice, dec!(60), 5, 5).is_err());
        assert!(book.check_withdraw(&alice, dec!(60), 10, 5).is_ok());

        book.burn(&alice, dec!(60));
        assert_eq!(book.balance_of(&alice), dec!(40));
        assert!(book.request_of(&alice).is_none());
        assert_eq!(
            book.check_withdraw(&alice, dec!(1), 10, 5),
            Err(WithdrawalError::NoRequest)
        );
    }

    #[test]
    fn test_transfer_shrinks_sender_request_only() {
        let mut book = ShareBook::default();
        let alice = Holder::account("alice");
        let bob = Holder::account("bob");
        book.mint(&alice, dec!(100));
        book.request_withdraw(&alice, dec!(80), 0, 0);

        book.transfer(&alice, &bob, dec!(50));
        assert_eq!(book.request_of(&alice).unwrap().amount, dec!(40));
        assert!(book.request_of(&bob).is_none());
        assert_eq!(book.total_supply(), dec!(100));
    }

    #[test]
    fn test_shortfall() {
        let mut book = ShareBook::default();
        let alice = Holder::account("alice");
        book.mint(&alice, dec!(5));
        assert_eq!(book.shortfall(&alice, dec!(6)), Some((dec!(6), dec!(5))));
        assert_eq!(book.shortfall(&alice, dec!(5)), None);
    }
}
