//! Two-phase withdrawal gate
//!
//! A depositor first requests a withdrawal; the request becomes usable after
//! the lockup period and stays usable for the withdrawable window. Share
//! transfers shrink the sender's request in proportion to the shares moved.

use crate::error::WithdrawalError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Pending withdrawal request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// First second at which the request may be executed (Unix seconds)
    pub unlocks_at: i64,
    /// Shares still claimable under this request
    pub amount: Decimal,
}

impl WithdrawalRequest {
    /// Stamp a new request made at `now`
    pub fn new(now: i64, lockup_secs: i64, amount: Decimal) -> Self {
        Self {
            unlocks_at: now + lockup_secs,
            amount,
        }
    }

    /// Last second at which the request may be executed
    pub fn closes_at(&self, window_secs: i64) -> i64 {
        self.unlocks_at + window_secs
    }

    /// Check that `amount` may be withdrawn at `now`
    pub fn check(&self, now: i64, window_secs: i64, amount: Decimal) -> Result<(), WithdrawalError> {
        let closes_at = self.closes_at(window_secs);
        if now < self.unlocks_at || now > closes_at {
            return Err(WithdrawalError::WindowClosed {
                opens_at: self.unlocks_at,
                closes_at,
                now,
            });
        }
        if amount > self.amount {
            return Err(WithdrawalError::ExceedsRequest {
                requested: amount,
                pending: self.amount,
            });
        }
        Ok(())
    }

    /// Consume `amount` from the request
    pub fn consume(&mut self, amount: Decimal) {
        self.amount = (self.amount - amount).max(Decimal::ZERO);
    }

    /// Shrink the request after `moved` of `balance` shares left the holder
    pub fn shrink_for_transfer(&mut self, balance: Decimal, moved: Decimal) {
        if balance.is_zero() || moved >= balance {
            self.amount = Decimal::ZERO;
            return;
        }
        let remaining = balance - moved;
        self.amount = (self.amount * remaining / balance).floor();
    }
}
