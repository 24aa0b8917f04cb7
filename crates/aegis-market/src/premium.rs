//! Premium models
//!
//! Pricing is a collaborator of the risk pool: the pool asks the model for a
//! quote when a policy is bought and only checks it against the buyer's
//! maximum cost.

use aegis_common::error::PoolError;
use aegis_common::{mul_div_ceil, PoolId, Result, SECONDS_PER_YEAR};
use rust_decimal::Decimal;

/// Prices coverage for a risk pool
pub trait PremiumModel: Send + Sync {
    /// Premium for covering `amount` for `span_secs`.
    ///
    /// Fails with `ExceedsAvailable` when `amount` is larger than the pool's
    /// unlocked liquidity.
    fn premium(
        &self,
        pool: PoolId,
        amount: Decimal,
        span_secs: i64,
        total_liquidity: Decimal,
        locked_amount: Decimal,
    ) -> Result<Decimal>;
}

/// Constant annual rate, pro-rated by the coverage span and rounded up
#[derive(Debug, Clone, Copy)]
pub struct FlatRatePremium {
    pub annual_rate: Decimal,
}

impl FlatRatePremium {
    pub fn new(annual_rate: Decimal) -> Self {
        Self { annual_rate }
    }
}

impl PremiumModel for FlatRatePremium {
    fn premium(
        &self,
        _pool: PoolId,
        amount: Decimal,
        span_secs: i64,
        total_liquidity: Decimal,
        locked_amount: Decimal,
    ) -> Result<Decimal> {
        let available = (total_liquidity - locked_amount).max(Decimal::ZERO);
        if amount > available {
            return Err(PoolError::ExceedsAvailable {
                requested: amount,
                available,
            }
            .into());
        }

        let annual = amount * self.annual_rate;
        Ok(mul_div_ceil(
            annual,
            Decimal::from(span_secs),
            Decimal::from(SECONDS_PER_YEAR),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_common::ErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn test_full_year_premium() {
        let model = FlatRatePremium::new(dec!(0.05));
        let premium = model
            .premium(PoolId::new(), dec!(10000), SECONDS_PER_YEAR, dec!(20000), Decimal::ZERO)
            .unwrap();
        assert_eq!(premium, dec!(500));
    }

    #[test]
    fn test_partial_span_rounds_up() {
        let model = FlatRatePremium::new(dec!(0.05));
        // 10000 * 0.05 * 7 / 365 = 9.589...
        let premium = model
            .premium(PoolId::new(), dec!(10000), 7 * 86_400, dec!(20000), Decimal::ZERO)
            .unwrap();
        assert_eq!(premium, dec!(10));
    }

    #[test]
    fn test_exceeds_available() {
        let model = FlatRatePremium::new(dec!(0.05));
        let err = model
            .premium(PoolId::new(), dec!(10001), SECONDS_PER_YEAR, dec!(20000), dec!(10000))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    }
}
