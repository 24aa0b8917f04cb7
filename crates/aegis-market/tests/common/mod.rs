//! Shared harness for market integration tests
#![allow(dead_code)]

use std::sync::Arc;

use aegis_common::{Holder, IndexId, IndexParameters, ManualClock, PoolId, ProtocolConfig, Result};
use aegis_market::{FlatRatePremium, PremiumModel, Protocol};
use rust_decimal::Decimal;

pub const START: i64 = 1_700_000_000;
pub const DAY: i64 = aegis_common::SECONDS_PER_DAY;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Charges the same premium for any policy
pub struct FixedPremium(pub Decimal);

impl PremiumModel for FixedPremium {
    fn premium(
        &self,
        _pool: PoolId,
        _amount: Decimal,
        _span_secs: i64,
        _total_liquidity: Decimal,
        _locked_amount: Decimal,
    ) -> Result<Decimal> {
        Ok(self.0)
    }
}

pub struct Harness {
    pub protocol: Protocol,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Market where coverage is free, so balances stay round
    pub fn new() -> Self {
        Self::with_premium(Arc::new(FlatRatePremium::new(Decimal::ZERO)))
    }

    pub fn with_premium(model: Arc<dyn PremiumModel>) -> Self {
        init_tracing();
        let clock = Arc::new(ManualClock::new(START));
        let protocol = Protocol::new(ProtocolConfig::default())
            .with_clock(clock.clone())
            .with_premium_model(model);
        Self { protocol, clock }
    }

    pub fn advance(&self, secs: i64) -> i64 {
        self.clock.advance(secs)
    }

    /// Account holding `amount` underlying tokens
    pub fn funded(&self, name: &str, amount: Decimal) -> Holder {
        let holder = Holder::account(name);
        self.protocol.mint_asset(&holder, amount).unwrap();
        holder
    }

    pub fn pool_with_lp(&self, lp: &str, amount: Decimal) -> PoolId {
        let pool = self.protocol.create_pool(lp, None).unwrap();
        if !amount.is_zero() {
            let lp = self.funded(lp, amount);
            self.protocol.pool_deposit(pool, &lp, amount).unwrap();
        }
        pool
    }

    pub fn index(&self, leverage: Decimal) -> IndexId {
        let params = IndexParameters {
            target_leverage: leverage,
            ..IndexParameters::default()
        };
        self.protocol.create_index("index", Some(params)).unwrap()
    }

    pub fn asset_balance(&self, holder: &Holder) -> Decimal {
        self.protocol.read(|s| s.vault().asset_balance_of(holder))
    }

    pub fn vault_value(&self, holder: &Holder) -> Decimal {
        self.protocol.read(|s| s.vault().value_of(holder).unwrap())
    }

    pub fn total_liquidity(&self, pool: PoolId) -> Decimal {
        self.protocol
            .read(|s| s.pool(pool).unwrap().total_liquidity(s.vault()).unwrap())
    }

    pub fn locked(&self, pool: PoolId) -> Decimal {
        self.protocol.read(|s| s.pool(pool).unwrap().locked_amount())
    }

    pub fn credit(&self, pool: PoolId, source: &Holder) -> Decimal {
        self.protocol.read(|s| s.pool(pool).unwrap().credit_of(source))
    }
}
