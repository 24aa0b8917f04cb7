//! Protocol configuration
//!
//! Defaults for newly created risk pools and aggregators, loadable from a
//! `.env` file and `AEGIS_` prefixed environment variables.

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, warn};

use crate::{SECONDS_PER_DAY, SECONDS_PER_YEAR};

/// Protocol-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Defaults applied to new risk pools
    pub pool: PoolParameters,
    /// Defaults applied to new aggregators
    pub index: IndexParameters,
    /// Annual rate of the reference premium model (0.05 = 5% per year)
    pub premium_rate: Decimal,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            pool: PoolParameters::default(),
            index: IndexParameters::default(),
            premium_rate: Decimal::new(5, 2),
        }
    }
}

impl ProtocolConfig {
    /// Load configuration from environment and `.env`
    pub fn load() -> Result<Self> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();

        // Pool settings
        if let Some(v) = env_parse("AEGIS_POOL_LOCKUP_SECS") {
            cfg.pool.lockup_secs = v;
        }
        if let Some(v) = env_parse("AEGIS_POOL_WITHDRAWABLE_SECS") {
            cfg.pool.withdrawable_secs = v;
        }
        if let Some(v) = env_parse("AEGIS_POOL_MIN_SPAN_SECS") {
            cfg.pool.min_span_secs = v;
        }
        if let Some(v) = env_parse("AEGIS_POOL_MAX_SPAN_SECS") {
            cfg.pool.max_span_secs = v;
        }
        if let Some(v) = env_parse("AEGIS_POOL_GRACE_SECS") {
            cfg.pool.grace_secs = v;
        }
        if let Some(v) = env_parse("AEGIS_POOL_CLAIM_WINDOW_SECS") {
            cfg.pool.claim_window_secs = v;
        }
        if let Some(v) = env_parse("AEGIS_POOL_FEE_RATE") {
            cfg.pool.fee_rate = v;
        }
        if let Some(v) = env_parse("AEGIS_POOL_MAX_CREDIT") {
            cfg.pool.max_credit = Some(v);
        }

        // Aggregator settings
        if let Some(v) = env_parse("AEGIS_INDEX_TARGET_LEVERAGE") {
            cfg.index.target_leverage = v;
        }
        if let Some(v) = env_parse("AEGIS_INDEX_UPPER_SLACK") {
            cfg.index.upper_slack = v;
        }
        if let Some(v) = env_parse("AEGIS_INDEX_LOWER_SLACK") {
            cfg.index.lower_slack = v;
        }
        if let Some(v) = env_parse("AEGIS_INDEX_LOCKUP_SECS") {
            cfg.index.lockup_secs = v;
        }
        if let Some(v) = env_parse("AEGIS_INDEX_WITHDRAWABLE_SECS") {
            cfg.index.withdrawable_secs = v;
        }

        if let Some(v) = env_parse("AEGIS_PREMIUM_RATE") {
            cfg.premium_rate = v;
        }

        cfg.validate()?;
        info!(
            pool_lockup_secs = cfg.pool.lockup_secs,
            pool_fee_rate = %cfg.pool.fee_rate,
            index_target_leverage = %cfg.index.target_leverage,
            premium_rate = %cfg.premium_rate,
            "Loaded protocol configuration"
        );
        Ok(cfg)
    }

    /// Reject inconsistent settings
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        self.index.validate()?;
        if self.premium_rate < Decimal::ZERO {
            bail!("premium_rate must not be negative");
        }
        Ok(())
    }
}

/// Parsed value of `key`; unparseable values keep the default
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable configuration value");
            None
        }
    }
}

/// Per-pool parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolParameters {
    /// Delay between a withdrawal request and its first usable second
    pub lockup_secs: i64,
    /// How long a matured withdrawal request stays usable
    pub withdrawable_secs: i64,
    /// Shortest coverage span a policy may be sold for
    pub min_span_secs: i64,
    /// Longest coverage span a policy may be sold for
    pub max_span_secs: i64,
    /// Delay after expiry before a policy's capital can be unlocked
    pub grace_secs: i64,
    /// How long claims stay redeemable once the pending window has elapsed
    pub claim_window_secs: i64,
    /// Fraction of every premium routed to the reserve
    pub fee_rate: Decimal,
    /// Optional ceiling on the total credit the pool accepts
    pub max_credit: Option<Decimal>,
}

impl Default for PoolParameters {
    fn default() -> Self {
        Self {
            lockup_secs: 7 * SECONDS_PER_DAY,
            withdrawable_secs: 2 * SECONDS_PER_DAY,
            min_span_secs: 7 * SECONDS_PER_DAY,
            max_span_secs: SECONDS_PER_YEAR,
            grace_secs: 3 * SECONDS_PER_DAY,
            claim_window_secs: 14 * SECONDS_PER_DAY,
            fee_rate: Decimal::new(1, 1),
            max_credit: None,
        }
    }
}

impl PoolParameters {
    pub fn validate(&self) -> Result<()> {
        if self.lockup_secs < 0 || self.grace_secs < 0 || self.claim_window_secs < 0 {
            bail!("pool durations must not be negative");
        }
        if self.withdrawable_secs <= 0 {
            bail!("pool withdrawable window must be positive");
        }
        if self.min_span_secs <= 0 || self.min_span_secs > self.max_span_secs {
            bail!(
                "pool span bounds invalid: [{}, {}]",
                self.min_span_secs,
                self.max_span_secs
            );
        }
        if self.fee_rate < Decimal::ZERO || self.fee_rate >= Decimal::ONE {
            bail!("pool fee_rate must be within [0, 1), got {}", self.fee_rate);
        }
        if let Some(ceiling) = self.max_credit {
            if ceiling < Decimal::ZERO {
                bail!("pool max_credit must not be negative");
            }
        }
        Ok(())
    }

    /// Fee rate expressed in parts per [`crate::WEIGHT_BASE`]
    pub fn fee_weight(&self) -> u64 {
        let scaled = (self.fee_rate * Decimal::from(crate::WEIGHT_BASE)).floor();
        u64::try_from(scaled).unwrap_or(0)
    }
}

/// Per-aggregator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexParameters {
    /// Credit allocated per unit of liquidity (2 = 2x leverage)
    pub target_leverage: Decimal,
    /// Fraction above a pool's target credit tolerated before withdrawing
    pub upper_slack: Decimal,
    /// Fraction below a pool's target credit tolerated before allocating
    pub lower_slack: Decimal,
    /// Delay between a withdrawal request and its first usable second
    pub lockup_secs: i64,
    /// How long a matured withdrawal request stays usable
    pub withdrawable_secs: i64,
}

impl Default for IndexParameters {
    fn default() -> Self {
        Self {
            target_leverage: Decimal::TWO,
            upper_slack: Decimal::new(5, 2),
            lower_slack: Decimal::new(5, 2),
            lockup_secs: 7 * SECONDS_PER_DAY,
            withdrawable_secs: 2 * SECONDS_PER_DAY,
        }
    }
}

impl IndexParameters {
    pub fn validate(&self) -> Result<()> {
        if self.target_leverage < Decimal::ONE {
            bail!(
                "target_leverage must be at least 1, got {}",
                self.target_leverage
            );
        }
        for (name, slack) in [("upper_slack", self.upper_slack), ("lower_slack", self.lower_slack)] {
            if slack < Decimal::ZERO || slack >= Decimal::ONE {
                bail!("{} must be within [0, 1), got {}", name, slack);
            }
        }
        if self.lockup_secs < 0 || self.withdrawable_secs <= 0 {
            bail!("aggregator withdrawal timing invalid");
        }
        Ok(())
    }
}
