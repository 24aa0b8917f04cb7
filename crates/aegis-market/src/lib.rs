//! # Aegis Market
//!
//! Risk pools, leverage aggregators and the reserve, built on the
//! [`aegis_ledger::Vault`].
//!
//! ## Components
//!
//! - [`pool::RiskPool`]: one insurable market funded by LPs and credit
//! - [`index::Index`]: spreads its depositors' liquidity as leveraged credit
//!   over weighted pools
//! - [`reserve::Reserve`]: collects fees and backstops aggregator shortfalls
//! - [`accumulator::RewardAccumulator`]: reward-per-credit premium sharing
//!
//! [`Protocol`] is the entry point: it runs every operation atomically
//! against the [`engine::MarketState`].

pub mod accumulator;
pub mod engine;
pub mod index;
pub mod pool;
pub mod premium;
pub mod protocol;
pub mod reserve;
pub mod shares;

pub use accumulator::{CreditPosition, RewardAccumulator, REWARD_SCALE};
pub use engine::{CoverRequest, Env, MarketState};
pub use index::{AllocationPlan, Index};
pub use pool::{Incident, Insurance, InsuranceStatus, MarketStatus, RiskPool};
pub use premium::{FlatRatePremium, PremiumModel};
pub use protocol::Protocol;
pub use reserve::{CompensationBackstop, Reserve};
pub use shares::ShareBook;
