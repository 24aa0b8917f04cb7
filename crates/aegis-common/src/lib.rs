//! # Aegis Common
//!
//! Shared types, errors, configuration and claim-proof primitives for the
//! Aegis underwriting engine.
//!
//! ## Core Types
//!
//! - [`Holder`]: any participant that can own vault attributions or debt
//! - [`PoolId`]/[`IndexId`]: identities of risk pools and aggregators
//! - [`WithdrawalRequest`]: two-phase withdrawal gate shared by pools and
//!   aggregators
//!
//! ## Crypto
//!
//! - [`crypto::merkle`]: sorted-pair Merkle tree and the claim proof oracle
//!
//! ## Configuration
//!
//! - [`config::ProtocolConfig`]: pool and aggregator defaults loaded from the
//!   environment

pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{IndexParameters, PoolParameters, ProtocolConfig};
pub use error::{AegisError, ErrorKind, Result};
pub use types::{
    ids::{Holder, IndexId, PoolId},
    math::{ensure_amount, mul_div_ceil, mul_div_floor, split_by_weights, split_pro_rata},
    withdrawal::WithdrawalRequest,
};

/// Aegis version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Seconds in a (non-leap) year, used to annualize premium rates
pub const SECONDS_PER_YEAR: i64 = 365 * 24 * 60 * 60;

/// Seconds in a day
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Weight base used when splitting a mint between recipients
pub const WEIGHT_BASE: u64 = 1_000_000;
