//! Market engine
//!
//! [`MarketState`] owns every component: the vault, the risk pools, the
//! aggregators and the reserve. Operations that cross components (premium
//! intake, credit moves, claim settlement, rebalancing) are methods on it, so
//! one call can update the pool, the aggregator and the vault together.
//!
//! Operations here are not atomic on their own; [`crate::Protocol`] runs
//! each of them against a draft copy and commits only on success.

mod index_ops;
mod pool_ops;

pub use pool_ops::CoverRequest;

use std::collections::{BTreeMap, BTreeSet};

use aegis_common::crypto::ProofOracle;
use aegis_common::error::{LedgerError, PoolError};
use aegis_common::{
    AegisError, Holder, IndexId, IndexParameters, PoolId, PoolParameters, ProtocolConfig, Result,
};
use aegis_ledger::{Controller, Vault};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::index::Index;
use crate::pool::RiskPool;
use crate::premium::PremiumModel;
use crate::reserve::Reserve;

/// Collaborators and time of the operation being executed
pub struct Env<'a> {
    /// Execution time (Unix seconds), read once per operation
    pub now: i64,
    pub premium_model: &'a dyn PremiumModel,
    pub oracle: &'a dyn ProofOracle,
}

/// The whole market
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketState {
    pub config: ProtocolConfig,
    pub(crate) vault: Vault,
    pub(crate) pools: BTreeMap<PoolId, RiskPool>,
    pub(crate) indices: BTreeMap<IndexId, Index>,
    pub(crate) reserve: Reserve,
    /// Accounts allowed to supply credit to pools directly
    pub(crate) direct_sources: BTreeSet<Holder>,
}

impl MarketState {
    pub fn new(config: ProtocolConfig) -> Self {
        let mut vault = Vault::new();
        vault.register_source(Holder::Reserve);
        Self {
            config,
            vault,
            ..Default::default()
        }
    }

    // ----- lookups -----

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn reserve(&self) -> &Reserve {
        &self.reserve
    }

    pub fn pool(&self, id: PoolId) -> Result<&RiskPool> {
        self.pools.get(&id).ok_or_else(|| pool_not_found(id))
    }

    pub(crate) fn pool_mut(&mut self, id: PoolId) -> Result<&mut RiskPool> {
        self.pools.get_mut(&id).ok_or_else(|| pool_not_found(id))
    }

    pub fn pools(&self) -> impl Iterator<Item = &RiskPool> {
        self.pools.values()
    }

    pub fn index(&self, id: IndexId) -> Result<&Index> {
        self.indices.get(&id).ok_or_else(|| index_not_found(id))
    }

    pub(crate) fn index_mut(&mut self, id: IndexId) -> Result<&mut Index> {
        self.indices.get_mut(&id).ok_or_else(|| index_not_found(id))
    }

    pub fn indices(&self) -> impl Iterator<Item = &Index> {
        self.indices.values()
    }

    pub fn is_direct_source(&self, holder: &Holder) -> bool {
        self.direct_sources.contains(holder)
    }

    // ----- registry -----

    /// Create a risk pool; it becomes a capital source of the vault
    pub fn create_pool(&mut self, name: &str, params: Option<PoolParameters>) -> Result<PoolId> {
        let params = params.unwrap_or_else(|| self.config.pool.clone());
        params.validate()?;
        let pool = RiskPool::new(name, params);
        let id = pool.id;

        self.vault.register_source(pool.holder());
        self.pools.insert(id, pool);

        info!(pool = %id, name, "Risk pool created");
        Ok(id)
    }

    /// Create an aggregator; it becomes a capital and credit source
    pub fn create_index(&mut self, name: &str, params: Option<IndexParameters>) -> Result<IndexId> {
        let params = params.unwrap_or_else(|| self.config.index.clone());
        params.validate()?;
        let index = Index::new(name, params);
        let id = index.id;

        self.vault.register_source(index.holder());
        self.indices.insert(id, index);

        info!(index = %id, name, "Aggregator created");
        Ok(id)
    }

    /// Let an account supply credit to pools directly, backed 1:1 by its own
    /// vault value
    pub fn register_direct_source(&mut self, account: Holder) -> Result<()> {
        if !matches!(account, Holder::Account(_)) || account.is_null() {
            return Err(LedgerError::InvalidRecipient(account).into());
        }
        self.vault.register_source(account.clone());
        self.direct_sources.insert(account);
        Ok(())
    }

    /// A direct source moves its own tokens into the vault
    pub fn supply_capital(&mut self, account: &Holder, amount: Decimal) -> Result<Decimal> {
        self.ensure_direct_source(account)?;
        self.vault.add_value(account, amount, account, account)
    }

    /// A direct source takes back vault value not backing any credit
    pub fn withdraw_capital(&mut self, account: &Holder, amount: Decimal) -> Result<Decimal> {
        self.ensure_direct_source(account)?;
        let value = self.vault.value_of(account)?;
        let backing = self.credit_across_pools(account);
        let free = (value - backing).max(Decimal::ZERO);
        if amount > free {
            return Err(LedgerError::InsufficientBalance {
                holder: account.clone(),
                required: amount,
                available: free,
            }
            .into());
        }
        self.vault.withdraw_value(account, amount, account)
    }

    /// Bridge underlying tokens to an external holder
    pub fn mint_asset(&mut self, to: &Holder, amount: Decimal) -> Result<()> {
        self.vault.mint_asset(to, amount)
    }

    pub fn reserve_deposit(&mut self, depositor: &Holder, amount: Decimal) -> Result<Decimal> {
        self.reserve.deposit(&mut self.vault, depositor, amount)
    }

    // ----- yield controller -----

    /// Swap the vault's yield controller; returns the amount migrated back
    pub fn set_controller(&mut self, controller: Option<Controller>) -> Result<Decimal> {
        self.vault.set_controller(controller)
    }

    pub fn utilize(&mut self) -> Result<Decimal> {
        self.vault.utilize()
    }

    pub fn report_yield(&mut self, amount: Decimal) -> Result<()> {
        self.vault.report_yield(amount)
    }

    // ----- shared helpers -----

    pub(crate) fn ensure_direct_source(&self, account: &Holder) -> Result<()> {
        if self.direct_sources.contains(account) {
            Ok(())
        } else {
            Err(PoolError::UnauthorizedSource(account.clone()).into())
        }
    }

    /// Aggregators that exist and registered accounts may supply credit
    pub(crate) fn ensure_credit_source(&self, source: &Holder) -> Result<()> {
        let allowed = match source {
            Holder::Index(id) => self.indices.contains_key(id),
            Holder::Account(_) => self.direct_sources.contains(source),
            _ => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(PoolError::UnauthorizedSource(source.clone()).into())
        }
    }

    /// Credit `source` allocates across every pool
    pub fn credit_across_pools(&self, source: &Holder) -> Decimal {
        self.pools.values().map(|p| p.credit_of(source)).sum()
    }
}

pub(crate) fn pool_not_found(id: PoolId) -> AegisError {
    AegisError::NotFound(format!("pool {}", id))
}

pub(crate) fn index_not_found(id: IndexId) -> AegisError {
    AegisError::NotFound(format!("index {}", id))
}

pub(crate) fn ensure_positive(amount: Decimal) -> Result<()> {
    if aegis_common::ensure_amount(amount) {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount).into())
    }
}
