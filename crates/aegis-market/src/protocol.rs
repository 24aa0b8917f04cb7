//! Transactional protocol facade
//!
//! Every mutating call runs against a draft copy of the market and is
//! committed only when it succeeds, so a failed operation leaves no trace.
//! Reads take a shared lock.

use std::sync::Arc;

use aegis_common::crypto::{Hash, MerkleProofOracle, ProofOracle};
use aegis_common::{
    Clock, Holder, IndexId, IndexParameters, PoolId, PoolParameters, ProtocolConfig, Result,
    SystemClock,
};
use aegis_ledger::Controller;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tracing::warn;

use crate::engine::{CoverRequest, Env, MarketState};
use crate::index::AllocationPlan;
use crate::premium::{FlatRatePremium, PremiumModel};

/// Shared handle to one market
#[derive(Clone)]
pub struct Protocol {
    state: Arc<RwLock<MarketState>>,
    premium_model: Arc<dyn PremiumModel>,
    oracle: Arc<dyn ProofOracle>,
    clock: Arc<dyn Clock>,
}

impl Protocol {
    /// Market with the flat-rate premium model, Merkle claim proofs and the
    /// wall clock
    pub fn new(config: ProtocolConfig) -> Self {
        let premium_model = Arc::new(FlatRatePremium::new(config.premium_rate));
        Self {
            state: Arc::new(RwLock::new(MarketState::new(config))),
            premium_model,
            oracle: Arc::new(MerkleProofOracle),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_premium_model(mut self, model: Arc<dyn PremiumModel>) -> Self {
        self.premium_model = model;
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ProofOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Run `f` against a draft of the market; commit on success.
    ///
    /// The write lock is held for the whole operation, so operations are
    /// serialized.
    pub fn transact<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut MarketState, &Env<'_>) -> Result<T>,
    ) -> Result<T> {
        let env = Env {
            now: self.clock.now(),
            premium_model: self.premium_model.as_ref(),
            oracle: self.oracle.as_ref(),
        };
        let mut state = self.state.write();
        let mut draft = state.clone();
        match f(&mut draft, &env) {
            Ok(value) => {
                *state = draft;
                Ok(value)
            }
            Err(e) => {
                warn!(operation, error = %e, kind = ?e.kind(), "Operation rolled back");
                Err(e)
            }
        }
    }

    /// Shared read of the market
    pub fn read<T>(&self, f: impl FnOnce(&MarketState) -> T) -> T {
        f(&self.state.read())
    }

    /// Serialize the whole market
    pub fn export_state(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.state.read())?)
    }

    /// Replace the market with a previously exported one
    pub fn import_state(&self, json: &str) -> Result<()> {
        let state: MarketState = serde_json::from_str(json)?;
        *self.state.write() = state;
        Ok(())
    }

    // ----- setup -----

    pub fn create_pool(&self, name: &str, params: Option<PoolParameters>) -> Result<PoolId> {
        self.transact("create_pool", |s, _| s.create_pool(name, params))
    }

    pub fn create_index(&self, name: &str, params: Option<IndexParameters>) -> Result<IndexId> {
        self.transact("create_index", |s, _| s.create_index(name, params))
    }

    pub fn register_direct_source(&self, account: Holder) -> Result<()> {
        self.transact("register_direct_source", |s, _| s.register_direct_source(account))
    }

    pub fn supply_capital(&self, account: &Holder, amount: Decimal) -> Result<Decimal> {
        self.transact("supply_capital", |s, _| s.supply_capital(account, amount))
    }

    pub fn withdraw_capital(&self, account: &Holder, amount: Decimal) -> Result<Decimal> {
        self.transact("withdraw_capital", |s, _| s.withdraw_capital(account, amount))
    }

    pub fn mint_asset(&self, to: &Holder, amount: Decimal) -> Result<()> {
        self.transact("mint_asset", |s, _| s.mint_asset(to, amount))
    }

    pub fn reserve_deposit(&self, depositor: &Holder, amount: Decimal) -> Result<Decimal> {
        self.transact("reserve_deposit", |s, _| s.reserve_deposit(depositor, amount))
    }

    pub fn set_controller(&self, controller: Option<Controller>) -> Result<Decimal> {
        self.transact("set_controller", |s, _| s.set_controller(controller))
    }

    pub fn utilize(&self) -> Result<Decimal> {
        self.transact("utilize", |s, _| s.utilize())
    }

    pub fn report_yield(&self, amount: Decimal) -> Result<()> {
        self.transact("report_yield", |s, _| s.report_yield(amount))
    }

    // ----- pools -----

    pub fn pool_deposit(&self, pool: PoolId, depositor: &Holder, amount: Decimal) -> Result<Decimal> {
        self.transact("pool_deposit", |s, env| s.pool_deposit(env, pool, depositor, amount))
    }

    pub fn pool_request_withdraw(&self, pool: PoolId, holder: &Holder, shares: Decimal) -> Result<()> {
        self.transact("pool_request_withdraw", |s, env| {
            s.pool_request_withdraw(env, pool, holder, shares)
        })
    }

    pub fn pool_withdraw(&self, pool: PoolId, holder: &Holder, shares: Decimal) -> Result<Decimal> {
        self.transact("pool_withdraw", |s, env| s.pool_withdraw(env, pool, holder, shares))
    }

    pub fn pool_transfer_shares(
        &self,
        pool: PoolId,
        from: &Holder,
        to: &Holder,
        shares: Decimal,
    ) -> Result<()> {
        self.transact("pool_transfer_shares", |s, _| {
            s.pool_transfer_shares(pool, from, to, shares)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insure(
        &self,
        pool: PoolId,
        buyer: &Holder,
        amount: Decimal,
        max_cost: Decimal,
        span_secs: i64,
        target: &str,
        agent: Option<Holder>,
    ) -> Result<u64> {
        self.transact("insure", |s, env| {
            s.insure(env, pool, buyer, amount, max_cost, span_secs, target, agent)
        })
    }

    pub fn unlock(&self, pool: PoolId, policy_id: u64) -> Result<()> {
        self.transact("unlock", |s, env| s.unlock(env, pool, policy_id))
    }

    pub fn unlock_batch(&self, pool: PoolId, policy_ids: &[u64]) -> Result<()> {
        self.transact("unlock_batch", |s, env| s.unlock_batch(env, pool, policy_ids))
    }

    pub fn transfer_insurance(
        &self,
        pool: PoolId,
        caller: &Holder,
        policy_id: u64,
        to: &Holder,
    ) -> Result<()> {
        self.transact("transfer_insurance", |s, _| {
            s.transfer_insurance(pool, caller, policy_id, to)
        })
    }

    pub fn apply_cover(&self, pool: PoolId, request: CoverRequest) -> Result<()> {
        self.transact("apply_cover", |s, env| s.apply_cover(env, pool, request))
    }

    pub fn redeem(
        &self,
        pool: PoolId,
        caller: &Holder,
        policy_id: u64,
        loss: Decimal,
        proof: &[Hash],
    ) -> Result<Decimal> {
        self.transact("redeem", |s, env| {
            s.redeem(env, pool, caller, policy_id, loss, proof)
        })
    }

    pub fn resume(&self, pool: PoolId) -> Result<()> {
        self.transact("resume", |s, env| s.resume(env, pool))
    }

    pub fn set_pool_paused(&self, pool: PoolId, paused: bool) -> Result<()> {
        self.transact("set_pool_paused", |s, env| s.set_pool_paused(env, pool, paused))
    }

    // ----- credit -----

    pub fn allocate_credit(&self, pool: PoolId, source: &Holder, amount: Decimal) -> Result<Decimal> {
        self.transact("allocate_credit", |s, env| {
            s.allocate_credit(env, pool, source, amount)
        })
    }

    pub fn withdraw_credit(&self, pool: PoolId, source: &Holder, amount: Decimal) -> Result<Decimal> {
        self.transact("withdraw_credit", |s, env| {
            s.withdraw_credit(env, pool, source, amount)
        })
    }

    pub fn unlock_credit(&self, pool: PoolId, source: &Holder) -> Result<Decimal> {
        self.transact("unlock_credit", |s, env| s.unlock_credit(env, pool, source))
    }

    pub fn harvest_credit(&self, pool: PoolId, source: &Holder) -> Result<Decimal> {
        self.transact("harvest_credit", |s, _| s.harvest_credit(pool, source))
    }

    // ----- aggregators -----

    pub fn index_deposit(&self, index: IndexId, depositor: &Holder, amount: Decimal) -> Result<Decimal> {
        self.transact("index_deposit", |s, env| {
            s.index_deposit(env, index, depositor, amount)
        })
    }

    pub fn index_request_withdraw(&self, index: IndexId, holder: &Holder, shares: Decimal) -> Result<()> {
        self.transact("index_request_withdraw", |s, env| {
            s.index_request_withdraw(env, index, holder, shares)
        })
    }

    pub fn index_withdraw(&self, index: IndexId, holder: &Holder, shares: Decimal) -> Result<Decimal> {
        self.transact("index_withdraw", |s, env| {
            s.index_withdraw(env, index, holder, shares)
        })
    }

    pub fn index_transfer_shares(
        &self,
        index: IndexId,
        from: &Holder,
        to: &Holder,
        shares: Decimal,
    ) -> Result<()> {
        self.transact("index_transfer_shares", |s, _| {
            s.index_transfer_shares(index, from, to, shares)
        })
    }

    /// See [`MarketState::set_index_pool`]
    pub fn set_index_pool(
        &self,
        index: IndexId,
        slot: usize,
        expected_alloc_point: u64,
        pool: Option<PoolId>,
        alloc_point: u64,
    ) -> Result<()> {
        self.transact("set_index_pool", |s, env| {
            s.set_index_pool(env, index, slot, expected_alloc_point, pool, alloc_point)
        })
    }

    pub fn adjust_alloc(&self, index: IndexId) -> Result<AllocationPlan> {
        self.transact("adjust_alloc", |s, env| s.adjust_alloc(env, index))
    }

    pub fn resume_index(&self, index: IndexId) -> Result<()> {
        self.transact("resume_index", |s, env| s.resume_index(env, index))
    }

    pub fn set_index_leverage(&self, index: IndexId, target: Decimal) -> Result<()> {
        self.transact("set_index_leverage", |s, env| {
            s.set_index_leverage(env, index, target)
        })
    }

    pub fn set_index_slack(&self, index: IndexId, upper: Decimal, lower: Decimal) -> Result<()> {
        self.transact("set_index_slack", |s, _| s.set_index_slack(index, upper, lower))
    }

    pub fn set_index_paused(&self, index: IndexId, paused: bool) -> Result<()> {
        self.transact("set_index_paused", |s, _| s.set_index_paused(index, paused))
    }
}
