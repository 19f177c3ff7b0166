//! Ledger state-transition engine.
//!
//! [`Ledger`] owns the state store, the fork database and the block log. Blocks and
//! transactions are applied strictly one at a time; every block runs inside one undo session
//! that is pushed only if the whole block applied.
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chain::authority::SignatureVerifier;
use crate::chain::maintenance::{MaintenanceHook, MaintenanceHooks};
use crate::chain::objects::{
    AccountObject, DynamicGlobalPropertyObject, ProducerObject, TransactionObject, SINGLETON_ID,
};
use crate::chain::observer::{ChainObserver, ObserverRegistry};
use crate::chain::pending::PendingState;
use crate::config::{ChainConfiguration, Configuration, BASIS_POINTS};
use crate::evaluator::{Evaluator, EvaluatorRegistry};
use crate::fork_db::ForkDatabase;
use crate::state::{Database, StateReader};
use crate::storage::{open_block_log, BlockLog};
use crate::types::{AccountName, BlockId, SignedBlock, SignedTransaction, TransactionId};
use crate::utilities::hash::HashType;
use crate::utilities::time::TimePointSec;

pub use context::{ApplyContext, ValidationSteps};
pub use error::{ChainError, Result};
pub use maintenance::{MaintenanceContext, MaintenancePhase};
pub use observer::{BlockNotification, OperationNotification, TransactionNotification};

pub(crate) mod authority;
mod block_apply;
pub(crate) mod context;
pub(crate) mod error;
pub(crate) mod genesis;
pub mod maintenance;
pub mod objects;
pub mod observer;
mod pending;
pub(crate) mod schedule;
mod transaction_apply;

#[cfg(test)]
pub(crate) mod test;

/// Number of slots covered by the participation bitmap.
const PARTICIPATION_WINDOW: u32 = 64;

pub struct Ledger {
    pub(crate) db: Database,
    pub(crate) fork_db: ForkDatabase,
    pub(crate) block_log: Box<dyn BlockLog>,
    pub(crate) config: ChainConfiguration,
    /// Checks used for blocks and transactions pushed without explicit steps.
    pub(crate) steps: ValidationSteps,
    pub(crate) evaluators: EvaluatorRegistry,
    pub(crate) hooks: MaintenanceHooks,
    pub(crate) observers: ObserverRegistry,
    /// Expected block ids at fixed heights.
    pub(crate) checkpoints: BTreeMap<u32, BlockId>,
    pub(crate) pending: PendingState,
    /// Transactions of blocks popped during a fork switch, replayed before pending ones.
    pub(crate) popped_transactions: Vec<SignedTransaction>,
    pub(crate) signature_verifier: SignatureVerifier,
}

pub struct LedgerBuilder {
    config: ChainConfiguration,
    block_log: Box<dyn BlockLog>,
    steps: ValidationSteps,
    checkpoints: BTreeMap<u32, BlockId>,
    evaluators: EvaluatorRegistry,
    hooks: MaintenanceHooks,
    observers: ObserverRegistry,
}

impl LedgerBuilder {
    /// Starts with the built-in evaluators and maintenance hooks.
    pub fn new(config: ChainConfiguration, block_log: Box<dyn BlockLog>) -> Self {
        Self {
            config,
            block_log,
            steps: ValidationSteps::all(),
            checkpoints: BTreeMap::new(),
            evaluators: EvaluatorRegistry::with_defaults(),
            hooks: MaintenanceHooks::with_defaults(),
            observers: ObserverRegistry::default(),
        }
    }

    /// Opens the configured block log and applies validation and checkpoint settings.
    pub fn from_configuration(configuration: &Configuration) -> anyhow::Result<Self> {
        let block_log = open_block_log(&configuration.storage)?;
        let checkpoints = configuration.checkpoints()?;
        Ok(Self::new(configuration.chain.clone(), block_log)
            .with_validation_steps(configuration.validation)
            .with_checkpoints(checkpoints))
    }

    pub fn with_validation_steps(mut self, steps: ValidationSteps) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_checkpoints<I>(mut self, checkpoints: I) -> Self
    where
        I: IntoIterator<Item = (u32, BlockId)>,
    {
        self.checkpoints.extend(checkpoints);
        self
    }

    pub fn with_evaluator(mut self, operation: &'static str, evaluator: Box<dyn Evaluator>) -> Self {
        self.evaluators.register(operation, evaluator);
        self
    }

    pub fn with_maintenance_hook(mut self, hook: Box<dyn MaintenanceHook>) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ChainObserver>) -> Self {
        self.observers.register(observer);
        self
    }

    /// Builds the ledger and rebuilds its state from the block log.
    pub fn open(self) -> Result<Ledger> {
        self.config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid chain configuration: {e}"))?;

        let signature_verifier = SignatureVerifier::new(self.config.signature_cache_size);
        let mut ledger = Ledger {
            db: Database::new(),
            fork_db: ForkDatabase::new(),
            block_log: self.block_log,
            config: self.config,
            steps: self.steps,
            evaluators: self.evaluators,
            hooks: self.hooks,
            observers: self.observers,
            checkpoints: self.checkpoints,
            pending: PendingState::default(),
            popped_transactions: vec![],
            signature_verifier,
        };
        ledger.reindex()?;
        Ok(ledger)
    }
}

impl Ledger {
    pub fn add_checkpoints<I>(&mut self, checkpoints: I)
    where
        I: IntoIterator<Item = (u32, BlockId)>,
    {
        self.checkpoints.extend(checkpoints);
    }

    /// Read-only view of state, including pending transactions.
    pub fn state(&self) -> StateReader {
        self.db.reader()
    }

    pub fn config(&self) -> &ChainConfiguration {
        &self.config
    }

    pub fn chain_id(&self) -> HashType {
        self.config.chain_id()
    }

    pub fn fork_db(&self) -> &ForkDatabase {
        &self.fork_db
    }

    pub fn global_properties(&self) -> Result<DynamicGlobalPropertyObject> {
        Ok(self.db.get(SINGLETON_ID)?)
    }

    pub fn head_block_num(&self) -> Result<u32> {
        Ok(self.global_properties()?.head_block_number)
    }

    pub fn head_block_id(&self) -> Result<BlockId> {
        Ok(self.global_properties()?.head_block_id)
    }

    pub fn head_block_time(&self) -> Result<TimePointSec> {
        Ok(self.global_properties()?.time)
    }

    pub fn last_irreversible_block_num(&self) -> Result<u32> {
        Ok(self.global_properties()?.last_irreversible_block_num)
    }

    pub fn revision(&self) -> u64 {
        self.db.revision()
    }

    /// Share of recent slots that got a block, in basis points.
    pub fn participation_rate(&self) -> Result<u32> {
        let dgpo = self.global_properties()?;
        Ok(dgpo.participation_count * BASIS_POINTS / PARTICIPATION_WINDOW)
    }

    pub fn fetch_block_by_id(&self, id: &BlockId) -> Result<Option<SignedBlock>> {
        if let Some(block) = self.fork_db.fetch_block(id) {
            return Ok(Some(block.as_ref().clone()));
        }
        self.block_log
            .read_block_by_id(id)
            .map_err(ChainError::BlockLog)
    }

    /// Block of the current chain with the given number.
    pub fn fetch_block_by_number(&self, num: u32) -> Result<Option<SignedBlock>> {
        if let Some(item) = self.fork_db.fetch_on_main_branch(num) {
            return Ok(Some(item.block.as_ref().clone()));
        }
        self.block_log
            .read_block_by_num(num)
            .map_err(ChainError::BlockLog)
    }

    pub fn is_known_block(&self, id: &BlockId) -> Result<bool> {
        if self.fork_db.is_known_block(id) {
            return Ok(true);
        }
        Ok(self.fetch_block_by_id(id)?.is_some())
    }

    pub fn is_known_transaction(&self, id: &TransactionId) -> bool {
        self.db.find_by_key::<TransactionObject>(id.as_ref()).is_some()
    }

    pub fn find_account(&self, name: &AccountName) -> Option<AccountObject> {
        self.db.find_by_key(name.as_bytes())
    }

    pub fn get_account(&self, name: &AccountName) -> Result<AccountObject> {
        Ok(self.db.get_by_key(name.as_bytes())?)
    }

    pub fn find_producer(&self, name: &AccountName) -> Option<ProducerObject> {
        self.db.find_by_key(name.as_bytes())
    }

    pub fn pending_transactions(&self) -> &[SignedTransaction] {
        &self.pending.transactions
    }

    /// Time of the n-th slot after the head block. Slot 0 is no time at all.
    pub fn get_slot_time(&self, slot: u32) -> Result<TimePointSec> {
        schedule::get_slot_time(&self.db, &self.config, slot)
    }

    pub fn get_slot_at_time(&self, when: TimePointSec) -> Result<u32> {
        schedule::get_slot_at_time(&self.db, &self.config, when)
    }

    pub fn get_scheduled_producer(&self, slot: u32) -> Result<AccountName> {
        schedule::get_scheduled_producer(&self.db, slot)
    }
}
