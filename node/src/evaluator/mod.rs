//! Operation evaluators: the state effects of each operation kind.
use std::collections::HashMap;

use crate::chain::objects::AccountObject;
use crate::config::ChainConfiguration;
use crate::state::{Database, ObjectId};
use crate::types::{AccountName, Operation};
use crate::utilities::time::TimePointSec;

pub use account::{AccountCreateEvaluator, AccountUpdateEvaluator};
pub use custom::CustomJsonEvaluator;
pub use producer::ProducerUpdateEvaluator;
pub use transfer::TransferEvaluator;

mod account;
mod custom;
mod producer;
mod transfer;

pub struct EvaluationContext<'a> {
    pub db: &'a Database,
    pub config: &'a ChainConfiguration,
    pub head_block_time: TimePointSec,
    pub block_num: u32,
}

impl<'a> EvaluationContext<'a> {
    pub fn get_account(&self, name: &AccountName) -> anyhow::Result<AccountObject> {
        self.db
            .find_by_key::<AccountObject>(name.as_bytes())
            .ok_or_else(|| anyhow::anyhow!("Account {name} does not exist"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OperationResult {
    #[default]
    Void,
    ObjectCreated(ObjectId),
}

pub trait Evaluator: Send + Sync {
    fn apply(&self, ctx: &EvaluationContext<'_>, op: &Operation) -> anyhow::Result<OperationResult>;
}

/// Dispatches operations to evaluators by operation name.
#[derive(Default)]
pub struct EvaluatorRegistry {
    evaluators: HashMap<&'static str, Box<dyn Evaluator>>,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("account_create", Box::new(AccountCreateEvaluator));
        registry.register("account_update", Box::new(AccountUpdateEvaluator));
        registry.register("transfer", Box::new(TransferEvaluator));
        registry.register("producer_update", Box::new(ProducerUpdateEvaluator));
        registry.register("custom_json", Box::new(CustomJsonEvaluator));
        registry
    }

    /// Replaces any evaluator already registered for the operation.
    pub fn register(&mut self, operation: &'static str, evaluator: Box<dyn Evaluator>) {
        self.evaluators.insert(operation, evaluator);
    }

    pub fn evaluator_for(&self, op: &Operation) -> Option<&dyn Evaluator> {
        self.evaluators.get(op.name()).map(|e| e.as_ref())
    }
}

fn unexpected(evaluator: &str, op: &Operation) -> anyhow::Error {
    anyhow::anyhow!("{evaluator} can't evaluate {}", op.name())
}
