//! Notifications about state transitions.
//!
//! Observers get read-only access to state. A failing observer is logged and otherwise
//! ignored, it can't affect block or transaction application.
use std::sync::Arc;

use crate::chain::context::ApplyContext;
use crate::state::StateReader;
use crate::types::{BlockId, Operation, SignedBlock, SignedTransaction, TransactionId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationNotification {
    pub trx_id: Option<TransactionId>,
    pub block_num: u32,
    pub trx_in_block: Option<u32>,
    pub op_in_trx: u32,
    /// Sequence within the block, only for virtual operations.
    pub virtual_op: Option<u32>,
    pub op: Operation,
}

impl OperationNotification {
    pub(crate) fn new(ctx: &ApplyContext, op: Operation) -> Self {
        Self {
            trx_id: ctx.trx_id,
            block_num: ctx.block_num,
            trx_in_block: ctx.trx_in_block,
            op_in_trx: ctx.op_in_trx,
            virtual_op: None,
            op,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TransactionNotification<'a> {
    pub trx_id: TransactionId,
    pub block_num: u32,
    pub trx_in_block: Option<u32>,
    pub transaction: &'a SignedTransaction,
}

#[derive(Clone, Debug)]
pub struct BlockNotification<'a> {
    pub block_id: BlockId,
    pub block: &'a SignedBlock,
}

/// All handlers default to doing nothing.
#[allow(unused_variables)]
pub trait ChainObserver: Send + Sync {
    fn pre_apply_block(&self, state: &StateReader, note: &BlockNotification<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_apply_block(&self, state: &StateReader, note: &BlockNotification<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre_apply_transaction(
        &self,
        state: &StateReader,
        note: &TransactionNotification<'_>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_apply_transaction(
        &self,
        state: &StateReader,
        note: &TransactionNotification<'_>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre_apply_operation(
        &self,
        state: &StateReader,
        note: &OperationNotification,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_apply_operation(
        &self,
        state: &StateReader,
        note: &OperationNotification,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_irreversible_block(&self, state: &StateReader, block_num: u32) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_pending_transaction(
        &self,
        state: &StateReader,
        trx: &SignedTransaction,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre_reindex(&self, state: &StateReader) -> anyhow::Result<()> {
        Ok(())
    }

    fn post_reindex(&self, state: &StateReader, head_block_num: u32) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct ObserverRegistry {
    observers: Vec<Arc<dyn ChainObserver>>,
}

impl ObserverRegistry {
    pub fn register(&mut self, observer: Arc<dyn ChainObserver>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub(crate) fn notify<F>(&self, signal: &'static str, f: F)
    where
        F: Fn(&dyn ChainObserver) -> anyhow::Result<()>,
    {
        for observer in &self.observers {
            if let Err(err) = f(observer.as_ref()) {
                log::error!("Observer failed on {signal}: {err:?}");
            }
        }
    }

    /// Assigns the next virtual operation sequence and fires the pre-apply signal.
    /// The returned notification is passed to [`Self::post_push_virtual_operation`]
    /// once the operation's effect is applied.
    pub(crate) fn pre_push_virtual_operation(
        &self,
        state: &StateReader,
        ctx: &mut ApplyContext,
        op: Operation,
    ) -> OperationNotification {
        let mut note = OperationNotification::new(ctx, op);
        note.virtual_op = Some(ctx.next_virtual_op());
        self.notify("pre_apply_operation", |o| o.pre_apply_operation(state, &note));
        note
    }

    pub(crate) fn post_push_virtual_operation(
        &self,
        state: &StateReader,
        note: &OperationNotification,
    ) {
        self.notify("post_apply_operation", |o| o.post_apply_operation(state, note));
    }
}
