use crate::chain::context::{ApplyContext, ValidationSteps};
use crate::chain::error::{ChainError, Result};
use crate::chain::schedule::{get_scheduled_producer, get_slot_at_time};
use crate::chain::Ledger;
use crate::evaluator::OperationResult;
use crate::state::UndoSession;
use crate::types::{AccountName, BlockHeader, SignedBlock, SignedTransaction};
use crate::utilities::crypto::{ChainKeypair, Keypair};
use crate::utilities::encoding::encode;
use crate::utilities::hash::HashType;
use crate::utilities::time::TimePointSec;

/// Room left in a generated block for the producer signature and merkle root.
const BLOCK_SIGNATURE_RESERVE: usize = 256;

/// Transactions applied on top of the head block, not yet in any block.
#[derive(Default)]
pub(crate) struct PendingState {
    pub(crate) transactions: Vec<SignedTransaction>,
    /// Holds the effects of all pending transactions.
    pub(crate) session: Option<UndoSession>,
}

impl Ledger {
    pub fn push_transaction(&mut self, trx: SignedTransaction) -> Result<Vec<OperationResult>> {
        self.push_transaction_with(trx, self.steps)
    }

    /// Applies a transaction to pending state. A failed transaction leaves no trace.
    pub fn push_transaction_with(
        &mut self,
        trx: SignedTransaction,
        steps: ValidationSteps,
    ) -> Result<Vec<OperationResult>> {
        if self.pending.session.is_none() {
            self.pending.session = Some(self.db.start_undo_session());
        }

        let session = self.db.start_undo_session();
        let mut ctx = ApplyContext::for_pending(steps, self.head_block_num()? + 1);
        let results = self.apply_transaction(&trx, &mut ctx)?;
        session.squash();

        self.observers.notify("on_pending_transaction", |o| {
            o.on_pending_transaction(&self.db, &trx)
        });
        self.pending.transactions.push(trx);
        Ok(results)
    }

    /// Discards all pending transactions and their effects.
    pub fn clear_pending(&mut self) {
        self.pending.transactions.clear();
        if let Some(session) = self.pending.session.take() {
            session.undo();
        }
    }

    pub(crate) fn take_pending(&mut self) -> Vec<SignedTransaction> {
        let transactions = std::mem::take(&mut self.pending.transactions);
        self.clear_pending();
        transactions
    }

    /// Replays popped and then previously pending transactions. Those that no longer apply
    /// are dropped.
    pub(crate) fn restore_pending(&mut self, pending: Vec<SignedTransaction>) {
        let popped = std::mem::take(&mut self.popped_transactions);
        let total = popped.len() + pending.len();
        let mut dropped = 0;
        for trx in popped.into_iter().chain(pending) {
            if let Err(err) = self.push_transaction(trx) {
                log::debug!("Dropping pending transaction: {err}");
                dropped += 1;
            }
        }
        if dropped > 0 {
            log::debug!("Restored {} of {total} pending transactions", total - dropped);
        }
    }

    /// Produces, signs and pushes a block for the slot at `when` from the pending transactions
    /// that still apply and fit into the block.
    pub fn generate_block(
        &mut self,
        when: TimePointSec,
        producer: &AccountName,
        keypair: &Keypair,
        steps: ValidationSteps,
    ) -> Result<SignedBlock> {
        let slot = get_slot_at_time(&self.db, &self.config, when)?;
        if slot == 0 {
            return Err(ChainError::InvalidSlot(when));
        }
        let scheduled = get_scheduled_producer(&self.db, slot)?;
        if scheduled != *producer {
            return Err(ChainError::WrongProducer {
                expected: scheduled,
                actual: producer.clone(),
            });
        }
        let producer_object = self
            .find_producer(producer)
            .ok_or_else(|| ChainError::UnknownProducer(producer.clone()))?;
        if steps.producer_signature && producer_object.signing_key != Some(keypair.public_key()) {
            return Err(ChainError::SigningKeyMismatch(producer.clone()));
        }

        let pending = self.take_pending();
        let header = BlockHeader {
            previous: self.head_block_id()?,
            timestamp: when,
            producer: producer.clone(),
            transaction_merkle_root: HashType::default(),
        };

        let selected = match self.select_transactions(&header, &pending, steps) {
            Ok(selected) => selected,
            Err(err) => {
                self.restore_pending(pending);
                return Err(err);
            }
        };
        log::debug!(
            "Generating block {} with {} of {} pending transactions",
            header.block_num(),
            selected.len(),
            pending.len()
        );

        let mut block = SignedBlock::new(header, selected);
        let built = block
            .calculate_merkle_root()
            .and_then(|root| {
                block.header.transaction_merkle_root = root;
                block.sign(keypair)
            });
        if let Err(err) = built {
            self.restore_pending(pending);
            return Err(err.into());
        }

        let result = self.push_block_inner(block.clone(), steps);
        self.restore_pending(pending);
        result.map(|_| block)
    }

    /// Re-applies pending transactions in a scratch session and keeps those that still
    /// apply and fit into the block.
    fn select_transactions(
        &mut self,
        header: &BlockHeader,
        pending: &[SignedTransaction],
        steps: ValidationSteps,
    ) -> Result<Vec<SignedTransaction>> {
        let max_size = self.config.max_block_size;
        let mut block_size =
            encode(&SignedBlock::new(header.clone(), vec![]))?.len() + BLOCK_SIGNATURE_RESERVE;
        let mut selected = vec![];

        let scratch = self.db.start_undo_session();
        let mut ctx = ApplyContext::for_pending(steps, header.block_num());
        for trx in pending {
            if trx.transaction.expiration < header.timestamp {
                continue;
            }
            let size = encode(trx)?.len() + 1;
            if block_size + size > max_size {
                log::debug!("Transaction does not fit into block {}", header.block_num());
                continue;
            }

            let session = self.db.start_undo_session();
            match self.apply_transaction(trx, &mut ctx) {
                Ok(_) => {
                    session.squash();
                    block_size += size;
                    selected.push(trx.clone());
                }
                Err(err) => {
                    log::debug!("Leaving out transaction: {err}");
                }
            }
        }
        scratch.undo();
        Ok(selected)
    }
}
