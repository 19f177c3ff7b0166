use serde::{Deserialize, Serialize};

use crate::types::{BlockId, TransactionId};

/// Which checks and side effects run while applying blocks and transactions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSteps {
    pub producer_signature: bool,
    pub producer_schedule: bool,
    pub merkle_root: bool,
    pub block_size: bool,
    pub transaction_signatures: bool,
    pub authority: bool,
    pub transaction_dupe_check: bool,
    /// Reference block check of transactions.
    pub tapos: bool,
    pub undo_history: bool,
    pub invariants: bool,
    pub fork_db: bool,
    pub block_log: bool,
}

impl Default for ValidationSteps {
    fn default() -> Self {
        Self::all()
    }
}

impl ValidationSteps {
    pub const fn all() -> Self {
        Self {
            producer_signature: true,
            producer_schedule: true,
            merkle_root: true,
            block_size: true,
            transaction_signatures: true,
            authority: true,
            transaction_dupe_check: true,
            tapos: true,
            undo_history: true,
            invariants: true,
            fork_db: true,
            block_log: true,
        }
    }

    /// Replaying the block log: blocks are already validated and already stored.
    pub const fn replay() -> Self {
        Self {
            producer_signature: false,
            producer_schedule: false,
            merkle_root: false,
            block_size: false,
            transaction_signatures: false,
            authority: false,
            transaction_dupe_check: true,
            tapos: false,
            undo_history: false,
            invariants: false,
            fork_db: false,
            block_log: false,
        }
    }

    /// Blocks covered by a checkpoint keep their bookkeeping but skip consensus checks.
    pub const fn trusted(self) -> Self {
        Self {
            producer_signature: false,
            producer_schedule: false,
            merkle_root: false,
            block_size: false,
            transaction_signatures: false,
            authority: false,
            tapos: false,
            ..self
        }
    }
}

/// State of the application in progress, threaded through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplyContext {
    pub steps: ValidationSteps,
    /// Block being applied, or the next block number for pending transactions.
    pub block_num: u32,
    pub block_id: Option<BlockId>,
    pub trx_in_block: Option<u32>,
    pub trx_id: Option<TransactionId>,
    pub op_in_trx: u32,
    /// Position of the next virtual operation within the block.
    pub virtual_op: u32,
}

impl ApplyContext {
    pub fn for_block(steps: ValidationSteps, block_num: u32, block_id: BlockId) -> Self {
        Self {
            steps,
            block_num,
            block_id: Some(block_id),
            trx_in_block: None,
            trx_id: None,
            op_in_trx: 0,
            virtual_op: 0,
        }
    }

    pub fn for_pending(steps: ValidationSteps, block_num: u32) -> Self {
        Self {
            steps,
            block_num,
            block_id: None,
            trx_in_block: None,
            trx_id: None,
            op_in_trx: 0,
            virtual_op: 0,
        }
    }

    pub(crate) fn next_virtual_op(&mut self) -> u32 {
        let sequence = self.virtual_op;
        self.virtual_op += 1;
        sequence
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn trusted_keeps_bookkeeping() {
        let steps = ValidationSteps::all().trusted();
        assert!(!steps.producer_signature);
        assert!(!steps.authority);
        assert!(steps.transaction_dupe_check);
        assert!(steps.fork_db);
        assert!(steps.block_log);
    }

    #[test]
    fn missing_steps_default_to_enabled() {
        let steps: ValidationSteps = serde_json::from_str(r#"{"tapos": false}"#).unwrap();
        assert!(!steps.tapos);
        assert!(steps.authority);
    }

    #[test]
    fn virtual_op_sequence() {
        let mut ctx = ApplyContext::for_pending(ValidationSteps::all(), 1);
        assert_eq!(ctx.next_virtual_op(), 0);
        assert_eq!(ctx.next_virtual_op(), 1);
        assert_eq!(ctx.virtual_op, 2);
    }
}
