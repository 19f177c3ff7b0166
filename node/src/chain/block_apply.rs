use crate::chain::context::{ApplyContext, ValidationSteps};
use crate::chain::error::{ChainError, Result};
use crate::chain::genesis::init_genesis;
use crate::chain::maintenance::MaintenanceContext;
use crate::chain::objects::{
    AccountObject, BlockSummaryObject, ProducerObject, ProducerScheduleObject, SINGLETON_ID,
};
use crate::chain::observer::BlockNotification;
use crate::chain::schedule::{get_scheduled_producer, get_slot_at_time, get_slot_time};
use crate::chain::Ledger;
use crate::config::{ChainConfiguration, BASIS_POINTS};
use crate::fork_db::ForkItem;
use crate::types::{BlockId, SignedBlock};
use crate::utilities::encoding::encode;

impl Ledger {
    /// Pushes a block with the ledger's default validation steps.
    pub fn push_block(&mut self, block: SignedBlock) -> Result<()> {
        self.push_block_with(block, self.steps)
    }

    /// Pushes a block, switching forks if it makes a longer chain.
    ///
    /// Pending transactions are set aside while the block is applied and replayed on the
    /// resulting head afterwards, whether the push succeeded or not.
    pub fn push_block_with(&mut self, block: SignedBlock, steps: ValidationSteps) -> Result<()> {
        let pending = self.take_pending();
        let result = self.push_block_inner(block, steps);
        self.restore_pending(pending);
        result
    }

    pub(crate) fn push_block_inner(&mut self, block: SignedBlock, steps: ValidationSteps) -> Result<()> {
        let item = ForkItem::new(block)?;

        if let Some(expected) = self.checkpoints.get(&item.num) {
            if *expected != item.id {
                return Err(ChainError::CheckpointMismatch {
                    num: item.num,
                    expected: *expected,
                    actual: item.id,
                });
            }
        }
        let steps = match self.checkpoints.keys().next_back() {
            Some(last) if item.num <= *last => steps.trusted(),
            _ => steps,
        };

        if !steps.fork_db {
            return self.apply_block(&item.block, steps);
        }

        let head_id = self.head_block_id()?;
        let new_head = self.fork_db.push_block(item.clone())?;

        if item.previous_id == head_id {
            if new_head.id != item.id {
                self.fork_db.set_head(item.clone());
            }
            if let Err(err) = self.apply_block(&item.block, steps) {
                log::warn!("Block {:?} failed to apply: {err}", item.id);
                self.fork_db.remove(&item.id);
                return Err(err);
            }
            return Ok(());
        }

        if new_head.id != head_id && new_head.num > self.head_block_num()? {
            return self.switch_forks(new_head, head_id, steps);
        }

        log::debug!(
            "Block {:?} is on a shorter fork, keeping head {head_id:?}",
            item.id
        );
        Ok(())
    }

    fn switch_forks(&mut self, new_head: ForkItem, old_head_id: BlockId, steps: ValidationSteps) -> Result<()> {
        log::info!("Switching to fork {:?} from head {old_head_id:?}", new_head.id);
        let (new_branch, old_branch) = self.fork_db.fetch_branch_from(&new_head.id, &old_head_id)?;
        let ancestor = match new_branch.last() {
            Some(item) => item.previous_id,
            None => return Ok(()),
        };
        let lib_before = self.last_irreversible_block_num()?;

        while self.head_block_id()? != ancestor {
            self.pop_block_inner()?;
        }

        // Undo history back to the ancestor stays intact until the whole branch is on.
        for item in new_branch.iter().rev() {
            self.fork_db.set_head(item.clone());
            if let Err(err) = self.apply_block_inner(&item.block, steps, false) {
                log::warn!(
                    "Block {:?} failed during fork switch, restoring previous chain: {err}",
                    item.id
                );
                self.fork_db.remove(&item.id);

                let restored = self
                    .restore_branch(&ancestor, &old_branch, steps)
                    .and_then(|_| self.settle_irreversible(lib_before, steps));
                if let Err(restore_err) = restored {
                    log::error!("Could not restore the previous chain after {err}: {restore_err}");
                    return Err(restore_err);
                }
                return Err(err);
            }
        }
        self.settle_irreversible(lib_before, steps)?;

        log::info!("Switched to fork {:?}", new_head.id);
        Ok(())
    }

    fn restore_branch(&mut self, ancestor: &BlockId, branch: &[ForkItem], steps: ValidationSteps) -> Result<()> {
        while self.head_block_id()? != *ancestor {
            self.pop_block_inner()?;
        }
        for item in branch.iter().rev() {
            self.fork_db.set_head(item.clone());
            self.apply_block_inner(&item.block, steps, false)?;
        }
        Ok(())
    }

    /// Migrates and releases whatever became irreversible while blocks were applied unsettled.
    fn settle_irreversible(&mut self, lib_before: u32, steps: ValidationSteps) -> Result<()> {
        let lib = self.last_irreversible_block_num()?;
        if steps.block_log {
            self.migrate_irreversible_blocks(lib)?;
        }
        self.release_irreversible(lib_before, lib, steps)
    }

    /// Announces newly irreversible blocks and drops undo history at or below them.
    fn release_irreversible(&mut self, old_lib: u32, new_lib: u32, steps: ValidationSteps) -> Result<()> {
        for num in old_lib + 1..=new_lib {
            self.observers
                .notify("on_irreversible_block", |o| o.on_irreversible_block(&self.db, num));
        }
        self.db.commit(u64::from(new_lib));
        if steps.fork_db {
            let head = self.head_block_num()?;
            self.fork_db.set_max_size(head.saturating_sub(new_lib));
        }
        Ok(())
    }

    /// Applies a block on top of the current head inside a single undo session.
    pub(crate) fn apply_block(&mut self, block: &SignedBlock, steps: ValidationSteps) -> Result<()> {
        self.apply_block_inner(block, steps, true)
    }

    /// Without `settle`, irreversible blocks are neither migrated nor released from undo history.
    fn apply_block_inner(&mut self, block: &SignedBlock, steps: ValidationSteps, settle: bool) -> Result<()> {
        let block_id = block.id()?;
        let block_num = block.block_num();
        log::trace!("Applying block {block_id:?}");

        if steps.merkle_root && block.calculate_merkle_root()? != block.header.transaction_merkle_root {
            return Err(ChainError::MerkleRootMismatch(block_id));
        }
        if steps.block_size {
            let size = encode(block)?.len();
            if size > self.config.max_block_size {
                return Err(ChainError::BlockTooLarge {
                    size,
                    max: self.config.max_block_size,
                });
            }
        }
        let producer = self.validate_block_header(block, &block_id, steps)?;

        let session = self.db.start_undo_session();
        let note = BlockNotification { block_id, block };
        self.observers
            .notify("pre_apply_block", |o| o.pre_apply_block(&self.db, &note));

        let mut ctx = ApplyContext::for_block(steps, block_num, block_id);
        for (index, trx) in block.transactions.iter().enumerate() {
            ctx.trx_in_block = Some(index as u32);
            self.apply_transaction(trx, &mut ctx)?;
        }
        ctx.trx_in_block = None;
        ctx.trx_id = None;

        self.update_global_dynamic_data(block, &block_id, steps)?;
        self.update_signing_producer(&producer, block_num)?;
        self.create_block_summary(&block_id)?;

        let mut maintenance = MaintenanceContext {
            db: &self.db,
            config: &self.config,
            block,
            apply: &mut ctx,
            observers: &self.observers,
        };
        self.hooks.run_all(&mut maintenance)?;

        if steps.invariants {
            self.validate_invariants()?;
        }

        let (old_lib, new_lib) = self.update_last_irreversible_block()?;
        if settle && steps.block_log {
            self.migrate_irreversible_blocks(new_lib)?;
        }

        self.observers
            .notify("post_apply_block", |o| o.post_apply_block(&self.db, &note));

        session.push();
        if settle {
            self.release_irreversible(old_lib, new_lib, steps)?;
        }
        Ok(())
    }

    fn validate_block_header(
        &self,
        block: &SignedBlock,
        block_id: &BlockId,
        steps: ValidationSteps,
    ) -> Result<ProducerObject> {
        let dgpo = self.global_properties()?;
        if block.previous() != dgpo.head_block_id {
            return Err(ChainError::InvalidPrevious {
                expected: dgpo.head_block_id,
                actual: block.previous(),
            });
        }
        if block.timestamp() <= dgpo.time {
            return Err(ChainError::BlockTooOld {
                timestamp: block.timestamp(),
                head_time: dgpo.time,
            });
        }

        let producer_name = &block.header.producer;
        let producer = self
            .find_producer(producer_name)
            .ok_or_else(|| ChainError::UnknownProducer(producer_name.clone()))?;

        if steps.producer_schedule {
            let slot = get_slot_at_time(&self.db, &self.config, block.timestamp())?;
            if slot == 0 || get_slot_time(&self.db, &self.config, slot)? != block.timestamp() {
                return Err(ChainError::InvalidSlot(block.timestamp()));
            }
            let scheduled = get_scheduled_producer(&self.db, slot)?;
            if scheduled != *producer_name {
                return Err(ChainError::WrongProducer {
                    expected: scheduled,
                    actual: producer_name.clone(),
                });
            }
        }

        if steps.producer_signature {
            let valid = match &producer.signing_key {
                Some(key) => block.validate_signee(key)?,
                None => false,
            };
            if !valid {
                return Err(ChainError::InvalidProducerSignature(*block_id));
            }
        }
        Ok(producer)
    }

    /// Moves the head forward and accounts for the slots skipped since the previous block.
    fn update_global_dynamic_data(
        &mut self,
        block: &SignedBlock,
        block_id: &BlockId,
        steps: ValidationSteps,
    ) -> Result<()> {
        let dgpo = self.global_properties()?;
        let slot = get_slot_at_time(&self.db, &self.config, block.timestamp())?;
        let missed_blocks = slot.saturating_sub(1);

        for i in 0..missed_blocks {
            let scheduled = get_scheduled_producer(&self.db, i + 1)?;
            if scheduled == block.header.producer {
                continue;
            }
            if let Some(missed) = self.find_producer(&scheduled) {
                log::trace!("Producer {scheduled} missed slot {}", i + 1);
                self.db.modify(&missed, |producer| producer.total_missed += 1)?;
            }
        }

        let dgpo = self.db.modify(&dgpo, |dgpo| {
            dgpo.head_block_number = block.block_num();
            dgpo.head_block_id = *block_id;
            dgpo.time = block.timestamp();
            dgpo.current_producer = block.header.producer.clone();
            dgpo.current_aslot += u64::from(missed_blocks) + 1;

            dgpo.recent_slots_filled = if missed_blocks < 64 {
                ((dgpo.recent_slots_filled << 1) | 1) << missed_blocks
            } else {
                0
            };
            dgpo.participation_count = dgpo.recent_slots_filled.count_ones();
        })?;

        if steps.undo_history {
            let distance = dgpo.head_block_number - dgpo.last_irreversible_block_num;
            if distance >= self.config.max_undo_history {
                return Err(ChainError::UndoHistoryExhausted {
                    head: dgpo.head_block_number,
                    distance,
                });
            }
        }
        Ok(())
    }

    fn update_signing_producer(&mut self, producer: &ProducerObject, block_num: u32) -> Result<()> {
        let aslot = self.global_properties()?.current_aslot;
        self.db.modify(producer, |producer| {
            producer.last_aslot = aslot;
            producer.last_confirmed_block_num = block_num;
        })?;
        Ok(())
    }

    fn create_block_summary(&mut self, block_id: &BlockId) -> Result<()> {
        let ref_block_num = (block_id.block_num() & 0xffff) as u16;
        match self
            .db
            .find_by_key::<BlockSummaryObject>(&BlockSummaryObject::key(ref_block_num))
        {
            Some(summary) => {
                self.db
                    .modify(&summary, |summary| summary.block_id = *block_id)?;
            }
            None => {
                self.db.create(|id| BlockSummaryObject {
                    id,
                    ref_block_num,
                    block_id: *block_id,
                })?;
            }
        }
        Ok(())
    }

    /// Every unit of supply must sit in some account.
    fn validate_invariants(&self) -> Result<()> {
        let dgpo = self.global_properties()?;
        let total: u64 = self
            .db
            .all::<AccountObject>()
            .iter()
            .map(|account| account.balance)
            .sum();
        if total != dgpo.current_supply {
            return Err(ChainError::SupplyMismatch {
                expected: dgpo.current_supply,
                actual: total,
            });
        }
        Ok(())
    }

    /// Returns the last irreversible block number before and after this block.
    fn update_last_irreversible_block(&mut self) -> Result<(u32, u32)> {
        let dgpo = self.global_properties()?;
        let schedule = self.db.get::<ProducerScheduleObject>(SINGLETON_ID)?;
        let confirmations = schedule
            .current_shuffled_producers
            .iter()
            .filter_map(|name| self.find_producer(name))
            .map(|producer| producer.last_confirmed_block_num)
            .collect();

        let old_lib = dgpo.last_irreversible_block_num;
        let candidate = irreversible_candidate(dgpo.head_block_number, &self.config, confirmations);
        if candidate <= old_lib {
            return Ok((old_lib, old_lib));
        }

        log::trace!("Last irreversible block moves from {old_lib} to {candidate}");
        self.db
            .modify(&dgpo, |dgpo| dgpo.last_irreversible_block_num = candidate)?;
        Ok((old_lib, candidate))
    }

    /// Appends blocks up to `last_irreversible` to the block log.
    fn migrate_irreversible_blocks(&mut self, last_irreversible: u32) -> Result<()> {
        let log_head = self.block_log.head_num().map_err(ChainError::BlockLog)?;
        for num in log_head + 1..=last_irreversible {
            let item = self.fork_db.fetch_on_main_branch(num).ok_or_else(|| {
                ChainError::Invariant(format!(
                    "irreversible block {num} is missing from the fork database"
                ))
            })?;
            self.block_log
                .append(&item.block)
                .map_err(ChainError::BlockLog)?;
            log::debug!("Block {:?} is irreversible", item.id);
        }
        Ok(())
    }

    /// Reverts the head block. Its transactions are replayed as pending ones.
    pub fn pop_block(&mut self) -> Result<()> {
        let pending = self.take_pending();
        let result = self.pop_block_inner();
        self.restore_pending(pending);
        result
    }

    pub(crate) fn pop_block_inner(&mut self) -> Result<()> {
        let head_id = self.head_block_id()?;
        let block = self
            .fork_db
            .fetch_block(&head_id)
            .ok_or(ChainError::UnknownBlock(head_id))?;

        self.db.undo()?;
        self.fork_db.pop_block()?;

        let mut popped = block.transactions.clone();
        popped.append(&mut self.popped_transactions);
        self.popped_transactions = popped;
        log::debug!("Popped block {head_id:?}");
        Ok(())
    }

    /// Rebuilds state from genesis by replaying the block log. Returns the new head.
    pub fn reindex(&mut self) -> Result<u32> {
        self.clear_pending();
        self.popped_transactions.clear();
        self.observers
            .notify("pre_reindex", |o| o.pre_reindex(&self.db));

        self.db.undo_all();
        self.db.wipe();
        init_genesis(&self.db, &self.config)?;
        self.fork_db.reset(BlockId::default());

        let log_head = self.block_log.head_num().map_err(ChainError::BlockLog)?;
        log::info!("Replaying {log_head} blocks from the block log");
        let steps = ValidationSteps::replay();
        for num in 1..=log_head {
            let block = self
                .block_log
                .read_block_by_num(num)
                .map_err(ChainError::BlockLog)?
                .ok_or_else(|| {
                    ChainError::BlockLog(anyhow::anyhow!("Block {num} is missing from the block log"))
                })?;
            self.apply_block(&block, steps)?;
            if num % 10_000 == 0 {
                log::info!("Replayed {num} of {log_head} blocks");
            }
        }

        self.db.commit(self.db.revision());
        if let Some(head) = self.block_log.head().map_err(ChainError::BlockLog)? {
            // everything in the log is irreversible
            let dgpo = self.global_properties()?;
            if dgpo.last_irreversible_block_num < log_head {
                self.db
                    .modify(&dgpo, |dgpo| dgpo.last_irreversible_block_num = log_head)?;
            }
            self.fork_db.start_block(head)?;
        }

        log::info!(
            "Reindex done, head {} revision {}",
            self.head_block_num()?,
            self.revision()
        );
        self.observers
            .notify("post_reindex", |o| o.post_reindex(&self.db, log_head));
        Ok(log_head)
    }
}

/// Last irreversible block implied by the producers' confirmations.
///
/// Below the bootstrap height it trails the head by `max_producers`. Afterwards it is the
/// highest block confirmed by enough producers to cross the configured threshold.
pub(crate) fn irreversible_candidate(
    head_block_num: u32,
    config: &ChainConfiguration,
    mut confirmations: Vec<u32>,
) -> u32 {
    if head_block_num < config.bootstrap_irreversible_height {
        return head_block_num.saturating_sub(config.max_producers);
    }
    if confirmations.is_empty() {
        return 0;
    }

    confirmations.sort_unstable();
    let producers = confirmations.len() as u64;
    let non_confirming = u64::from(BASIS_POINTS.saturating_sub(config.irreversible_threshold_bps));
    let rank = (non_confirming * producers)
        .div_ceil(u64::from(BASIS_POINTS))
        .max(1);
    confirmations[(rank - 1) as usize]
}
