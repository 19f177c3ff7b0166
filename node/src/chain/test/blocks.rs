use std::collections::BTreeSet;
use std::sync::Arc;

use assert_matches::assert_matches;
use parking_lot::Mutex;

use crate::chain::maintenance::MaintenanceHook;
use crate::chain::observer::{BlockNotification, ChainObserver};
use crate::chain::test::*;
use crate::chain::{ChainError, Ledger, LedgerBuilder, MaintenanceContext, MaintenancePhase};
use crate::config::ChainConfiguration;
use crate::fork_db::ForkDbError;
use crate::state::StateReader;
use crate::types::{AccountName, BlockId};
use crate::utilities::encoding::encode;
use crate::utilities::hash::HashType;

#[test]
fn revision_tracks_head() {
    let mut ledger = open_ledger(chain_config());
    assert_eq!(ledger.head_block_num().unwrap(), 0);
    assert_eq!(ledger.revision(), 0);

    for expected in 1..=5 {
        let block = generate_next(&mut ledger);
        assert_eq!(block.block_num(), expected);
        assert_eq!(ledger.head_block_num().unwrap(), expected);
        assert_eq!(ledger.head_block_id().unwrap(), block.id().unwrap());
        assert_eq!(ledger.revision(), u64::from(expected));
    }
}

#[test]
fn missed_slots_lower_participation() {
    let mut ledger = open_ledger(chain_config());
    generate_next(&mut ledger);
    generate_at(&mut ledger, 3);

    let dgpo = ledger.global_properties().unwrap();
    assert_eq!(dgpo.current_aslot, 4);
    assert_eq!(dgpo.participation_count, 62);
    assert_eq!(ledger.participation_rate().unwrap(), 9687);
}

#[test]
fn pop_block_restores_previous_head() {
    let mut ledger = open_ledger(chain_config());
    let blocks: Vec<_> = (0..5).map(|_| generate_next(&mut ledger)).collect();

    ledger.pop_block().unwrap();
    ledger.pop_block().unwrap();

    assert_eq!(ledger.head_block_num().unwrap(), 3);
    assert_eq!(ledger.head_block_id().unwrap(), blocks[2].id().unwrap());
    assert_eq!(ledger.head_block_time().unwrap(), blocks[2].timestamp());
    assert_eq!(ledger.revision(), 3);

    ledger.push_block(blocks[3].clone()).unwrap();
    assert_eq!(ledger.head_block_id().unwrap(), blocks[3].id().unwrap());
}

#[test]
fn switches_only_to_longer_fork() {
    let mut node_a = open_ledger(chain_config());
    let mut node_b = open_ledger(chain_config());

    let a_blocks: Vec<_> = (0..3).map(|_| generate_next(&mut node_a)).collect();
    let mut b_blocks = vec![generate_at(&mut node_b, 2)];
    for _ in 0..3 {
        b_blocks.push(generate_next(&mut node_b));
    }

    for block in &b_blocks[..3] {
        node_a.push_block(block.clone()).unwrap();
        assert_eq!(node_a.head_block_id().unwrap(), a_blocks[2].id().unwrap());
    }

    node_a.push_block(b_blocks[3].clone()).unwrap();
    assert_eq!(node_a.head_block_id().unwrap(), b_blocks[3].id().unwrap());
    assert_eq!(node_a.revision(), 4);
    assert_eq!(
        node_a.global_properties().unwrap(),
        node_b.global_properties().unwrap()
    );
    assert_eq!(
        node_a.get_account(&"initminer".into()).unwrap(),
        node_b.get_account(&"initminer".into()).unwrap()
    );
}

#[test]
fn failed_switch_restores_original_fork() {
    let mut node_a = open_ledger(chain_config());
    let mut node_b = open_ledger(chain_config());

    let a_blocks: Vec<_> = (0..2).map(|_| generate_next(&mut node_a)).collect();
    let b1 = generate_at(&mut node_b, 2);
    let b2 = generate_next(&mut node_b);
    let mut b3 = generate_next(&mut node_b);
    b3.header.transaction_merkle_root = HashType::digest(b"bogus");
    let bad_id = b3.id().unwrap();

    node_a.push_block(b1).unwrap();
    node_a.push_block(b2.clone()).unwrap();
    assert_eq!(node_a.head_block_id().unwrap(), a_blocks[1].id().unwrap());

    let err = node_a.push_block(b3).unwrap_err();
    assert_matches!(err, ChainError::MerkleRootMismatch(id) if id == bad_id);

    assert_eq!(node_a.head_block_id().unwrap(), a_blocks[1].id().unwrap());
    assert_eq!(node_a.revision(), 2);
    assert!(!node_a.fork_db().is_known_block(&bad_id));
    assert!(node_a.fork_db().is_known_block(&b2.id().unwrap()));
    assert_eq!(
        node_a.fork_db().head().unwrap().id,
        a_blocks[1].id().unwrap()
    );
}

#[test]
fn switch_forks_returns_undone_transactions_to_pending() {
    let mut node_a = open_ledger(chain_config());
    let mut node_b = open_ledger(chain_config());

    let common = generate_next(&mut node_a);
    node_b.push_block(common).unwrap();

    let create_alice = sign_transaction(&node_a, vec![create_account("alice")], &[&init_keypair()]);
    node_a.push_transaction(create_alice.clone()).unwrap();
    generate_next(&mut node_a);
    assert!(node_a.find_account(&"alice".into()).is_some());

    let b2 = generate_at(&mut node_b, 2);
    let b3 = generate_next(&mut node_b);
    node_a.push_block(b2).unwrap();
    assert!(node_a.find_account(&"alice".into()).is_some());

    node_a.push_block(b3.clone()).unwrap();
    assert_eq!(node_a.head_block_id().unwrap(), b3.id().unwrap());
    // Only pending state knows about alice now.
    assert_eq!(node_a.pending_transactions(), &[create_alice.clone()]);
    node_a.clear_pending();
    assert!(node_a.find_account(&"alice".into()).is_none());

    node_b.push_transaction(create_alice).unwrap();
    let b4 = generate_next(&mut node_b);
    node_a.push_block(b4).unwrap();

    assert_eq!(node_a.head_block_id().unwrap(), node_b.head_block_id().unwrap());
    assert_eq!(
        node_a.get_account(&"alice".into()).unwrap(),
        node_b.get_account(&"alice".into()).unwrap()
    );
    assert_eq!(
        node_a.global_properties().unwrap(),
        node_b.global_properties().unwrap()
    );
}

#[test]
fn rejects_block_with_wrong_signature() {
    let mut ledger = open_ledger(chain_config());
    let block = block_at(&ledger, 1, &account_keypair("mallory"));
    let id = block.id().unwrap();

    assert_matches!(
        ledger.push_block(block),
        Err(ChainError::InvalidProducerSignature(bad)) if bad == id
    );
    assert!(!ledger.fork_db().is_known_block(&id));
    assert_eq!(ledger.head_block_num().unwrap(), 0);
}

fn assert_head_unchanged(ledger: &Ledger, head: BlockId, revision: u64) {
    assert_eq!(ledger.head_block_id().unwrap(), head);
    assert_eq!(ledger.revision(), revision);
    assert_eq!(ledger.fork_db().head().unwrap().id, head);
}

#[test]
fn rejects_block_not_after_head_time() {
    let mut ledger = open_ledger(chain_config());
    generate_next(&mut ledger);
    let head = ledger.head_block_id().unwrap();
    let head_time = ledger.head_block_time().unwrap();

    let mut block = block_at(&ledger, 1, &init_keypair());
    block.header.timestamp = head_time;
    block.sign(&init_keypair()).unwrap();
    let id = block.id().unwrap();

    assert_matches!(
        ledger.push_block(block),
        Err(ChainError::BlockTooOld { timestamp, head_time: at }) if timestamp == head_time && at == head_time
    );
    assert_head_unchanged(&ledger, head, 1);
    assert!(!ledger.fork_db().is_known_block(&id));
}

#[test]
fn rejects_block_off_slot_boundary() {
    let mut ledger = open_ledger(chain_config());
    generate_next(&mut ledger);
    let head = ledger.head_block_id().unwrap();

    let mut block = block_at(&ledger, 1, &init_keypair());
    let off_slot = block.timestamp() + 1;
    block.header.timestamp = off_slot;
    block.sign(&init_keypair()).unwrap();

    assert_matches!(
        ledger.push_block(block),
        Err(ChainError::InvalidSlot(at)) if at == off_slot
    );
    assert_head_unchanged(&ledger, head, 1);
}

#[test]
fn rejects_oversized_block() {
    let scratch = open_ledger(chain_config());
    let empty_size = encode(&block_at(&scratch, 1, &init_keypair())).unwrap().len();
    let limit = empty_size + 16;
    let mut ledger = open_ledger(ChainConfiguration {
        max_block_size: limit,
        ..chain_config()
    });
    generate_next(&mut ledger);
    let head = ledger.head_block_id().unwrap();

    let mut block = block_at(&ledger, 1, &init_keypair());
    block
        .transactions
        .push(sign_transaction(&ledger, vec![create_account("alice")], &[&init_keypair()]));
    block.header.transaction_merkle_root = block.calculate_merkle_root().unwrap();
    block.sign(&init_keypair()).unwrap();

    assert_matches!(
        ledger.push_block(block),
        Err(ChainError::BlockTooLarge { size, max }) if max == limit && size > limit
    );
    assert_head_unchanged(&ledger, head, 1);
    assert!(ledger.find_account(&"alice".into()).is_none());
}

#[test]
fn refuses_to_outgrow_undo_history() {
    let mut ledger = open_ledger(ChainConfiguration {
        max_undo_history: 3,
        ..chain_config()
    });
    generate_next(&mut ledger);
    generate_next(&mut ledger);
    let head = ledger.head_block_id().unwrap();

    let block = block_at(&ledger, 1, &init_keypair());
    let id = block.id().unwrap();
    assert_matches!(
        ledger.push_block(block),
        Err(ChainError::UndoHistoryExhausted { head: 3, distance: 3 })
    );
    assert_head_unchanged(&ledger, head, 2);
    assert!(!ledger.fork_db().is_known_block(&id));
    assert_eq!(ledger.state().undo_depth(), 2);
}

/// Ledger where bob and carol produce next to initminer, with irreversibility decided by
/// confirmations from the first block on. The three of them are scheduled from block 3.
fn ledger_with_producers() -> Ledger {
    let mut ledger = open_ledger(ChainConfiguration {
        bootstrap_irreversible_height: 0,
        max_producers: 3,
        ..chain_config()
    });
    generate_next(&mut ledger);

    let accounts = sign_transaction(
        &ledger,
        vec![create_account("bob"), create_account("carol")],
        &[&init_keypair()],
    );
    ledger.push_transaction(accounts).unwrap();
    generate_next(&mut ledger);

    let registrations = sign_transaction(
        &ledger,
        vec![producer_update("bob"), producer_update("carol")],
        &[&account_keypair("bob"), &account_keypair("carol")],
    );
    ledger.push_transaction(registrations).unwrap();
    generate_next(&mut ledger);
    ledger
}

fn producer_names() -> BTreeSet<AccountName> {
    BTreeSet::from(["bob".into(), "carol".into(), "initminer".into()])
}

#[test]
fn registered_producers_rotate_and_confirm_blocks() {
    let mut ledger = ledger_with_producers();
    let scheduled: BTreeSet<AccountName> = (1..=3)
        .map(|slot| ledger.get_scheduled_producer(slot).unwrap())
        .collect();
    assert_eq!(scheduled, producer_names());

    let mut seen = BTreeSet::new();
    for _ in 0..12 {
        let block = generate_next(&mut ledger);
        seen.insert(block.header.producer.clone());
    }
    assert_eq!(seen, producer_names());
    assert_eq!(ledger.head_block_num().unwrap(), 15);
    // the last three blocks come from three different producers
    assert_eq!(ledger.last_irreversible_block_num().unwrap(), 13);

    let skipped = ledger.get_scheduled_producer(1).unwrap();
    assert_eq!(ledger.find_producer(&skipped).unwrap().total_missed, 0);
    let block = generate_at(&mut ledger, 2);
    assert_ne!(block.header.producer, skipped);
    assert_eq!(ledger.find_producer(&skipped).unwrap().total_missed, 1);
    assert_eq!(ledger.find_producer(&block.header.producer).unwrap().total_missed, 0);
}

#[test]
fn rejects_block_from_unscheduled_producer() {
    let mut ledger = ledger_with_producers();
    let head = ledger.head_block_id().unwrap();
    let revision = ledger.revision();
    let slot = (1..=3)
        .find(|slot| ledger.get_scheduled_producer(*slot).unwrap().as_str() != "initminer")
        .unwrap();
    let scheduled = ledger.get_scheduled_producer(slot).unwrap();

    let block = block_at(&ledger, slot, &init_keypair());
    assert_matches!(
        ledger.push_block(block),
        Err(ChainError::WrongProducer { expected, actual }) if expected == scheduled && actual.as_str() == "initminer"
    );
    assert_head_unchanged(&ledger, head, revision);
}

#[test]
fn rejects_unlinkable_block() {
    let mut ledger = open_ledger(chain_config());
    let mut orphan = block_at(&ledger, 1, &init_keypair());
    orphan.header.previous = BlockId::new(5, &HashType::digest(b"elsewhere"));
    orphan.sign(&init_keypair()).unwrap();

    assert_matches!(
        ledger.push_block(orphan),
        Err(ChainError::ForkDb(ForkDbError::Unlinkable { .. }))
    );
    assert_eq!(ledger.head_block_num().unwrap(), 0);
}

#[test]
fn checkpoint_mismatch_is_rejected() {
    let mut ledger = open_ledger(chain_config());
    ledger.add_checkpoints([(1, BlockId::new(1, &HashType::digest(b"other")))]);
    let block = block_at(&ledger, 1, &init_keypair());

    assert_matches!(
        ledger.push_block(block),
        Err(ChainError::CheckpointMismatch { num: 1, .. })
    );
}

#[test]
fn checkpointed_blocks_skip_signature_checks() {
    let mut untrusting = open_ledger(chain_config());
    let block = block_at(&untrusting, 1, &account_keypair("mallory"));
    assert_matches!(
        untrusting.push_block(block.clone()),
        Err(ChainError::InvalidProducerSignature(_))
    );

    let mut trusting = open_ledger(chain_config());
    trusting.add_checkpoints([(1, block.id().unwrap())]);
    trusting.push_block(block.clone()).unwrap();
    assert_eq!(trusting.head_block_id().unwrap(), block.id().unwrap());
}

#[test]
fn irreversibility_is_monotonic_and_migrates_blocks() {
    let config = ChainConfiguration {
        max_producers: 3,
        ..chain_config()
    };
    let log = MemoryBlockLog::default();
    let mut ledger = open_ledger_with_log(config, log.clone());

    let mut last = 0;
    for _ in 0..10 {
        generate_next(&mut ledger);
        let lib = ledger.last_irreversible_block_num().unwrap();
        assert!(lib >= last);
        last = lib;

        for num in 0..lib {
            assert!(ledger.fork_db().fetch_by_number(num).is_empty());
        }
        assert_eq!(log.len() as u32, lib);
    }
    assert_eq!(last, 7);
    assert_eq!(ledger.fetch_block_by_number(2).unwrap().unwrap().block_num(), 2);
}

#[test]
fn quorum_rule_takes_over_at_bootstrap_height() {
    let config = ChainConfiguration {
        bootstrap_irreversible_height: 5,
        max_producers: 3,
        ..chain_config()
    };
    let log = MemoryBlockLog::default();
    let mut ledger = open_ledger_with_log(config, log.clone());

    for _ in 0..4 {
        generate_next(&mut ledger);
    }
    assert_eq!(ledger.last_irreversible_block_num().unwrap(), 1);

    generate_next(&mut ledger);
    assert_eq!(ledger.last_irreversible_block_num().unwrap(), 5);
    assert_eq!(log.len(), 5);
    assert_eq!(ledger.fork_db().len(), 1);

    generate_next(&mut ledger);
    assert_eq!(ledger.last_irreversible_block_num().unwrap(), 6);
}

#[test]
fn reindex_rebuilds_identical_state() {
    let config = ChainConfiguration {
        bootstrap_irreversible_height: 1,
        max_producers: 1,
        ..chain_config()
    };
    let log = MemoryBlockLog::default();
    let mut ledger = open_ledger_with_log(config.clone(), log.clone());

    generate_next(&mut ledger);
    let create_alice = sign_transaction(&ledger, vec![create_account("alice")], &[&init_keypair()]);
    ledger.push_transaction(create_alice).unwrap();
    generate_next(&mut ledger);
    let pay_alice = sign_transaction(
        &ledger,
        vec![transfer("initminer", "alice", 500)],
        &[&init_keypair()],
    );
    ledger.push_transaction(pay_alice).unwrap();
    generate_next(&mut ledger);
    generate_next(&mut ledger);
    assert_eq!(log.len(), 4);

    let replayed = open_ledger_with_log(config, log);
    assert_eq!(replayed.head_block_num().unwrap(), 4);
    assert_eq!(replayed.head_block_id().unwrap(), ledger.head_block_id().unwrap());
    assert_eq!(replayed.last_irreversible_block_num().unwrap(), 4);
    assert_eq!(replayed.revision(), ledger.revision());
    assert_eq!(
        replayed.get_account(&"alice".into()).unwrap(),
        ledger.get_account(&"alice".into()).unwrap()
    );
    assert_eq!(
        replayed.global_properties().unwrap(),
        ledger.global_properties().unwrap()
    );

    assert_eq!(ledger.reindex().unwrap(), 4);
    assert_eq!(ledger.get_account(&"alice".into()).unwrap().balance, ACCOUNT_CREATION_FEE + 500);
}

#[derive(Default)]
struct Recorder {
    applied: Mutex<Vec<u32>>,
    irreversible: Mutex<Vec<u32>>,
}

impl ChainObserver for Recorder {
    fn post_apply_block(&self, _: &StateReader, note: &BlockNotification<'_>) -> anyhow::Result<()> {
        self.applied.lock().push(note.block.block_num());
        Ok(())
    }

    fn on_irreversible_block(&self, _: &StateReader, block_num: u32) -> anyhow::Result<()> {
        self.irreversible.lock().push(block_num);
        Ok(())
    }
}

#[test]
fn observers_see_each_irreversible_block_once() {
    let config = ChainConfiguration {
        bootstrap_irreversible_height: 5,
        max_producers: 3,
        ..chain_config()
    };
    let recorder = Arc::new(Recorder::default());
    crate::logging::init_for_tests();
    let mut ledger = LedgerBuilder::new(config, Box::new(MemoryBlockLog::default()))
        .with_observer(recorder.clone())
        .open()
        .unwrap();

    for _ in 0..5 {
        generate_next(&mut ledger);
    }

    assert_eq!(*recorder.applied.lock(), vec![1, 2, 3, 4, 5]);
    assert_eq!(*recorder.irreversible.lock(), vec![1, 2, 3, 4, 5]);
}

fn recorded_ledger(config: ChainConfiguration, log: MemoryBlockLog) -> (Ledger, Arc<Recorder>) {
    crate::logging::init_for_tests();
    let recorder = Arc::new(Recorder::default());
    let ledger = LedgerBuilder::new(config, Box::new(log))
        .with_observer(recorder.clone())
        .open()
        .unwrap();
    (ledger, recorder)
}

/// Two nodes sharing blocks 1 and 2, each extended to block 4 on its own. The second
/// node's branch starts one slot later.
fn diverged_nodes(node_a: &mut Ledger, config: ChainConfiguration) -> Ledger {
    let mut node_b = open_ledger(config);
    for _ in 0..2 {
        let block = generate_next(node_a);
        node_b.push_block(block).unwrap();
    }
    generate_next(node_a);
    generate_next(node_a);
    generate_at(&mut node_b, 2);
    generate_next(&mut node_b);
    node_b
}

#[test]
fn fork_switch_settles_irreversibility_once() {
    let config = ChainConfiguration {
        max_producers: 3,
        ..chain_config()
    };
    let log = MemoryBlockLog::default();
    let (mut node_a, recorder) = recorded_ledger(config.clone(), log.clone());
    let mut node_b = diverged_nodes(&mut node_a, config);
    assert_eq!(node_a.last_irreversible_block_num().unwrap(), 1);
    let b5 = generate_next(&mut node_b);

    for num in 3..=5 {
        let block = node_b.fetch_block_by_number(num).unwrap().unwrap();
        node_a.push_block(block).unwrap();
    }

    assert_eq!(node_a.head_block_id().unwrap(), b5.id().unwrap());
    assert_eq!(node_a.last_irreversible_block_num().unwrap(), 2);
    assert_eq!(log.len(), 2);
    assert_eq!(node_a.state().undo_depth(), 3);
    assert_eq!(*recorder.irreversible.lock(), vec![1, 2]);
    assert_eq!(*recorder.applied.lock(), vec![1, 2, 3, 4, 3, 4, 5]);
}

#[test]
fn failed_fork_switch_keeps_irreversibility_untouched() {
    let config = ChainConfiguration {
        max_producers: 3,
        ..chain_config()
    };
    let log = MemoryBlockLog::default();
    let (mut node_a, recorder) = recorded_ledger(config.clone(), log.clone());
    let mut node_b = diverged_nodes(&mut node_a, config);
    let head = node_a.head_block_id().unwrap();

    let mut bad = generate_next(&mut node_b);
    bad.header.transaction_merkle_root = HashType::digest(b"bogus");
    let bad_id = bad.id().unwrap();

    for num in 3..=4 {
        let block = node_b.fetch_block_by_number(num).unwrap().unwrap();
        node_a.push_block(block).unwrap();
    }
    assert_matches!(
        node_a.push_block(bad),
        Err(ChainError::MerkleRootMismatch(id)) if id == bad_id
    );

    assert_head_unchanged(&node_a, head, 4);
    assert_eq!(node_a.last_irreversible_block_num().unwrap(), 1);
    assert_eq!(log.len(), 1);
    assert_eq!(node_a.state().undo_depth(), 3);
    assert_eq!(*recorder.irreversible.lock(), vec![1]);
    assert!(!node_a.fork_db().is_known_block(&bad_id));
}

struct Inflation;

impl MaintenanceHook for Inflation {
    fn name(&self) -> &'static str {
        "inflation"
    }

    fn phase(&self) -> MaintenancePhase {
        MaintenancePhase::Funds
    }

    fn run(&self, ctx: &mut MaintenanceContext<'_>) -> anyhow::Result<()> {
        let dgpo = ctx.global_properties()?;
        ctx.db.modify(&dgpo, |dgpo| dgpo.current_supply += 1)?;
        Ok(())
    }
}

#[test]
fn supply_mismatch_is_fatal_and_leaves_no_trace() {
    crate::logging::init_for_tests();
    let mut ledger = LedgerBuilder::new(chain_config(), Box::new(MemoryBlockLog::default()))
        .with_maintenance_hook(Box::new(Inflation))
        .open()
        .unwrap();
    let block = block_at(&ledger, 1, &init_keypair());
    let id = block.id().unwrap();

    let err = ledger.push_block(block).unwrap_err();
    assert_matches!(err, ChainError::SupplyMismatch { .. });
    assert!(err.is_fatal());
    assert_eq!(ledger.head_block_num().unwrap(), 0);
    assert_eq!(ledger.revision(), 0);
    assert!(!ledger.fork_db().is_known_block(&id));
}
