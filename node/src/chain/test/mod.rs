//! Harness for end-to-end tests of the ledger.
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chain::{Ledger, LedgerBuilder, ValidationSteps};
use crate::config::ChainConfiguration;
use crate::storage::{check_append_order, BlockLog};
use crate::types::{
    AccountCreateOperation, AccountName, Authority, BlockHeader, BlockId, Operation,
    ProducerUpdateOperation, SignedBlock, SignedTransaction, Transaction, TransferOperation,
};
use crate::utilities::crypto::{ChainKeypair, ChainPublicKey, Keypair};
use crate::utilities::hash::HashType;

mod blocks;

pub(crate) const GENESIS_TIME: u32 = 1_500_000_000;
pub(crate) const ACCOUNT_CREATION_FEE: u64 = 100;

/// Block log kept in memory and shared between clones, so a second ledger can replay it.
#[derive(Clone, Default)]
pub(crate) struct MemoryBlockLog {
    blocks: Arc<Mutex<Vec<SignedBlock>>>,
}

impl MemoryBlockLog {
    pub(crate) fn len(&self) -> usize {
        self.blocks.lock().len()
    }
}

impl BlockLog for MemoryBlockLog {
    fn append(&mut self, block: &SignedBlock) -> anyhow::Result<()> {
        let mut blocks = self.blocks.lock();
        check_append_order(blocks.len() as u32, block)?;
        blocks.push(block.clone());
        Ok(())
    }

    fn read_block_by_num(&self, block_num: u32) -> anyhow::Result<Option<SignedBlock>> {
        let blocks = self.blocks.lock();
        Ok(block_num
            .checked_sub(1)
            .and_then(|index| blocks.get(index as usize))
            .cloned())
    }

    fn read_block_by_id(&self, block_id: &BlockId) -> anyhow::Result<Option<SignedBlock>> {
        let blocks = self.blocks.lock();
        for block in blocks.iter() {
            if block.id()? == *block_id {
                return Ok(Some(block.clone()));
            }
        }
        Ok(None)
    }

    fn head(&self) -> anyhow::Result<Option<SignedBlock>> {
        Ok(self.blocks.lock().last().cloned())
    }
}

pub(crate) fn init_keypair() -> Keypair {
    Keypair::generate(Some(b"initminer-key".to_vec()))
}

pub(crate) fn account_keypair(name: &str) -> Keypair {
    Keypair::generate(Some(format!("{name}-key").into_bytes()))
}

/// Block signing key of a producer registered with [`producer_update`].
pub(crate) fn producer_keypair(producer: &AccountName) -> Keypair {
    match producer.as_str() {
        "initminer" => init_keypair(),
        name => account_keypair(name),
    }
}

/// Irreversibility trails the head by 21 blocks, so every test block stays reversible.
pub(crate) fn chain_config() -> ChainConfiguration {
    ChainConfiguration {
        genesis_time: GENESIS_TIME,
        init_public_key: init_keypair().public_key().to_base58(),
        bootstrap_irreversible_height: 1_000_000,
        max_producers: 21,
        ..Default::default()
    }
}

pub(crate) fn open_ledger(config: ChainConfiguration) -> Ledger {
    open_ledger_with_log(config, MemoryBlockLog::default())
}

pub(crate) fn open_ledger_with_log(config: ChainConfiguration, block_log: MemoryBlockLog) -> Ledger {
    crate::logging::init_for_tests();
    LedgerBuilder::new(config, Box::new(block_log)).open().unwrap()
}

/// Produces the block of the given slot after the head, signed by the scheduled producer.
pub(crate) fn generate_at(ledger: &mut Ledger, slot: u32) -> SignedBlock {
    let when = ledger.get_slot_time(slot).unwrap();
    let producer = ledger.get_scheduled_producer(slot).unwrap();
    ledger
        .generate_block(when, &producer, &producer_keypair(&producer), ValidationSteps::all())
        .unwrap()
}

pub(crate) fn generate_next(ledger: &mut Ledger) -> SignedBlock {
    generate_at(ledger, 1)
}

/// Transaction referencing the head block, signed by `signers`.
pub(crate) fn sign_transaction(
    ledger: &Ledger,
    operations: Vec<Operation>,
    signers: &[&Keypair],
) -> SignedTransaction {
    sign_transaction_with(ledger, operations, signers, |_| {})
}

/// Like [`sign_transaction`], with a chance to alter the transaction before signing.
pub(crate) fn sign_transaction_with<F>(
    ledger: &Ledger,
    operations: Vec<Operation>,
    signers: &[&Keypair],
    adjust: F,
) -> SignedTransaction
where
    F: FnOnce(&mut Transaction),
{
    let mut transaction = Transaction {
        ref_block_num: 0,
        ref_block_prefix: 0,
        expiration: ledger.head_block_time().unwrap() + 60,
        operations,
    };
    transaction.set_reference_block(&ledger.head_block_id().unwrap());
    adjust(&mut transaction);

    let mut signed = SignedTransaction::new(transaction);
    for signer in signers {
        signed.sign(signer, &ledger.chain_id()).unwrap();
    }
    signed
}

/// Empty block for the given slot, signed by `keypair`.
pub(crate) fn block_at(ledger: &Ledger, slot: u32, keypair: &Keypair) -> SignedBlock {
    let mut block = SignedBlock::new(
        BlockHeader {
            previous: ledger.head_block_id().unwrap(),
            timestamp: ledger.get_slot_time(slot).unwrap(),
            producer: "initminer".into(),
            transaction_merkle_root: HashType::default(),
        },
        vec![],
    );
    block.sign(keypair).unwrap();
    block
}

pub(crate) fn create_account(name: &str) -> Operation {
    let key = account_keypair(name).public_key();
    Operation::AccountCreate(AccountCreateOperation {
        fee: ACCOUNT_CREATION_FEE,
        creator: "initminer".into(),
        new_account_name: name.into(),
        owner: Authority::from_key(key),
        active: Authority::from_key(key),
        posting: Authority::from_key(key),
        memo_key: key,
    })
}

pub(crate) fn producer_update(name: &str) -> Operation {
    Operation::ProducerUpdate(ProducerUpdateOperation {
        owner: name.into(),
        url: format!("https://{name}.example"),
        signing_key: Some(account_keypair(name).public_key()),
    })
}

pub(crate) fn transfer(from: &str, to: &str, amount: u64) -> Operation {
    Operation::Transfer(TransferOperation {
        from: from.into(),
        to: to.into(),
        amount,
        memo: String::new(),
    })
}
