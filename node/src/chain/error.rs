use thiserror::Error;

use crate::fork_db::ForkDbError;
use crate::state::StateError;
use crate::types::{AccountName, AuthorityLevel, BlockId, TransactionId, ValidationError};
use crate::utilities::crypto::PublicKey;
use crate::utilities::time::TimePointSec;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("Block {num} does not match checkpoint, expected {expected:?}, got {actual:?}")]
    CheckpointMismatch {
        num: u32,
        expected: BlockId,
        actual: BlockId,
    },
    #[error("Block does not build on head, expected previous {expected:?}, got {actual:?}")]
    InvalidPrevious { expected: BlockId, actual: BlockId },
    #[error("Block timestamp {timestamp} is not after head block time {head_time}")]
    BlockTooOld {
        timestamp: TimePointSec,
        head_time: TimePointSec,
    },
    #[error("Block timestamp {0} does not fall on a producer slot")]
    InvalidSlot(TimePointSec),
    #[error("Producer {actual} is not scheduled for this slot, expected {expected}")]
    WrongProducer {
        expected: AccountName,
        actual: AccountName,
    },
    #[error("Unknown producer {0}")]
    UnknownProducer(AccountName),
    #[error("Signing key does not match the registered key of producer {0}")]
    SigningKeyMismatch(AccountName),
    #[error("Invalid producer signature on block {0:?}")]
    InvalidProducerSignature(BlockId),
    #[error("Transaction merkle root mismatch on block {0:?}")]
    MerkleRootMismatch(BlockId),
    #[error("Block size {size} exceeds maximum {max}")]
    BlockTooLarge { size: usize, max: usize },
    #[error("Block {0:?} is not known")]
    UnknownBlock(BlockId),

    #[error("Duplicate transaction {0}")]
    DuplicateTransaction(TransactionId),
    #[error("Transaction expired at {expiration}, head block time is {now}")]
    TransactionExpired {
        expiration: TimePointSec,
        now: TimePointSec,
    },
    #[error("Transaction expiration {expiration} is too far in the future, maximum is {max}")]
    ExpirationTooFar {
        expiration: TimePointSec,
        max: TimePointSec,
    },
    #[error("Transaction references block {ref_block_num} with prefix {ref_block_prefix}, which is not on this chain")]
    TaposMismatch {
        ref_block_num: u16,
        ref_block_prefix: u32,
    },
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] ValidationError),
    #[error("Missing {level} authority of {account}")]
    MissingAuthority {
        level: AuthorityLevel,
        account: AccountName,
    },
    #[error("Transaction has signatures that are not needed")]
    IrrelevantSignature,
    #[error("Duplicate signature by {0}")]
    DuplicateSignature(PublicKey),
    #[error("Invalid signature by {0}")]
    InvalidSignature(PublicKey),
    #[error("Transaction has {count} signatures, maximum is {max}")]
    TooManySignatures { count: usize, max: usize },
    #[error("Posting authority can't be combined with active or owner authority")]
    MixedAuthority,
    #[error("Operation {index} ({name}) failed: {source}")]
    Operation {
        index: usize,
        name: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("Maintenance hook {hook} failed: {source}")]
    Maintenance {
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Undo history exhausted, head {head} is {distance} blocks past the last irreversible block")]
    UndoHistoryExhausted { head: u32, distance: u32 },
    #[error("Supply invariant violated, current supply {expected}, sum of balances {actual}")]
    SupplyMismatch { expected: u64, actual: u64 },
    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    ForkDb(#[from] ForkDbError),
    #[error("Block log failure: {0}")]
    BlockLog(#[source] anyhow::Error),
    #[error(transparent)]
    General(#[from] anyhow::Error),
}

impl ChainError {
    /// Errors that leave the node unable to continue safely.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChainError::UndoHistoryExhausted { .. }
                | ChainError::SupplyMismatch { .. }
                | ChainError::Invariant(_)
                | ChainError::BlockLog(_)
                | ChainError::State(StateError::UndoHistoryExhausted)
                | ChainError::ForkDb(ForkDbError::NoCommonAncestor { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;
